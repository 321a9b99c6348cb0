//! Entry-point synthesis: host-ABI wrappers that marshal caller buffers into
//! and out of the translated shader's `io_struct` ABI.
mod fragment;
mod vertex;
