//! # pumice-spirv: SPIR-V front-end for the pumice software Vulkan driver.
//!
//! This crate owns the word-stream layer: the binary container, header
//! validation, an instruction cursor that reports each instruction's word
//! offset (the blame location every downstream diagnostic carries), operand
//! decoding, and typed per-opcode operand structs. It deliberately knows
//! nothing about code generation; the translator in `pumice-shader` drives
//! [`parse`] twice with its own visitor.
//!
//! Enumerations come from the `spirv` crate and are decoded with
//! `num_traits::FromPrimitive`; an opcode or enumerant outside the known set
//! is a parse error, not a fall-through.
mod binary;
mod error;
mod instr;
pub mod ops;

pub use binary::{parse, SpirvBinary, SpirvHeader, Visitor, HEADER_LEN, MAGIC};
pub use error::{ParseError, Result};
pub use instr::{Instr, Instrs, Instruction, InstructionBuilder, Operands};

pub use spirv;
