//! # pumice-pipeline: graphics pipelines for the pumice software Vulkan driver.
//!
//! A [`GraphicsPipeline`] is assembled from a `VkGraphicsPipelineCreateInfo`:
//! each stage's SPIR-V is translated to an LLVM module, verified, compiled by
//! one shared ORC stack, and exposed as a typed entry-point function pointer.
//! The pipeline owns the JIT stack exclusively; the rasterizer must not cache
//! the function pointers past the pipeline's lifetime.
mod graphics;
mod shader_module;

pub use graphics::{FragmentShaderFunction, GraphicsPipeline, VertexShaderFunction};
pub use shader_module::ShaderModule;

pub use pumice_shader::{Error, Result};
