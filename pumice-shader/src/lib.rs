//! # pumice-shader: SPIR-V → native code for the pumice software Vulkan driver.
//!
//! The defining job of this crate is turning a SPIR-V shader module into a
//! native-callable LLVM module at pipeline-creation time. It is organized as:
//!
//! - [`ty`]: the type-descriptor graph and the packed struct layout engine;
//! - [`translate`]: the two-pass translator (pass 1 builds the id table and
//!   the shader interface, pass 2 emits IR) together with the vertex and
//!   fragment entry-point synthesizers;
//! - [`interface`]: the vertex-input description carrier and format table.
//!
//! Everything is deterministic given the SPIR-V words and the target data
//! layout: two runs over the same input produce byte-identical IR text and
//! identical interface struct layouts.
mod constant;
mod error;
pub mod interface;
mod translate;
pub mod ty;

pub use error::{Error, Result};
pub use interface::VertexInputState;

use pumice_llvm::{Context, Module, TargetMachine};
use spirv::ExecutionModel;

use translate::Translator;

/// The product of one translation: the IR module plus everything the
/// pipeline assembler needs to wire the stage up.
pub struct TranslatedShader {
    pub module: Module,
    /// Symbol name of the synthesized entry wrapper.
    pub entry_function_name: String,
    /// The packed inputs struct (one member per `Input` interface variable).
    pub inputs: ty::TypeRef,
    /// The packed outputs struct; its ABI size is the varyings stride.
    pub outputs: ty::TypeRef,
    pub execution_model: ExecutionModel,
}

impl std::fmt::Debug for TranslatedShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatedShader")
            .field("entry_function_name", &self.entry_function_name)
            .field("execution_model", &self.execution_model)
            .finish_non_exhaustive()
    }
}

/// Translates one shader stage.
///
/// `vertex_input` is required when synthesizing a vertex entry point and
/// ignored otherwise. The returned module lives in `context` and still has
/// to pass verification before it is handed to the JIT.
pub fn translate(
    context: &Context,
    target_machine: &TargetMachine,
    words: &[u32],
    shader_id: u64,
    execution_model: ExecutionModel,
    entry_point_name: &str,
    vertex_input: Option<&VertexInputState>,
) -> Result<TranslatedShader> {
    log::debug!(
        "translating shader {} ({:?}, entry {:?})",
        shader_id,
        execution_model,
        entry_point_name
    );
    Translator::new(
        context,
        target_machine,
        shader_id,
        execution_model,
        entry_point_name,
        vertex_input,
    )
    .run(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumice_spirv::{InstructionBuilder, SpirvHeader};
    use spirv::Op;

    /// vec4 passthrough vertex shader: one Input at Location 0 copied to one
    /// Output at Location 0.
    fn passthrough_vertex_shader() -> Vec<u32> {
        let mut header = SpirvHeader::default();
        header.bound = 20;
        let mut words = header.words().to_vec();
        let instrs = [
            InstructionBuilder::new(Op::Capability)
                .push(spirv::Capability::Shader as u32)
                .build(),
            InstructionBuilder::new(Op::MemoryModel)
                .push(spirv::AddressingModel::Logical as u32)
                .push(spirv::MemoryModel::GLSL450 as u32)
                .build(),
            InstructionBuilder::new(Op::EntryPoint)
                .push(spirv::ExecutionModel::Vertex as u32)
                .push(4)
                .push_str("main")
                .push_list(&[10, 11])
                .build(),
            InstructionBuilder::new(Op::Decorate)
                .push(10)
                .push(spirv::Decoration::Location as u32)
                .push(0)
                .build(),
            InstructionBuilder::new(Op::Decorate)
                .push(11)
                .push(spirv::Decoration::Location as u32)
                .push(0)
                .build(),
            InstructionBuilder::new(Op::TypeVoid).push(1).build(),
            InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
            InstructionBuilder::new(Op::TypeFloat).push(5).push(32).build(),
            InstructionBuilder::new(Op::TypeVector).push(6).push(5).push(4).build(),
            InstructionBuilder::new(Op::TypePointer)
                .push(7)
                .push(spirv::StorageClass::Input as u32)
                .push(6)
                .build(),
            InstructionBuilder::new(Op::TypePointer)
                .push(8)
                .push(spirv::StorageClass::Output as u32)
                .push(6)
                .build(),
            InstructionBuilder::new(Op::Variable)
                .push(7)
                .push(10)
                .push(spirv::StorageClass::Input as u32)
                .build(),
            InstructionBuilder::new(Op::Variable)
                .push(8)
                .push(11)
                .push(spirv::StorageClass::Output as u32)
                .build(),
            InstructionBuilder::new(Op::Function)
                .push(1)
                .push(4)
                .push(0)
                .push(2)
                .build(),
            InstructionBuilder::new(Op::Label).push(12).build(),
            InstructionBuilder::new(Op::Load).push(6).push(13).push(10).build(),
            InstructionBuilder::new(Op::Store).push(11).push(13).build(),
            InstructionBuilder::new(Op::Return).build(),
            InstructionBuilder::new(Op::FunctionEnd).build(),
        ];
        for instr in &instrs {
            words.extend_from_slice(instr.as_ref());
        }
        words
    }

    fn vertex_input_for_vec4() -> VertexInputState {
        use ash::vk;
        VertexInputState {
            bindings: vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: 16,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            attributes: vec![vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            }],
        }
    }

    /// Determinism: two independent runs over the same words and data layout
    /// print byte-identical IR.
    #[test]
    fn translation_is_deterministic() {
        let words = passthrough_vertex_shader();
        let vertex_input = vertex_input_for_vec4();
        let mut texts = Vec::new();
        for _ in 0..2 {
            let context = Context::create().unwrap();
            let machine = TargetMachine::create_native().unwrap();
            let shader = translate(
                &context,
                &machine,
                &words,
                1,
                ExecutionModel::Vertex,
                "main",
                Some(&vertex_input),
            )
            .unwrap();
            shader.module.verify().unwrap();
            texts.push(shader.module.print_to_string());
        }
        assert_eq!(texts[0], texts[1]);
    }

    /// A reference to an id that was never defined is a parse error, not a
    /// crash.
    #[test]
    fn dangling_id_is_reported() {
        let mut header = SpirvHeader::default();
        header.bound = 20;
        let mut words = header.words().to_vec();
        let instrs = [
            InstructionBuilder::new(Op::Capability)
                .push(spirv::Capability::Shader as u32)
                .build(),
            InstructionBuilder::new(Op::MemoryModel)
                .push(spirv::AddressingModel::Logical as u32)
                .push(spirv::MemoryModel::GLSL450 as u32)
                .build(),
            InstructionBuilder::new(Op::EntryPoint)
                .push(spirv::ExecutionModel::Vertex as u32)
                .push(4)
                .push_str("main")
                .build(),
            // Vector of an undefined component type.
            InstructionBuilder::new(Op::TypeVector).push(6).push(5).push(4).build(),
        ];
        for instr in &instrs {
            words.extend_from_slice(instr.as_ref());
        }
        let context = Context::create().unwrap();
        let machine = TargetMachine::create_native().unwrap();
        let err = translate(
            &context,
            &machine,
            &words,
            1,
            ExecutionModel::Vertex,
            "main",
            None,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Parser { .. }), "{}", err);
    }

    /// Missing and duplicate entry points are fatal.
    #[test]
    fn missing_entry_point_is_fatal() {
        let words = passthrough_vertex_shader();
        let vertex_input = vertex_input_for_vec4();
        let context = Context::create().unwrap();
        let machine = TargetMachine::create_native().unwrap();
        let err = translate(
            &context,
            &machine,
            &words,
            1,
            ExecutionModel::Vertex,
            "not_main",
            Some(&vertex_input),
        )
        .unwrap_err();
        assert!(err.to_string().contains("can't find entry point"), "{}", err);
    }

    /// Uniform variables are recognized but not yet laid out.
    #[test]
    fn uniform_variables_are_refused() {
        let mut header = SpirvHeader::default();
        header.bound = 20;
        let mut words = header.words().to_vec();
        let instrs = [
            InstructionBuilder::new(Op::Capability)
                .push(spirv::Capability::Shader as u32)
                .build(),
            InstructionBuilder::new(Op::MemoryModel)
                .push(spirv::AddressingModel::Logical as u32)
                .push(spirv::MemoryModel::GLSL450 as u32)
                .build(),
            InstructionBuilder::new(Op::EntryPoint)
                .push(spirv::ExecutionModel::Vertex as u32)
                .push(4)
                .push_str("main")
                .build(),
            InstructionBuilder::new(Op::TypeFloat).push(5).push(32).build(),
            InstructionBuilder::new(Op::TypePointer)
                .push(7)
                .push(spirv::StorageClass::Uniform as u32)
                .push(5)
                .build(),
            InstructionBuilder::new(Op::Variable)
                .push(7)
                .push(10)
                .push(spirv::StorageClass::Uniform as u32)
                .build(),
        ];
        for instr in &instrs {
            words.extend_from_slice(instr.as_ref());
        }
        let context = Context::create().unwrap();
        let machine = TargetMachine::create_native().unwrap();
        let err = translate(
            &context,
            &machine,
            &words,
            1,
            ExecutionModel::Vertex,
            "main",
            None,
        )
        .unwrap_err();
        assert!(
            err.to_string()
                .contains("unimplemented OpVariable storage class: Uniform"),
            "{}",
            err
        );
    }

    /// Unsupported capabilities are refused by name after closure.
    #[test]
    fn geometry_capability_is_refused() {
        let mut header = SpirvHeader::default();
        header.bound = 8;
        let mut words = header.words().to_vec();
        words.extend_from_slice(
            InstructionBuilder::new(Op::Capability)
                .push(spirv::Capability::Geometry as u32)
                .build()
                .as_ref(),
        );
        let context = Context::create().unwrap();
        let machine = TargetMachine::create_native().unwrap();
        let err = translate(
            &context,
            &machine,
            &words,
            1,
            ExecutionModel::Vertex,
            "main",
            None,
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("capability not implemented: Geometry"),
            "{}",
            err
        );
    }
}
