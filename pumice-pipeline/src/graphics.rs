//! Graphics-pipeline assembly.
//!
//! For each shader stage: derive the execution model from the stage bit, run
//! the translator, verify the module, hand it to one shared ORC stack, and
//! resolve the synthesized entry point into a typed function pointer. The
//! pipeline exclusively owns the JIT stack backing those pointers; dropping
//! it invalidates them.
use std::ffi::CStr;
use std::os::raw::c_void;

use ash::vk;
use pumice_llvm::{Context, OrcStack, TargetMachine};
use pumice_shader::ty::TypeContext;
use pumice_shader::{translate, Error, Result, VertexInputState};
use spirv::{BuiltIn, Decoration, ExecutionModel};

use crate::ShaderModule;

/// Host ABI of the synthesized vertex entry point.
pub type VertexShaderFunction = unsafe extern "C" fn(
    vertex_start_index: u32,
    vertex_end_index: u32,
    instance_id: u32,
    output_buffer: *mut c_void,
    bindings: *const *const c_void,
    uniforms: *mut c_void,
);
/// Host ABI of the synthesized fragment entry point.
pub type FragmentShaderFunction = unsafe extern "C" fn(color_attachment_pixel: *mut u32);

/// Owns the JIT stack and the context its code lives in. Field order is the
/// drop order: code first, then the context that produced it.
#[allow(dead_code)]
struct Implementation {
    jit_stack: OrcStack,
    llvm_context: Context,
}

/// Maps a stage bit to its execution model; the mapping is bijective, and
/// every stage this pipeline kind cannot host is refused here.
fn execution_model_for_stage(stage: vk::ShaderStageFlags) -> Result<ExecutionModel> {
    if stage == vk::ShaderStageFlags::VERTEX {
        Ok(ExecutionModel::Vertex)
    } else if stage == vk::ShaderStageFlags::FRAGMENT {
        Ok(ExecutionModel::Fragment)
    } else if stage == vk::ShaderStageFlags::GEOMETRY {
        Err(Error::unsupported("geometry shader stages"))
    } else if stage == vk::ShaderStageFlags::TESSELLATION_CONTROL
        || stage == vk::ShaderStageFlags::TESSELLATION_EVALUATION
    {
        Err(Error::unsupported("tessellation shader stages"))
    } else if stage == vk::ShaderStageFlags::COMPUTE {
        Err(Error::unsupported(
            "compute shaders cannot be created from a graphics pipeline",
        ))
    } else {
        Err(Error::unsupported(format!("unknown shader stage {:?}", stage)))
    }
}

pub struct GraphicsPipeline {
    implementation: Implementation,
    vertex_fn: VertexShaderFunction,
    vertex_output_struct_size: usize,
    vertex_output_struct_alignment: usize,
    vertex_position_output_offset: Option<usize>,
    fragment_fn: Option<FragmentShaderFunction>,
    viewport: vk::Viewport,
    scissor: vk::Rect2D,
}

impl GraphicsPipeline {
    /// Builds a pipeline from a `VkGraphicsPipelineCreateInfo`.
    ///
    /// # Safety
    /// Every pointer/count pair the create-info carries must be valid, and
    /// `module` handles must come from [`ShaderModule::into_handle`]; this is
    /// the Vulkan API contract for the struct.
    pub unsafe fn create(create_info: &vk::GraphicsPipelineCreateInfo) -> Result<GraphicsPipeline> {
        assert_eq!(
            create_info.s_type,
            vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO
        );
        if create_info
            .flags
            .contains(vk::PipelineCreateFlags::DERIVATIVE)
        {
            return Err(Error::unsupported("creating derived pipelines"));
        }

        let llvm_context = Context::create()?;
        let target_machine = TargetMachine::create_native()?;
        let target_data = target_machine.create_target_data();

        let vertex_input_state = if create_info.p_vertex_input_state.is_null() {
            None
        } else {
            Some(VertexInputState::from_create_info(
                &*create_info.p_vertex_input_state,
            ))
        };

        let stages: &[vk::PipelineShaderStageCreateInfo] = if create_info.stage_count == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(create_info.p_stages, create_info.stage_count as usize)
        };
        let mut shaders = Vec::with_capacity(stages.len());
        for (index, stage) in stages.iter().enumerate() {
            assert_eq!(
                stage.s_type,
                vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO
            );
            let execution_model = execution_model_for_stage(stage.stage)?;
            let shader_module = ShaderModule::from_handle_ref(stage.module)
                .ok_or_else(|| Error::runtime("pipeline stage has a null shader module"))?;
            let entry_point_name = CStr::from_ptr(stage.p_name)
                .to_str()
                .map_err(|_| Error::runtime("pipeline stage entry-point name is not UTF-8"))?;
            let shader = translate(
                &llvm_context,
                &target_machine,
                shader_module.words(),
                index as u64 + 1,
                execution_model,
                entry_point_name,
                vertex_input_state.as_ref(),
            )?;
            if let Err(text) = shader.module.verify() {
                return Err(Error::translation(text));
            }
            log::debug!(
                "stage {} ({:?}) translated and verified",
                index,
                execution_model
            );
            shaders.push(shader);
        }

        let jit_stack = OrcStack::create(target_machine)?;
        let mut vertex_fn: Option<VertexShaderFunction> = None;
        let mut vertex_output_struct_size = 0usize;
        let mut vertex_output_struct_alignment = 1usize;
        let mut vertex_position_output_offset = None;
        let mut fragment_fn: Option<FragmentShaderFunction> = None;
        for shader in shaders {
            let entry_function_name = shader.entry_function_name.clone();
            let outputs = shader.outputs.clone();
            let execution_model = shader.execution_model;
            jit_stack.add_eagerly_compiled(shader.module, &llvm_context)?;
            let address = jit_stack.symbol_address(&entry_function_name)?;
            log::debug!(
                "shader entry {:?} resolved to {:#x}",
                entry_function_name,
                address
            );
            match execution_model {
                ExecutionModel::Vertex => {
                    vertex_fn =
                        Some(std::mem::transmute::<usize, VertexShaderFunction>(address));
                    let tcx = TypeContext {
                        context: llvm_context.raw(),
                        target_data: target_data.raw(),
                    };
                    let native = outputs.materialize(tcx)?;
                    vertex_output_struct_size = target_data.abi_size(native.ty) as usize;
                    vertex_output_struct_alignment = native.alignment as usize;
                    vertex_position_output_offset = position_output_offset(&outputs, tcx, native);
                }
                ExecutionModel::Fragment => {
                    fragment_fn =
                        Some(std::mem::transmute::<usize, FragmentShaderFunction>(address));
                }
                other => {
                    return Err(Error::unsupported(format!(
                        "unimplemented execution model: {:?}",
                        other
                    )))
                }
            }
        }
        let vertex_fn = vertex_fn.ok_or_else(|| {
            Error::translation("graphics pipeline doesn't have a vertex shader")
        })?;

        let (viewport, scissor) = viewport_state(create_info);

        Ok(GraphicsPipeline {
            implementation: Implementation {
                jit_stack,
                llvm_context,
            },
            vertex_fn,
            vertex_output_struct_size,
            vertex_output_struct_alignment,
            vertex_position_output_offset,
            fragment_fn,
            viewport,
            scissor,
        })
    }

    /// Runs the vertex loop over `[vertex_start_index, vertex_end_index)`.
    ///
    /// # Safety
    /// `output_buffer` must hold at least `end - start` outputs structs at
    /// [`vertex_output_struct_size`](Self::vertex_output_struct_size) stride,
    /// aligned to
    /// [`vertex_output_struct_alignment`](Self::vertex_output_struct_alignment);
    /// `bindings` must cover every binding number the pipeline's vertex input
    /// state declares.
    pub unsafe fn run_vertex_shader(
        &self,
        vertex_start_index: u32,
        vertex_end_index: u32,
        instance_id: u32,
        output_buffer: *mut c_void,
        bindings: *const *const c_void,
        uniforms: *mut c_void,
    ) {
        (self.vertex_fn)(
            vertex_start_index,
            vertex_end_index,
            instance_id,
            output_buffer,
            bindings,
            uniforms,
        );
    }

    /// Runs the fragment entry on one pixel.
    ///
    /// # Safety
    /// The pipeline must contain a fragment stage and `color_attachment_pixel`
    /// must be writable.
    pub unsafe fn run_fragment_shader(&self, color_attachment_pixel: *mut u32) {
        let fragment_fn = self
            .fragment_fn
            .expect("graphics pipeline has no fragment stage");
        fragment_fn(color_attachment_pixel);
    }

    pub fn vertex_shader_function(&self) -> VertexShaderFunction {
        self.vertex_fn
    }
    pub fn fragment_shader_function(&self) -> Option<FragmentShaderFunction> {
        self.fragment_fn
    }
    /// ABI size of the outputs struct; the rasterizer's varyings stride.
    pub fn vertex_output_struct_size(&self) -> usize {
        self.vertex_output_struct_size
    }
    pub fn vertex_output_struct_alignment(&self) -> usize {
        self.vertex_output_struct_alignment
    }
    /// Byte offset of the `Position` built-in inside the outputs struct,
    /// when the vertex shader writes one.
    pub fn vertex_position_output_offset(&self) -> Option<usize> {
        self.vertex_position_output_offset
    }
    pub fn viewport(&self) -> vk::Viewport {
        self.viewport
    }
    pub fn scissor(&self) -> vk::Rect2D {
        self.scissor
    }
}

impl std::fmt::Debug for GraphicsPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsPipeline")
            .field("vertex_output_struct_size", &self.vertex_output_struct_size)
            .field(
                "vertex_position_output_offset",
                &self.vertex_position_output_offset,
            )
            .field("has_fragment_stage", &self.fragment_fn.is_some())
            .finish_non_exhaustive()
    }
}

fn position_output_offset(
    outputs: &pumice_shader::ty::TypeRef,
    tcx: TypeContext,
    native: pumice_shader::ty::NativeType,
) -> Option<usize> {
    let layout = outputs.as_struct()?;
    for member in layout.members().iter() {
        let is_position = member.decorations.iter().any(|entry| {
            entry.decoration == Decoration::BuiltIn
                && entry.params.first().copied() == Some(BuiltIn::Position as u32)
        });
        if is_position {
            return Some(tcx.element_offset(native.ty, member.native_member_index()) as usize);
        }
    }
    None
}

unsafe fn viewport_state(
    create_info: &vk::GraphicsPipelineCreateInfo,
) -> (vk::Viewport, vk::Rect2D) {
    let mut viewport = vk::Viewport::default();
    let mut scissor = vk::Rect2D::default();
    if !create_info.p_viewport_state.is_null() {
        let state = &*create_info.p_viewport_state;
        if state.viewport_count > 0 && !state.p_viewports.is_null() {
            viewport = *state.p_viewports;
        }
        if state.scissor_count > 0 && !state.p_scissors.is_null() {
            scissor = *state.p_scissors;
        }
    }
    (viewport, scissor)
}
