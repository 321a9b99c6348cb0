//! End-to-end pipeline scenarios: assemble SPIR-V by hand, build a pipeline,
//! run the JIT-compiled entry points, and check the bytes that come out.
use std::ffi::CString;
use std::os::raw::c_void;

use ash::vk;
use pumice_pipeline::{GraphicsPipeline, ShaderModule};
use pumice_spirv::{Instruction, InstructionBuilder, SpirvHeader};
use spirv::{
    AddressingModel, BuiltIn, Capability, Decoration, ExecutionMode, ExecutionModel, MemoryModel,
    Op, StorageClass,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn assemble(bound: u32, instrs: &[Instruction]) -> Vec<u32> {
    let mut header = SpirvHeader::default();
    header.bound = bound;
    let mut words = header.words().to_vec();
    for instr in instrs {
        words.extend_from_slice(instr.as_ref());
    }
    words
}

fn preamble(execution_model: ExecutionModel, main_id: u32, interface: &[u32]) -> Vec<Instruction> {
    let mut instrs = vec![
        InstructionBuilder::new(Op::Capability)
            .push(Capability::Shader as u32)
            .build(),
        InstructionBuilder::new(Op::MemoryModel)
            .push(AddressingModel::Logical as u32)
            .push(MemoryModel::GLSL450 as u32)
            .build(),
        InstructionBuilder::new(Op::EntryPoint)
            .push(execution_model as u32)
            .push(main_id)
            .push_str("main")
            .push_list(interface)
            .build(),
    ];
    if execution_model == ExecutionModel::Fragment {
        instrs.push(
            InstructionBuilder::new(Op::ExecutionMode)
                .push(main_id)
                .push(ExecutionMode::OriginUpperLeft as u32)
                .build(),
        );
    }
    instrs
}

/// S1: a vertex shader whose `main` does nothing.
fn empty_vertex_shader() -> Vec<u32> {
    let mut instrs = preamble(ExecutionModel::Vertex, 4, &[]);
    instrs.extend([
        InstructionBuilder::new(Op::TypeVoid).push(1).build(),
        InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
        InstructionBuilder::new(Op::Function).push(1).push(4).push(0).push(2).build(),
        InstructionBuilder::new(Op::Label).push(5).build(),
        InstructionBuilder::new(Op::Return).build(),
        InstructionBuilder::new(Op::FunctionEnd).build(),
    ]);
    assemble(16, &instrs)
}

/// S2: one `Input` vec4 at Location 0 copied to one `Output` vec4 at
/// Location 0.
fn passthrough_vertex_shader() -> Vec<u32> {
    let mut instrs = preamble(ExecutionModel::Vertex, 4, &[10, 11]);
    instrs.extend([
        InstructionBuilder::new(Op::Decorate)
            .push(10)
            .push(Decoration::Location as u32)
            .push(0)
            .build(),
        InstructionBuilder::new(Op::Decorate)
            .push(11)
            .push(Decoration::Location as u32)
            .push(0)
            .build(),
        InstructionBuilder::new(Op::TypeVoid).push(1).build(),
        InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
        InstructionBuilder::new(Op::TypeFloat).push(5).push(32).build(),
        InstructionBuilder::new(Op::TypeVector).push(6).push(5).push(4).build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(7)
            .push(StorageClass::Input as u32)
            .push(6)
            .build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(8)
            .push(StorageClass::Output as u32)
            .push(6)
            .build(),
        InstructionBuilder::new(Op::Variable)
            .push(7)
            .push(10)
            .push(StorageClass::Input as u32)
            .build(),
        InstructionBuilder::new(Op::Variable)
            .push(8)
            .push(11)
            .push(StorageClass::Output as u32)
            .build(),
        InstructionBuilder::new(Op::Function).push(1).push(4).push(0).push(2).build(),
        InstructionBuilder::new(Op::Label).push(12).build(),
        InstructionBuilder::new(Op::Load).push(6).push(13).push(10).build(),
        InstructionBuilder::new(Op::Store).push(11).push(13).build(),
        InstructionBuilder::new(Op::Return).build(),
        InstructionBuilder::new(Op::FunctionEnd).build(),
    ]);
    assemble(20, &instrs)
}

/// S3: reads `VertexIndex` and writes it, bitcast to float, to Location 0.
fn vertex_index_shader() -> Vec<u32> {
    let mut instrs = preamble(ExecutionModel::Vertex, 4, &[10, 11]);
    instrs.extend([
        InstructionBuilder::new(Op::Decorate)
            .push(10)
            .push(Decoration::BuiltIn as u32)
            .push(BuiltIn::VertexIndex as u32)
            .build(),
        InstructionBuilder::new(Op::Decorate)
            .push(11)
            .push(Decoration::Location as u32)
            .push(0)
            .build(),
        InstructionBuilder::new(Op::TypeVoid).push(1).build(),
        InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
        InstructionBuilder::new(Op::TypeInt).push(5).push(32).push(0).build(),
        InstructionBuilder::new(Op::TypeFloat).push(6).push(32).build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(7)
            .push(StorageClass::Input as u32)
            .push(5)
            .build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(8)
            .push(StorageClass::Output as u32)
            .push(6)
            .build(),
        InstructionBuilder::new(Op::Variable)
            .push(7)
            .push(10)
            .push(StorageClass::Input as u32)
            .build(),
        InstructionBuilder::new(Op::Variable)
            .push(8)
            .push(11)
            .push(StorageClass::Output as u32)
            .build(),
        InstructionBuilder::new(Op::Function).push(1).push(4).push(0).push(2).build(),
        InstructionBuilder::new(Op::Label).push(12).build(),
        InstructionBuilder::new(Op::Load).push(5).push(13).push(10).build(),
        InstructionBuilder::new(Op::Bitcast).push(6).push(14).push(13).build(),
        InstructionBuilder::new(Op::Store).push(11).push(14).build(),
        InstructionBuilder::new(Op::Return).build(),
        InstructionBuilder::new(Op::FunctionEnd).build(),
    ]);
    assemble(20, &instrs)
}

/// A fragment shader writing a constant vec4 to its sole Location 0 output.
fn constant_color_fragment_shader(color: [f32; 4]) -> Vec<u32> {
    let mut instrs = preamble(ExecutionModel::Fragment, 4, &[11]);
    instrs.extend([
        InstructionBuilder::new(Op::Decorate)
            .push(11)
            .push(Decoration::Location as u32)
            .push(0)
            .build(),
        InstructionBuilder::new(Op::TypeVoid).push(1).build(),
        InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
        InstructionBuilder::new(Op::TypeFloat).push(5).push(32).build(),
        InstructionBuilder::new(Op::TypeVector).push(6).push(5).push(4).build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(8)
            .push(StorageClass::Output as u32)
            .push(6)
            .build(),
        InstructionBuilder::new(Op::Constant).push(5).push(20).push_f32(color[0]).build(),
        InstructionBuilder::new(Op::Constant).push(5).push(21).push_f32(color[1]).build(),
        InstructionBuilder::new(Op::Constant).push(5).push(22).push_f32(color[2]).build(),
        InstructionBuilder::new(Op::Constant).push(5).push(23).push_f32(color[3]).build(),
        InstructionBuilder::new(Op::ConstantComposite)
            .push(6)
            .push(24)
            .push_list(&[20, 21, 22, 23])
            .build(),
        InstructionBuilder::new(Op::Variable)
            .push(8)
            .push(11)
            .push(StorageClass::Output as u32)
            .build(),
        InstructionBuilder::new(Op::Function).push(1).push(4).push(0).push(2).build(),
        InstructionBuilder::new(Op::Label).push(12).build(),
        InstructionBuilder::new(Op::Store).push(11).push(24).build(),
        InstructionBuilder::new(Op::Return).build(),
        InstructionBuilder::new(Op::FunctionEnd).build(),
    ]);
    assemble(30, &instrs)
}

/// Writes `smod(-7, 3)` and `smod(7, -3)`, bitcast to float, to Locations 0
/// and 1.
fn smod_vertex_shader() -> Vec<u32> {
    let mut instrs = preamble(ExecutionModel::Vertex, 4, &[11, 12]);
    instrs.extend([
        InstructionBuilder::new(Op::Decorate)
            .push(11)
            .push(Decoration::Location as u32)
            .push(0)
            .build(),
        InstructionBuilder::new(Op::Decorate)
            .push(12)
            .push(Decoration::Location as u32)
            .push(1)
            .build(),
        InstructionBuilder::new(Op::TypeVoid).push(1).build(),
        InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
        InstructionBuilder::new(Op::TypeInt).push(5).push(32).push(1).build(),
        InstructionBuilder::new(Op::TypeFloat).push(6).push(32).build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(8)
            .push(StorageClass::Output as u32)
            .push(6)
            .build(),
        InstructionBuilder::new(Op::Constant).push(5).push(20).push(-7i32 as u32).build(),
        InstructionBuilder::new(Op::Constant).push(5).push(21).push(3).build(),
        InstructionBuilder::new(Op::Constant).push(5).push(22).push(7).build(),
        InstructionBuilder::new(Op::Constant).push(5).push(23).push(-3i32 as u32).build(),
        InstructionBuilder::new(Op::Variable)
            .push(8)
            .push(11)
            .push(StorageClass::Output as u32)
            .build(),
        InstructionBuilder::new(Op::Variable)
            .push(8)
            .push(12)
            .push(StorageClass::Output as u32)
            .build(),
        InstructionBuilder::new(Op::Function).push(1).push(4).push(0).push(2).build(),
        InstructionBuilder::new(Op::Label).push(13).build(),
        InstructionBuilder::new(Op::SMod).push(5).push(14).push(20).push(21).build(),
        InstructionBuilder::new(Op::SMod).push(5).push(15).push(22).push(23).build(),
        InstructionBuilder::new(Op::Bitcast).push(6).push(16).push(14).build(),
        InstructionBuilder::new(Op::Bitcast).push(6).push(17).push(15).build(),
        InstructionBuilder::new(Op::Store).push(11).push(16).build(),
        InstructionBuilder::new(Op::Store).push(12).push(17).build(),
        InstructionBuilder::new(Op::Return).build(),
        InstructionBuilder::new(Op::FunctionEnd).build(),
    ]);
    assemble(30, &instrs)
}

/// Computes `sqrt(16.0)` through GLSL.std.450 and writes it to Location 0.
fn glsl_sqrt_vertex_shader() -> Vec<u32> {
    let instrs = vec![
        InstructionBuilder::new(Op::Capability)
            .push(Capability::Shader as u32)
            .build(),
        InstructionBuilder::new(Op::ExtInstImport)
            .push(3)
            .push_str("GLSL.std.450")
            .build(),
        InstructionBuilder::new(Op::MemoryModel)
            .push(AddressingModel::Logical as u32)
            .push(MemoryModel::GLSL450 as u32)
            .build(),
        InstructionBuilder::new(Op::EntryPoint)
            .push(ExecutionModel::Vertex as u32)
            .push(4)
            .push_str("main")
            .push_list(&[11])
            .build(),
        InstructionBuilder::new(Op::Decorate)
            .push(11)
            .push(Decoration::Location as u32)
            .push(0)
            .build(),
        InstructionBuilder::new(Op::TypeVoid).push(1).build(),
        InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
        InstructionBuilder::new(Op::TypeFloat).push(6).push(32).build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(8)
            .push(StorageClass::Output as u32)
            .push(6)
            .build(),
        InstructionBuilder::new(Op::Constant).push(6).push(20).push_f32(16.0).build(),
        InstructionBuilder::new(Op::Variable)
            .push(8)
            .push(11)
            .push(StorageClass::Output as u32)
            .build(),
        InstructionBuilder::new(Op::Function).push(1).push(4).push(0).push(2).build(),
        InstructionBuilder::new(Op::Label).push(12).build(),
        InstructionBuilder::new(Op::ExtInst)
            .push(6)
            .push(13)
            .push(3)
            .push(spirv::GLOp::Sqrt as u32)
            .push(20)
            .build(),
        InstructionBuilder::new(Op::Store).push(11).push(13).build(),
        InstructionBuilder::new(Op::Return).build(),
        InstructionBuilder::new(Op::FunctionEnd).build(),
    ];
    assemble(30, &instrs)
}

/// Structured selection: writes 100.0 for vertex indices below six and 200.0
/// otherwise, merging the two arms through an `OpPhi`.
fn select_vertex_shader() -> Vec<u32> {
    let mut instrs = preamble(ExecutionModel::Vertex, 4, &[10, 11]);
    instrs.extend([
        InstructionBuilder::new(Op::Decorate)
            .push(10)
            .push(Decoration::BuiltIn as u32)
            .push(BuiltIn::VertexIndex as u32)
            .build(),
        InstructionBuilder::new(Op::Decorate)
            .push(11)
            .push(Decoration::Location as u32)
            .push(0)
            .build(),
        InstructionBuilder::new(Op::TypeVoid).push(1).build(),
        InstructionBuilder::new(Op::TypeFunction).push(2).push(1).build(),
        InstructionBuilder::new(Op::TypeInt).push(5).push(32).push(0).build(),
        InstructionBuilder::new(Op::TypeFloat).push(6).push(32).build(),
        InstructionBuilder::new(Op::TypeBool).push(7).build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(8)
            .push(StorageClass::Input as u32)
            .push(5)
            .build(),
        InstructionBuilder::new(Op::TypePointer)
            .push(9)
            .push(StorageClass::Output as u32)
            .push(6)
            .build(),
        InstructionBuilder::new(Op::Constant).push(5).push(20).push(6).build(),
        InstructionBuilder::new(Op::Constant).push(6).push(21).push_f32(100.0).build(),
        InstructionBuilder::new(Op::Constant).push(6).push(22).push_f32(200.0).build(),
        InstructionBuilder::new(Op::Variable)
            .push(8)
            .push(10)
            .push(StorageClass::Input as u32)
            .build(),
        InstructionBuilder::new(Op::Variable)
            .push(9)
            .push(11)
            .push(StorageClass::Output as u32)
            .build(),
        InstructionBuilder::new(Op::Function).push(1).push(4).push(0).push(2).build(),
        InstructionBuilder::new(Op::Label).push(12).build(),
        InstructionBuilder::new(Op::Load).push(5).push(13).push(10).build(),
        InstructionBuilder::new(Op::ULessThan).push(7).push(14).push(13).push(20).build(),
        InstructionBuilder::new(Op::SelectionMerge).push(17).push(0).build(),
        InstructionBuilder::new(Op::BranchConditional).push(14).push(15).push(16).build(),
        InstructionBuilder::new(Op::Label).push(15).build(),
        InstructionBuilder::new(Op::Branch).push(17).build(),
        InstructionBuilder::new(Op::Label).push(16).build(),
        InstructionBuilder::new(Op::Branch).push(17).build(),
        InstructionBuilder::new(Op::Label).push(17).build(),
        InstructionBuilder::new(Op::Phi)
            .push(6)
            .push(18)
            .push_list(&[21, 15, 22, 16])
            .build(),
        InstructionBuilder::new(Op::Store).push(11).push(18).build(),
        InstructionBuilder::new(Op::Return).build(),
        InstructionBuilder::new(Op::FunctionEnd).build(),
    ]);
    assemble(30, &instrs)
}

/// S6: declares the `Geometry` capability, which is outside the allowlist.
fn geometry_capability_shader() -> Vec<u32> {
    assemble(
        8,
        &[InstructionBuilder::new(Op::Capability)
            .push(Capability::Geometry as u32)
            .build()],
    )
}

struct StageDescription {
    stage: vk::ShaderStageFlags,
    words: Vec<u32>,
}

fn build_pipeline(
    stages: &[StageDescription],
    vertex_bindings: &[vk::VertexInputBindingDescription],
    vertex_attributes: &[vk::VertexInputAttributeDescription],
) -> Result<GraphicsPipeline, pumice_pipeline::Error> {
    let entry_name = CString::new("main").unwrap();
    unsafe {
        let mut module_handles = Vec::with_capacity(stages.len());
        let mut stage_infos = Vec::with_capacity(stages.len());
        for stage in stages {
            let module_info = vk::ShaderModuleCreateInfo::builder().code(&stage.words).build();
            let module = match ShaderModule::create(&module_info) {
                Ok(module) => module,
                Err(err) => {
                    for handle in module_handles {
                        drop(ShaderModule::from_handle(handle));
                    }
                    return Err(err);
                }
            };
            let handle = ShaderModule::into_handle(Box::new(module));
            module_handles.push(handle);
            stage_infos.push(
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(handle)
                    .name(&entry_name)
                    .build(),
            );
        }
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(vertex_bindings)
            .vertex_attribute_descriptions(vertex_attributes)
            .build();
        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input_info)
            .build();
        let result = GraphicsPipeline::create(&create_info);
        // The pipeline copies everything it needs; the modules can go.
        for handle in module_handles {
            drop(ShaderModule::from_handle(handle));
        }
        result
    }
}

#[repr(C, align(16))]
#[derive(Clone, Copy, Default, Debug, PartialEq)]
struct Vec4([f32; 4]);

#[test]
fn s1_empty_passthrough() {
    init_logging();
    let pipeline = build_pipeline(
        &[StageDescription {
            stage: vk::ShaderStageFlags::VERTEX,
            words: empty_vertex_shader(),
        }],
        &[],
        &[],
    )
    .unwrap();
    // start == end: the loop body must not run, and the null output buffer
    // must not be touched.
    unsafe {
        pipeline.run_vertex_shader(
            0,
            0,
            0,
            std::ptr::null_mut(),
            std::ptr::null(),
            std::ptr::null_mut(),
        );
    }
}

#[test]
fn s2_single_attribute_passthrough() {
    init_logging();
    let bindings = [vk::VertexInputBindingDescription {
        binding: 0,
        stride: 16,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    let attributes = [vk::VertexInputAttributeDescription {
        location: 0,
        binding: 0,
        format: vk::Format::R32G32B32A32_SFLOAT,
        offset: 0,
    }];
    let pipeline = build_pipeline(
        &[StageDescription {
            stage: vk::ShaderStageFlags::VERTEX,
            words: passthrough_vertex_shader(),
        }],
        &bindings,
        &attributes,
    )
    .unwrap();
    assert_eq!(pipeline.vertex_output_struct_size(), 16);

    let vertex_data = [
        Vec4([1.0, 0.0, 0.0, 0.0]),
        Vec4([0.0, 1.0, 0.0, 0.0]),
        Vec4([0.0, 0.0, 1.0, 0.0]),
    ];
    let mut output = [Vec4::default(); 3];
    let binding_pointers = [vertex_data.as_ptr() as *const c_void];
    unsafe {
        pipeline.run_vertex_shader(
            0,
            3,
            0,
            output.as_mut_ptr() as *mut c_void,
            binding_pointers.as_ptr(),
            std::ptr::null_mut(),
        );
    }
    assert_eq!(output, vertex_data);
}

#[test]
fn s3_vertex_index_builtin() {
    init_logging();
    let pipeline = build_pipeline(
        &[StageDescription {
            stage: vk::ShaderStageFlags::VERTEX,
            words: vertex_index_shader(),
        }],
        &[],
        &[],
    )
    .unwrap();
    assert_eq!(pipeline.vertex_output_struct_size(), 4);

    let mut output = [0f32; 3];
    unsafe {
        pipeline.run_vertex_shader(
            5,
            8,
            0,
            output.as_mut_ptr() as *mut c_void,
            std::ptr::null(),
            std::ptr::null_mut(),
        );
    }
    let indices: Vec<u32> = output.iter().map(|value| value.to_bits()).collect();
    assert_eq!(indices, vec![5, 6, 7]);
}

#[test]
fn s4_constant_pixel_fragment() {
    init_logging();
    let pipeline = build_pipeline(
        &[
            StageDescription {
                stage: vk::ShaderStageFlags::VERTEX,
                words: empty_vertex_shader(),
            },
            StageDescription {
                stage: vk::ShaderStageFlags::FRAGMENT,
                words: constant_color_fragment_shader([0.0, 1.0, 0.0, 1.0]),
            },
        ],
        &[],
        &[],
    )
    .unwrap();
    let mut pixel: u32 = 0;
    unsafe { pipeline.run_fragment_shader(&mut pixel) };
    assert_eq!(pixel, 0xFF00_FF00);
}

#[test]
fn s5_fragment_clamp_and_quantize() {
    init_logging();
    let pipeline = build_pipeline(
        &[
            StageDescription {
                stage: vk::ShaderStageFlags::VERTEX,
                words: empty_vertex_shader(),
            },
            StageDescription {
                stage: vk::ShaderStageFlags::FRAGMENT,
                words: constant_color_fragment_shader([-0.5, 0.5, 1.5, 0.5]),
            },
        ],
        &[],
        &[],
    )
    .unwrap();
    let mut pixel: u32 = 0;
    unsafe { pipeline.run_fragment_shader(&mut pixel) };
    // pack(floor(clamp(v, 0, 1) * nextafter(256, -inf))): the 0.5 channels
    // scale to just below 128 and truncate to 127.
    let multiplier = f32::from_bits(256.0f32.to_bits() - 1);
    let expected_half = (0.5f32 * multiplier) as u32 as u8;
    assert_eq!(
        pixel.to_le_bytes(),
        [0, expected_half, 255, expected_half]
    );
}

#[test]
fn s6_geometry_capability_is_refused() {
    init_logging();
    let err = build_pipeline(
        &[StageDescription {
            stage: vk::ShaderStageFlags::VERTEX,
            words: geometry_capability_shader(),
        }],
        &[],
        &[],
    )
    .unwrap_err();
    let text = err.to_string();
    assert!(
        text.contains("capability not implemented: Geometry"),
        "{}",
        text
    );
}

/// Property: each stage resolves to its own distinct entry address.
#[test]
fn entry_points_are_distinct() {
    init_logging();
    let pipeline = build_pipeline(
        &[
            StageDescription {
                stage: vk::ShaderStageFlags::VERTEX,
                words: empty_vertex_shader(),
            },
            StageDescription {
                stage: vk::ShaderStageFlags::FRAGMENT,
                words: constant_color_fragment_shader([0.0, 0.0, 0.0, 1.0]),
            },
        ],
        &[],
        &[],
    )
    .unwrap();
    let vertex_address = pipeline.vertex_shader_function() as usize;
    let fragment_address = pipeline.fragment_shader_function().unwrap() as usize;
    assert_ne!(vertex_address, 0);
    assert_ne!(fragment_address, 0);
    assert_ne!(vertex_address, fragment_address);
}

#[test]
fn glsl_sqrt_through_ext_inst() {
    init_logging();
    let pipeline = build_pipeline(
        &[StageDescription {
            stage: vk::ShaderStageFlags::VERTEX,
            words: glsl_sqrt_vertex_shader(),
        }],
        &[],
        &[],
    )
    .unwrap();
    let mut output = [0f32; 1];
    unsafe {
        pipeline.run_vertex_shader(
            0,
            1,
            0,
            output.as_mut_ptr() as *mut c_void,
            std::ptr::null(),
            std::ptr::null_mut(),
        );
    }
    assert_eq!(output[0], 4.0);
}

#[test]
fn structured_selection_merges_through_phi() {
    init_logging();
    let pipeline = build_pipeline(
        &[StageDescription {
            stage: vk::ShaderStageFlags::VERTEX,
            words: select_vertex_shader(),
        }],
        &[],
        &[],
    )
    .unwrap();
    let mut output = [0f32; 3];
    unsafe {
        pipeline.run_vertex_shader(
            5,
            8,
            0,
            output.as_mut_ptr() as *mut c_void,
            std::ptr::null(),
            std::ptr::null_mut(),
        );
    }
    assert_eq!(output, [100.0, 200.0, 200.0]);
}

/// `OpSMod` takes the divisor's sign; `OpSRem` would give -1 and -2 here.
#[test]
fn smod_follows_divisor_sign() {
    init_logging();
    let pipeline = build_pipeline(
        &[StageDescription {
            stage: vk::ShaderStageFlags::VERTEX,
            words: smod_vertex_shader(),
        }],
        &[],
        &[],
    )
    .unwrap();
    assert_eq!(pipeline.vertex_output_struct_size(), 8);

    let mut output = [0f32; 2];
    unsafe {
        pipeline.run_vertex_shader(
            0,
            1,
            0,
            output.as_mut_ptr() as *mut c_void,
            std::ptr::null(),
            std::ptr::null_mut(),
        );
    }
    assert_eq!(output[0].to_bits() as i32, 2);
    assert_eq!(output[1].to_bits() as i32, -2);
}

/// Derivative pipelines are recognized and refused.
#[test]
fn derivative_pipelines_are_refused() {
    init_logging();
    let entry_name = CString::new("main").unwrap();
    unsafe {
        let words = empty_vertex_shader();
        let module_info = vk::ShaderModuleCreateInfo::builder().code(&words).build();
        let module = ShaderModule::create(&module_info).unwrap();
        let handle = ShaderModule::into_handle(Box::new(module));
        let stage_infos = [vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(handle)
            .name(&entry_name)
            .build()];
        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .flags(vk::PipelineCreateFlags::DERIVATIVE)
            .stages(&stage_infos)
            .build();
        let err = GraphicsPipeline::create(&create_info).unwrap_err();
        assert!(err.to_string().contains("derived pipelines"), "{}", err);
        drop(ShaderModule::from_handle(handle));
    }
}
