//! The vertex entry point: a vertex loop that converts vertex-input
//! attributes into the inputs struct, calls the shader `main` once per
//! vertex, and advances the caller's output buffer one outputs struct per
//! iteration.
use fnv::FnvHashMap;
use llvm_sys::core::*;
use llvm_sys::prelude::*;
use llvm_sys::LLVMIntPredicate;
use num_traits::FromPrimitive;
use pumice_llvm::cstr;
use spirv::{BuiltIn, Decoration};

use crate::error::{Error, Result};
use crate::interface::vertex_format_type;
use crate::ty::DecorationEntry;

use super::super::{EntryPointRecord, Translator};

const ARG_VERTEX_START_INDEX: u32 = 0;
const ARG_VERTEX_END_INDEX: u32 = 1;
const ARG_INSTANCE_ID: u32 = 2;
const ARG_OUTPUT_BUFFER: u32 = 3;
const ARG_BINDINGS: u32 = 4;
const ARG_UNIFORMS: u32 = 5;

struct InputMember {
    decorations: Vec<DecorationEntry>,
    ty: crate::ty::TypeRef,
    native_index: u32,
}

impl<'a> Translator<'a> {
    pub(crate) fn generate_vertex_entry(
        &mut self,
        record: &EntryPointRecord,
        main_function: LLVMValueRef,
    ) -> Result<String> {
        let at = record.instruction_start_index;
        let vertex_input = self.vertex_input().ok_or_else(|| {
            Error::translation("vertex entry point requires vertex input state")
        })?;
        let tcx = self.tcx();
        let cx = self.context_raw();
        let builder = self.builder_raw();

        let input_members: Vec<InputMember> = Translator::struct_layout(self.inputs_struct())
            .members()
            .iter()
            .map(|member| InputMember {
                decorations: member.decorations.clone(),
                ty: member.ty.clone(),
                native_index: member.native_member_index(),
            })
            .collect();

        let io_native = self.io_struct().materialize(tcx)?;
        let inputs_native = self.inputs_struct().materialize(tcx)?;
        let outputs_native = self.outputs_struct().materialize(tcx)?;
        let (inputs_member, outputs_member, uniforms_member) = self.io_members();
        let io_inputs_index = Translator::member_native_index(self.io_struct(), inputs_member);
        let io_outputs_index = Translator::member_native_index(self.io_struct(), outputs_member);
        let io_uniforms_index = Translator::member_native_index(self.io_struct(), uniforms_member);

        let name = self.prefixed_name("vertex_entry_point", true);
        unsafe {
            let i8_ty = LLVMInt8TypeInContext(cx);
            let i32_ty = LLVMInt32TypeInContext(cx);
            let i64_ty = LLVMInt64TypeInContext(cx);
            let ptr_ty = LLVMPointerTypeInContext(cx, 0);
            let void_ty = LLVMVoidTypeInContext(cx);

            let mut params = [i32_ty, i32_ty, i32_ty, ptr_ty, ptr_ty, ptr_ty];
            let fn_ty = LLVMFunctionType(void_ty, params.as_mut_ptr(), params.len() as u32, 0);
            let cname = cstr(&name);
            let entry_function = LLVMAddFunction(self.module_raw(), cname.as_ptr(), fn_ty);
            for (index, param_name) in [
                "vertex_start_index",
                "vertex_end_index",
                "instance_id",
                "output_buffer_",
                "bindings",
                "uniforms",
            ]
            .iter()
            .enumerate()
            {
                LLVMSetValueName2(
                    LLVMGetParam(entry_function, index as u32),
                    param_name.as_ptr() as *const _,
                    param_name.len(),
                );
            }
            let vertex_start = LLVMGetParam(entry_function, ARG_VERTEX_START_INDEX);
            let vertex_end = LLVMGetParam(entry_function, ARG_VERTEX_END_INDEX);
            let instance_id = LLVMGetParam(entry_function, ARG_INSTANCE_ID);
            let output_buffer_arg = LLVMGetParam(entry_function, ARG_OUTPUT_BUFFER);
            let bindings_arg = LLVMGetParam(entry_function, ARG_BINDINGS);
            let uniforms_arg = LLVMGetParam(entry_function, ARG_UNIFORMS);

            let entry_block = LLVMAppendBasicBlockInContext(cx, entry_function, cstr("entry").as_ptr());
            let loop_block = LLVMAppendBasicBlockInContext(cx, entry_function, cstr("loop").as_ptr());
            let exit_block = LLVMAppendBasicBlockInContext(cx, entry_function, cstr("exit").as_ptr());

            LLVMPositionBuilderAtEnd(builder, entry_block);
            let io_pointer = LLVMBuildAlloca(builder, io_native.ty, cstr("io_struct").as_ptr());
            LLVMSetAlignment(io_pointer, io_native.alignment);
            let inputs_pointer = LLVMBuildAlloca(builder, inputs_native.ty, cstr("inputs").as_ptr());
            LLVMSetAlignment(inputs_pointer, inputs_native.alignment);
            let zero_store = LLVMBuildStore(builder, LLVMConstNull(io_native.ty), io_pointer);
            LLVMSetAlignment(zero_store, io_native.alignment);
            let inputs_slot = LLVMBuildStructGEP2(
                builder,
                io_native.ty,
                io_pointer,
                io_inputs_index,
                cstr("inputs_pointer").as_ptr(),
            );
            LLVMBuildStore(builder, inputs_pointer, inputs_slot);
            let uniforms_slot = LLVMBuildStructGEP2(
                builder,
                io_native.ty,
                io_pointer,
                io_uniforms_index,
                cstr("uniforms_pointer").as_ptr(),
            );
            LLVMBuildStore(builder, uniforms_arg, uniforms_slot);

            // Per-binding base pointers, loaded from the caller's table once.
            let mut binding_values: FnvHashMap<u32, LLVMValueRef> = FnvHashMap::default();
            for description in &vertex_input.bindings {
                let mut indexes = [LLVMConstInt(i64_ty, description.binding as u64, 0)];
                let slot = LLVMBuildGEP2(
                    builder,
                    ptr_ty,
                    bindings_arg,
                    indexes.as_mut_ptr(),
                    indexes.len() as u32,
                    cstr("").as_ptr(),
                );
                let value =
                    LLVMBuildLoad2(builder, ptr_ty, slot, cstr("input_binding").as_ptr());
                if binding_values.insert(description.binding, value).is_some() {
                    return Err(Error::parser(at, "duplicate vertex input binding"));
                }
            }

            let start_condition = LLVMBuildICmp(
                builder,
                LLVMIntPredicate::LLVMIntULT,
                vertex_start,
                vertex_end,
                cstr("start_loop_condition").as_ptr(),
            );
            LLVMBuildCondBr(builder, start_condition, loop_block, exit_block);

            LLVMPositionBuilderAtEnd(builder, loop_block);
            let vertex_index = LLVMBuildPhi(builder, i32_ty, cstr("vertex_index").as_ptr());
            let output_buffer = LLVMBuildPhi(builder, ptr_ty, cstr("output_buffer").as_ptr());
            let next_vertex_index = LLVMBuildNUWAdd(
                builder,
                vertex_index,
                LLVMConstInt(i32_ty, 1, 0),
                cstr("next_vertex_index").as_ptr(),
            );
            let mut next_output_indexes = [LLVMConstInt(i64_ty, 1, 0)];
            let next_output_buffer = LLVMBuildGEP2(
                builder,
                outputs_native.ty,
                output_buffer,
                next_output_indexes.as_mut_ptr(),
                next_output_indexes.len() as u32,
                cstr("next_output_buffer").as_ptr(),
            );
            {
                let mut values = [next_vertex_index, vertex_start];
                let mut blocks = [loop_block, entry_block];
                LLVMAddIncoming(vertex_index, values.as_mut_ptr(), blocks.as_mut_ptr(), 2);
            }
            {
                let mut values = [next_output_buffer, output_buffer_arg];
                let mut blocks = [loop_block, entry_block];
                LLVMAddIncoming(output_buffer, values.as_mut_ptr(), blocks.as_mut_ptr(), 2);
            }

            for member in &input_members {
                let input_pointer = LLVMBuildStructGEP2(
                    builder,
                    inputs_native.ty,
                    inputs_pointer,
                    member.native_index,
                    cstr("input").as_ptr(),
                );
                let mut built_in: Option<BuiltIn> = None;
                let mut location: Option<u32> = None;
                for entry in &member.decorations {
                    match entry.decoration {
                        Decoration::BuiltIn => {
                            if built_in.is_some() {
                                return Err(Error::parser(
                                    at,
                                    "multiple BuiltIn decorations on the same variable",
                                ));
                            }
                            let value = entry.params.first().copied().ok_or_else(|| {
                                Error::parser(at, "BuiltIn decoration is missing its operand")
                            })?;
                            built_in = Some(BuiltIn::from_u32(value).ok_or_else(|| {
                                Error::parser(at, "unencoded BuiltIn enumerant")
                            })?);
                        }
                        Decoration::Location => {
                            if location.is_some() {
                                return Err(Error::parser(
                                    at,
                                    "multiple Location decorations on the same variable",
                                ));
                            }
                            location = entry.params.first().copied();
                        }
                        other => {
                            return Err(Error::parser(
                                at,
                                format!(
                                    "unimplemented member decoration on shader input variable: {:?}",
                                    other
                                ),
                            ))
                        }
                    }
                }
                let member_native = member.ty.materialize(tcx)?;
                match built_in {
                    Some(built_in) => {
                        if location.is_some() {
                            return Err(Error::parser(
                                at,
                                "Location decoration not implemented on built-in shader input variables",
                            ));
                        }
                        match built_in {
                            BuiltIn::VertexIndex => {
                                if member_native.ty != i32_ty {
                                    return Err(Error::parser(
                                        at,
                                        "invalid type for vertex index built-in variable",
                                    ));
                                }
                                LLVMBuildStore(builder, vertex_index, input_pointer);
                            }
                            other => {
                                return Err(Error::unsupported(format!(
                                    "unimplemented built in shader input variable: {:?}",
                                    other
                                )))
                            }
                        }
                    }
                    None => {
                        let location = location.ok_or_else(|| {
                            Error::parser(
                                at,
                                "non-built-in shader input variable is missing Location decoration",
                            )
                        })?;
                        let attribute = vertex_input
                            .attributes
                            .iter()
                            .find(|attribute| attribute.location == location)
                            .ok_or_else(|| {
                                Error::unsupported(
                                    "non-exactly-matched shader input variable Location \
                                     not implemented",
                                )
                            })?;
                        let binding_description =
                            vertex_input.binding(attribute.binding).ok_or_else(|| {
                                Error::parser(
                                    at,
                                    "vertex input binding number not found in \
                                     VkPipelineVertexInputStateCreateInfo::pVertexBindingDescriptions",
                                )
                            })?;
                        let base = *binding_values.get(&attribute.binding).ok_or_else(|| {
                            Error::parser(at, "vertex input binding was not loaded")
                        })?;
                        let element_index = match binding_description.input_rate {
                            ash::vk::VertexInputRate::INSTANCE => instance_id,
                            ash::vk::VertexInputRate::VERTEX => vertex_index,
                            other => {
                                return Err(Error::unsupported(format!(
                                    "unimplemented vertex input rate: {:?}",
                                    other
                                )))
                            }
                        };
                        // Stride zero reuses the binding pointer unchanged.
                        let element_pointer = if binding_description.stride != 0 {
                            let stride_array_ty =
                                LLVMArrayType2(i8_ty, binding_description.stride as u64);
                            let mut indexes = [element_index];
                            LLVMBuildGEP2(
                                builder,
                                stride_array_ty,
                                base,
                                indexes.as_mut_ptr(),
                                indexes.len() as u32,
                                cstr("input_element").as_ptr(),
                            )
                        } else {
                            base
                        };
                        let mut offset_indexes =
                            [LLVMConstInt(i64_ty, attribute.offset as u64, 0)];
                        let value_pointer = LLVMBuildGEP2(
                            builder,
                            i8_ty,
                            element_pointer,
                            offset_indexes.as_mut_ptr(),
                            offset_indexes.len() as u32,
                            cstr("input_value_ptr").as_ptr(),
                        );
                        let format_ty = vertex_format_type(attribute.format)?;
                        let format_native = format_ty.materialize(tcx)?;
                        if format_native.ty != member_native.ty {
                            return Err(Error::unsupported(
                                "unimplemented vertex input variable type conversion",
                            ));
                        }
                        // Attribute offsets are only component-aligned, so
                        // the load alignment is the component's, not the
                        // vector's.
                        let format_alignment = match format_ty.as_vector() {
                            Some((element, _)) => element.materialize(tcx)?.alignment,
                            None => format_native.alignment,
                        };
                        let value = LLVMBuildLoad2(
                            builder,
                            format_native.ty,
                            value_pointer,
                            cstr("unconverted_input_value").as_ptr(),
                        );
                        LLVMSetAlignment(value, format_alignment);
                        let store = LLVMBuildStore(builder, value, input_pointer);
                        LLVMSetAlignment(store, member_native.alignment);
                    }
                }
            }

            let outputs_slot = LLVMBuildStructGEP2(
                builder,
                io_native.ty,
                io_pointer,
                io_outputs_index,
                cstr("outputs_pointer").as_ptr(),
            );
            LLVMBuildStore(builder, output_buffer, outputs_slot);

            let mut main_params = [ptr_ty];
            let main_fn_ty = LLVMFunctionType(void_ty, main_params.as_mut_ptr(), 1, 0);
            let mut call_args = [io_pointer];
            LLVMBuildCall2(
                builder,
                main_fn_ty,
                main_function,
                call_args.as_mut_ptr(),
                call_args.len() as u32,
                cstr("").as_ptr(),
            );

            let next_condition = LLVMBuildICmp(
                builder,
                LLVMIntPredicate::LLVMIntULT,
                next_vertex_index,
                vertex_end,
                cstr("next_iteration_condition").as_ptr(),
            );
            LLVMBuildCondBr(builder, next_condition, loop_block, exit_block);

            LLVMPositionBuilderAtEnd(builder, exit_block);
            LLVMBuildRetVoid(builder);
        }
        Ok(name)
    }
}
