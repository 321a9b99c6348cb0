//! The fragment entry point: wires the io struct, calls the shader `main`,
//! then clamps and quantizes the Location 0 color output into one RGBA8
//! pixel.
use llvm_sys::core::*;
use llvm_sys::prelude::*;
use llvm_sys::LLVMRealPredicate;
use num_traits::FromPrimitive;
use pumice_llvm::cstr;
use spirv::{BuiltIn, Decoration};

use crate::error::{Error, Result};
use crate::ty::DecorationEntry;

use super::super::{EntryPointRecord, Translator};

struct MemberInfo {
    decorations: Vec<DecorationEntry>,
    ty: crate::ty::TypeRef,
    native_index: u32,
}

fn collect_members(layout: &crate::ty::StructLayout) -> Vec<MemberInfo> {
    layout
        .members()
        .iter()
        .map(|member| MemberInfo {
            decorations: member.decorations.clone(),
            ty: member.ty.clone(),
            native_index: member.native_member_index(),
        })
        .collect()
}

impl<'a> Translator<'a> {
    pub(crate) fn generate_fragment_entry(
        &mut self,
        record: &EntryPointRecord,
        main_function: LLVMValueRef,
    ) -> Result<String> {
        let at = record.instruction_start_index;
        let tcx = self.tcx();
        let cx = self.context_raw();
        let builder = self.builder_raw();

        let input_members = collect_members(Translator::struct_layout(self.inputs_struct()));
        let output_members = collect_members(Translator::struct_layout(self.outputs_struct()));

        let io_native = self.io_struct().materialize(tcx)?;
        let inputs_native = self.inputs_struct().materialize(tcx)?;
        let outputs_native = self.outputs_struct().materialize(tcx)?;
        let (inputs_member, outputs_member, _) = self.io_members();
        let io_inputs_index = Translator::member_native_index(self.io_struct(), inputs_member);
        let io_outputs_index = Translator::member_native_index(self.io_struct(), outputs_member);

        let name = self.prefixed_name("fragment_entry_point", true);
        unsafe {
            let i8_ty = LLVMInt8TypeInContext(cx);
            let i32_ty = LLVMInt32TypeInContext(cx);
            let f32_ty = LLVMFloatTypeInContext(cx);
            let vec4_ty = LLVMVectorType(f32_ty, 4);
            let u8vec4_ty = LLVMVectorType(i8_ty, 4);
            let ptr_ty = LLVMPointerTypeInContext(cx, 0);
            let void_ty = LLVMVoidTypeInContext(cx);

            let mut params = [ptr_ty];
            let fn_ty = LLVMFunctionType(void_ty, params.as_mut_ptr(), params.len() as u32, 0);
            let cname = cstr(&name);
            let entry_function = LLVMAddFunction(self.module_raw(), cname.as_ptr(), fn_ty);
            let pixel_pointer = LLVMGetParam(entry_function, 0);
            let pixel_name = "color_attachment_pixel";
            LLVMSetValueName2(pixel_pointer, pixel_name.as_ptr() as *const _, pixel_name.len());

            let entry_block = LLVMAppendBasicBlockInContext(cx, entry_function, cstr("entry").as_ptr());
            LLVMPositionBuilderAtEnd(builder, entry_block);

            let io_pointer = LLVMBuildAlloca(builder, io_native.ty, cstr("io_struct").as_ptr());
            LLVMSetAlignment(io_pointer, io_native.alignment);
            let inputs_pointer = LLVMBuildAlloca(builder, inputs_native.ty, cstr("inputs").as_ptr());
            LLVMSetAlignment(inputs_pointer, inputs_native.alignment);
            let outputs_pointer =
                LLVMBuildAlloca(builder, outputs_native.ty, cstr("outputs").as_ptr());
            LLVMSetAlignment(outputs_pointer, outputs_native.alignment);
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
            let outputs_slot = LLVMBuildStructGEP2(
                builder,
                io_native.ty,
                io_pointer,
                io_outputs_index,
                cstr("outputs_pointer").as_ptr(),
            );
            LLVMBuildStore(builder, outputs_pointer, outputs_slot);

            // Fragment built-in inputs are all still unimplemented; refuse
            // them precisely rather than feed the shader garbage.
            if let Some(member) = input_members.first() {
                let mut built_in: Option<BuiltIn> = None;
                for entry in &member.decorations {
                    match entry.decoration {
                        Decoration::BuiltIn => {
                            let value = entry.params.first().copied().ok_or_else(|| {
                                Error::parser(at, "BuiltIn decoration is missing its operand")
                            })?;
                            built_in = Some(BuiltIn::from_u32(value).ok_or_else(|| {
                                Error::parser(at, "unencoded BuiltIn enumerant")
                            })?);
                        }
                        Decoration::Location => {}
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
                return match built_in {
                    Some(built_in) => Err(Error::unsupported(format!(
                        "unimplemented built in shader input variable: {:?}",
                        built_in
                    ))),
                    None => Err(Error::unsupported(
                        "non-built-in fragment shader input variables are not implemented",
                    )),
                };
            }

            // The color load is deferred until after the shader call.
            let mut color_pointer: Option<(LLVMValueRef, u32)> = None;
            for member in &output_members {
                let output_pointer = LLVMBuildStructGEP2(
                    builder,
                    outputs_native.ty,
                    outputs_pointer,
                    member.native_index,
                    cstr("output").as_ptr(),
                );
                let mut location: Option<u32> = None;
                for entry in &member.decorations {
                    match entry.decoration {
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
                                    "unimplemented member decoration on shader output variable: {:?}",
                                    other
                                ),
                            ))
                        }
                    }
                }
                let location = location.ok_or_else(|| {
                    Error::parser(
                        at,
                        "fragment shader output variable is missing Location decoration",
                    )
                })?;
                if location != 0 {
                    return Err(Error::unsupported(
                        "nonzero Location for fragment shader output variable",
                    ));
                }
                let member_native = member.ty.materialize(tcx)?;
                if member_native.ty != vec4_ty {
                    return Err(Error::unsupported(
                        "fragment shader output variable type is unimplemented",
                    ));
                }
                if color_pointer.is_some() {
                    return Err(Error::parser(at, "duplicate fragment shader output variable"));
                }
                color_pointer = Some((output_pointer, member_native.alignment));
            }

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

            let (color_pointer, color_alignment) = color_pointer.ok_or_else(|| {
                Error::parser(at, "no fragment shader color output variables")
            })?;
            let output_color =
                LLVMBuildLoad2(builder, vec4_ty, color_pointer, cstr("output_color").as_ptr());
            LLVMSetAlignment(output_color, color_alignment);

            let one = LLVMConstReal(f32_ty, 1.0);
            let mut ones = [one, one, one, one];
            let one_vec = LLVMConstVector(ones.as_mut_ptr(), 4);
            let zero_vec = LLVMConstNull(vec4_ty);
            // ULT so NaN lanes clamp to zero.
            let too_small = LLVMBuildFCmp(
                builder,
                LLVMRealPredicate::LLVMRealULT,
                output_color,
                zero_vec,
                cstr("output_color_is_too_small").as_ptr(),
            );
            let too_large = LLVMBuildFCmp(
                builder,
                LLVMRealPredicate::LLVMRealOGT,
                output_color,
                one_vec,
                cstr("output_color_is_too_large").as_ptr(),
            );
            let upper_clamped = LLVMBuildSelect(
                builder,
                too_large,
                one_vec,
                output_color,
                cstr("").as_ptr(),
            );
            let clamped = LLVMBuildSelect(
                builder,
                too_small,
                zero_vec,
                upper_clamped,
                cstr("clamped_output_color").as_ptr(),
            );
            // Largest float below 256: scaling then truncating toward zero is
            // the exact 8-bit unorm encoding without the x255 rounding bias.
            let multiplier_value = f32::from_bits(256.0f32.to_bits() - 1);
            let multiplier = LLVMConstReal(f32_ty, multiplier_value as f64);
            let mut multipliers = [multiplier, multiplier, multiplier, multiplier];
            let multiplier_vec = LLVMConstVector(multipliers.as_mut_ptr(), 4);
            let scaled = LLVMBuildFMul(
                builder,
                multiplier_vec,
                clamped,
                cstr("scaled_output_color").as_ptr(),
            );
            let converted = LLVMBuildFPToUI(
                builder,
                scaled,
                u8vec4_ty,
                cstr("converted_output_color").as_ptr(),
            );
            let packed = LLVMBuildBitCast(
                builder,
                converted,
                i32_ty,
                cstr("packed_output_color").as_ptr(),
            );
            let store = LLVMBuildStore(builder, packed, pixel_pointer);
            LLVMSetAlignment(store, 4);
            LLVMBuildRetVoid(builder);
        }
        Ok(name)
    }
}
