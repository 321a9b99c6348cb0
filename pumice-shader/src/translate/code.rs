//! Pass-2 handlers: functions, memory access, composites, conversions,
//! arithmetic, compares, and control flow.
use std::os::raw::c_char;

use llvm_sys::core::*;
use llvm_sys::prelude::*;
use llvm_sys::{LLVMIntPredicate, LLVMOpcode, LLVMRealPredicate};
use pumice_llvm::cstr;
use pumice_spirv::{ops, Instr};

use crate::error::{Error, Result};
use crate::ty::{Type, TypeKind, TypeRef};

use super::{EntryBlock, FunctionState, Id, Stage, Translator, Value};

pub(super) type UnaryEmitter =
    unsafe extern "C" fn(LLVMBuilderRef, LLVMValueRef, *const c_char) -> LLVMValueRef;
pub(super) type BinaryEmitter =
    unsafe extern "C" fn(LLVMBuilderRef, LLVMValueRef, LLVMValueRef, *const c_char) -> LLVMValueRef;

/// Suffix LLVM uses to mangle an overloaded intrinsic for `ty`.
pub(super) fn intrinsic_suffix(ty: &TypeRef) -> Result<String> {
    match ty.kind() {
        TypeKind::Float { width } => Ok(format!("f{}", width)),
        TypeKind::Int { width, .. } => Ok(format!("i{}", width)),
        TypeKind::Bool => Ok("i1".to_owned()),
        TypeKind::Vector { element, count } => {
            Ok(format!("v{}{}", count, intrinsic_suffix(element)?))
        }
        _ => Err(Error::translation(
            "intrinsic requested for a type with no overload suffix",
        )),
    }
}

impl<'a> Translator<'a> {
    // ---- functions ------------------------------------------------------

    pub(super) fn op_function(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpFunction::decode(instr, at)?;
        self.begin_function(op.result, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let function_type = self.ty_of(op.function_type, at)?;
        let signature = function_type
            .as_function()
            .ok_or_else(|| Error::parser(at, "OpFunction type is not a function type"))?;
        let state = self.state_ref(op.result);
        if !state.entry_points.is_empty() && !signature.valid_for_entry_point {
            return Err(Error::parser(at, "invalid function type for entry point"));
        }
        let mut name = self.name_of(op.result);
        if name.is_empty() && state.entry_points.len() == 1 {
            name = state.entry_points[0].name.clone();
        }
        let name = self.make_prefixed_name(&name);
        let native = function_type.materialize(self.tcx())?;
        let cname = cstr(&name);
        let raw = unsafe { LLVMAddFunction(self.module_raw(), cname.as_ptr(), native.ty) };
        self.state(op.result, at)?.function = Some(FunctionState {
            ty: function_type,
            raw,
            entry: None,
            name,
            next_param: 0,
        });
        Ok(())
    }

    pub(super) fn op_function_parameter(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpFunctionParameter::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        let function_id = self
            .current_function()
            .ok_or_else(|| Error::parser(at, "OpFunctionParameter outside a function"))?;
        let (raw, index) = {
            let state = self.state(function_id, at)?;
            let function = state
                .function
                .as_mut()
                .ok_or_else(|| Error::parser(at, "OpFunctionParameter before OpFunction"))?;
            let index = function.next_param;
            function.next_param += 1;
            (function.raw, index)
        };
        // Parameter 0 is the implicit io-struct pointer.
        let raw = unsafe { LLVMGetParam(raw, index + 1) };
        let ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty })
    }

    pub(super) fn op_function_end(&mut self, _instr: &Instr, at: usize) -> Result<()> {
        self.end_function(at)?;
        if self.stage() == Stage::GenerateCode {
            self.resolve_pending_phis()?;
        }
        Ok(())
    }

    pub(super) fn op_function_call(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpFunctionCall::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let (callee_raw, callee_ty) = match &self.checked_state_ref(op.function, at)?.function {
            Some(function) => (function.raw, function.ty.clone()),
            None => {
                return Err(Error::translation(
                    "OpFunctionCall to a function not yet defined is not implemented",
                ))
            }
        };
        let callee_native = callee_ty.materialize(self.tcx())?;
        let caller_id = self
            .current_function()
            .ok_or_else(|| Error::parser(at, "OpFunctionCall outside a function"))?;
        let caller_raw = match &self.state_ref(caller_id).function {
            Some(function) => function.raw,
            None => return Err(Error::parser(at, "OpFunctionCall in an undeclared function")),
        };
        let mut args = Vec::with_capacity(1 + op.args.len());
        args.push(unsafe { LLVMGetParam(caller_raw, 0) });
        for &arg in op.args {
            args.push(self.value_of(arg, at)?.raw);
        }
        let result_ty = self.ty_of(op.result_type, at)?;
        let name = if result_ty.is_void() {
            String::new()
        } else {
            self.name_of(op.result)
        };
        let cname = cstr(&name);
        let raw = unsafe {
            LLVMBuildCall2(
                self.builder_raw(),
                callee_native.ty,
                callee_raw,
                args.as_mut_ptr(),
                args.len() as u32,
                cname.as_ptr(),
            )
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    // ---- memory ---------------------------------------------------------

    fn check_memory_access(access: Option<u32>, what: &str, at: usize) -> Result<()> {
        let access = access.unwrap_or(0);
        if access & ops::memory_access::VOLATILE != 0 {
            return Err(Error::unsupported(format!("{} volatile", what)));
        }
        if access & ops::memory_access::ALIGNED != 0 {
            return Err(Error::unsupported(format!("{} alignment", what)));
        }
        if access & ops::memory_access::NONTEMPORAL != 0 {
            return Err(Error::unsupported(format!("{} nontemporal", what)));
        }
        let _ = at;
        Ok(())
    }

    pub(super) fn op_load(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpLoad::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        Self::check_memory_access(op.memory_access, "OpLoad", at)?;
        let pointer = self.value_of(op.pointer, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            let load = LLVMBuildLoad2(self.builder_raw(), native.ty, pointer.raw, name.as_ptr());
            LLVMSetAlignment(load, native.alignment);
            load
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_store(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpStore::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        Self::check_memory_access(op.memory_access, "OpStore", at)?;
        let object = self.value_of(op.object, at)?;
        let pointer = self.value_of(op.pointer, at)?;
        let native = object.ty.materialize(self.tcx())?;
        unsafe {
            let store = LLVMBuildStore(self.builder_raw(), object.raw, pointer.raw);
            LLVMSetAlignment(store, native.alignment);
        }
        Ok(())
    }

    pub(super) fn op_access_chain(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpAccessChain::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let base = self.value_of(op.base, at)?;
        let base_pointee = base
            .ty
            .as_pointer()
            .ok_or_else(|| Error::parser(at, "base type is not a pointer for OpAccessChain"))?
            .pointee()
            .ok_or_else(|| Error::parser(at, "base pointer type is incomplete"))?;
        let base_native = base_pointee.materialize(self.tcx())?;
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        let mut indexes: Vec<LLVMValueRef> = Vec::with_capacity(op.indexes.len() + 1);
        indexes.push(unsafe { LLVMConstInt(i32_ty, 0, 0) });
        let mut current = base_pointee;
        for &index in op.indexes {
            current = match current.kind() {
                TypeKind::Vector { element, .. }
                | TypeKind::Array { element, .. }
                | TypeKind::RuntimeArray { element } => {
                    indexes.push(self.value_of(index, at)?.raw);
                    element.clone()
                }
                TypeKind::Struct(layout) => {
                    let member_index = self.unsigned_constant(index, at)? as usize;
                    let members = layout.members();
                    let member = members.get(member_index).ok_or_else(|| {
                        Error::parser(at, "index out of range in OpAccessChain")
                    })?;
                    indexes.push(unsafe {
                        LLVMConstInt(i32_ty, member.native_member_index() as u64, 0)
                    });
                    member.ty.clone()
                }
                TypeKind::Matrix { .. } => {
                    return Err(Error::parser(
                        at,
                        "unimplemented composite type for OpAccessChain",
                    ))
                }
                _ => {
                    return Err(Error::parser(
                        at,
                        "invalid composite type for OpAccessChain",
                    ))
                }
            };
        }
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildGEP2(
                self.builder_raw(),
                base_native.ty,
                base.raw,
                indexes.as_mut_ptr(),
                indexes.len() as u32,
                name.as_ptr(),
            )
        };
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    // ---- composites -----------------------------------------------------

    pub(super) fn op_vector_shuffle(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpVectorShuffle::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let vector_1 = self.value_of(op.vector_1, at)?;
        let vector_2 = self.value_of(op.vector_2, at)?;
        let lanes_1 = vector_1
            .ty
            .as_vector()
            .map(|(_, count)| count)
            .ok_or_else(|| Error::parser(at, "OpVectorShuffle operand is not a vector"))?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        let name = cstr(&self.name_of(op.result));
        let mut raw = unsafe { LLVMGetUndef(native.ty) };
        for (lane, &component) in op.components.iter().enumerate() {
            // 0xFFFFFFFF selects an undefined lane.
            if component == u32::MAX {
                continue;
            }
            let (source, index) = if component < lanes_1 {
                (vector_1.raw, component)
            } else {
                (vector_2.raw, component - lanes_1)
            };
            unsafe {
                let element = LLVMBuildExtractElement(
                    self.builder_raw(),
                    source,
                    LLVMConstInt(i32_ty, index as u64, 0),
                    cstr("").as_ptr(),
                );
                let lane_name = if lane + 1 == op.components.len() {
                    name.as_ptr()
                } else {
                    cstr("").as_ptr()
                };
                raw = LLVMBuildInsertElement(
                    self.builder_raw(),
                    raw,
                    element,
                    LLVMConstInt(i32_ty, lane as u64, 0),
                    lane_name,
                );
            }
        }
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_composite_construct(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpCompositeConstruct::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        let raw = match result_ty.kind() {
            TypeKind::Vector { count, .. } => {
                if op.constituents.len() < 2 {
                    return Err(Error::parser(at, "too few inputs to construct a vector"));
                }
                let mut raw = unsafe { LLVMGetUndef(native.ty) };
                let mut lane: u32 = 0;
                let mut insert = |value: LLVMValueRef, last: bool| -> Result<()> {
                    if lane >= *count {
                        return Err(Error::parser(
                            at,
                            "too many input vector elements to fit in output vector",
                        ));
                    }
                    unsafe {
                        raw = LLVMBuildInsertElement(
                            self.builder_raw(),
                            raw,
                            value,
                            LLVMConstInt(i32_ty, lane as u64, 0),
                            if last && lane + 1 == *count {
                                name.as_ptr()
                            } else {
                                cstr("").as_ptr()
                            },
                        );
                    }
                    lane += 1;
                    Ok(())
                };
                for (position, &constituent) in op.constituents.iter().enumerate() {
                    let last = position + 1 == op.constituents.len();
                    let value = self.value_of(constituent, at)?;
                    if let Some((_, sub_count)) = value.ty.as_vector() {
                        for sub_lane in 0..sub_count {
                            let element = unsafe {
                                LLVMBuildExtractElement(
                                    self.builder_raw(),
                                    value.raw,
                                    LLVMConstInt(i32_ty, sub_lane as u64, 0),
                                    cstr("").as_ptr(),
                                )
                            };
                            insert(element, last)?;
                        }
                    } else {
                        insert(value.raw, last)?;
                    }
                }
                if lane < *count {
                    return Err(Error::parser(
                        at,
                        "too few input vector elements to fill output vector",
                    ));
                }
                raw
            }
            TypeKind::Struct(layout) => {
                if op.constituents.len() != layout.member_count() {
                    return Err(Error::parser(at, "wrong number of constituents for type"));
                }
                let native_indexes: Vec<u32> = layout
                    .members()
                    .iter()
                    .map(|member| member.native_member_index())
                    .collect();
                // Start from zero so the padding fillers hold defined bytes.
                let mut raw = unsafe { LLVMConstNull(native.ty) };
                for (position, &constituent) in op.constituents.iter().enumerate() {
                    let value = self.value_of(constituent, at)?;
                    raw = unsafe {
                        LLVMBuildInsertValue(
                            self.builder_raw(),
                            raw,
                            value.raw,
                            native_indexes[position],
                            if position + 1 == op.constituents.len() {
                                name.as_ptr()
                            } else {
                                cstr("").as_ptr()
                            },
                        )
                    };
                }
                raw
            }
            TypeKind::Array { length, .. } => {
                if op.constituents.len() != *length as usize {
                    return Err(Error::parser(at, "wrong number of constituents for type"));
                }
                let mut raw = unsafe { LLVMGetUndef(native.ty) };
                for (position, &constituent) in op.constituents.iter().enumerate() {
                    let value = self.value_of(constituent, at)?;
                    raw = unsafe {
                        LLVMBuildInsertValue(
                            self.builder_raw(),
                            raw,
                            value.raw,
                            position as u32,
                            if position + 1 == op.constituents.len() {
                                name.as_ptr()
                            } else {
                                cstr("").as_ptr()
                            },
                        )
                    };
                }
                raw
            }
            _ => {
                return Err(Error::parser(
                    at,
                    "invalid result type for OpCompositeConstruct",
                ))
            }
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_composite_extract(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpCompositeExtract::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        let mut current = self.value_of(op.composite, at)?;
        for (position, &index) in op.indexes.iter().enumerate() {
            let name = if position + 1 == op.indexes.len() {
                cstr(&self.name_of(op.result))
            } else {
                cstr("")
            };
            current = match current.ty.kind() {
                TypeKind::Vector { element, count } => {
                    if index >= *count {
                        return Err(Error::parser(at, "index out of range in OpCompositeExtract"));
                    }
                    let raw = unsafe {
                        LLVMBuildExtractElement(
                            self.builder_raw(),
                            current.raw,
                            LLVMConstInt(i32_ty, index as u64, 0),
                            name.as_ptr(),
                        )
                    };
                    Value {
                        raw,
                        ty: element.clone(),
                    }
                }
                TypeKind::Struct(layout) => {
                    let members = layout.members();
                    let member = members.get(index as usize).ok_or_else(|| {
                        Error::parser(at, "index out of range in OpCompositeExtract")
                    })?;
                    let raw = unsafe {
                        LLVMBuildExtractValue(
                            self.builder_raw(),
                            current.raw,
                            member.native_member_index(),
                            name.as_ptr(),
                        )
                    };
                    let ty = member.ty.clone();
                    drop(members);
                    Value { raw, ty }
                }
                TypeKind::Array { element, length } => {
                    if index as u64 >= *length {
                        return Err(Error::parser(at, "index out of range in OpCompositeExtract"));
                    }
                    let raw = unsafe {
                        LLVMBuildExtractValue(self.builder_raw(), current.raw, index, name.as_ptr())
                    };
                    Value {
                        raw,
                        ty: element.clone(),
                    }
                }
                TypeKind::Matrix { column, columns } => {
                    if index >= *columns {
                        return Err(Error::parser(at, "index out of range in OpCompositeExtract"));
                    }
                    let raw = unsafe {
                        LLVMBuildExtractValue(self.builder_raw(), current.raw, index, name.as_ptr())
                    };
                    Value {
                        raw,
                        ty: column.clone(),
                    }
                }
                _ => {
                    return Err(Error::parser(
                        at,
                        "invalid composite type for OpCompositeExtract",
                    ))
                }
            };
        }
        self.set_value(op.result, at, current)
    }

    pub(super) fn op_composite_insert(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpCompositeInsert::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let object = self.value_of(op.object, at)?;
        let composite = self.value_of(op.composite, at)?;
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        // Walk down remembering each aggregate and the native slot taken,
        // then rebuild with insertvalue from the inside out.
        let mut spine: Vec<(LLVMValueRef, u32)> = Vec::new();
        let mut current = composite;
        let mut replacement: Option<LLVMValueRef> = None;
        for (position, &index) in op.indexes.iter().enumerate() {
            let last = position + 1 == op.indexes.len();
            match current.ty.kind() {
                TypeKind::Vector { element, count } => {
                    if !last {
                        return Err(Error::parser(
                            at,
                            "vector element access must be the final OpCompositeInsert index",
                        ));
                    }
                    if index >= *count {
                        return Err(Error::parser(at, "index out of range in OpCompositeInsert"));
                    }
                    let _ = element;
                    replacement = Some(unsafe {
                        LLVMBuildInsertElement(
                            self.builder_raw(),
                            current.raw,
                            object.raw,
                            LLVMConstInt(i32_ty, index as u64, 0),
                            cstr("").as_ptr(),
                        )
                    });
                }
                TypeKind::Struct(layout) => {
                    let (native_index, member_ty) = {
                        let members = layout.members();
                        let member = members.get(index as usize).ok_or_else(|| {
                            Error::parser(at, "index out of range in OpCompositeInsert")
                        })?;
                        (member.native_member_index(), member.ty.clone())
                    };
                    if last {
                        replacement = Some(unsafe {
                            LLVMBuildInsertValue(
                                self.builder_raw(),
                                current.raw,
                                object.raw,
                                native_index,
                                cstr("").as_ptr(),
                            )
                        });
                    } else {
                        spine.push((current.raw, native_index));
                        let raw = unsafe {
                            LLVMBuildExtractValue(
                                self.builder_raw(),
                                current.raw,
                                native_index,
                                cstr("").as_ptr(),
                            )
                        };
                        current = Value { raw, ty: member_ty };
                    }
                }
                TypeKind::Array { element, length } => {
                    if index as u64 >= *length {
                        return Err(Error::parser(at, "index out of range in OpCompositeInsert"));
                    }
                    if last {
                        replacement = Some(unsafe {
                            LLVMBuildInsertValue(
                                self.builder_raw(),
                                current.raw,
                                object.raw,
                                index,
                                cstr("").as_ptr(),
                            )
                        });
                    } else {
                        spine.push((current.raw, index));
                        let raw = unsafe {
                            LLVMBuildExtractValue(
                                self.builder_raw(),
                                current.raw,
                                index,
                                cstr("").as_ptr(),
                            )
                        };
                        current = Value {
                            raw,
                            ty: element.clone(),
                        };
                    }
                }
                _ => {
                    return Err(Error::parser(
                        at,
                        "invalid composite type for OpCompositeInsert",
                    ))
                }
            }
        }
        let mut raw = replacement
            .ok_or_else(|| Error::parser(at, "OpCompositeInsert requires at least one index"))?;
        for (aggregate, native_index) in spine.into_iter().rev() {
            raw = unsafe {
                LLVMBuildInsertValue(
                    self.builder_raw(),
                    aggregate,
                    raw,
                    native_index,
                    cstr("").as_ptr(),
                )
            };
        }
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_copy_object(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let ty = self.ty_of(op.result_type, at)?;
        self.set_value(
            op.result,
            at,
            Value {
                raw: value.raw,
                ty,
            },
        )
    }

    pub(super) fn op_vector_extract_dynamic(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpVectorExtractDynamic::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let vector = self.value_of(op.vector, at)?;
        let index = self.value_of(op.index, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildExtractElement(self.builder_raw(), vector.raw, index.raw, name.as_ptr())
        };
        let ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty })
    }

    pub(super) fn op_vector_insert_dynamic(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpVectorInsertDynamic::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let vector = self.value_of(op.vector, at)?;
        let component = self.value_of(op.component, at)?;
        let index = self.value_of(op.index, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildInsertElement(
                self.builder_raw(),
                vector.raw,
                component.raw,
                index.raw,
                name.as_ptr(),
            )
        };
        let ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty })
    }

    // ---- conversions ----------------------------------------------------

    pub(super) fn cast_op(&mut self, instr: &Instr, at: usize, opcode: LLVMOpcode) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildCast(self.builder_raw(), opcode, value.raw, native.ty, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    fn width_convert(
        &mut self,
        instr: &Instr,
        at: usize,
        widen: LLVMOpcode,
        narrow: LLVMOpcode,
        width_of: fn(&Type) -> Option<u32>,
        what: &str,
    ) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let from = width_of(value.ty.as_ref())
            .ok_or_else(|| Error::parser(at, format!("{} operand has no width", what)))?;
        let to = width_of(result_ty.as_ref())
            .ok_or_else(|| Error::parser(at, format!("{} result has no width", what)))?;
        let opcode = match to.cmp(&from) {
            std::cmp::Ordering::Greater => widen,
            std::cmp::Ordering::Less => narrow,
            std::cmp::Ordering::Equal => {
                return Err(Error::parser(
                    at,
                    format!("{} between identical widths", what),
                ))
            }
        };
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildCast(self.builder_raw(), opcode, value.raw, native.ty, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_u_convert(&mut self, instr: &Instr, at: usize) -> Result<()> {
        self.width_convert(
            instr,
            at,
            LLVMOpcode::LLVMZExt,
            LLVMOpcode::LLVMTrunc,
            Type::scalar_int_width,
            "OpUConvert",
        )
    }
    pub(super) fn op_s_convert(&mut self, instr: &Instr, at: usize) -> Result<()> {
        self.width_convert(
            instr,
            at,
            LLVMOpcode::LLVMSExt,
            LLVMOpcode::LLVMTrunc,
            Type::scalar_int_width,
            "OpSConvert",
        )
    }
    pub(super) fn op_f_convert(&mut self, instr: &Instr, at: usize) -> Result<()> {
        self.width_convert(
            instr,
            at,
            LLVMOpcode::LLVMFPExt,
            LLVMOpcode::LLVMFPTrunc,
            Type::scalar_float_width,
            "OpFConvert",
        )
    }

    pub(super) fn op_quantize_to_f16(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let half_scalar = unsafe { LLVMHalfTypeInContext(self.context_raw()) };
        let half_ty = match value.ty.lane_count() {
            1 => half_scalar,
            lanes => unsafe { LLVMVectorType(half_scalar, lanes) },
        };
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            let narrowed =
                LLVMBuildFPTrunc(self.builder_raw(), value.raw, half_ty, cstr("").as_ptr());
            LLVMBuildFPExt(self.builder_raw(), narrowed, native.ty, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_bitcast(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        if result_ty.lane_count() != value.ty.lane_count() {
            return Err(Error::unsupported(
                "element-count-changing OpBitcast is not implemented",
            ));
        }
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildBitCast(self.builder_raw(), value.raw, native.ty, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    // ---- arithmetic and logic -------------------------------------------

    pub(super) fn unary_op(&mut self, instr: &Instr, at: usize, emit: UnaryEmitter) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe { emit(self.builder_raw(), value.raw, name.as_ptr()) };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn binary_op(&mut self, instr: &Instr, at: usize, emit: BinaryEmitter) -> Result<()> {
        let op = ops::OpBinaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let lhs = self.value_of(op.operand_1, at)?;
        let rhs = self.value_of(op.operand_2, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe { emit(self.builder_raw(), lhs.raw, rhs.raw, name.as_ptr()) };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn icmp_op(
        &mut self,
        instr: &Instr,
        at: usize,
        predicate: LLVMIntPredicate,
    ) -> Result<()> {
        let op = ops::OpBinaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let lhs = self.value_of(op.operand_1, at)?;
        let rhs = self.value_of(op.operand_2, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildICmp(self.builder_raw(), predicate, lhs.raw, rhs.raw, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn fcmp_op(
        &mut self,
        instr: &Instr,
        at: usize,
        predicate: LLVMRealPredicate,
    ) -> Result<()> {
        let op = ops::OpBinaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let lhs = self.value_of(op.operand_1, at)?;
        let rhs = self.value_of(op.operand_2, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildFCmp(self.builder_raw(), predicate, lhs.raw, rhs.raw, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    /// `OpSMod`: remainder whose sign follows the divisor, unlike the native
    /// signed remainder `OpSRem` emits.
    pub(super) fn op_s_mod(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpBinaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let lhs = self.value_of(op.operand_1, at)?;
        let rhs = self.value_of(op.operand_2, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            let builder = self.builder_raw();
            let zero = LLVMConstNull(native.ty);
            let rem = LLVMBuildSRem(builder, lhs.raw, rhs.raw, cstr("").as_ptr());
            let nonzero = LLVMBuildICmp(
                builder,
                LLVMIntPredicate::LLVMIntNE,
                rem,
                zero,
                cstr("").as_ptr(),
            );
            // The signs differ exactly when rem ^ divisor is negative.
            let mixed = LLVMBuildXor(builder, rem, rhs.raw, cstr("").as_ptr());
            let sign_differs = LLVMBuildICmp(
                builder,
                LLVMIntPredicate::LLVMIntSLT,
                mixed,
                zero,
                cstr("").as_ptr(),
            );
            let needs_fix = LLVMBuildAnd(builder, nonzero, sign_differs, cstr("").as_ptr());
            let fixed = LLVMBuildAdd(builder, rem, rhs.raw, cstr("").as_ptr());
            LLVMBuildSelect(builder, needs_fix, fixed, rem, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    /// `OpFMod`: like `frem`, then folded so the result takes the divisor's
    /// sign.
    pub(super) fn op_f_mod(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpBinaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let lhs = self.value_of(op.operand_1, at)?;
        let rhs = self.value_of(op.operand_2, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            let builder = self.builder_raw();
            let zero = LLVMConstNull(native.ty);
            let rem = LLVMBuildFRem(builder, lhs.raw, rhs.raw, cstr("").as_ptr());
            let product = LLVMBuildFMul(builder, rem, rhs.raw, cstr("").as_ptr());
            let sign_differs = LLVMBuildFCmp(
                builder,
                LLVMRealPredicate::LLVMRealOLT,
                product,
                zero,
                cstr("").as_ptr(),
            );
            let fixed = LLVMBuildFAdd(builder, rem, rhs.raw, cstr("").as_ptr());
            LLVMBuildSelect(builder, sign_differs, fixed, rem, name.as_ptr())
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    /// Splats a scalar across a vector by repeated insertion.
    pub(super) fn splat(&mut self, scalar: LLVMValueRef, vector_ty: &TypeRef) -> Result<LLVMValueRef> {
        let native = vector_ty.materialize(self.tcx())?;
        let lanes = vector_ty.lane_count();
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        let mut raw = unsafe { LLVMGetUndef(native.ty) };
        for lane in 0..lanes {
            raw = unsafe {
                LLVMBuildInsertElement(
                    self.builder_raw(),
                    raw,
                    scalar,
                    LLVMConstInt(i32_ty, lane as u64, 0),
                    cstr("").as_ptr(),
                )
            };
        }
        Ok(raw)
    }

    pub(super) fn op_vector_times_scalar(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpBinaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let vector = self.value_of(op.operand_1, at)?;
        let scalar = self.value_of(op.operand_2, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let splatted = self.splat(scalar.raw, &result_ty)?;
        let name = cstr(&self.name_of(op.result));
        let raw =
            unsafe { LLVMBuildFMul(self.builder_raw(), vector.raw, splatted, name.as_ptr()) };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    /// Horizontal float add over the lanes of `vector`.
    pub(super) fn horizontal_fadd(&mut self, vector: LLVMValueRef, lanes: u32) -> LLVMValueRef {
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        unsafe {
            let mut sum = LLVMBuildExtractElement(
                self.builder_raw(),
                vector,
                LLVMConstInt(i32_ty, 0, 0),
                cstr("").as_ptr(),
            );
            for lane in 1..lanes {
                let element = LLVMBuildExtractElement(
                    self.builder_raw(),
                    vector,
                    LLVMConstInt(i32_ty, lane as u64, 0),
                    cstr("").as_ptr(),
                );
                sum = LLVMBuildFAdd(self.builder_raw(), sum, element, cstr("").as_ptr());
            }
            sum
        }
    }

    pub(super) fn op_dot(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpBinaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let lhs = self.value_of(op.operand_1, at)?;
        let rhs = self.value_of(op.operand_2, at)?;
        let lanes = lhs
            .ty
            .as_vector()
            .map(|(_, lanes)| lanes)
            .ok_or_else(|| Error::parser(at, "OpDot operands must be float vectors"))?;
        let product =
            unsafe { LLVMBuildFMul(self.builder_raw(), lhs.raw, rhs.raw, cstr("").as_ptr()) };
        let raw = self.horizontal_fadd(product, lanes);
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_any_all(&mut self, instr: &Instr, at: usize, all: bool) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let lanes = value
            .ty
            .as_vector()
            .map(|(_, lanes)| lanes)
            .ok_or_else(|| Error::parser(at, "operand must be a boolean vector"))?;
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            let mut folded = LLVMBuildExtractElement(
                self.builder_raw(),
                value.raw,
                LLVMConstInt(i32_ty, 0, 0),
                cstr("").as_ptr(),
            );
            for lane in 1..lanes {
                let element = LLVMBuildExtractElement(
                    self.builder_raw(),
                    value.raw,
                    LLVMConstInt(i32_ty, lane as u64, 0),
                    cstr("").as_ptr(),
                );
                let last = lane + 1 == lanes;
                let lane_name = if last { name.as_ptr() } else { cstr("").as_ptr() };
                folded = if all {
                    LLVMBuildAnd(self.builder_raw(), folded, element, lane_name)
                } else {
                    LLVMBuildOr(self.builder_raw(), folded, element, lane_name)
                };
            }
            folded
        };
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_is_nan(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildFCmp(
                self.builder_raw(),
                LLVMRealPredicate::LLVMRealUNO,
                value.raw,
                value.raw,
                name.as_ptr(),
            )
        };
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_is_inf(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let magnitude = self.intrinsic_call("fabs", &value.ty, &[value.raw], "")?;
        let infinity = self.float_splat_const(&value.ty, f64::INFINITY, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildFCmp(
                self.builder_raw(),
                LLVMRealPredicate::LLVMRealOEQ,
                magnitude,
                infinity,
                name.as_ptr(),
            )
        };
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_select(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpTernaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let condition = self.value_of(op.operand_1, at)?;
        let on_true = self.value_of(op.operand_2, at)?;
        let on_false = self.value_of(op.operand_3, at)?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            LLVMBuildSelect(
                self.builder_raw(),
                condition.raw,
                on_true.raw,
                on_false.raw,
                name.as_ptr(),
            )
        };
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_bit_count(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let counted = self.intrinsic_call("ctpop", &value.ty, &[value.raw], "")?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let from = value
            .ty
            .scalar_int_width()
            .ok_or_else(|| Error::parser(at, "OpBitCount operand must be an integer"))?;
        let to = result_ty
            .scalar_int_width()
            .ok_or_else(|| Error::parser(at, "OpBitCount result must be an integer"))?;
        let name = cstr(&self.name_of(op.result));
        let raw = unsafe {
            match to.cmp(&from) {
                std::cmp::Ordering::Greater => LLVMBuildCast(
                    self.builder_raw(),
                    LLVMOpcode::LLVMZExt,
                    counted,
                    native.ty,
                    name.as_ptr(),
                ),
                std::cmp::Ordering::Less => LLVMBuildCast(
                    self.builder_raw(),
                    LLVMOpcode::LLVMTrunc,
                    counted,
                    native.ty,
                    name.as_ptr(),
                ),
                std::cmp::Ordering::Equal => counted,
            }
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    pub(super) fn op_bit_reverse(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUnaryCommon::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let value = self.value_of(op.operand, at)?;
        let raw = self.intrinsic_call("bitreverse", &value.ty, &[value.raw], &self.name_of(op.result))?;
        let result_ty = self.ty_of(op.result_type, at)?;
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    // ---- intrinsic plumbing ---------------------------------------------

    pub(super) fn get_or_declare_function(
        &mut self,
        name: &str,
        fn_ty: LLVMTypeRef,
    ) -> LLVMValueRef {
        let cname = cstr(name);
        unsafe {
            let existing = LLVMGetNamedFunction(self.module_raw(), cname.as_ptr());
            if existing.is_null() {
                LLVMAddFunction(self.module_raw(), cname.as_ptr(), fn_ty)
            } else {
                existing
            }
        }
    }

    /// Calls `llvm.<base>.<suffix>` where every parameter and the return
    /// value share `ty`'s native form.
    pub(super) fn intrinsic_call(
        &mut self,
        base: &str,
        ty: &TypeRef,
        args: &[LLVMValueRef],
        name: &str,
    ) -> Result<LLVMValueRef> {
        let native = ty.materialize(self.tcx())?;
        let full_name = format!("llvm.{}.{}", base, intrinsic_suffix(ty)?);
        let mut param_tys = vec![native.ty; args.len()];
        let fn_ty = unsafe {
            LLVMFunctionType(
                native.ty,
                param_tys.as_mut_ptr(),
                param_tys.len() as u32,
                0,
            )
        };
        let function = self.get_or_declare_function(&full_name, fn_ty);
        let mut args = args.to_vec();
        let cname = cstr(name);
        Ok(unsafe {
            LLVMBuildCall2(
                self.builder_raw(),
                fn_ty,
                function,
                args.as_mut_ptr(),
                args.len() as u32,
                cname.as_ptr(),
            )
        })
    }

    /// A constant of `ty` (scalar or vector) with every lane set to `value`.
    pub(super) fn float_splat_const(
        &mut self,
        ty: &TypeRef,
        value: f64,
        at: usize,
    ) -> Result<LLVMValueRef> {
        match ty.kind() {
            TypeKind::Float { .. } => {
                let native = ty.materialize(self.tcx())?;
                Ok(unsafe { LLVMConstReal(native.ty, value) })
            }
            TypeKind::Vector { element, count } => {
                let element_native = element.materialize(self.tcx())?;
                let scalar = unsafe { LLVMConstReal(element_native.ty, value) };
                let mut lanes = vec![scalar; *count as usize];
                Ok(unsafe { LLVMConstVector(lanes.as_mut_ptr(), lanes.len() as u32) })
            }
            _ => Err(Error::parser(at, "expected a float scalar or vector type")),
        }
    }

    /// An integer constant of `ty` with every lane set to `value`.
    pub(super) fn int_splat_const(
        &mut self,
        ty: &TypeRef,
        value: u64,
        at: usize,
    ) -> Result<LLVMValueRef> {
        match ty.kind() {
            TypeKind::Int { .. } | TypeKind::Bool => {
                let native = ty.materialize(self.tcx())?;
                Ok(unsafe { LLVMConstInt(native.ty, value, 0) })
            }
            TypeKind::Vector { element, count } => {
                let element_native = element.materialize(self.tcx())?;
                let scalar = unsafe { LLVMConstInt(element_native.ty, value, 0) };
                let mut lanes = vec![scalar; *count as usize];
                Ok(unsafe { LLVMConstVector(lanes.as_mut_ptr(), lanes.len() as u32) })
            }
            _ => Err(Error::parser(at, "expected an integer scalar or vector type")),
        }
    }

    // ---- control flow ---------------------------------------------------

    pub(super) fn op_phi(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpPhi::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        if op.incoming.len() % 2 != 0 {
            return Err(Error::parser(at, "malformed OpPhi operand pairs"));
        }
        let result_ty = self.ty_of(op.result_type, at)?;
        let native = result_ty.materialize(self.tcx())?;
        let name = cstr(&self.name_of(op.result));
        let phi = unsafe { LLVMBuildPhi(self.builder_raw(), native.ty, name.as_ptr()) };
        let incoming = op
            .incoming
            .chunks_exact(2)
            .map(|pair| (pair[0], pair[1]))
            .collect::<Vec<(Id, Id)>>();
        self.push_pending_phi(phi, incoming, at);
        self.set_value(op.result, at, Value { raw: phi, ty: result_ty })
    }

    pub(super) fn op_loop_merge(&mut self, instr: &Instr, at: usize) -> Result<()> {
        ops::OpLoopMerge::decode(instr, at)?;
        self.set_pending_merge(at);
        Ok(())
    }

    pub(super) fn op_selection_merge(&mut self, instr: &Instr, at: usize) -> Result<()> {
        ops::OpSelectionMerge::decode(instr, at)?;
        self.set_pending_merge(at);
        Ok(())
    }

    pub(super) fn op_label(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpLabel::decode(instr, at)?;
        self.open_block(op.result, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        self.forbid_decorations(op.result, at)?;
        let block = self.get_or_make_label(op.result, at)?;
        unsafe { LLVMPositionBuilderAtEnd(self.builder_raw(), block) };

        let function_id = self
            .current_function()
            .ok_or_else(|| Error::parser(at, "OpLabel not allowed outside a function"))?;
        let needs_entry = self
            .state_ref(function_id)
            .function
            .as_ref()
            .map(|function| function.entry.is_none())
            .unwrap_or(false);
        if needs_entry {
            let function_raw = match &self.state_ref(function_id).function {
                Some(function) => function.raw,
                None => return Err(Error::parser(at, "OpLabel in an undeclared function")),
            };
            let tcx = self.tcx();
            let io_native = self.io_struct().materialize(tcx)?;
            let (inputs_member, outputs_member, _) = self.io_members();
            let inputs_index = Self::member_native_index(self.io_struct(), inputs_member);
            let outputs_index = Self::member_native_index(self.io_struct(), outputs_member);
            let entry = unsafe {
                let io_param = LLVMGetParam(function_raw, 0);
                let ptr_ty = LLVMPointerTypeInContext(self.context_raw(), 0);
                let inputs_slot = LLVMBuildStructGEP2(
                    self.builder_raw(),
                    io_native.ty,
                    io_param,
                    inputs_index,
                    cstr("inputs_pointer").as_ptr(),
                );
                let inputs_ptr =
                    LLVMBuildLoad2(self.builder_raw(), ptr_ty, inputs_slot, cstr("inputs").as_ptr());
                let outputs_slot = LLVMBuildStructGEP2(
                    self.builder_raw(),
                    io_native.ty,
                    io_param,
                    outputs_index,
                    cstr("outputs_pointer").as_ptr(),
                );
                let outputs_ptr = LLVMBuildLoad2(
                    self.builder_raw(),
                    ptr_ty,
                    outputs_slot,
                    cstr("outputs").as_ptr(),
                );
                EntryBlock {
                    block,
                    io_param,
                    inputs_ptr,
                    outputs_ptr,
                }
            };
            if let Some(function) = self.state(function_id, at)?.function.as_mut() {
                function.entry = Some(entry);
            }
            self.bind_interface_values(entry)?;
        }
        Ok(())
    }

    pub(super) fn op_branch(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpBranch::decode(instr, at)?;
        if self.stage() == Stage::GenerateCode {
            let target = self.get_or_make_label(op.target, at)?;
            unsafe { LLVMBuildBr(self.builder_raw(), target) };
        }
        self.close_block();
        Ok(())
    }

    pub(super) fn op_branch_conditional(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpBranchConditional::decode(instr, at)?;
        if self.stage() == Stage::GenerateCode {
            let condition = self.value_of(op.condition, at)?;
            let on_true = self.get_or_make_label(op.true_label, at)?;
            let on_false = self.get_or_make_label(op.false_label, at)?;
            unsafe { LLVMBuildCondBr(self.builder_raw(), condition.raw, on_true, on_false) };
        }
        self.close_block();
        Ok(())
    }

    pub(super) fn op_switch(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpSwitch::decode(instr, at)?;
        if self.stage() == Stage::GenerateCode {
            let selector = self.value_of(op.selector, at)?;
            let width = selector
                .ty
                .scalar_int_width()
                .ok_or_else(|| Error::parser(at, "OpSwitch selector must be an integer"))?;
            let native = selector.ty.materialize(self.tcx())?;
            let literal_words = if width == 64 { 2 } else { 1 };
            let stride = literal_words + 1;
            if op.targets.len() % stride != 0 {
                return Err(Error::parser(at, "malformed OpSwitch target list"));
            }
            // Create the case blocks first so forward targets exist.
            for case in op.targets.chunks_exact(stride) {
                self.get_or_make_label(case[literal_words], at)?;
            }
            let default_block = self.get_or_make_label(op.default, at)?;
            let switch = unsafe {
                LLVMBuildSwitch(
                    self.builder_raw(),
                    selector.raw,
                    default_block,
                    (op.targets.len() / stride) as u32,
                )
            };
            for case in op.targets.chunks_exact(stride) {
                let literal = if literal_words == 2 {
                    ((case[1] as u64) << 32) | case[0] as u64
                } else {
                    case[0] as u64
                };
                let block = self.get_or_make_label(case[literal_words], at)?;
                unsafe { LLVMAddCase(switch, LLVMConstInt(native.ty, literal, 0), block) };
            }
        }
        self.close_block();
        Ok(())
    }

    pub(super) fn op_kill(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let _ = (instr, at);
        if self.stage() == Stage::GenerateCode {
            // Discard: the invocation ends without writing its outputs.
            unsafe { LLVMBuildRetVoid(self.builder_raw()) };
        }
        self.close_block();
        Ok(())
    }

    pub(super) fn op_return(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let _ = (instr, at);
        if self.stage() == Stage::GenerateCode {
            unsafe { LLVMBuildRetVoid(self.builder_raw()) };
        }
        self.close_block();
        Ok(())
    }

    pub(super) fn op_return_value(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpReturnValue::decode(instr, at)?;
        if self.stage() == Stage::GenerateCode {
            let value = self.value_of(op.value, at)?;
            unsafe { LLVMBuildRet(self.builder_raw(), value.raw) };
        }
        self.close_block();
        Ok(())
    }

    pub(super) fn op_unreachable(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let _ = (instr, at);
        if self.stage() == Stage::GenerateCode {
            unsafe { LLVMBuildUnreachable(self.builder_raw()) };
        }
        self.close_block();
        Ok(())
    }
}
