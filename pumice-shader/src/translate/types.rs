//! Pass-1 handlers: module metadata, capabilities, annotations, types,
//! constants, and the shader-interface side of `OpVariable`.
use llvm_sys::core::*;
use llvm_sys::prelude::LLVMValueRef;
use pumice_spirv::{ops, Instr};
use spirv::{AddressingModel, Capability, MemoryModel, StorageClass};

use crate::constant::{scalar_from_words, ConstantDescriptor};
use crate::error::{Error, Result};
use crate::ty::{DecorationEntry, PointerType, StructLayout, StructMember, Type, TypeKind};

use super::{ExtInstSet, InterfaceSlot, Stage, Translator, Value};

/// Capabilities this translator accepts after closure over the implication
/// graph.
const IMPLEMENTED_CAPABILITIES: &[Capability] = &[
    Capability::Matrix,
    Capability::Shader,
    Capability::InputAttachment,
    Capability::Sampled1D,
    Capability::Image1D,
    Capability::SampledBuffer,
    Capability::ImageBuffer,
    Capability::ImageQuery,
    Capability::DerivativeControl,
    Capability::Int64,
];

/// The SPIR-V capability implication graph, restricted to capabilities that
/// can reach the allowlist or commonly appear in shader modules.
pub(crate) fn directly_required_capabilities(capability: Capability) -> &'static [Capability] {
    use Capability::*;
    match capability {
        Shader => &[Matrix],
        Geometry | Tessellation => &[Shader],
        Vector16 | Float16Buffer | ImageBasic | Pipes | DeviceEnqueue | LiteralSampler => &[Kernel],
        ImageReadWrite | ImageMipmap => &[ImageBasic],
        Int64Atomics => &[Int64],
        AtomicStorage
        | ImageGatherExtended
        | StorageImageMultisample
        | UniformBufferArrayDynamicIndexing
        | SampledImageArrayDynamicIndexing
        | StorageBufferArrayDynamicIndexing
        | StorageImageArrayDynamicIndexing
        | ClipDistance
        | CullDistance
        | SampleRateShading
        | SampledRect
        | SampledCubeArray
        | ImageMSArray
        | StorageImageExtendedFormats
        | ImageQuery
        | DerivativeControl
        | InterpolationFunction
        | TransformFeedback
        | StorageImageReadWithoutFormat
        | StorageImageWriteWithoutFormat
        | InputAttachment
        | SparseResidency
        | MinLod => &[Shader],
        TessellationPointSize => &[Tessellation],
        GeometryPointSize | GeometryStreams | MultiViewport => &[Geometry],
        ImageCubeArray => &[SampledCubeArray],
        ImageRect => &[SampledRect],
        Image1D => &[Sampled1D],
        ImageBuffer => &[SampledBuffer],
        GenericPointer => &[Addresses],
        _ => &[],
    }
}

/// Expands `capability` over the implication graph.
pub(crate) fn capability_closure(capability: Capability) -> Vec<Capability> {
    let mut closed = Vec::new();
    let mut work_list = vec![capability];
    while let Some(capability) = work_list.pop() {
        if closed.contains(&capability) {
            continue;
        }
        closed.push(capability);
        work_list.extend_from_slice(directly_required_capabilities(capability));
    }
    closed
}

impl<'a> Translator<'a> {
    pub(super) fn op_undef(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpUndef::decode(instr, at)?;
        if self.stage() == Stage::GenerateCode {
            let ty = self.ty_of(op.result_type, at)?;
            let native = ty.materialize(self.tcx())?;
            let raw = unsafe { LLVMGetUndef(native.ty) };
            self.set_value(op.result, at, Value { raw, ty })?;
        }
        Ok(())
    }

    pub(super) fn op_string(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpString::decode(instr, at)?;
            let text = op.string.to_owned();
            self.state(op.result, at)?.string = Some(text);
        }
        Ok(())
    }

    pub(super) fn op_name(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpName::decode(instr, at)?;
            if !op.name.is_empty() {
                let name = op.name.to_owned();
                self.state(op.target, at)?.name = Some(name);
            }
        }
        Ok(())
    }

    pub(super) fn op_member_name(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpMemberName::decode(instr, at)?;
            if !op.name.is_empty() {
                let entry = (op.member, op.name.to_owned());
                self.state(op.target, at)?.member_names.push(entry);
            }
        }
        Ok(())
    }

    pub(super) fn op_extension(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let mut operands = instr.operands(at);
        let name = operands.read_str()?;
        Err(Error::parser(
            at,
            format!("unsupported SPIR-V extension: {:?}", name),
        ))
    }

    pub(super) fn op_ext_inst_import(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpExtInstImport::decode(instr, at)?;
            let set = match op.name {
                "GLSL.std.450" => ExtInstSet::GlslStd450,
                "OpenCL.std" => ExtInstSet::OpenClStd,
                other => {
                    return Err(Error::parser(
                        at,
                        format!("unknown instruction set: {:?}", other),
                    ))
                }
            };
            self.state(op.result, at)?.ext_inst_import = Some(set);
        }
        Ok(())
    }

    pub(super) fn op_memory_model(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpMemoryModel::decode(instr, at)?;
        if op.addressing_model != AddressingModel::Logical {
            return Err(Error::parser(
                at,
                format!("unsupported addressing model: {:?}", op.addressing_model),
            ));
        }
        match op.memory_model {
            MemoryModel::Simple | MemoryModel::GLSL450 => Ok(()),
            other => Err(Error::parser(
                at,
                format!("unsupported memory model: {:?}", other),
            )),
        }
    }

    pub(super) fn op_entry_point(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpEntryPoint::decode(instr, at)?;
            let record = super::EntryPointRecord {
                execution_model: op.execution_model,
                name: op.name.to_owned(),
                interface: op.interface.to_vec(),
                instruction_start_index: at,
                execution_modes: Vec::new(),
            };
            self.state(op.entry_point, at)?.entry_points.push(record);
        }
        Ok(())
    }

    pub(super) fn op_execution_mode(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpExecutionMode::decode(instr, at)?;
            let mode = (op.mode, op.params.to_vec());
            let state = self.state(op.entry_point, at)?;
            match state.entry_points.last_mut() {
                Some(record) => record.execution_modes.push(mode),
                None => {
                    return Err(Error::parser(
                        at,
                        "entry point not defined in OpExecutionMode",
                    ))
                }
            }
        }
        Ok(())
    }

    pub(super) fn op_capability(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpCapability::decode(instr, at)?;
            self.enable_capabilities(capability_closure(op.capability));
            for capability in self.capability_set().iter() {
                if !IMPLEMENTED_CAPABILITIES.contains(capability) {
                    return Err(Error::parser(
                        at,
                        format!("capability not implemented: {:?}", capability),
                    ));
                }
            }
        }
        Ok(())
    }

    pub(super) fn op_decorate(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpDecorate::decode(instr, at)?;
            let entry = DecorationEntry::new(op.decoration, op.params);
            self.state(op.target, at)?.decorations.push(entry);
        }
        Ok(())
    }

    pub(super) fn op_member_decorate(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpMemberDecorate::decode(instr, at)?;
            let entry = (op.member, DecorationEntry::new(op.decoration, op.params));
            self.state(op.target, at)?.member_decorations.push(entry);
        }
        Ok(())
    }

    // ---- types ----------------------------------------------------------

    fn set_type(&mut self, result: super::Id, at: usize, kind: TypeKind) -> Result<()> {
        self.forbid_decorations(result, at)?;
        self.state(result, at)?.ty = Some(Type::new(kind, at));
        Ok(())
    }

    pub(super) fn op_type_void(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeVoid::decode(instr, at)?;
            self.set_type(op.result, at, TypeKind::Void)?;
        }
        Ok(())
    }
    pub(super) fn op_type_bool(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeBool::decode(instr, at)?;
            self.set_type(op.result, at, TypeKind::Bool)?;
        }
        Ok(())
    }
    pub(super) fn op_type_int(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeInt::decode(instr, at)?;
            match op.width {
                8 | 16 | 32 | 64 => {}
                _ => return Err(Error::parser(at, "invalid int width")),
            }
            self.set_type(
                op.result,
                at,
                TypeKind::Int {
                    width: op.width,
                    signed: op.signed,
                },
            )?;
        }
        Ok(())
    }
    pub(super) fn op_type_float(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeFloat::decode(instr, at)?;
            match op.width {
                16 | 32 | 64 => {}
                _ => return Err(Error::parser(at, "invalid float width")),
            }
            self.set_type(op.result, at, TypeKind::Float { width: op.width })?;
        }
        Ok(())
    }
    pub(super) fn op_type_vector(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeVector::decode(instr, at)?;
            let element = self.ty_of(op.component_type, at)?;
            if !element.is_scalar() {
                return Err(Error::parser(at, "vector component type must be a scalar"));
            }
            self.set_type(
                op.result,
                at,
                TypeKind::Vector {
                    element,
                    count: op.component_count,
                },
            )?;
        }
        Ok(())
    }
    pub(super) fn op_type_matrix(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeMatrix::decode(instr, at)?;
            let column = self.ty_of(op.column_type, at)?;
            if column.as_vector().is_none() {
                return Err(Error::parser(at, "matrix column type must be a vector"));
            }
            self.set_type(
                op.result,
                at,
                TypeKind::Matrix {
                    column,
                    columns: op.column_count,
                },
            )?;
        }
        Ok(())
    }
    pub(super) fn op_type_array(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeArray::decode(instr, at)?;
            let element = self.ty_of(op.element_type, at)?;
            let length = self.unsigned_constant(op.length, at)?;
            if length == 0 {
                return Err(Error::parser(
                    at,
                    "OpTypeArray length must be a positive constant integer",
                ));
            }
            self.set_type(op.result, at, TypeKind::Array { element, length })?;
        }
        Ok(())
    }
    pub(super) fn op_type_runtime_array(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeRuntimeArray::decode(instr, at)?;
            let element = self.ty_of(op.element_type, at)?;
            self.set_type(op.result, at, TypeKind::RuntimeArray { element })?;
        }
        Ok(())
    }
    pub(super) fn op_type_struct(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeStruct::decode(instr, at)?;
            let mut members = Vec::with_capacity(op.members.len());
            for &member_id in op.members {
                members.push(StructMember::new(Vec::new(), self.ty_of(member_id, at)?));
            }
            let member_decorations = self.state(op.result, at)?.member_decorations.clone();
            for (member_index, entry) in member_decorations {
                let member = members.get_mut(member_index as usize).ok_or_else(|| {
                    Error::parser(at, "member decoration's member index is out of range")
                })?;
                member.decorations.push(entry);
            }
            let debug_name = self.name_of(op.result);
            let name = if debug_name.is_empty() {
                self.prefixed_name(&format!("struct_{}", op.result), true)
            } else {
                self.prefixed_name(&debug_name, false)
            };
            let decorations = self.state(op.result, at)?.decorations.clone();
            let layout = StructLayout::with_members(name, decorations, members);
            self.state(op.result, at)?.ty = Some(Type::new(TypeKind::Struct(layout), at));
        }
        Ok(())
    }
    pub(super) fn op_type_opaque(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeOpaque::decode(instr, at)?;
            let name = self.prefixed_name(op.name, false);
            self.set_type(op.result, at, TypeKind::Opaque { name })?;
        }
        Ok(())
    }
    pub(super) fn op_type_pointer(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypePointer::decode(instr, at)?;
            self.forbid_decorations(op.result, at)?;
            let pointee = self.ty_of(op.pointee, at)?;
            let existing = self.state(op.result, at)?.ty.clone();
            match existing {
                None => {
                    let kind =
                        TypeKind::Pointer(PointerType::new(Some(pointee), op.storage_class));
                    self.state(op.result, at)?.ty = Some(Type::new(kind, at));
                }
                Some(ty) => match ty.as_pointer() {
                    Some(pointer) => pointer.complete(pointee, at)?,
                    None => {
                        return Err(Error::parser(
                            at,
                            "result type is not a pointer forward declaration",
                        ))
                    }
                },
            }
        }
        Ok(())
    }
    pub(super) fn op_type_forward_pointer(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeForwardPointer::decode(instr, at)?;
            if self.state(op.pointer_type, at)?.ty.is_some() {
                return Err(Error::parser(
                    at,
                    "OpTypeForwardPointer target already has a type",
                ));
            }
            let kind = TypeKind::Pointer(PointerType::new(None, op.storage_class));
            self.state(op.pointer_type, at)?.ty = Some(Type::new(kind, at));
        }
        Ok(())
    }
    pub(super) fn op_type_function(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeFunction::decode(instr, at)?;
            let return_type = self.ty_of(op.return_type, at)?;
            let valid_for_entry_point = op.params.is_empty() && return_type.is_void();
            let mut params = Vec::with_capacity(1 + op.params.len());
            params.push(self.io_pointer_type().clone());
            for &param in op.params {
                params.push(self.ty_of(param, at)?);
            }
            self.set_type(
                op.result,
                at,
                TypeKind::Function(crate::ty::FunctionSignature {
                    return_type,
                    params,
                    valid_for_entry_point,
                }),
            )?;
        }
        Ok(())
    }
    pub(super) fn op_type_image(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeImage::decode(instr, at)?;
            let name = self.prefixed_name(&format!("image_{}", op.result), true);
            self.set_type(op.result, at, TypeKind::Opaque { name })?;
        }
        Ok(())
    }
    pub(super) fn op_type_sampler(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeSampler::decode(instr, at)?;
            let name = self.prefixed_name(&format!("sampler_{}", op.result), true);
            self.set_type(op.result, at, TypeKind::Opaque { name })?;
        }
        Ok(())
    }
    pub(super) fn op_type_sampled_image(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeSampledImage::decode(instr, at)?;
            let name = self.prefixed_name(&format!("sampled_image_{}", op.result), true);
            self.set_type(op.result, at, TypeKind::Opaque { name })?;
        }
        Ok(())
    }
    pub(super) fn op_type_event(&mut self, instr: &Instr, at: usize) -> Result<()> {
        if self.stage() == Stage::CalculateTypes {
            let op = ops::OpTypeEvent::decode(instr, at)?;
            let name = self.prefixed_name(&format!("event_{}", op.result), true);
            self.set_type(op.result, at, TypeKind::Opaque { name })?;
        }
        Ok(())
    }

    // ---- constants ------------------------------------------------------

    /// In pass 2 a constant id simply republishes its materialized value.
    fn publish_constant(&mut self, result: super::Id, result_type: super::Id, at: usize) -> Result<()> {
        let constant = self.constant_of(result, at)?;
        let ty = self.ty_of(result_type, at)?;
        self.set_value(
            result,
            at,
            Value {
                raw: constant.value(),
                ty,
            },
        )
    }

    pub(super) fn op_constant_bool(&mut self, instr: &Instr, at: usize, value: bool) -> Result<()> {
        let op = ops::OpConstantTrue::decode(instr, at)?;
        match self.stage() {
            Stage::CalculateTypes => {
                self.forbid_decorations(op.result, at)?;
                let ty = self.ty_of(op.result_type, at)?;
                if !ty.is_bool() {
                    return Err(Error::parser(at, "boolean constant of non-boolean type"));
                }
                let native = ty.materialize(self.tcx())?;
                let raw = unsafe { LLVMConstInt(native.ty, value as u64, 0) };
                self.state(op.result, at)?.constant = Some(ConstantDescriptor::new(ty, raw));
                Ok(())
            }
            Stage::GenerateCode => self.publish_constant(op.result, op.result_type, at),
        }
    }

    pub(super) fn op_constant(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpConstant::decode(instr, at)?;
        match self.stage() {
            Stage::CalculateTypes => {
                self.forbid_decorations(op.result, at)?;
                let ty = self.ty_of(op.result_type, at)?;
                let raw = scalar_from_words(&ty, self.tcx(), op.value, at)?;
                self.state(op.result, at)?.constant = Some(ConstantDescriptor::new(ty, raw));
                Ok(())
            }
            Stage::GenerateCode => self.publish_constant(op.result, op.result_type, at),
        }
    }

    pub(super) fn op_constant_composite(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpConstantComposite::decode(instr, at)?;
        match self.stage() {
            Stage::CalculateTypes => {
                self.forbid_decorations(op.result, at)?;
                let ty = self.ty_of(op.result_type, at)?;
                let mut constituents: Vec<LLVMValueRef> = Vec::with_capacity(op.constituents.len());
                for &id in op.constituents {
                    constituents.push(self.constant_of(id, at)?.value());
                }
                let raw = unsafe {
                    match ty.kind() {
                        TypeKind::Vector { count, .. } => {
                            if constituents.len() != *count as usize {
                                return Err(Error::parser(
                                    at,
                                    "wrong number of constituents for type",
                                ));
                            }
                            LLVMConstVector(constituents.as_mut_ptr(), constituents.len() as u32)
                        }
                        TypeKind::Array { element, length } => {
                            if constituents.len() != *length as usize {
                                return Err(Error::parser(
                                    at,
                                    "wrong number of constituents for type",
                                ));
                            }
                            let element = element.materialize(self.tcx())?;
                            LLVMConstArray2(
                                element.ty,
                                constituents.as_mut_ptr(),
                                constituents.len() as u64,
                            )
                        }
                        TypeKind::Struct(layout) => {
                            if constituents.len() != layout.member_count() {
                                return Err(Error::parser(
                                    at,
                                    "wrong number of constituents for type",
                                ));
                            }
                            let native = ty.materialize(self.tcx())?;
                            let element_count = LLVMCountStructElementTypes(native.ty) as usize;
                            let mut values: Vec<LLVMValueRef> =
                                vec![std::ptr::null_mut(); element_count];
                            for (member, value) in
                                layout.members().iter().zip(constituents.iter())
                            {
                                values[member.native_member_index() as usize] = *value;
                            }
                            // Padding fillers become zero bytes.
                            for (index, slot) in values.iter_mut().enumerate() {
                                if slot.is_null() {
                                    *slot = LLVMConstNull(LLVMStructGetTypeAtIndex(
                                        native.ty,
                                        index as u32,
                                    ));
                                }
                            }
                            LLVMConstNamedStruct(
                                native.ty,
                                values.as_mut_ptr(),
                                values.len() as u32,
                            )
                        }
                        _ => {
                            return Err(Error::parser(
                                at,
                                "unimplemented type for OpConstantComposite",
                            ))
                        }
                    }
                };
                self.state(op.result, at)?.constant = Some(ConstantDescriptor::new(ty, raw));
                Ok(())
            }
            Stage::GenerateCode => self.publish_constant(op.result, op.result_type, at),
        }
    }

    pub(super) fn op_constant_null(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpConstantNull::decode(instr, at)?;
        match self.stage() {
            Stage::CalculateTypes => {
                self.forbid_decorations(op.result, at)?;
                let ty = self.ty_of(op.result_type, at)?;
                let native = ty.materialize(self.tcx())?;
                let raw = unsafe { LLVMConstNull(native.ty) };
                self.state(op.result, at)?.constant = Some(ConstantDescriptor::new(ty, raw));
                Ok(())
            }
            Stage::GenerateCode => self.publish_constant(op.result, op.result_type, at),
        }
    }

    // ---- variables ------------------------------------------------------

    pub(super) fn op_variable(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpVariable::decode(instr, at)?;
        match self.stage() {
            Stage::CalculateTypes => self.variable_pass1(&op, at),
            Stage::GenerateCode => self.variable_pass2(&op, at),
        }
    }

    fn interface_pointee(&self, op: &ops::OpVariable, at: usize) -> Result<crate::ty::TypeRef> {
        let pointer = self.ty_of(op.result_type, at)?;
        let pointer = pointer
            .as_pointer()
            .ok_or_else(|| Error::parser(at, "OpVariable result type is not a pointer"))?
            .pointee()
            .ok_or_else(|| Error::parser(at, "OpVariable pointer type is incomplete"))?;
        Ok(pointer)
    }

    fn variable_pass1(&mut self, op: &ops::OpVariable, at: usize) -> Result<()> {
        match op.storage_class {
            StorageClass::Input | StorageClass::Output => {
                if op.initializer.is_some() {
                    return Err(Error::parser(
                        at,
                        "shader interface variable initializers are not implemented",
                    ));
                }
                let pointee = self.interface_pointee(op, at)?;
                let decorations = self.state(op.result, at)?.decorations.clone();
                for entry in &decorations {
                    match entry.decoration {
                        spirv::Decoration::Location | spirv::Decoration::BuiltIn => {}
                        other => {
                            return Err(Error::parser(
                                at,
                                format!(
                                    "unimplemented decoration on shader interface variable: {:?}",
                                    other
                                ),
                            ))
                        }
                    }
                }
                let slot = if op.storage_class == StorageClass::Input {
                    let struct_ty = self.inputs_struct().clone();
                    let member = Self::struct_layout(&struct_ty)
                        .add_member(StructMember::new(decorations, pointee));
                    InterfaceSlot::Input { member }
                } else {
                    let struct_ty = self.outputs_struct().clone();
                    let member = Self::struct_layout(&struct_ty)
                        .add_member(StructMember::new(decorations, pointee));
                    InterfaceSlot::Output { member }
                };
                self.state(op.result, at)?.variable = Some(slot);
                Ok(())
            }
            StorageClass::Function => {
                if self.current_function().is_none() {
                    return Err(Error::parser(
                        at,
                        "function-local variable must be inside function",
                    ));
                }
                self.forbid_decorations(op.result, at)
            }
            other => Err(Error::parser(
                at,
                format!("unimplemented OpVariable storage class: {:?}", other),
            )),
        }
    }

    fn variable_pass2(&mut self, op: &ops::OpVariable, at: usize) -> Result<()> {
        match op.storage_class {
            StorageClass::Input | StorageClass::Output => {
                if !self.is_in_pinned_interface(op.result) {
                    // Not part of this entry point's interface; reads through
                    // it are undefined, so an undef pointer is sufficient.
                    let ty = self.ty_of(op.result_type, at)?;
                    let native = ty.materialize(self.tcx())?;
                    let raw = unsafe { LLVMGetUndef(native.ty) };
                    return self.set_value(op.result, at, Value { raw, ty });
                }
                let slot = self.state_ref(op.result).variable.ok_or_else(|| {
                    Error::parser(at, "interface variable was not collected in pass 1")
                })?;
                self.push_interface_binding(op.result, slot, op.result_type, at);
                Ok(())
            }
            StorageClass::Function => {
                let function_id = self.current_function().ok_or_else(|| {
                    Error::parser(at, "function-local variable must be inside function")
                })?;
                let entry = self
                    .state_ref(function_id)
                    .function
                    .as_ref()
                    .and_then(|function| function.entry)
                    .ok_or_else(|| {
                        Error::parser(
                            at,
                            "function-local variable must be inside initial basic block",
                        )
                    })?;
                let current = self
                    .current_block()
                    .ok_or_else(|| Error::parser(at, "OpVariable outside a basic block"))?;
                if self.state_ref(current).label != Some(entry.block) {
                    return Err(Error::parser(
                        at,
                        "function-local variable must be inside initial basic block",
                    ));
                }
                let pointer_ty = self.ty_of(op.result_type, at)?;
                let pointee = self.interface_pointee(op, at)?;
                let native = pointee.materialize(self.tcx())?;
                let name = pumice_llvm::cstr(&self.name_of(op.result));
                let raw = unsafe {
                    let alloca = LLVMBuildAlloca(self.builder_raw(), native.ty, name.as_ptr());
                    LLVMSetAlignment(alloca, native.alignment);
                    alloca
                };
                if let Some(initializer) = op.initializer {
                    let constant = self.constant_of(initializer, at)?;
                    unsafe {
                        let store = LLVMBuildStore(self.builder_raw(), constant.value(), raw);
                        LLVMSetAlignment(store, native.alignment);
                    }
                }
                self.set_value(
                    op.result,
                    at,
                    Value {
                        raw,
                        ty: pointer_ty,
                    },
                )
            }
            other => Err(Error::parser(
                at,
                format!("unimplemented OpVariable storage class: {:?}", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Capability closure: for every capability the enabled set is closed
    /// under the implication graph.
    #[test]
    fn capability_closure_is_closed() {
        for &capability in &[
            Capability::Shader,
            Capability::Geometry,
            Capability::ImageBuffer,
            Capability::InputAttachment,
            Capability::Image1D,
        ] {
            let closed = capability_closure(capability);
            for &member in &closed {
                for &required in directly_required_capabilities(member) {
                    assert!(
                        closed.contains(&required),
                        "{:?}: {:?} missing {:?}",
                        capability,
                        member,
                        required
                    );
                }
            }
        }
    }

    #[test]
    fn shader_implies_matrix() {
        let closed = capability_closure(Capability::Shader);
        assert!(closed.contains(&Capability::Matrix));
    }

    #[test]
    fn geometry_reaches_shader_and_matrix() {
        let closed = capability_closure(Capability::Geometry);
        assert!(closed.contains(&Capability::Shader));
        assert!(closed.contains(&Capability::Matrix));
        assert!(closed.contains(&Capability::Geometry));
    }
}
