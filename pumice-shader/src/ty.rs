//! The SPIR-V type-descriptor graph and the packed struct layout engine.
//!
//! Descriptors are reference-counted and independently owned by the id table;
//! cyclic shapes (pointer to struct containing a pointer) are expressed as a
//! late-completed pointee slot, not cyclic owning links. Native LLVM types
//! are materialized lazily against the target data layout and memoized per
//! node, so a cycle that passes through a pointer terminates naturally at the
//! opaque native pointer type.
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use llvm_sys::core::*;
use llvm_sys::prelude::*;
use llvm_sys::LLVMTypeKind;
use pumice_llvm::cstr;
use spirv::{Decoration, StorageClass};

use crate::error::{Error, Result};

/// Raw handles a materialization needs: the owning context and the data
/// layout that decides sizes and alignments.
#[derive(Clone, Copy)]
pub struct TypeContext {
    pub context: LLVMContextRef,
    pub target_data: llvm_sys::target::LLVMTargetDataRef,
}
impl TypeContext {
    pub fn abi_size(&self, ty: LLVMTypeRef) -> u64 {
        unsafe { llvm_sys::target::LLVMABISizeOfType(self.target_data, ty) }
    }
    pub fn abi_alignment(&self, ty: LLVMTypeRef) -> u32 {
        unsafe { llvm_sys::target::LLVMABIAlignmentOfType(self.target_data, ty) }
    }
    pub fn element_offset(&self, struct_ty: LLVMTypeRef, member: u32) -> u64 {
        unsafe { llvm_sys::target::LLVMOffsetOfElement(self.target_data, struct_ty, member) }
    }
}

/// A materialized native type together with the alignment the layout engine
/// will honor for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeType {
    pub ty: LLVMTypeRef,
    pub alignment: u32,
}

/// A decoration with its literal parameters, as accumulated from
/// `OpDecorate`/`OpMemberDecorate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecorationEntry {
    pub decoration: Decoration,
    pub params: Vec<u32>,
}
impl DecorationEntry {
    pub fn new(decoration: Decoration, params: &[u32]) -> Self {
        DecorationEntry {
            decoration,
            params: params.to_vec(),
        }
    }
}

/// First entry for `which`, if any.
pub fn find_decoration(list: &[DecorationEntry], which: Decoration) -> Option<&DecorationEntry> {
    list.iter().find(|entry| entry.decoration == which)
}

pub type TypeRef = Rc<Type>;

pub enum TypeKind {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { element: TypeRef, count: u32 },
    Matrix { column: TypeRef, columns: u32 },
    Array { element: TypeRef, length: u64 },
    RuntimeArray { element: TypeRef },
    Struct(StructLayout),
    /// Image/sampler/event handle types; placeholders that cannot be laid out.
    Opaque { name: String },
    Pointer(PointerType),
    Function(FunctionSignature),
}

pub struct Type {
    kind: TypeKind,
    instruction_start_index: usize,
    cache: Cell<Option<NativeType>>,
}

impl Type {
    pub fn new(kind: TypeKind, instruction_start_index: usize) -> TypeRef {
        Rc::new(Type {
            kind,
            instruction_start_index,
            cache: Cell::new(None),
        })
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }
    pub fn start_index(&self) -> usize {
        self.instruction_start_index
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }
    pub fn is_bool(&self) -> bool {
        matches!(self.kind, TypeKind::Bool)
    }
    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Bool | TypeKind::Int { .. } | TypeKind::Float { .. }
        )
    }
    pub fn as_vector(&self) -> Option<(&TypeRef, u32)> {
        match &self.kind {
            TypeKind::Vector { element, count } => Some((element, *count)),
            _ => None,
        }
    }
    pub fn as_struct(&self) -> Option<&StructLayout> {
        match &self.kind {
            TypeKind::Struct(layout) => Some(layout),
            _ => None,
        }
    }
    pub fn as_pointer(&self) -> Option<&PointerType> {
        match &self.kind {
            TypeKind::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }
    pub fn as_function(&self) -> Option<&FunctionSignature> {
        match &self.kind {
            TypeKind::Function(signature) => Some(signature),
            _ => None,
        }
    }
    /// Integer width of the type or of its vector element.
    pub fn scalar_int_width(&self) -> Option<u32> {
        match &self.kind {
            TypeKind::Int { width, .. } => Some(*width),
            TypeKind::Vector { element, .. } => element.scalar_int_width(),
            _ => None,
        }
    }
    /// Float width of the type or of its vector element.
    pub fn scalar_float_width(&self) -> Option<u32> {
        match &self.kind {
            TypeKind::Float { width } => Some(*width),
            TypeKind::Vector { element, .. } => element.scalar_float_width(),
            _ => None,
        }
    }
    /// Vector lane count; 1 for scalars.
    pub fn lane_count(&self) -> u32 {
        match &self.kind {
            TypeKind::Vector { count, .. } => *count,
            _ => 1,
        }
    }

    /// Returns the native type and alignment, computing and caching them on
    /// first use.
    pub fn materialize(&self, tcx: TypeContext) -> Result<NativeType> {
        if let Some(native) = self.cache.get() {
            return Ok(native);
        }
        let at = self.instruction_start_index;
        let native = unsafe {
            match &self.kind {
                TypeKind::Void => NativeType {
                    ty: LLVMVoidTypeInContext(tcx.context),
                    alignment: 1,
                },
                TypeKind::Bool => NativeType {
                    ty: LLVMInt1TypeInContext(tcx.context),
                    alignment: 1,
                },
                TypeKind::Int { width, .. } => {
                    match width {
                        8 | 16 | 32 | 64 => {}
                        _ => return Err(Error::parser(at, "invalid int width")),
                    }
                    let ty = LLVMIntTypeInContext(tcx.context, *width);
                    NativeType {
                        ty,
                        alignment: tcx.abi_alignment(ty),
                    }
                }
                TypeKind::Float { width } => {
                    let ty = match width {
                        16 => LLVMHalfTypeInContext(tcx.context),
                        32 => LLVMFloatTypeInContext(tcx.context),
                        64 => LLVMDoubleTypeInContext(tcx.context),
                        _ => return Err(Error::parser(at, "invalid float width")),
                    };
                    NativeType {
                        ty,
                        alignment: tcx.abi_alignment(ty),
                    }
                }
                TypeKind::Vector { element, count } => {
                    let element = element.materialize(tcx)?;
                    let ty = LLVMVectorType(element.ty, *count);
                    NativeType {
                        ty,
                        alignment: tcx.abi_alignment(ty),
                    }
                }
                TypeKind::Matrix { column, columns } => {
                    let column = column.materialize(tcx)?;
                    NativeType {
                        ty: LLVMArrayType2(column.ty, *columns as u64),
                        alignment: column.alignment,
                    }
                }
                TypeKind::Array { element, length } => {
                    let element = element.materialize(tcx)?;
                    NativeType {
                        ty: LLVMArrayType2(element.ty, *length),
                        alignment: element.alignment,
                    }
                }
                TypeKind::RuntimeArray { element } => {
                    let element = element.materialize(tcx)?;
                    NativeType {
                        ty: LLVMArrayType2(element.ty, 0),
                        alignment: element.alignment,
                    }
                }
                TypeKind::Struct(layout) => {
                    // Structs memoize through their layout state so that an
                    // in-progress (opaque) body is never cached here.
                    return layout.materialize(tcx, at);
                }
                TypeKind::Opaque { name } => {
                    let name = cstr(name);
                    NativeType {
                        ty: LLVMStructCreateNamed(tcx.context, name.as_ptr()),
                        alignment: 1,
                    }
                }
                TypeKind::Pointer(_) => {
                    let ty = LLVMPointerTypeInContext(tcx.context, 0);
                    NativeType {
                        ty,
                        alignment: tcx.abi_alignment(ty),
                    }
                }
                TypeKind::Function(signature) => {
                    let return_type = signature.return_type.materialize(tcx)?;
                    let mut params = Vec::with_capacity(signature.params.len());
                    for param in &signature.params {
                        params.push(param.materialize(tcx)?.ty);
                    }
                    NativeType {
                        ty: LLVMFunctionType(
                            return_type.ty,
                            params.as_mut_ptr(),
                            params.len() as u32,
                            0,
                        ),
                        alignment: 1,
                    }
                }
            }
        };
        self.cache.set(Some(native));
        Ok(native)
    }
}

/// A pointer whose pointee may arrive later (`OpTypeForwardPointer`).
pub struct PointerType {
    pointee: RefCell<Option<TypeRef>>,
    storage_class: StorageClass,
}
impl PointerType {
    pub fn new(pointee: Option<TypeRef>, storage_class: StorageClass) -> Self {
        PointerType {
            pointee: RefCell::new(pointee),
            storage_class,
        }
    }
    pub fn storage_class(&self) -> StorageClass {
        self.storage_class
    }
    pub fn pointee(&self) -> Option<TypeRef> {
        self.pointee.borrow().clone()
    }
    /// Completes a forward declaration. Idempotent against the identical
    /// pointee; any other re-completion is fatal.
    pub fn complete(&self, pointee: TypeRef, at: usize) -> Result<()> {
        let mut slot = self.pointee.borrow_mut();
        match &*slot {
            None => {
                *slot = Some(pointee);
                Ok(())
            }
            Some(existing) if Rc::ptr_eq(existing, &pointee) => Ok(()),
            Some(_) => Err(Error::parser(
                at,
                "pointer forward declaration completed with a different pointee",
            )),
        }
    }
}

pub struct FunctionSignature {
    pub return_type: TypeRef,
    pub params: Vec<TypeRef>,
    /// True when the SPIR-V signature (no explicit params, void return) can
    /// serve an `OpEntryPoint`.
    pub valid_for_entry_point: bool,
}

/// One logical struct member. `native_member_index` is assigned by the
/// layout engine and is not the SPIR-V member index: padding fillers occupy
/// intermediate slots.
pub struct StructMember {
    pub decorations: Vec<DecorationEntry>,
    pub ty: TypeRef,
    native_member_index: Cell<u32>,
}
impl StructMember {
    pub fn new(decorations: Vec<DecorationEntry>, ty: TypeRef) -> Self {
        StructMember {
            decorations,
            ty,
            native_member_index: Cell::new(0),
        }
    }
    pub fn native_member_index(&self) -> u32 {
        self.native_member_index.get()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LayoutState {
    Pending,
    InProgress,
    Complete,
}

/// A named struct whose body is laid out on first use.
///
/// The emitted native struct is packed: the engine alone owns every padding
/// byte, inserted as explicit `[N x i8]` members, so ABI consumers see an
/// unambiguous bit layout.
pub struct StructLayout {
    name: String,
    decorations: Vec<DecorationEntry>,
    members: RefCell<Vec<StructMember>>,
    native: Cell<Option<LLVMTypeRef>>,
    alignment: Cell<u32>,
    state: Cell<LayoutState>,
}

impl StructLayout {
    pub fn new(name: String, decorations: Vec<DecorationEntry>) -> Self {
        StructLayout {
            name,
            decorations,
            members: RefCell::new(Vec::new()),
            native: Cell::new(None),
            alignment: Cell::new(1),
            state: Cell::new(LayoutState::Pending),
        }
    }
    pub fn with_members(
        name: String,
        decorations: Vec<DecorationEntry>,
        members: Vec<StructMember>,
    ) -> Self {
        let layout = StructLayout::new(name, decorations);
        *layout.members.borrow_mut() = members;
        layout
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    /// Appends a member and returns its logical index. Only legal before the
    /// first materialization.
    pub fn add_member(&self, member: StructMember) -> usize {
        debug_assert!(self.state.get() == LayoutState::Pending);
        let mut members = self.members.borrow_mut();
        members.push(member);
        members.len() - 1
    }
    pub fn members(&self) -> Ref<'_, Vec<StructMember>> {
        self.members.borrow()
    }
    pub fn member_count(&self) -> usize {
        self.members.borrow().len()
    }

    fn named_struct(&self, tcx: TypeContext) -> LLVMTypeRef {
        if let Some(ty) = self.native.get() {
            return ty;
        }
        let name = cstr(&self.name);
        let ty = unsafe { LLVMStructCreateNamed(tcx.context, name.as_ptr()) };
        self.native.set(Some(ty));
        ty
    }

    pub fn materialize(&self, tcx: TypeContext, at: usize) -> Result<NativeType> {
        match self.state.get() {
            LayoutState::Complete => Ok(NativeType {
                // `named_struct` already ran on the way to Complete.
                ty: self.native.get().unwrap(),
                alignment: self.alignment.get(),
            }),
            // Still under construction: hand back the opaque shell so the
            // caller's recursion check can fire.
            LayoutState::InProgress => Ok(NativeType {
                ty: self.named_struct(tcx),
                alignment: 1,
            }),
            LayoutState::Pending => self.complete(tcx, at),
        }
    }

    fn complete(&self, tcx: TypeContext, at: usize) -> Result<NativeType> {
        for entry in &self.decorations {
            match entry.decoration {
                Decoration::Block | Decoration::BufferBlock => {}
                other => {
                    return Err(Error::parser(
                        at,
                        format!("unimplemented decoration on OpTypeStruct: {:?}", other),
                    ))
                }
            }
        }

        let ty = self.named_struct(tcx);
        self.state.set(LayoutState::InProgress);

        struct MemberInfo {
            alignment: u32,
            size: u64,
            ty: LLVMTypeRef,
        }
        let members = self.members.borrow();
        let mut infos = Vec::with_capacity(members.len());
        let mut total_alignment: u32 = 1;
        for member in members.iter() {
            for entry in &member.decorations {
                match entry.decoration {
                    // Location/BuiltIn feed the interface assembler; Offset
                    // is reserved for the buffer-block path; interpolation
                    // qualifiers do not affect layout.
                    Decoration::Location
                    | Decoration::BuiltIn
                    | Decoration::Offset
                    | Decoration::Flat
                    | Decoration::NoPerspective => {}
                    other => {
                        return Err(Error::parser(
                            at,
                            format!(
                                "unimplemented member decoration on OpTypeStruct: {:?}",
                                other
                            ),
                        ))
                    }
                }
            }
            let native = member.ty.materialize(tcx)?;
            let is_opaque_struct = unsafe {
                LLVMGetTypeKind(native.ty) == LLVMTypeKind::LLVMStructTypeKind
                    && LLVMIsOpaqueStruct(native.ty) != 0
            };
            if is_opaque_struct {
                return match member.ty.kind() {
                    TypeKind::Struct(_) => {
                        Err(Error::unsupported("recursive struct has infinite size"))
                    }
                    _ => Err(Error::parser(at, "struct can't have opaque struct members")),
                };
            }
            assert!(native.alignment.is_power_of_two());
            if native.alignment > total_alignment {
                total_alignment = native.alignment;
            }
            infos.push(MemberInfo {
                alignment: native.alignment,
                size: tcx.abi_size(native.ty),
                ty: native.ty,
            });
        }
        assert!(total_alignment.is_power_of_two());

        let i8_ty = unsafe { LLVMInt8TypeInContext(tcx.context) };
        let mut element_types: Vec<LLVMTypeRef> = Vec::with_capacity(members.len() * 2);
        if members.is_empty() {
            // A single byte so pointer arithmetic stays well-defined.
            element_types.push(i8_ty);
        } else {
            let mut current_offset: u64 = 0;
            for (index, info) in infos.iter().enumerate() {
                members[index]
                    .native_member_index
                    .set(element_types.len() as u32);
                element_types.push(info.ty);
                current_offset += info.size;
                let next_alignment = match infos.get(index + 1) {
                    Some(next) => next.alignment,
                    None => total_alignment,
                };
                let padding = current_offset.wrapping_neg() & (next_alignment as u64 - 1);
                if padding != 0 {
                    element_types.push(unsafe { LLVMArrayType2(i8_ty, padding) });
                    current_offset += padding;
                }
            }
        }
        unsafe {
            LLVMStructSetBody(
                ty,
                element_types.as_mut_ptr(),
                element_types.len() as u32,
                1,
            );
        }
        self.alignment.set(total_alignment);
        self.state.set(LayoutState::Complete);
        Ok(NativeType {
            ty,
            alignment: total_alignment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumice_llvm::{Context, TargetMachine};

    fn scaffolding() -> (Context, pumice_llvm::TargetData) {
        let context = Context::create().unwrap();
        let machine = TargetMachine::create_native().unwrap();
        let data = machine.create_target_data();
        (context, data)
    }

    fn f32_ty() -> TypeRef {
        Type::new(TypeKind::Float { width: 32 }, 0)
    }
    fn u8_ty() -> TypeRef {
        Type::new(
            TypeKind::Int {
                width: 8,
                signed: false,
            },
            0,
        )
    }
    fn vec_ty(element: TypeRef, count: u32) -> TypeRef {
        Type::new(TypeKind::Vector { element, count }, 0)
    }

    /// Layout soundness: every member offset is a multiple of its alignment
    /// and the struct size is a multiple of the struct alignment.
    #[test]
    fn packed_layout_is_aligned() {
        let (context, data) = scaffolding();
        let tcx = TypeContext {
            context: context.raw(),
            target_data: data.raw(),
        };
        let mixes: Vec<Vec<TypeRef>> = vec![
            vec![u8_ty(), vec_ty(f32_ty(), 4)],
            vec![f32_ty(), u8_ty(), f32_ty()],
            vec![vec_ty(f32_ty(), 3), u8_ty(), vec_ty(f32_ty(), 2)],
            vec![u8_ty(), u8_ty(), u8_ty()],
        ];
        for (case, mix) in mixes.into_iter().enumerate() {
            let layout = StructLayout::with_members(
                format!("case_{}", case),
                Vec::new(),
                mix.iter()
                    .map(|ty| StructMember::new(Vec::new(), ty.clone()))
                    .collect(),
            );
            let native = layout.materialize(tcx, 0).unwrap();
            for member in layout.members().iter() {
                let offset = tcx.element_offset(native.ty, member.native_member_index());
                let alignment = member.ty.materialize(tcx).unwrap().alignment as u64;
                assert_eq!(offset % alignment, 0, "case {}", case);
            }
            assert_eq!(tcx.abi_size(native.ty) % native.alignment as u64, 0);
        }
    }

    #[test]
    fn empty_struct_occupies_one_byte() {
        let (context, data) = scaffolding();
        let tcx = TypeContext {
            context: context.raw(),
            target_data: data.raw(),
        };
        let layout = StructLayout::new("empty".to_owned(), Vec::new());
        let native = layout.materialize(tcx, 0).unwrap();
        assert_eq!(tcx.abi_size(native.ty), 1);
    }

    #[test]
    fn pointer_completion_is_idempotent_once() {
        let pointee = f32_ty();
        let pointer = PointerType::new(None, StorageClass::Private);
        pointer.complete(pointee.clone(), 0).unwrap();
        pointer.complete(pointee, 0).unwrap();
        let other = f32_ty();
        assert!(pointer.complete(other, 0).is_err());
    }

    #[test]
    fn unknown_struct_decoration_is_refused() {
        let (context, data) = scaffolding();
        let tcx = TypeContext {
            context: context.raw(),
            target_data: data.raw(),
        };
        let layout = StructLayout::with_members(
            "decorated".to_owned(),
            vec![DecorationEntry::new(Decoration::RowMajor, &[])],
            vec![StructMember::new(Vec::new(), f32_ty())],
        );
        let err = layout.materialize(tcx, 9).unwrap_err();
        assert!(err.to_string().contains("RowMajor"), "{}", err);
    }
}
