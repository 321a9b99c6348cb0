//! The two-pass SPIR-V → LLVM translator.
//!
//! The same byte stream is parsed twice with the same visitor. Pass 1
//! (`CalculateTypes`) populates the id table: names, decorations, types,
//! constants, entry points, and the shader interface. Between the passes
//! every type is forced to materialize and the entry point is pinned. Pass 2
//! (`GenerateCode`) walks again and emits IR through the builder.
mod code;
mod entry;
mod ext;
mod types;

use std::rc::Rc;

use fnv::FnvHashSet;
use llvm_sys::core::*;
use llvm_sys::prelude::*;
use pumice_llvm::{cstr, Builder, Context, Module, TargetData, TargetMachine};
use pumice_spirv::{Instr, SpirvHeader};
use spirv::{Capability, ExecutionModel, Op, StorageClass};

use crate::constant::ConstantDescriptor;
use crate::error::{Error, Result};
use crate::interface::VertexInputState;
use crate::ty::{
    DecorationEntry, PointerType, StructLayout, StructMember, Type, TypeContext, TypeKind, TypeRef,
};
use crate::TranslatedShader;

pub(crate) type Id = u32;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Stage {
    CalculateTypes,
    GenerateCode,
}

/// One `OpEntryPoint` targeting an id, with its accumulated execution modes.
#[derive(Clone)]
pub(crate) struct EntryPointRecord {
    pub execution_model: ExecutionModel,
    pub name: String,
    pub interface: Vec<Id>,
    pub instruction_start_index: usize,
    #[allow(dead_code)]
    pub execution_modes: Vec<(spirv::ExecutionMode, Vec<u32>)>,
}

/// An SSA value paired with its type descriptor.
#[derive(Clone)]
pub(crate) struct Value {
    pub raw: LLVMValueRef,
    pub ty: TypeRef,
}

/// Struct-GEPs into the io/inputs/outputs structs, available once a
/// function's first basic block has been opened.
#[derive(Clone, Copy)]
pub(crate) struct EntryBlock {
    pub block: LLVMBasicBlockRef,
    #[allow(dead_code)]
    pub io_param: LLVMValueRef,
    pub inputs_ptr: LLVMValueRef,
    pub outputs_ptr: LLVMValueRef,
}

pub(crate) struct FunctionState {
    pub ty: TypeRef,
    pub raw: LLVMValueRef,
    pub entry: Option<EntryBlock>,
    pub name: String,
    pub next_param: u32,
}

/// Which interface struct a module-scope variable landed in, and where.
#[derive(Clone, Copy, Debug)]
pub(crate) enum InterfaceSlot {
    Input { member: usize },
    Output { member: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum ExtInstSet {
    GlslStd450,
    OpenClStd,
}

/// Everything a SPIR-V id can accumulate across the two passes.
#[derive(Default)]
pub(crate) struct IdState {
    pub name: Option<String>,
    #[allow(dead_code)]
    pub member_names: Vec<(u32, String)>,
    pub decorations: Vec<DecorationEntry>,
    pub member_decorations: Vec<(u32, DecorationEntry)>,
    pub ty: Option<TypeRef>,
    pub constant: Option<Rc<ConstantDescriptor>>,
    pub entry_points: Vec<EntryPointRecord>,
    pub variable: Option<InterfaceSlot>,
    pub function: Option<FunctionState>,
    pub label: Option<LLVMBasicBlockRef>,
    pub value: Option<Value>,
    pub ext_inst_import: Option<ExtInstSet>,
    #[allow(dead_code)]
    pub string: Option<String>,
}

/// A deferred Input/Output variable whose struct-GEP is emitted once the
/// entry block exists. Captures the id state by index so id-table
/// reallocation cannot invalidate it.
#[derive(Clone, Copy)]
struct InterfaceBinding {
    id: Id,
    slot: InterfaceSlot,
    result_type: Id,
    at: usize,
}

/// A phi whose incoming edges are resolved at `OpFunctionEnd`, after every
/// forward-referenced value exists.
struct PendingPhi {
    phi: LLVMValueRef,
    incoming: Vec<(Id, Id)>,
    at: usize,
}

pub(crate) struct Translator<'a> {
    ids: Vec<IdState>,
    version: (u32, u32),
    generator_magic: u32,
    capabilities: FnvHashSet<Capability>,
    cx: LLVMContextRef,
    target_data: TargetData,
    name_prefix: String,
    module: Module,
    builder: Builder,
    io_struct: TypeRef,
    io_pointer_type: TypeRef,
    inputs_member: usize,
    inputs_struct: TypeRef,
    outputs_member: usize,
    outputs_struct: TypeRef,
    uniforms_member: usize,
    stage: Stage,
    current_function: Option<Id>,
    current_block: Option<Id>,
    pending_merge: Option<usize>,
    interface_bindings: Vec<InterfaceBinding>,
    pending_phis: Vec<PendingPhi>,
    execution_model: ExecutionModel,
    entry_point_name: &'a str,
    pinned_entry: Option<(Id, usize)>,
    pinned_interface: Vec<Id>,
    vertex_input: Option<&'a VertexInputState>,
    next_name_index: u64,
}

impl<'a> Translator<'a> {
    pub fn new(
        context: &'a Context,
        target_machine: &'a TargetMachine,
        shader_id: u64,
        execution_model: ExecutionModel,
        entry_point_name: &'a str,
        vertex_input: Option<&'a VertexInputState>,
    ) -> Self {
        let name_prefix = format!("shader_{}_", shader_id);
        let module = Module::create(&format!("{}module", name_prefix), context);
        module.set_target(target_machine);
        let target_data = target_machine.create_target_data();
        let builder = Builder::create(context);

        let io_struct = Type::new(
            TypeKind::Struct(StructLayout::new(
                format!("{}Io_struct", name_prefix),
                Vec::new(),
            )),
            0,
        );
        let io_pointer_type = Type::new(
            TypeKind::Pointer(PointerType::new(
                Some(io_struct.clone()),
                StorageClass::Private,
            )),
            0,
        );
        let inputs_struct = Type::new(
            TypeKind::Struct(StructLayout::new(
                format!("{}Inputs", name_prefix),
                Vec::new(),
            )),
            0,
        );
        let outputs_struct = Type::new(
            TypeKind::Struct(StructLayout::new(
                format!("{}Outputs", name_prefix),
                Vec::new(),
            )),
            0,
        );
        let io_layout = match io_struct.kind() {
            TypeKind::Struct(layout) => layout,
            _ => unreachable!(),
        };
        let inputs_member = io_layout.add_member(StructMember::new(
            Vec::new(),
            Type::new(
                TypeKind::Pointer(PointerType::new(
                    Some(inputs_struct.clone()),
                    StorageClass::Private,
                )),
                0,
            ),
        ));
        let outputs_member = io_layout.add_member(StructMember::new(
            Vec::new(),
            Type::new(
                TypeKind::Pointer(PointerType::new(
                    Some(outputs_struct.clone()),
                    StorageClass::Private,
                )),
                0,
            ),
        ));
        let uniforms_member = io_layout.add_member(StructMember::new(
            Vec::new(),
            Type::new(
                TypeKind::Pointer(PointerType::new(None, StorageClass::Private)),
                0,
            ),
        ));

        Translator {
            ids: Vec::new(),
            version: (0, 0),
            generator_magic: 0,
            capabilities: FnvHashSet::default(),
            cx: context.raw(),
            target_data,
            name_prefix,
            module,
            builder,
            io_struct,
            io_pointer_type,
            inputs_member,
            inputs_struct,
            outputs_member,
            outputs_struct,
            uniforms_member,
            stage: Stage::CalculateTypes,
            current_function: None,
            current_block: None,
            pending_merge: None,
            interface_bindings: Vec::new(),
            pending_phis: Vec::new(),
            execution_model,
            entry_point_name,
            pinned_entry: None,
            pinned_interface: Vec::new(),
            vertex_input,
            next_name_index: 0,
        }
    }

    pub fn run(mut self, words: &[u32]) -> Result<TranslatedShader> {
        self.stage = Stage::CalculateTypes;
        pumice_spirv::parse(words, &mut self)?;
        log::debug!(
            "pass 1 complete: SPIR-V {}.{}, generator {:#x}, {} ids",
            self.version.0,
            self.version.1,
            self.generator_magic,
            self.ids.len()
        );

        // Force every type and the three interface structs so pass 2 works
        // against a fully materialized type universe.
        let tcx = self.tcx();
        for index in 0..self.ids.len() {
            if let Some(ty) = self.ids[index].ty.clone() {
                ty.materialize(tcx)?;
            }
        }
        self.io_pointer_type.materialize(tcx)?;
        self.inputs_struct.materialize(tcx)?;
        self.outputs_struct.materialize(tcx)?;
        self.io_struct.materialize(tcx)?;

        self.resolve_entry_point()?;

        self.stage = Stage::GenerateCode;
        pumice_spirv::parse(words, &mut self)?;

        let (entry_id, entry_index) = self.pinned_entry.unwrap();
        let record = self.state_ref(entry_id).entry_points[entry_index].clone();
        let main_function = match &self.state_ref(entry_id).function {
            Some(function) => {
                log::trace!("shader main resolved as {:?}", function.name);
                function.raw
            }
            None => {
                return Err(Error::parser(
                    record.instruction_start_index,
                    "no definition for function referenced in OpEntryPoint",
                ))
            }
        };
        let entry_function_name = match self.execution_model {
            ExecutionModel::Vertex => self.generate_vertex_entry(&record, main_function)?,
            ExecutionModel::Fragment => self.generate_fragment_entry(&record, main_function)?,
            other => {
                return Err(Error::unsupported(format!(
                    "unimplemented execution model: {:?}",
                    other
                )))
            }
        };
        log::debug!("entry point synthesized as {:?}", entry_function_name);

        Ok(TranslatedShader {
            module: self.module,
            entry_function_name,
            inputs: self.inputs_struct,
            outputs: self.outputs_struct,
            execution_model: self.execution_model,
        })
    }

    // ---- id-table access ----------------------------------------------

    fn check_id(&self, id: Id, at: usize) -> Result<usize> {
        if id == 0 || id as usize > self.ids.len() {
            return Err(Error::parser(at, format!("id {} is out of range", id)));
        }
        Ok(id as usize - 1)
    }
    pub(crate) fn state_ref(&self, id: Id) -> &IdState {
        &self.ids[id as usize - 1]
    }
    /// Like [`state_ref`](Self::state_ref) for ids the current pass has not
    /// validated yet.
    pub(crate) fn checked_state_ref(&self, id: Id, at: usize) -> Result<&IdState> {
        let index = self.check_id(id, at)?;
        Ok(&self.ids[index])
    }
    pub(crate) fn state(&mut self, id: Id, at: usize) -> Result<&mut IdState> {
        let index = self.check_id(id, at)?;
        Ok(&mut self.ids[index])
    }
    pub(crate) fn ty_of(&self, id: Id, at: usize) -> Result<TypeRef> {
        let index = self.check_id(id, at)?;
        self.ids[index]
            .ty
            .clone()
            .ok_or_else(|| Error::parser(at, format!("id {} is not a type", id)))
    }
    pub(crate) fn value_of(&self, id: Id, at: usize) -> Result<Value> {
        let index = self.check_id(id, at)?;
        self.ids[index]
            .value
            .clone()
            .ok_or_else(|| Error::parser(at, format!("id {} has no value", id)))
    }
    pub(crate) fn set_value(&mut self, id: Id, at: usize, value: Value) -> Result<()> {
        debug_assert_eq!(self.stage, Stage::GenerateCode);
        self.state(id, at)?.value = Some(value);
        Ok(())
    }
    pub(crate) fn constant_of(&self, id: Id, at: usize) -> Result<Rc<ConstantDescriptor>> {
        let index = self.check_id(id, at)?;
        self.ids[index]
            .constant
            .clone()
            .ok_or_else(|| Error::parser(at, format!("id {} is not a constant", id)))
    }
    /// The zero-extended value of a constant integer id.
    pub(crate) fn unsigned_constant(&self, id: Id, at: usize) -> Result<u64> {
        let constant = self.constant_of(id, at)?;
        match constant.ty.kind() {
            TypeKind::Int { .. } => Ok(unsafe { LLVMConstIntGetZExtValue(constant.value()) }),
            _ => Err(Error::parser(at, "id is not a constant integer")),
        }
    }
    pub(crate) fn name_of(&self, id: Id) -> String {
        (id as usize)
            .checked_sub(1)
            .and_then(|index| self.ids.get(index))
            .and_then(|state| state.name.clone())
            .unwrap_or_default()
    }
    pub(crate) fn forbid_decorations(&self, id: Id, at: usize) -> Result<()> {
        let index = self.check_id(id, at)?;
        if let Some(entry) = self.ids[index].decorations.first() {
            return Err(Error::parser(
                at,
                format!(
                    "decorations on instruction not implemented: {:?}",
                    entry.decoration
                ),
            ));
        }
        Ok(())
    }

    // ---- naming ---------------------------------------------------------

    pub(crate) fn prefixed_name(&self, name: &str, is_builtin_name: bool) -> String {
        if name.is_empty() {
            return String::new();
        }
        let mut name = name.to_owned();
        let first_non_underline = name.find(|c| c != '_');
        if let Some(index) = first_non_underline {
            if name.as_bytes()[index].is_ascii_digit() {
                // keep clear of the generated numeric names
                name.insert(0, '_');
            }
        }
        if !is_builtin_name {
            // user names must not collide with synthesized ones
            name.insert(0, '_');
        }
        format!("{}{}", self.name_prefix, name)
    }
    pub(crate) fn make_prefixed_name(&mut self, name: &str) -> String {
        if name.is_empty() {
            let generated = format!("{}{}", self.name_prefix, self.next_name_index);
            self.next_name_index += 1;
            return generated;
        }
        self.prefixed_name(name, false)
    }

    // ---- shared handles -------------------------------------------------

    pub(crate) fn tcx(&self) -> TypeContext {
        TypeContext {
            context: self.cx,
            target_data: self.target_data.raw(),
        }
    }
    pub(crate) fn context_raw(&self) -> LLVMContextRef {
        self.cx
    }
    pub(crate) fn module_raw(&self) -> LLVMModuleRef {
        self.module.raw()
    }
    pub(crate) fn builder_raw(&self) -> LLVMBuilderRef {
        self.builder.raw()
    }
    pub(crate) fn io_struct(&self) -> &TypeRef {
        &self.io_struct
    }
    pub(crate) fn io_pointer_type(&self) -> &TypeRef {
        &self.io_pointer_type
    }
    pub(crate) fn inputs_struct(&self) -> &TypeRef {
        &self.inputs_struct
    }
    pub(crate) fn outputs_struct(&self) -> &TypeRef {
        &self.outputs_struct
    }
    pub(crate) fn io_members(&self) -> (usize, usize, usize) {
        (self.inputs_member, self.outputs_member, self.uniforms_member)
    }
    pub(crate) fn vertex_input(&self) -> Option<&'a VertexInputState> {
        self.vertex_input
    }
    pub(crate) fn stage(&self) -> Stage {
        self.stage
    }
    pub(crate) fn current_function(&self) -> Option<Id> {
        self.current_function
    }
    pub(crate) fn capability_set(&self) -> &FnvHashSet<Capability> {
        &self.capabilities
    }

    pub(crate) fn struct_layout(ty: &TypeRef) -> &StructLayout {
        match ty.kind() {
            TypeKind::Struct(layout) => layout,
            _ => unreachable!("interface type is always a struct"),
        }
    }

    /// Native index of a logical member of one of the interface structs.
    pub(crate) fn member_native_index(ty: &TypeRef, member: usize) -> u32 {
        Self::struct_layout(ty).members()[member].native_member_index()
    }

    // ---- entry-point pinning -------------------------------------------

    fn resolve_entry_point(&mut self) -> Result<()> {
        let mut found: Option<(Id, usize)> = None;
        for (index, state) in self.ids.iter().enumerate() {
            for (record_index, record) in state.entry_points.iter().enumerate() {
                if record.name != self.entry_point_name
                    || record.execution_model != self.execution_model
                {
                    continue;
                }
                if found.is_some() {
                    return Err(Error::parser(
                        record.instruction_start_index,
                        format!(
                            "duplicate entry point: {:?} {:?}",
                            self.execution_model, self.entry_point_name
                        ),
                    ));
                }
                found = Some((index as Id + 1, record_index));
            }
        }
        let (id, record_index) = found.ok_or_else(|| {
            Error::parser(
                0,
                format!(
                    "can't find entry point: {:?} {:?}",
                    self.execution_model, self.entry_point_name
                ),
            )
        })?;
        self.pinned_interface = self.state_ref(id).entry_points[record_index].interface.clone();
        self.pinned_entry = Some((id, record_index));
        Ok(())
    }

    pub(crate) fn is_in_pinned_interface(&self, id: Id) -> bool {
        self.pinned_interface.contains(&id)
    }

    // ---- basic blocks ---------------------------------------------------

    pub(crate) fn get_or_make_label(&mut self, id: Id, at: usize) -> Result<LLVMBasicBlockRef> {
        let index = self.check_id(id, at)?;
        if let Some(block) = self.ids[index].label {
            return Ok(block);
        }
        let function_id = self
            .current_function
            .ok_or_else(|| Error::parser(at, "label outside a function"))?;
        let function_raw = match &self.state_ref(function_id).function {
            Some(function) => function.raw,
            None => return Err(Error::parser(at, "label in an undeclared function")),
        };
        let name = cstr(&self.prefixed_name(&self.name_of(id), false));
        let block =
            unsafe { LLVMAppendBasicBlockInContext(self.cx, function_raw, name.as_ptr()) };
        self.ids[index].label = Some(block);
        Ok(block)
    }

    pub(crate) fn push_interface_binding(
        &mut self,
        id: Id,
        slot: InterfaceSlot,
        result_type: Id,
        at: usize,
    ) {
        self.interface_bindings.push(InterfaceBinding {
            id,
            slot,
            result_type,
            at,
        });
    }

    /// Emits the struct-GEP for every deferred Input/Output variable into the
    /// freshly opened entry block.
    pub(crate) fn bind_interface_values(&mut self, entry: EntryBlock) -> Result<()> {
        let bindings = self.interface_bindings.clone();
        let tcx = self.tcx();
        for binding in bindings {
            let (struct_ty, base, member) = match binding.slot {
                InterfaceSlot::Input { member } => {
                    (self.inputs_struct.clone(), entry.inputs_ptr, member)
                }
                InterfaceSlot::Output { member } => {
                    (self.outputs_struct.clone(), entry.outputs_ptr, member)
                }
            };
            let native = struct_ty.materialize(tcx)?;
            let native_index = Self::member_native_index(&struct_ty, member);
            let name = cstr(&self.name_of(binding.id));
            let raw = unsafe {
                LLVMBuildStructGEP2(
                    self.builder.raw(),
                    native.ty,
                    base,
                    native_index,
                    name.as_ptr(),
                )
            };
            let ty = self.ty_of(binding.result_type, binding.at)?;
            self.set_value(binding.id, binding.at, Value { raw, ty })?;
        }
        Ok(())
    }

    pub(crate) fn push_pending_phi(&mut self, phi: LLVMValueRef, incoming: Vec<(Id, Id)>, at: usize) {
        self.pending_phis.push(PendingPhi { phi, incoming, at });
    }

    /// Wires every phi recorded in the finished function; incoming values may
    /// have been defined after the phi itself.
    pub(crate) fn resolve_pending_phis(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_phis);
        for item in pending {
            let mut values = Vec::with_capacity(item.incoming.len());
            let mut blocks = Vec::with_capacity(item.incoming.len());
            for (value_id, block_id) in &item.incoming {
                values.push(self.value_of(*value_id, item.at)?.raw);
                let index = self.check_id(*block_id, item.at)?;
                let block = self.ids[index]
                    .label
                    .ok_or_else(|| Error::parser(item.at, "OpPhi references an unknown block"))?;
                blocks.push(block);
            }
            unsafe {
                LLVMAddIncoming(
                    item.phi,
                    values.as_mut_ptr(),
                    blocks.as_mut_ptr(),
                    values.len() as u32,
                )
            };
        }
        Ok(())
    }

    // ---- state machines -------------------------------------------------

    pub(crate) fn begin_function(&mut self, id: Id, at: usize) -> Result<()> {
        if self.current_function.is_some() {
            return Err(Error::parser(
                at,
                "missing OpFunctionEnd before starting a new function",
            ));
        }
        self.current_function = Some(id);
        Ok(())
    }
    pub(crate) fn end_function(&mut self, at: usize) -> Result<()> {
        if self.current_function.is_none() {
            return Err(Error::parser(at, "OpFunctionEnd without matching OpFunction"));
        }
        self.current_function = None;
        Ok(())
    }
    pub(crate) fn open_block(&mut self, id: Id, at: usize) -> Result<()> {
        if self.current_function.is_none() {
            return Err(Error::parser(at, "OpLabel not allowed outside a function"));
        }
        if self.current_block.is_some() {
            return Err(Error::parser(at, "missing block terminator before OpLabel"));
        }
        self.current_block = Some(id);
        Ok(())
    }
    pub(crate) fn current_block(&self) -> Option<Id> {
        self.current_block
    }
    /// A terminator closes the current block and consumes any pending merge.
    pub(crate) fn close_block(&mut self) {
        self.current_block = None;
        self.pending_merge = None;
    }
    pub(crate) fn set_pending_merge(&mut self, at: usize) {
        self.pending_merge = Some(at);
    }

    pub(crate) fn set_version(&mut self, header: &SpirvHeader) {
        self.version = (header.version_major(), header.version_minor());
        self.generator_magic = header.generator;
        self.ids = Vec::new();
        self.ids.resize_with(header.bound as usize - 1, IdState::default);
    }
    pub(crate) fn enable_capabilities(&mut self, caps: impl IntoIterator<Item = Capability>) {
        self.capabilities.extend(caps);
    }
}

fn is_terminator(op: Op) -> bool {
    matches!(
        op,
        Op::Branch
            | Op::BranchConditional
            | Op::Switch
            | Op::Kill
            | Op::Return
            | Op::ReturnValue
            | Op::Unreachable
    )
}

impl<'a> pumice_spirv::Visitor for Translator<'a> {
    type Error = Error;

    fn header(&mut self, header: &SpirvHeader) -> Result<()> {
        if self.stage == Stage::CalculateTypes {
            self.set_version(header);
        }
        Ok(())
    }

    fn instruction(&mut self, at: usize, instr: &Instr) -> Result<()> {
        let op = instr
            .op()
            .ok_or_else(|| Error::parser(at, format!("unknown opcode {}", instr.opcode())))?;

        // A merge instruction must be consumed by the terminator that
        // immediately follows it.
        if self.pending_merge.is_some()
            && !is_terminator(op)
            && !matches!(op, Op::Line | Op::NoLine)
        {
            return Err(Error::parser(
                at,
                "a merge instruction must be immediately followed by a block terminator",
            ));
        }
        // Between OpFunction and the first OpLabel only parameters may
        // appear; after a terminator the next instruction opens a new block.
        if self.current_function.is_some() && self.current_block.is_none() {
            match op {
                Op::Label
                | Op::FunctionParameter
                | Op::FunctionEnd
                | Op::Line
                | Op::NoLine => {}
                _ => {
                    return Err(Error::parser(
                        at,
                        format!("{:?} is not allowed outside a basic block", op),
                    ))
                }
            }
        }

        match op {
            Op::Nop
            | Op::SourceContinued
            | Op::Source
            | Op::SourceExtension
            | Op::Line
            | Op::NoLine
            | Op::ModuleProcessed => Ok(()),
            Op::Undef => self.op_undef(instr, at),
            Op::String => self.op_string(instr, at),
            Op::Name => self.op_name(instr, at),
            Op::MemberName => self.op_member_name(instr, at),
            Op::Extension => self.op_extension(instr, at),
            Op::ExtInstImport => self.op_ext_inst_import(instr, at),
            Op::ExtInst => self.op_ext_inst(instr, at),
            Op::MemoryModel => self.op_memory_model(instr, at),
            Op::EntryPoint => self.op_entry_point(instr, at),
            Op::ExecutionMode => self.op_execution_mode(instr, at),
            Op::Capability => self.op_capability(instr, at),

            Op::TypeVoid => self.op_type_void(instr, at),
            Op::TypeBool => self.op_type_bool(instr, at),
            Op::TypeInt => self.op_type_int(instr, at),
            Op::TypeFloat => self.op_type_float(instr, at),
            Op::TypeVector => self.op_type_vector(instr, at),
            Op::TypeMatrix => self.op_type_matrix(instr, at),
            Op::TypeImage => self.op_type_image(instr, at),
            Op::TypeSampler => self.op_type_sampler(instr, at),
            Op::TypeSampledImage => self.op_type_sampled_image(instr, at),
            Op::TypeArray => self.op_type_array(instr, at),
            Op::TypeRuntimeArray => self.op_type_runtime_array(instr, at),
            Op::TypeStruct => self.op_type_struct(instr, at),
            Op::TypeOpaque => self.op_type_opaque(instr, at),
            Op::TypePointer => self.op_type_pointer(instr, at),
            Op::TypeFunction => self.op_type_function(instr, at),
            Op::TypeEvent => self.op_type_event(instr, at),
            Op::TypeForwardPointer => self.op_type_forward_pointer(instr, at),

            Op::ConstantTrue => self.op_constant_bool(instr, at, true),
            Op::ConstantFalse => self.op_constant_bool(instr, at, false),
            Op::Constant => self.op_constant(instr, at),
            Op::ConstantComposite => self.op_constant_composite(instr, at),
            Op::ConstantNull => self.op_constant_null(instr, at),

            Op::Function => self.op_function(instr, at),
            Op::FunctionParameter => self.op_function_parameter(instr, at),
            Op::FunctionEnd => self.op_function_end(instr, at),
            Op::FunctionCall => self.op_function_call(instr, at),

            Op::Variable => self.op_variable(instr, at),
            Op::Load => self.op_load(instr, at),
            Op::Store => self.op_store(instr, at),
            Op::AccessChain | Op::InBoundsAccessChain => self.op_access_chain(instr, at),

            Op::Decorate => self.op_decorate(instr, at),
            Op::MemberDecorate => self.op_member_decorate(instr, at),

            Op::VectorExtractDynamic => self.op_vector_extract_dynamic(instr, at),
            Op::VectorInsertDynamic => self.op_vector_insert_dynamic(instr, at),
            Op::VectorShuffle => self.op_vector_shuffle(instr, at),
            Op::CompositeConstruct => self.op_composite_construct(instr, at),
            Op::CompositeExtract => self.op_composite_extract(instr, at),
            Op::CompositeInsert => self.op_composite_insert(instr, at),
            Op::CopyObject => self.op_copy_object(instr, at),

            Op::ConvertFToU => self.cast_op(instr, at, llvm_sys::LLVMOpcode::LLVMFPToUI),
            Op::ConvertFToS => self.cast_op(instr, at, llvm_sys::LLVMOpcode::LLVMFPToSI),
            Op::ConvertSToF => self.cast_op(instr, at, llvm_sys::LLVMOpcode::LLVMSIToFP),
            Op::ConvertUToF => self.cast_op(instr, at, llvm_sys::LLVMOpcode::LLVMUIToFP),
            Op::UConvert => self.op_u_convert(instr, at),
            Op::SConvert => self.op_s_convert(instr, at),
            Op::FConvert => self.op_f_convert(instr, at),
            Op::QuantizeToF16 => self.op_quantize_to_f16(instr, at),
            Op::Bitcast => self.op_bitcast(instr, at),

            Op::SNegate => self.unary_op(instr, at, LLVMBuildNeg),
            Op::FNegate => self.unary_op(instr, at, LLVMBuildFNeg),
            Op::IAdd => self.binary_op(instr, at, LLVMBuildAdd),
            Op::FAdd => self.binary_op(instr, at, LLVMBuildFAdd),
            Op::ISub => self.binary_op(instr, at, LLVMBuildSub),
            Op::FSub => self.binary_op(instr, at, LLVMBuildFSub),
            Op::IMul => self.binary_op(instr, at, LLVMBuildMul),
            Op::FMul => self.binary_op(instr, at, LLVMBuildFMul),
            Op::UDiv => self.binary_op(instr, at, LLVMBuildUDiv),
            Op::SDiv => self.binary_op(instr, at, LLVMBuildSDiv),
            Op::FDiv => self.binary_op(instr, at, LLVMBuildFDiv),
            Op::UMod => self.binary_op(instr, at, LLVMBuildURem),
            Op::SRem => self.binary_op(instr, at, LLVMBuildSRem),
            Op::SMod => self.op_s_mod(instr, at),
            Op::FRem => self.binary_op(instr, at, LLVMBuildFRem),
            Op::FMod => self.op_f_mod(instr, at),
            Op::VectorTimesScalar => self.op_vector_times_scalar(instr, at),
            Op::Dot => self.op_dot(instr, at),

            Op::Any => self.op_any_all(instr, at, false),
            Op::All => self.op_any_all(instr, at, true),
            Op::IsNan => self.op_is_nan(instr, at),
            Op::IsInf => self.op_is_inf(instr, at),
            Op::LogicalEqual => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntEQ),
            Op::LogicalNotEqual => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntNE),
            Op::LogicalOr => self.binary_op(instr, at, LLVMBuildOr),
            Op::LogicalAnd => self.binary_op(instr, at, LLVMBuildAnd),
            Op::LogicalNot => self.unary_op(instr, at, LLVMBuildNot),
            Op::Select => self.op_select(instr, at),

            Op::IEqual => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntEQ),
            Op::INotEqual => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntNE),
            Op::UGreaterThan => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntUGT),
            Op::SGreaterThan => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntSGT),
            Op::UGreaterThanEqual => {
                self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntUGE)
            }
            Op::SGreaterThanEqual => {
                self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntSGE)
            }
            Op::ULessThan => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntULT),
            Op::SLessThan => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntSLT),
            Op::ULessThanEqual => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntULE),
            Op::SLessThanEqual => self.icmp_op(instr, at, llvm_sys::LLVMIntPredicate::LLVMIntSLE),
            Op::FOrdEqual => self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealOEQ),
            Op::FUnordEqual => self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealUEQ),
            Op::FOrdNotEqual => self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealONE),
            Op::FUnordNotEqual => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealUNE)
            }
            Op::FOrdLessThan => self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealOLT),
            Op::FUnordLessThan => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealULT)
            }
            Op::FOrdGreaterThan => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealOGT)
            }
            Op::FUnordGreaterThan => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealUGT)
            }
            Op::FOrdLessThanEqual => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealOLE)
            }
            Op::FUnordLessThanEqual => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealULE)
            }
            Op::FOrdGreaterThanEqual => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealOGE)
            }
            Op::FUnordGreaterThanEqual => {
                self.fcmp_op(instr, at, llvm_sys::LLVMRealPredicate::LLVMRealUGE)
            }

            Op::ShiftRightLogical => self.binary_op(instr, at, LLVMBuildLShr),
            Op::ShiftRightArithmetic => self.binary_op(instr, at, LLVMBuildAShr),
            Op::ShiftLeftLogical => self.binary_op(instr, at, LLVMBuildShl),
            Op::BitwiseOr => self.binary_op(instr, at, LLVMBuildOr),
            Op::BitwiseXor => self.binary_op(instr, at, LLVMBuildXor),
            Op::BitwiseAnd => self.binary_op(instr, at, LLVMBuildAnd),
            Op::Not => self.unary_op(instr, at, LLVMBuildNot),
            Op::BitCount => self.op_bit_count(instr, at),
            Op::BitReverse => self.op_bit_reverse(instr, at),

            Op::Phi => self.op_phi(instr, at),
            Op::LoopMerge => self.op_loop_merge(instr, at),
            Op::SelectionMerge => self.op_selection_merge(instr, at),
            Op::Label => self.op_label(instr, at),
            Op::Branch => self.op_branch(instr, at),
            Op::BranchConditional => self.op_branch_conditional(instr, at),
            Op::Switch => self.op_switch(instr, at),
            Op::Kill => self.op_kill(instr, at),
            Op::Return => self.op_return(instr, at),
            Op::ReturnValue => self.op_return_value(instr, at),
            Op::Unreachable => self.op_unreachable(instr, at),

            other => Err(Error::translation(format!(
                "instruction not implemented: {:?}",
                other
            ))),
        }
    }
}
