//! Typed views over the operands of the instructions the translator handles.
//!
//! Each struct lists its operands in encoding order; `decode` walks them with
//! an [`Operands`] cursor so malformed instructions are blamed on their word
//! offset.
use crate::error::Result;
use crate::instr::Instr;
use crate::spirv::*;

pub type Id = u32;
pub type MemberIndex = u32;

// Be aware that the order of the read methods is important.
macro_rules! define_ops {
    (read_enum: $type:ty: $operands:expr) => {
        $operands.read_enum::<$type>()?
    };
    ($read_fn:ident: $type:ty: $operands:expr) => {
        $operands.$read_fn()?
    };
    ($($opcode:ident { $($field:ident: $type:ty = $read_fn:tt(),)* })+) => {
        $(
            pub struct $opcode<'a> {
                $( pub $field: $type, )*
                _ph: ::std::marker::PhantomData<&'a ()>,
            }
            impl<'a> $opcode<'a> {
                #[allow(unused_mut, unused_variables)]
                pub fn decode(instr: &'a Instr, at: usize) -> Result<Self> {
                    let mut operands = instr.operands(at);
                    Ok($opcode {
                        $( $field: define_ops!($read_fn: $type: operands), )*
                        _ph: ::std::marker::PhantomData,
                    })
                }
            }
        )+
    };
}

define_ops! {
    OpExtInstImport {
        result: Id = read_id(),
        name: &'a str = read_str(),
    }
    OpExtInst {
        result_type: Id = read_id(),
        result: Id = read_id(),
        set: Id = read_id(),
        instruction: u32 = read_u32(),
        operands: &'a [u32] = read_list(),
    }

    OpMemoryModel {
        addressing_model: AddressingModel = read_enum(),
        memory_model: MemoryModel = read_enum(),
    }
    OpEntryPoint {
        execution_model: ExecutionModel = read_enum(),
        entry_point: Id = read_id(),
        name: &'a str = read_str(),
        interface: &'a [Id] = read_list(),
    }
    OpExecutionMode {
        entry_point: Id = read_id(),
        mode: ExecutionMode = read_enum(),
        params: &'a [u32] = read_list(),
    }
    OpCapability {
        capability: Capability = read_enum(),
    }

    OpString {
        result: Id = read_id(),
        string: &'a str = read_str(),
    }
    OpName {
        target: Id = read_id(),
        name: &'a str = read_str(),
    }
    OpMemberName {
        target: Id = read_id(),
        member: MemberIndex = read_u32(),
        name: &'a str = read_str(),
    }

    OpDecorate {
        target: Id = read_id(),
        decoration: Decoration = read_enum(),
        params: &'a [u32] = read_list(),
    }
    OpMemberDecorate {
        target: Id = read_id(),
        member: MemberIndex = read_u32(),
        decoration: Decoration = read_enum(),
        params: &'a [u32] = read_list(),
    }

    OpTypeVoid {
        result: Id = read_id(),
    }
    OpTypeBool {
        result: Id = read_id(),
    }
    OpTypeInt {
        result: Id = read_id(),
        width: u32 = read_u32(),
        signed: bool = read_bool(),
    }
    OpTypeFloat {
        result: Id = read_id(),
        width: u32 = read_u32(),
    }
    OpTypeVector {
        result: Id = read_id(),
        component_type: Id = read_id(),
        component_count: u32 = read_u32(),
    }
    OpTypeMatrix {
        result: Id = read_id(),
        column_type: Id = read_id(),
        column_count: u32 = read_u32(),
    }
    OpTypeArray {
        result: Id = read_id(),
        element_type: Id = read_id(),
        length: Id = read_id(),
    }
    OpTypeRuntimeArray {
        result: Id = read_id(),
        element_type: Id = read_id(),
    }
    OpTypeStruct {
        result: Id = read_id(),
        members: &'a [Id] = read_list(),
    }
    OpTypeOpaque {
        result: Id = read_id(),
        name: &'a str = read_str(),
    }
    OpTypePointer {
        result: Id = read_id(),
        storage_class: StorageClass = read_enum(),
        pointee: Id = read_id(),
    }
    OpTypeForwardPointer {
        pointer_type: Id = read_id(),
        storage_class: StorageClass = read_enum(),
    }
    OpTypeFunction {
        result: Id = read_id(),
        return_type: Id = read_id(),
        params: &'a [Id] = read_list(),
    }
    OpTypeImage {
        result: Id = read_id(),
        rest: &'a [u32] = read_list(),
    }
    OpTypeSampler {
        result: Id = read_id(),
    }
    OpTypeSampledImage {
        result: Id = read_id(),
        image_type: Id = read_id(),
    }
    OpTypeEvent {
        result: Id = read_id(),
    }

    OpUndef {
        result_type: Id = read_id(),
        result: Id = read_id(),
    }
    OpConstantTrue {
        result_type: Id = read_id(),
        result: Id = read_id(),
    }
    OpConstantFalse {
        result_type: Id = read_id(),
        result: Id = read_id(),
    }
    OpConstant {
        result_type: Id = read_id(),
        result: Id = read_id(),
        value: &'a [u32] = read_list(),
    }
    OpConstantComposite {
        result_type: Id = read_id(),
        result: Id = read_id(),
        constituents: &'a [Id] = read_list(),
    }
    OpConstantNull {
        result_type: Id = read_id(),
        result: Id = read_id(),
    }

    OpFunction {
        result_type: Id = read_id(),
        result: Id = read_id(),
        function_control: u32 = read_u32(),
        function_type: Id = read_id(),
    }
    OpFunctionParameter {
        result_type: Id = read_id(),
        result: Id = read_id(),
    }
    OpFunctionCall {
        result_type: Id = read_id(),
        result: Id = read_id(),
        function: Id = read_id(),
        args: &'a [Id] = read_list(),
    }

    OpVariable {
        result_type: Id = read_id(),
        result: Id = read_id(),
        storage_class: StorageClass = read_enum(),
        initializer: Option<Id> = read_opt_id(),
    }
    OpLoad {
        result_type: Id = read_id(),
        result: Id = read_id(),
        pointer: Id = read_id(),
        memory_access: Option<u32> = read_opt_u32(),
    }
    OpStore {
        pointer: Id = read_id(),
        object: Id = read_id(),
        memory_access: Option<u32> = read_opt_u32(),
    }
    OpAccessChain {
        result_type: Id = read_id(),
        result: Id = read_id(),
        base: Id = read_id(),
        indexes: &'a [Id] = read_list(),
    }

    OpVectorShuffle {
        result_type: Id = read_id(),
        result: Id = read_id(),
        vector_1: Id = read_id(),
        vector_2: Id = read_id(),
        components: &'a [u32] = read_list(),
    }
    OpCompositeConstruct {
        result_type: Id = read_id(),
        result: Id = read_id(),
        constituents: &'a [Id] = read_list(),
    }
    OpCompositeExtract {
        result_type: Id = read_id(),
        result: Id = read_id(),
        composite: Id = read_id(),
        indexes: &'a [u32] = read_list(),
    }
    OpCompositeInsert {
        result_type: Id = read_id(),
        result: Id = read_id(),
        object: Id = read_id(),
        composite: Id = read_id(),
        indexes: &'a [u32] = read_list(),
    }
    OpVectorExtractDynamic {
        result_type: Id = read_id(),
        result: Id = read_id(),
        vector: Id = read_id(),
        index: Id = read_id(),
    }
    OpVectorInsertDynamic {
        result_type: Id = read_id(),
        result: Id = read_id(),
        vector: Id = read_id(),
        component: Id = read_id(),
        index: Id = read_id(),
    }

    // Shared shapes for the unary/binary/ternary value instructions
    // (conversions, arithmetic, compares, logic, select).
    OpUnaryCommon {
        result_type: Id = read_id(),
        result: Id = read_id(),
        operand: Id = read_id(),
    }
    OpBinaryCommon {
        result_type: Id = read_id(),
        result: Id = read_id(),
        operand_1: Id = read_id(),
        operand_2: Id = read_id(),
    }
    OpTernaryCommon {
        result_type: Id = read_id(),
        result: Id = read_id(),
        operand_1: Id = read_id(),
        operand_2: Id = read_id(),
        operand_3: Id = read_id(),
    }

    OpPhi {
        result_type: Id = read_id(),
        result: Id = read_id(),
        incoming: &'a [u32] = read_list(),
    }
    OpLoopMerge {
        merge_block: Id = read_id(),
        continue_target: Id = read_id(),
        loop_control: u32 = read_u32(),
        params: &'a [u32] = read_list(),
    }
    OpSelectionMerge {
        merge_block: Id = read_id(),
        selection_control: u32 = read_u32(),
    }
    OpLabel {
        result: Id = read_id(),
    }
    OpBranch {
        target: Id = read_id(),
    }
    OpBranchConditional {
        condition: Id = read_id(),
        true_label: Id = read_id(),
        false_label: Id = read_id(),
        branch_weights: &'a [u32] = read_list(),
    }
    OpSwitch {
        selector: Id = read_id(),
        default: Id = read_id(),
        targets: &'a [u32] = read_list(),
    }
    OpReturnValue {
        value: Id = read_id(),
    }
}

/// Memory-access literal bits (`OpLoad`/`OpStore`).
pub mod memory_access {
    pub const VOLATILE: u32 = 0x1;
    pub const ALIGNED: u32 = 0x2;
    pub const NONTEMPORAL: u32 = 0x4;
}

/// Decodes a GLSL.std.450 extended-instruction number.
pub fn glsl_op(instruction: u32) -> Option<GLOp> {
    GLOp::from_u32(instruction)
}
