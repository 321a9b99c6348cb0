//! Constant descriptors.
use std::rc::Rc;

use llvm_sys::core::*;
use llvm_sys::prelude::*;

use crate::error::{Error, Result};
use crate::ty::{TypeContext, TypeKind, TypeRef};

/// A materialized constant and the descriptor of its type.
pub struct ConstantDescriptor {
    pub ty: TypeRef,
    value: LLVMValueRef,
}
impl ConstantDescriptor {
    pub fn new(ty: TypeRef, value: LLVMValueRef) -> Rc<Self> {
        Rc::new(ConstantDescriptor { ty, value })
    }
    pub fn value(&self) -> LLVMValueRef {
        self.value
    }
}

/// Decodes an `OpConstant` immediate payload against its already-known
/// result type. Payload words are little-endian; 64-bit values span two
/// words, low word first.
pub fn scalar_from_words(
    ty: &TypeRef,
    tcx: TypeContext,
    words: &[u32],
    at: usize,
) -> Result<LLVMValueRef> {
    let native = ty.materialize(tcx)?;
    let expect_words = |n: usize, what: &str| -> Result<()> {
        if words.len() != n {
            Err(Error::parser(
                at,
                format!("OpConstant immediate value is wrong size for type {}", what),
            ))
        } else {
            Ok(())
        }
    };
    unsafe {
        match ty.kind() {
            TypeKind::Int { width: 64, .. } => {
                expect_words(2, "int64")?;
                let bits = ((words[1] as u64) << 32) | words[0] as u64;
                Ok(LLVMConstInt(native.ty, bits, 0))
            }
            TypeKind::Int { .. } => {
                expect_words(1, "int")?;
                Ok(LLVMConstInt(native.ty, words[0] as u64, 0))
            }
            TypeKind::Float { width: 16 } => {
                expect_words(1, "float16")?;
                let value = half::f16::from_bits(words[0] as u16);
                Ok(LLVMConstReal(native.ty, value.to_f64()))
            }
            TypeKind::Float { width: 32 } => {
                expect_words(1, "float32")?;
                Ok(LLVMConstReal(native.ty, f32::from_bits(words[0]) as f64))
            }
            TypeKind::Float { width: 64 } => {
                expect_words(2, "float64")?;
                let bits = ((words[1] as u64) << 32) | words[0] as u64;
                Ok(LLVMConstReal(native.ty, f64::from_bits(bits)))
            }
            _ => Err(Error::parser(at, "unimplemented type for OpConstant")),
        }
    }
}
