//! Native target machine and data-layout queries.
use std::os::raw::c_char;
use std::ptr;

use llvm_sys::prelude::LLVMTypeRef;
use llvm_sys::target::{
    LLVMABIAlignmentOfType, LLVMABISizeOfType, LLVMCopyStringRepOfTargetData,
    LLVMDisposeTargetData, LLVMOffsetOfElement, LLVMTargetDataRef,
};
use llvm_sys::target_machine::*;

use crate::{initialize_native, JitError, LlvmString, Result};

/// An owned target machine configured for the host process.
pub struct TargetMachine {
    raw: LLVMTargetMachineRef,
}
impl TargetMachine {
    /// Process triple + host CPU + host features, JIT code model.
    pub fn create_native() -> Result<TargetMachine> {
        initialize_native()?;
        unsafe {
            let triple = LlvmString::from_raw(LLVMGetDefaultTargetTriple())
                .ok_or_else(|| JitError::new("no default target triple"))?;
            let mut target: LLVMTargetRef = ptr::null_mut();
            let mut message: *mut c_char = ptr::null_mut();
            if LLVMGetTargetFromTriple(triple.as_ptr(), &mut target, &mut message) != 0 {
                let text = LlvmString::from_raw(message)
                    .map(|s| s.to_string_lossy())
                    .unwrap_or_else(|| "unknown target lookup failure".to_owned());
                return Err(JitError::new(text));
            }
            let cpu = LlvmString::from_raw(LLVMGetHostCPUName())
                .ok_or_else(|| JitError::new("no host cpu name"))?;
            let features = LlvmString::from_raw(LLVMGetHostCPUFeatures())
                .ok_or_else(|| JitError::new("no host cpu features"))?;
            let raw = LLVMCreateTargetMachine(
                target,
                triple.as_ptr(),
                cpu.as_ptr(),
                features.as_ptr(),
                LLVMCodeGenOptLevel::LLVMCodeGenLevelDefault,
                LLVMRelocMode::LLVMRelocDefault,
                LLVMCodeModel::LLVMCodeModelJITDefault,
            );
            if raw.is_null() {
                return Err(JitError::new("failed to create native target machine"));
            }
            log::debug!(
                "native target machine: {} / {}",
                triple.to_string_lossy(),
                cpu.to_string_lossy()
            );
            Ok(TargetMachine { raw })
        }
    }
    pub fn raw(&self) -> LLVMTargetMachineRef {
        self.raw
    }
    pub fn triple(&self) -> String {
        unsafe {
            LlvmString::from_raw(LLVMGetTargetMachineTriple(self.raw))
                .map(|s| s.to_string_lossy())
                .unwrap_or_default()
        }
    }
    pub fn create_target_data(&self) -> TargetData {
        TargetData {
            raw: unsafe { LLVMCreateTargetDataLayout(self.raw) },
        }
    }
    /// Releases ownership; used when the JIT builder takes the machine over.
    pub(crate) fn into_raw(self) -> LLVMTargetMachineRef {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}
impl Drop for TargetMachine {
    fn drop(&mut self) {
        unsafe { LLVMDisposeTargetMachine(self.raw) };
    }
}

/// An owned data layout; the source of every ABI size, alignment, and member
/// offset the layout engine reports.
pub struct TargetData {
    raw: LLVMTargetDataRef,
}
impl TargetData {
    pub fn raw(&self) -> LLVMTargetDataRef {
        self.raw
    }
    pub fn abi_size(&self, ty: LLVMTypeRef) -> u64 {
        unsafe { LLVMABISizeOfType(self.raw, ty) }
    }
    pub fn abi_alignment(&self, ty: LLVMTypeRef) -> u32 {
        unsafe { LLVMABIAlignmentOfType(self.raw, ty) }
    }
    pub fn element_offset(&self, struct_ty: LLVMTypeRef, member: u32) -> u64 {
        unsafe { LLVMOffsetOfElement(self.raw, struct_ty, member) }
    }
    pub fn layout_string(&self) -> String {
        unsafe {
            LlvmString::from_raw(LLVMCopyStringRepOfTargetData(self.raw))
                .map(|s| s.to_string_lossy())
                .unwrap_or_default()
        }
    }
}
impl Drop for TargetData {
    fn drop(&mut self) {
        unsafe { LLVMDisposeTargetData(self.raw) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_machine_reports_layout() {
        let tm = TargetMachine::create_native().unwrap();
        assert!(!tm.triple().is_empty());
        let data = tm.create_target_data();
        assert!(!data.layout_string().is_empty());
    }
}
