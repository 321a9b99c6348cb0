//! # pumice-llvm: owning handles over the LLVM-C API.
//!
//! Every wrapper in this crate follows scoped acquisition with guaranteed
//! release: a handle owns the underlying LLVM object, disposes of it on drop,
//! moves transfer ownership, and copies are not available. The raw
//! `llvm_sys` pointers are exposed through `raw()` accessors for the code
//! generator in `pumice-shader`, which stays inside the lifetime of the
//! owning handle.
//!
//! The context is an ORC thread-safe context so that finished modules can be
//! handed to the [`OrcStack`] without re-wrapping; the plain `LLVMContextRef`
//! view is what IR construction uses. Concurrent construction of independent
//! contexts on different threads is supported; one-time native-target
//! initialization is serialized internally.
mod error;
mod orc;
mod target;

pub use error::{JitError, Result};
pub use orc::OrcStack;
pub use target::{TargetData, TargetMachine};

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::OnceLock;

use llvm_sys::analysis::{LLVMVerifierFailureAction, LLVMVerifyModule};
use llvm_sys::core::*;
use llvm_sys::orc2::{
    LLVMOrcCreateNewThreadSafeContext, LLVMOrcDisposeThreadSafeContext,
    LLVMOrcThreadSafeContextGetContext, LLVMOrcThreadSafeContextRef,
};
use llvm_sys::prelude::*;

/// Serialized one-time initialization of the native target backend.
pub(crate) fn initialize_native() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| unsafe {
        if llvm_sys::target::LLVM_InitializeNativeTarget() != 0 {
            return Err("native target initialization failed".to_owned());
        }
        if llvm_sys::target::LLVM_InitializeNativeAsmPrinter() != 0 {
            return Err("native asm printer initialization failed".to_owned());
        }
        Ok(())
    })
    .clone()
    .map_err(JitError)
}

/// Builds a nul-terminated copy of `text` for LLVM name parameters. Interior
/// nuls cannot occur in names we synthesize; SPIR-V debug names that carry
/// one degrade to an empty name.
pub fn cstr(text: &str) -> CString {
    CString::new(text).unwrap_or_default()
}

/// An owned `char*` allocated by LLVM.
pub struct LlvmString {
    ptr: *mut c_char,
}
impl LlvmString {
    /// Takes ownership of `ptr`; returns `None` for null.
    ///
    /// # Safety
    /// `ptr` must have been allocated by LLVM (disposable with
    /// `LLVMDisposeMessage`) and not be owned elsewhere.
    pub unsafe fn from_raw(ptr: *mut c_char) -> Option<LlvmString> {
        if ptr.is_null() {
            None
        } else {
            Some(LlvmString { ptr })
        }
    }
    pub fn as_ptr(&self) -> *const c_char {
        self.ptr
    }
    pub fn to_string_lossy(&self) -> String {
        unsafe { CStr::from_ptr(self.ptr) }
            .to_string_lossy()
            .into_owned()
    }
}
impl Drop for LlvmString {
    fn drop(&mut self) {
        unsafe { LLVMDisposeMessage(self.ptr) };
    }
}
impl std::fmt::Display for LlvmString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// An owned LLVM context, wrapped in an ORC thread-safe context so modules
/// built in it can be handed to the JIT.
pub struct Context {
    tsc: LLVMOrcThreadSafeContextRef,
    raw: LLVMContextRef,
}
impl Context {
    pub fn create() -> Result<Context> {
        unsafe {
            if LLVMIsMultithreaded() == 0 {
                return Err(JitError::new("LLVM is not multithreaded"));
            }
            initialize_native()?;
            let tsc = LLVMOrcCreateNewThreadSafeContext();
            if tsc.is_null() {
                return Err(JitError::new("failed to create LLVM context"));
            }
            let raw = LLVMOrcThreadSafeContextGetContext(tsc);
            Ok(Context { tsc, raw })
        }
    }
    pub fn raw(&self) -> LLVMContextRef {
        self.raw
    }
    pub(crate) fn tsc(&self) -> LLVMOrcThreadSafeContextRef {
        self.tsc
    }
}
impl Drop for Context {
    fn drop(&mut self) {
        unsafe { LLVMOrcDisposeThreadSafeContext(self.tsc) };
    }
}

/// An owned module. Ownership moves into the JIT through
/// [`OrcStack::add_eagerly_compiled`].
pub struct Module {
    raw: LLVMModuleRef,
}
impl Module {
    pub fn create(name: &str, context: &Context) -> Module {
        let name = cstr(name);
        let raw = unsafe { LLVMModuleCreateWithNameInContext(name.as_ptr(), context.raw()) };
        Module { raw }
    }
    pub fn raw(&self) -> LLVMModuleRef {
        self.raw
    }
    /// Stamps the module with the machine's triple and data layout.
    pub fn set_target(&self, target_machine: &TargetMachine) {
        unsafe {
            let triple = target_machine.triple();
            let triple = cstr(&triple);
            LLVMSetTarget(self.raw, triple.as_ptr());
            let data = target_machine.create_target_data();
            llvm_sys::target::LLVMSetModuleDataLayout(self.raw, data.raw());
        }
    }
    /// Runs the IR verifier; the verifier text is the error payload.
    pub fn verify(&self) -> Result<(), String> {
        unsafe {
            let mut message: *mut c_char = std::ptr::null_mut();
            let broken = LLVMVerifyModule(
                self.raw,
                LLVMVerifierFailureAction::LLVMReturnStatusAction,
                &mut message,
            );
            let text = LlvmString::from_raw(message).map(|s| s.to_string_lossy());
            if broken != 0 {
                Err(text.unwrap_or_else(|| "module verification failed".to_owned()))
            } else {
                Ok(())
            }
        }
    }
    /// Textual IR; used by determinism tests and trace logging.
    pub fn print_to_string(&self) -> String {
        unsafe {
            LlvmString::from_raw(LLVMPrintModuleToString(self.raw))
                .map(|s| s.to_string_lossy())
                .unwrap_or_default()
        }
    }
    /// Releases ownership of the underlying module.
    pub fn into_raw(self) -> LLVMModuleRef {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}
impl Drop for Module {
    fn drop(&mut self) {
        unsafe { LLVMDisposeModule(self.raw) };
    }
}

/// An owned instruction builder.
pub struct Builder {
    raw: LLVMBuilderRef,
}
impl Builder {
    pub fn create(context: &Context) -> Builder {
        Builder {
            raw: unsafe { LLVMCreateBuilderInContext(context.raw()) },
        }
    }
    pub fn raw(&self) -> LLVMBuilderRef {
        self.raw
    }
}
impl Drop for Builder {
    fn drop(&mut self) {
        unsafe { LLVMDisposeBuilder(self.raw) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_module_builder_lifecycle() {
        let context = Context::create().unwrap();
        let module = Module::create("lifecycle", &context);
        let _builder = Builder::create(&context);
        module.verify().unwrap();
        assert!(module.print_to_string().contains("lifecycle"));
    }

    #[test]
    fn independent_contexts_coexist() {
        let a = Context::create().unwrap();
        let b = Context::create().unwrap();
        assert_ne!(a.raw(), b.raw());
    }
}
