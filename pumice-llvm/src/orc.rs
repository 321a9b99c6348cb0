//! Eager ORC compile stack.
//!
//! A thin owner of an LLJIT instance: modules go in, symbol addresses come
//! out. Symbols the modules themselves do not define are resolved against
//! the host process through a whitelist of C-runtime and libm helpers the
//! generated code may legitimately reference (libcalls materialized by
//! instruction selection). Anything else resolves to null and surfaces as a
//! link error.
use std::ffi::{CStr, CString};
use std::os::raw::{c_int, c_void};
use std::ptr;

use llvm_sys::error::{LLVMDisposeErrorMessage, LLVMErrorRef, LLVMGetErrorMessage};
use llvm_sys::orc2::lljit::{
    LLVMOrcCreateLLJIT, LLVMOrcCreateLLJITBuilder, LLVMOrcDisposeLLJIT,
    LLVMOrcLLJITAddLLVMIRModule, LLVMOrcLLJITBuilderSetJITTargetMachineBuilder,
    LLVMOrcLLJITGetGlobalPrefix, LLVMOrcLLJITGetMainJITDylib, LLVMOrcLLJITLookup, LLVMOrcLLJITRef,
};
use llvm_sys::orc2::{
    LLVMOrcCreateDynamicLibrarySearchGeneratorForProcess, LLVMOrcCreateNewThreadSafeModule,
    LLVMOrcDefinitionGeneratorRef, LLVMOrcExecutorAddress,
    LLVMOrcJITTargetMachineBuilderCreateFromTargetMachine, LLVMOrcJITDylibAddGenerator,
    LLVMOrcSymbolStringPoolEntryRef, LLVMOrcSymbolStringPoolEntryStr,
};

use crate::{Context, JitError, Module, Result, TargetMachine};

/// Process symbols the generated code is allowed to bind to. Instruction
/// selection may lower vector math and aggregate moves into these libcalls.
const RUNTIME_HELPER_SYMBOLS: &[&str] = &[
    "memcpy",
    "memmove",
    "memset",
    "fmod",
    "fmodf",
    "sin",
    "sinf",
    "cos",
    "cosf",
    "tan",
    "tanf",
    "pow",
    "powf",
    "exp",
    "expf",
    "exp2",
    "exp2f",
    "log",
    "logf",
    "log2",
    "log2f",
    "log10",
    "log10f",
    "round",
    "roundf",
    "roundeven",
    "roundevenf",
    "trunc",
    "truncf",
    "floor",
    "floorf",
    "ceil",
    "ceilf",
    "sqrt",
    "sqrtf",
    "fma",
    "fmaf",
    "fmin",
    "fminf",
    "fmax",
    "fmaxf",
    "__aeabi_unwind_cpp_pr0",
];

extern "C" fn runtime_symbol_filter(
    _ctx: *mut c_void,
    symbol: LLVMOrcSymbolStringPoolEntryRef,
) -> c_int {
    let name = unsafe { CStr::from_ptr(LLVMOrcSymbolStringPoolEntryStr(symbol)) };
    let name = name.to_string_lossy();
    // Mach-O pools symbols with the global prefix applied.
    let bare = name.strip_prefix('_').unwrap_or(&name);
    let allowed = RUNTIME_HELPER_SYMBOLS.contains(&bare);
    if !allowed {
        log::debug!("refusing to resolve process symbol {:?}", name);
    }
    allowed as c_int
}

unsafe fn consume_error(error: LLVMErrorRef) -> Result<()> {
    if error.is_null() {
        return Ok(());
    }
    let message = LLVMGetErrorMessage(error);
    let text = CStr::from_ptr(message).to_string_lossy().into_owned();
    LLVMDisposeErrorMessage(message);
    Err(JitError::new(text))
}

/// An owned eager-compile JIT stack.
pub struct OrcStack {
    jit: LLVMOrcLLJITRef,
}
impl OrcStack {
    /// Builds the stack around `target_machine`, taking ownership of it.
    pub fn create(target_machine: TargetMachine) -> Result<OrcStack> {
        unsafe {
            let machine_builder =
                LLVMOrcJITTargetMachineBuilderCreateFromTargetMachine(target_machine.into_raw());
            let builder = LLVMOrcCreateLLJITBuilder();
            LLVMOrcLLJITBuilderSetJITTargetMachineBuilder(builder, machine_builder);
            let mut jit: LLVMOrcLLJITRef = ptr::null_mut();
            consume_error(LLVMOrcCreateLLJIT(&mut jit, builder))?;

            let mut generator: LLVMOrcDefinitionGeneratorRef = ptr::null_mut();
            consume_error(LLVMOrcCreateDynamicLibrarySearchGeneratorForProcess(
                &mut generator,
                LLVMOrcLLJITGetGlobalPrefix(jit),
                Some(runtime_symbol_filter),
                ptr::null_mut(),
            ))?;
            LLVMOrcJITDylibAddGenerator(LLVMOrcLLJITGetMainJITDylib(jit), generator);
            Ok(OrcStack { jit })
        }
    }

    /// Hands a finished module to the JIT. The module must have been built in
    /// `context`; ownership transfers here, and its code is generated no
    /// later than the first [`symbol_address`](Self::symbol_address) hit.
    pub fn add_eagerly_compiled(&self, module: Module, context: &Context) -> Result<()> {
        unsafe {
            let tsm = LLVMOrcCreateNewThreadSafeModule(module.into_raw(), context.tsc());
            consume_error(LLVMOrcLLJITAddLLVMIRModule(
                self.jit,
                LLVMOrcLLJITGetMainJITDylib(self.jit),
                tsm,
            ))
        }
    }

    /// Resolves a defined symbol to an immediately callable address.
    pub fn symbol_address(&self, name: &str) -> Result<usize> {
        let name = CString::new(name)
            .map_err(|_| JitError::new("symbol name contains an interior nul"))?;
        unsafe {
            let mut address: LLVMOrcExecutorAddress = 0;
            consume_error(LLVMOrcLLJITLookup(self.jit, &mut address, name.as_ptr()))?;
            if address == 0 {
                return Err(JitError::new(format!(
                    "symbol {:?} resolved to null",
                    name
                )));
            }
            Ok(address as usize)
        }
    }
}
impl Drop for OrcStack {
    fn drop(&mut self) {
        unsafe {
            let error = LLVMOrcDisposeLLJIT(self.jit);
            if !error.is_null() {
                let message = LLVMGetErrorMessage(error);
                log::warn!(
                    "disposing JIT stack reported: {}",
                    CStr::from_ptr(message).to_string_lossy()
                );
                LLVMDisposeErrorMessage(message);
            }
        }
    }
}

// The stack owns its ExecutionSession; lookups synchronize internally.
unsafe impl Send for OrcStack {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cstr, Builder, Context};
    use llvm_sys::core::*;

    /// Builds `i32 add_one(i32)` by hand and runs it through the stack.
    #[test]
    fn compiles_and_resolves_a_function() {
        let context = Context::create().unwrap();
        let machine = TargetMachine::create_native().unwrap();
        let module = Module::create("orc_smoke", &context);
        module.set_target(&machine);
        unsafe {
            let i32_ty = LLVMInt32TypeInContext(context.raw());
            let mut params = [i32_ty];
            let fn_ty = LLVMFunctionType(i32_ty, params.as_mut_ptr(), 1, 0);
            let name = cstr("add_one");
            let function = LLVMAddFunction(module.raw(), name.as_ptr(), fn_ty);
            let block = LLVMAppendBasicBlockInContext(context.raw(), function, cstr("entry").as_ptr());
            let builder = Builder::create(&context);
            LLVMPositionBuilderAtEnd(builder.raw(), block);
            let sum = LLVMBuildAdd(
                builder.raw(),
                LLVMGetParam(function, 0),
                LLVMConstInt(i32_ty, 1, 0),
                cstr("sum").as_ptr(),
            );
            LLVMBuildRet(builder.raw(), sum);
        }
        module.verify().unwrap();

        let stack = OrcStack::create(machine).unwrap();
        stack.add_eagerly_compiled(module, &context).unwrap();
        let address = stack.symbol_address("add_one").unwrap();
        let add_one: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(address) };
        assert_eq!(add_one(41), 42);
    }

    #[test]
    fn unknown_symbols_fail_lookup() {
        let context = Context::create().unwrap();
        let machine = TargetMachine::create_native().unwrap();
        let stack = OrcStack::create(machine).unwrap();
        drop(context);
        assert!(stack.symbol_address("no_such_symbol").is_err());
    }
}
