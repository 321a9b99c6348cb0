//! GLSL.std.450 extended instructions.
//!
//! The implemented subset maps to LLVM intrinsics or short inline sequences;
//! everything else refuses with the extended opcode's name. OpenCL.std is
//! recognized as an import but none of its instructions are implemented.
use llvm_sys::core::*;
use llvm_sys::prelude::*;
use llvm_sys::LLVMRealPredicate;
use pumice_llvm::cstr;
use pumice_spirv::{ops, Instr};
use spirv::GLOp;

use crate::error::{Error, Result};
use crate::ty::{TypeKind, TypeRef};

use super::{ExtInstSet, Stage, Translator, Value};

fn arg(args: &[Value], index: usize, at: usize) -> Result<Value> {
    args.get(index)
        .cloned()
        .ok_or_else(|| Error::parser(at, "extended instruction is missing an operand"))
}

impl<'a> Translator<'a> {
    pub(super) fn op_ext_inst(&mut self, instr: &Instr, at: usize) -> Result<()> {
        let op = ops::OpExtInst::decode(instr, at)?;
        if self.stage() == Stage::CalculateTypes {
            return Ok(());
        }
        let set = self
            .checked_state_ref(op.set, at)?
            .ext_inst_import
            .ok_or_else(|| Error::parser(at, "OpExtInst set is not an imported instruction set"))?;
        match set {
            ExtInstSet::OpenClStd => Err(Error::translation(format!(
                "instruction not implemented: OpenCL.std {}",
                op.instruction
            ))),
            ExtInstSet::GlslStd450 => self.glsl_inst(&op, at),
        }
    }

    fn glsl_inst(&mut self, op: &ops::OpExtInst, at: usize) -> Result<()> {
        let glsl = ops::glsl_op(op.instruction).ok_or_else(|| {
            Error::parser(
                at,
                format!("unknown GLSL.std.450 instruction {}", op.instruction),
            )
        })?;
        self.forbid_decorations(op.result, at)?;
        let result_ty = self.ty_of(op.result_type, at)?;
        let mut args = Vec::with_capacity(op.operands.len());
        for &id in op.operands {
            args.push(self.value_of(id, at)?);
        }
        let name = self.name_of(op.result);

        let raw = match glsl {
            GLOp::Round => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("round", &x.ty, &[x.raw], &name)?
            }
            GLOp::RoundEven => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("roundeven", &x.ty, &[x.raw], &name)?
            }
            GLOp::Trunc => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("trunc", &x.ty, &[x.raw], &name)?
            }
            GLOp::FAbs => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("fabs", &x.ty, &[x.raw], &name)?
            }
            GLOp::SAbs => {
                let x = arg(&args, 0, at)?;
                self.abs_intrinsic(&x, &name)?
            }
            GLOp::FSign => {
                let x = arg(&args, 0, at)?;
                self.fsign(&x, &name, at)?
            }
            GLOp::SSign => {
                let x = arg(&args, 0, at)?;
                self.ssign(&x, &name, at)?
            }
            GLOp::Floor => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("floor", &x.ty, &[x.raw], &name)?
            }
            GLOp::Ceil => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("ceil", &x.ty, &[x.raw], &name)?
            }
            GLOp::Fract => {
                let x = arg(&args, 0, at)?;
                let floored = self.intrinsic_call("floor", &x.ty, &[x.raw], "")?;
                unsafe {
                    LLVMBuildFSub(self.builder_raw(), x.raw, floored, cstr(&name).as_ptr())
                }
            }
            GLOp::Radians => {
                let x = arg(&args, 0, at)?;
                let factor = self.float_splat_const(&x.ty, std::f64::consts::PI / 180.0, at)?;
                unsafe { LLVMBuildFMul(self.builder_raw(), x.raw, factor, cstr(&name).as_ptr()) }
            }
            GLOp::Degrees => {
                let x = arg(&args, 0, at)?;
                let factor = self.float_splat_const(&x.ty, 180.0 / std::f64::consts::PI, at)?;
                unsafe { LLVMBuildFMul(self.builder_raw(), x.raw, factor, cstr(&name).as_ptr()) }
            }
            GLOp::Sqrt => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("sqrt", &x.ty, &[x.raw], &name)?
            }
            GLOp::InverseSqrt => {
                let x = arg(&args, 0, at)?;
                let root = self.intrinsic_call("sqrt", &x.ty, &[x.raw], "")?;
                let one = self.float_splat_const(&x.ty, 1.0, at)?;
                unsafe { LLVMBuildFDiv(self.builder_raw(), one, root, cstr(&name).as_ptr()) }
            }
            GLOp::FMin | GLOp::NMin => self.binary_intrinsic("minnum", &args, &name, at)?,
            GLOp::FMax | GLOp::NMax => self.binary_intrinsic("maxnum", &args, &name, at)?,
            GLOp::UMin => self.binary_intrinsic("umin", &args, &name, at)?,
            GLOp::UMax => self.binary_intrinsic("umax", &args, &name, at)?,
            GLOp::SMin => self.binary_intrinsic("smin", &args, &name, at)?,
            GLOp::SMax => self.binary_intrinsic("smax", &args, &name, at)?,
            GLOp::FClamp | GLOp::NClamp => self.clamp("maxnum", "minnum", &args, &name, at)?,
            GLOp::UClamp => self.clamp("umax", "umin", &args, &name, at)?,
            GLOp::SClamp => self.clamp("smax", "smin", &args, &name, at)?,
            GLOp::FMix => {
                let x = arg(&args, 0, at)?;
                let y = arg(&args, 1, at)?;
                let a = arg(&args, 2, at)?;
                let one = self.float_splat_const(&x.ty, 1.0, at)?;
                unsafe {
                    let builder = self.builder_raw();
                    let inverse = LLVMBuildFSub(builder, one, a.raw, cstr("").as_ptr());
                    let from = LLVMBuildFMul(builder, x.raw, inverse, cstr("").as_ptr());
                    let to = LLVMBuildFMul(builder, y.raw, a.raw, cstr("").as_ptr());
                    LLVMBuildFAdd(builder, from, to, cstr(&name).as_ptr())
                }
            }
            GLOp::Step => {
                let edge = arg(&args, 0, at)?;
                let x = arg(&args, 1, at)?;
                let zero = self.float_splat_const(&x.ty, 0.0, at)?;
                let one = self.float_splat_const(&x.ty, 1.0, at)?;
                unsafe {
                    let below = LLVMBuildFCmp(
                        self.builder_raw(),
                        LLVMRealPredicate::LLVMRealOLT,
                        x.raw,
                        edge.raw,
                        cstr("").as_ptr(),
                    );
                    LLVMBuildSelect(self.builder_raw(), below, zero, one, cstr(&name).as_ptr())
                }
            }
            GLOp::SmoothStep => {
                let edge0 = arg(&args, 0, at)?;
                let edge1 = arg(&args, 1, at)?;
                let x = arg(&args, 2, at)?;
                let zero = self.float_splat_const(&x.ty, 0.0, at)?;
                let one = self.float_splat_const(&x.ty, 1.0, at)?;
                let three = self.float_splat_const(&x.ty, 3.0, at)?;
                let two = self.float_splat_const(&x.ty, 2.0, at)?;
                let t = unsafe {
                    let builder = self.builder_raw();
                    let offset = LLVMBuildFSub(builder, x.raw, edge0.raw, cstr("").as_ptr());
                    let span = LLVMBuildFSub(builder, edge1.raw, edge0.raw, cstr("").as_ptr());
                    LLVMBuildFDiv(builder, offset, span, cstr("").as_ptr())
                };
                let t = {
                    let low = self.intrinsic_call("maxnum", &x.ty, &[t, zero], "")?;
                    self.intrinsic_call("minnum", &x.ty, &[low, one], "")?
                };
                unsafe {
                    let builder = self.builder_raw();
                    let scaled = LLVMBuildFMul(builder, two, t, cstr("").as_ptr());
                    let inner = LLVMBuildFSub(builder, three, scaled, cstr("").as_ptr());
                    let square = LLVMBuildFMul(builder, t, t, cstr("").as_ptr());
                    LLVMBuildFMul(builder, square, inner, cstr(&name).as_ptr())
                }
            }
            GLOp::Fma => {
                let a = arg(&args, 0, at)?;
                let b = arg(&args, 1, at)?;
                let c = arg(&args, 2, at)?;
                self.intrinsic_call("fma", &a.ty, &[a.raw, b.raw, c.raw], &name)?
            }
            GLOp::Pow => self.binary_intrinsic("pow", &args, &name, at)?,
            GLOp::Exp => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("exp", &x.ty, &[x.raw], &name)?
            }
            GLOp::Log => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("log", &x.ty, &[x.raw], &name)?
            }
            GLOp::Exp2 => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("exp2", &x.ty, &[x.raw], &name)?
            }
            GLOp::Log2 => {
                let x = arg(&args, 0, at)?;
                self.intrinsic_call("log2", &x.ty, &[x.raw], &name)?
            }
            GLOp::Length => {
                let x = arg(&args, 0, at)?;
                self.length(&x, &name)?
            }
            GLOp::Distance => {
                let p0 = arg(&args, 0, at)?;
                let p1 = arg(&args, 1, at)?;
                let difference = unsafe {
                    LLVMBuildFSub(self.builder_raw(), p0.raw, p1.raw, cstr("").as_ptr())
                };
                let difference = Value {
                    raw: difference,
                    ty: p0.ty.clone(),
                };
                self.length(&difference, &name)?
            }
            GLOp::Cross => {
                let a = arg(&args, 0, at)?;
                let b = arg(&args, 1, at)?;
                self.cross(&a, &b, &name, at)?
            }
            GLOp::Normalize => {
                let x = arg(&args, 0, at)?;
                let magnitude = self.length(&x, "")?;
                let divisor = match x.ty.as_vector() {
                    Some(_) => self.splat(magnitude, &x.ty)?,
                    None => magnitude,
                };
                unsafe {
                    LLVMBuildFDiv(self.builder_raw(), x.raw, divisor, cstr(&name).as_ptr())
                }
            }
            GLOp::FaceForward => {
                let n = arg(&args, 0, at)?;
                let i = arg(&args, 1, at)?;
                let nref = arg(&args, 2, at)?;
                let alignment = self.fdot(&nref, &i)?;
                let scalar_ty = scalar_of(&nref.ty);
                let zero = self.float_splat_const(&scalar_ty, 0.0, at)?;
                unsafe {
                    let builder = self.builder_raw();
                    let facing = LLVMBuildFCmp(
                        builder,
                        LLVMRealPredicate::LLVMRealOLT,
                        alignment,
                        zero,
                        cstr("").as_ptr(),
                    );
                    let negated = LLVMBuildFNeg(builder, n.raw, cstr("").as_ptr());
                    LLVMBuildSelect(builder, facing, n.raw, negated, cstr(&name).as_ptr())
                }
            }
            GLOp::Reflect => {
                let i = arg(&args, 0, at)?;
                let n = arg(&args, 1, at)?;
                let alignment = self.fdot(&n, &i)?;
                let scalar_ty = scalar_of(&n.ty);
                let two = self.float_splat_const(&scalar_ty, 2.0, at)?;
                unsafe {
                    let builder = self.builder_raw();
                    let doubled = LLVMBuildFMul(builder, two, alignment, cstr("").as_ptr());
                    let doubled = match n.ty.as_vector() {
                        Some(_) => self.splat(doubled, &n.ty)?,
                        None => doubled,
                    };
                    let scaled = LLVMBuildFMul(builder, doubled, n.raw, cstr("").as_ptr());
                    LLVMBuildFSub(builder, i.raw, scaled, cstr(&name).as_ptr())
                }
            }
            other => {
                return Err(Error::translation(format!(
                    "instruction not implemented: GLSL.std.450 {:?}",
                    other
                )))
            }
        };
        self.set_value(op.result, at, Value { raw, ty: result_ty })
    }

    fn binary_intrinsic(
        &mut self,
        base: &str,
        args: &[Value],
        name: &str,
        at: usize,
    ) -> Result<LLVMValueRef> {
        let a = arg(args, 0, at)?;
        let b = arg(args, 1, at)?;
        self.intrinsic_call(base, &a.ty, &[a.raw, b.raw], name)
    }

    fn clamp(
        &mut self,
        lower_base: &str,
        upper_base: &str,
        args: &[Value],
        name: &str,
        at: usize,
    ) -> Result<LLVMValueRef> {
        let x = arg(args, 0, at)?;
        let low = arg(args, 1, at)?;
        let high = arg(args, 2, at)?;
        let raised = self.intrinsic_call(lower_base, &x.ty, &[x.raw, low.raw], "")?;
        self.intrinsic_call(upper_base, &x.ty, &[raised, high.raw], name)
    }

    /// `llvm.abs` carries a trailing `i1` that poisons INT_MIN when set; the
    /// GLSL semantics keep it defined, so it stays false.
    fn abs_intrinsic(&mut self, x: &Value, name: &str) -> Result<LLVMValueRef> {
        let native = x.ty.materialize(self.tcx())?;
        let suffix = super::code::intrinsic_suffix(&x.ty)?;
        let full_name = format!("llvm.abs.{}", suffix);
        let i1_ty = unsafe { LLVMInt1TypeInContext(self.context_raw()) };
        let mut param_tys = [native.ty, i1_ty];
        let fn_ty =
            unsafe { LLVMFunctionType(native.ty, param_tys.as_mut_ptr(), 2, 0) };
        let function = self.get_or_declare_function(&full_name, fn_ty);
        let mut call_args = [x.raw, unsafe { LLVMConstInt(i1_ty, 0, 0) }];
        let cname = cstr(name);
        Ok(unsafe {
            LLVMBuildCall2(
                self.builder_raw(),
                fn_ty,
                function,
                call_args.as_mut_ptr(),
                call_args.len() as u32,
                cname.as_ptr(),
            )
        })
    }

    fn fsign(&mut self, x: &Value, name: &str, at: usize) -> Result<LLVMValueRef> {
        let zero = self.float_splat_const(&x.ty, 0.0, at)?;
        let one = self.float_splat_const(&x.ty, 1.0, at)?;
        let minus_one = self.float_splat_const(&x.ty, -1.0, at)?;
        unsafe {
            let builder = self.builder_raw();
            let positive = LLVMBuildFCmp(
                builder,
                LLVMRealPredicate::LLVMRealOGT,
                x.raw,
                zero,
                cstr("").as_ptr(),
            );
            let negative = LLVMBuildFCmp(
                builder,
                LLVMRealPredicate::LLVMRealOLT,
                x.raw,
                zero,
                cstr("").as_ptr(),
            );
            let negative_or_zero =
                LLVMBuildSelect(builder, negative, minus_one, zero, cstr("").as_ptr());
            Ok(LLVMBuildSelect(
                builder,
                positive,
                one,
                negative_or_zero,
                cstr(name).as_ptr(),
            ))
        }
    }

    fn ssign(&mut self, x: &Value, name: &str, at: usize) -> Result<LLVMValueRef> {
        let zero = self.int_splat_const(&x.ty, 0, at)?;
        let one = self.int_splat_const(&x.ty, 1, at)?;
        let minus_one = self.int_splat_const(&x.ty, u64::MAX, at)?;
        unsafe {
            let builder = self.builder_raw();
            let positive = LLVMBuildICmp(
                builder,
                llvm_sys::LLVMIntPredicate::LLVMIntSGT,
                x.raw,
                zero,
                cstr("").as_ptr(),
            );
            let negative = LLVMBuildICmp(
                builder,
                llvm_sys::LLVMIntPredicate::LLVMIntSLT,
                x.raw,
                zero,
                cstr("").as_ptr(),
            );
            let negative_or_zero =
                LLVMBuildSelect(builder, negative, minus_one, zero, cstr("").as_ptr());
            Ok(LLVMBuildSelect(
                builder,
                positive,
                one,
                negative_or_zero,
                cstr(name).as_ptr(),
            ))
        }
    }

    /// Scalar float dot product of two vectors (or product of two scalars).
    fn fdot(&mut self, a: &Value, b: &Value) -> Result<LLVMValueRef> {
        let product =
            unsafe { LLVMBuildFMul(self.builder_raw(), a.raw, b.raw, cstr("").as_ptr()) };
        match a.ty.as_vector() {
            Some((_, lanes)) => Ok(self.horizontal_fadd(product, lanes)),
            None => Ok(product),
        }
    }

    fn length(&mut self, x: &Value, name: &str) -> Result<LLVMValueRef> {
        match x.ty.as_vector() {
            Some((element, _)) => {
                let squared = self.fdot(x, x)?;
                let element = element.clone();
                self.intrinsic_call("sqrt", &element, &[squared], name)
            }
            None => self.intrinsic_call("fabs", &x.ty, &[x.raw], name),
        }
    }

    fn cross(&mut self, a: &Value, b: &Value, name: &str, at: usize) -> Result<LLVMValueRef> {
        if a.ty.as_vector().map(|(_, lanes)| lanes) != Some(3) {
            return Err(Error::parser(at, "Cross operands must be 3-component vectors"));
        }
        let native = a.ty.materialize(self.tcx())?;
        let i32_ty = unsafe { LLVMInt32TypeInContext(self.context_raw()) };
        let builder = self.builder_raw();
        let lane = |vector: LLVMValueRef, index: u32| unsafe {
            LLVMBuildExtractElement(
                builder,
                vector,
                LLVMConstInt(i32_ty, index as u64, 0),
                cstr("").as_ptr(),
            )
        };
        let component = |x1, y1, x2, y2| unsafe {
            let left = LLVMBuildFMul(builder, x1, y1, cstr("").as_ptr());
            let right = LLVMBuildFMul(builder, x2, y2, cstr("").as_ptr());
            LLVMBuildFSub(builder, left, right, cstr("").as_ptr())
        };
        let (a0, a1, a2) = (lane(a.raw, 0), lane(a.raw, 1), lane(a.raw, 2));
        let (b0, b1, b2) = (lane(b.raw, 0), lane(b.raw, 1), lane(b.raw, 2));
        let r0 = component(a1, b2, a2, b1);
        let r1 = component(a2, b0, a0, b2);
        let r2 = component(a0, b1, a1, b0);
        let mut result = unsafe { LLVMGetUndef(native.ty) };
        for (index, value) in [r0, r1, r2].into_iter().enumerate() {
            let lane_name = if index == 2 { cstr(name) } else { cstr("") };
            result = unsafe {
                LLVMBuildInsertElement(
                    builder,
                    result,
                    value,
                    LLVMConstInt(i32_ty, index as u64, 0),
                    lane_name.as_ptr(),
                )
            };
        }
        Ok(result)
    }
}

fn scalar_of(ty: &TypeRef) -> TypeRef {
    match ty.kind() {
        TypeKind::Vector { element, .. } => element.clone(),
        _ => ty.clone(),
    }
}
