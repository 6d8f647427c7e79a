//! The operation catalog.
//!
//! Every recorded operation is an [`OpCode`] plus a run of [`Arg`]s in the
//! tape's flat argument array. [`evaluate`] gives the order-zero value of an
//! elementary opcode; the Taylor and adjoint rules live in
//! [`taylor_ops`](crate::taylor_ops).

use crate::base::Base;

/// Result slot of an operation that produces no result (stores, compares).
pub const NO_RESULT: u32 = u32::MAX;

/// Operation codes of the recorded operation sequence.
///
/// Several unary opcodes keep auxiliary results in the slots directly after
/// their primary result; the Taylor recurrences need them. The layouts are:
///
/// | opcode | results |
/// |---|---|
/// | `Sin` / `Cos` | `sin x`, `cos x` / `cos x`, `sin x` |
/// | `Sinh` / `Cosh` | `sinh x`, `cosh x` / `cosh x`, `sinh x` |
/// | `Tan` / `Tanh` | `z`, `z * z` |
/// | `Asin` / `Acos` | `z`, `sqrt(1 - x * x)` |
/// | `Atan` | `z`, `1 + x * x` |
/// | `Pow` | `x^y`, `ln x`, `y ln x` |
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpCode {
    // ── Leaves ──
    /// Independent variable. Args: `[Imm(j)]`.
    Independent,
    /// Dynamic parameter. Args: `[Imm(j)]`.
    Dynamic,

    // ── Binary arithmetic ──
    Add,
    Sub,
    Mul,
    Div,
    /// Absolute-zero multiply.
    Azmul,
    Pow,

    // ── Unary ──
    Neg,
    Abs,
    /// Zero derivative.
    Sign,
    Sqrt,
    Exp,
    ExpM1,
    Ln,
    Ln1p,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,

    // ── Control ──
    /// Args: `[Imm(cmp), left, right, if_true, if_false]`.
    CondExp,
    /// Args: `[Imm(cmp), Imm(outcome), left, right]`. No result.
    Compare,
    /// Args: `[Imm(sign), term]` pairs; sign 0 adds, 1 subtracts.
    CumSum,

    // ── Indexed arrays ──
    /// Args: `[Imm(arena), index]`.
    Load,
    /// Args: `[Imm(arena), index, value]`. No result.
    Store,

    // ── User functions ──
    /// Piecewise-constant user function. Args: `[Imm(function), x]`.
    Discrete,
    /// Atomic function call. Args: `[Imm(function), x...]`.
    Call,
}

/// Operand reference of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Arg {
    /// Result slot of an earlier operation.
    Slot(u32),
    /// Index into the constant pool.
    Const(u32),
    /// Immediate integer field (comparison code, arena id, function index).
    Imm(u32),
}

impl Arg {
    #[inline]
    pub fn slot(self) -> Option<u32> {
        match self {
            Arg::Slot(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn imm(self) -> u32 {
        match self {
            Arg::Imm(v) => v,
            other => unreachable!("expected an immediate argument, found {other:?}"),
        }
    }
}

/// How an opcode's second derivatives couple its operands, used by Hessian
/// sparsity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OpClass {
    /// Zero second derivative (affine or piecewise affine).
    Linear,
    /// Zero first derivative.
    ZeroDerivative,
    /// `f(x)` nonlinear in its single operand.
    UnaryNonlinear,
    /// Cross terms between the two operands only (`x * y`).
    Bilinear,
    /// Cross terms plus a nonlinear denominator (`x / y`).
    Quotient,
    /// Everything couples with everything.
    Dense,
}

impl OpCode {
    /// Number of arguments, or `None` when variable-length.
    pub fn arity(self) -> Option<usize> {
        use OpCode::*;
        match self {
            Independent | Dynamic => Some(1),
            Add | Sub | Mul | Div | Azmul | Pow => Some(2),
            Neg | Abs | Sign | Sqrt | Exp | ExpM1 | Ln | Ln1p | Sin | Cos | Tan | Asin | Acos
            | Atan | Sinh | Cosh | Tanh => Some(1),
            CondExp => Some(5),
            Compare => Some(4),
            Load => Some(2),
            Store => Some(3),
            Discrete => Some(2),
            CumSum | Call => None,
        }
    }

    /// Number of result slots, or `None` for [`OpCode::Call`] whose count
    /// comes from the callee.
    pub fn result_count(self) -> Option<u32> {
        use OpCode::*;
        match self {
            Compare | Store => Some(0),
            Sin | Cos | Sinh | Cosh | Tan | Tanh | Asin | Acos | Atan => Some(2),
            Pow => Some(3),
            Call => None,
            _ => Some(1),
        }
    }

    #[inline]
    pub fn is_unary(self) -> bool {
        use OpCode::*;
        matches!(
            self,
            Neg | Abs
                | Sign
                | Sqrt
                | Exp
                | ExpM1
                | Ln
                | Ln1p
                | Sin
                | Cos
                | Tan
                | Asin
                | Acos
                | Atan
                | Sinh
                | Cosh
                | Tanh
        )
    }

    #[inline]
    pub fn is_binary(self) -> bool {
        use OpCode::*;
        matches!(self, Add | Sub | Mul | Div | Azmul | Pow)
    }

    #[inline]
    pub fn is_commutative(self) -> bool {
        matches!(self, OpCode::Add | OpCode::Mul)
    }

    /// True if two records with equal opcode and arguments always produce
    /// equal results, so the later one can be merged into the earlier.
    pub(crate) fn is_pure(self) -> bool {
        use OpCode::*;
        !matches!(
            self,
            Independent | Dynamic | Compare | Load | Store | Call
        )
    }

    pub(crate) fn class(self) -> OpClass {
        use OpCode::*;
        match self {
            Add | Sub | Neg | Abs | CumSum | CondExp | Load | Store => OpClass::Linear,
            Sign | Discrete | Compare | Independent | Dynamic => OpClass::ZeroDerivative,
            Mul | Azmul => OpClass::Bilinear,
            Div => OpClass::Quotient,
            Pow | Call => OpClass::Dense,
            Sqrt | Exp | ExpM1 | Ln | Ln1p | Sin | Cos | Tan | Asin | Acos | Atan | Sinh | Cosh
            | Tanh => OpClass::UnaryNonlinear,
        }
    }
}

/// Order-zero value of an elementary opcode. `b` is ignored for unary ops.
///
/// Only the primary result is returned; auxiliary results are produced by
/// the forward sweep.
#[inline]
pub fn evaluate<B: Base>(op: OpCode, a: B, b: B) -> B {
    use OpCode::*;
    match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => a / b,
        Azmul => a.azmul(b),
        Pow => a.powf(b),
        Neg => -a,
        Abs => a.abs(),
        Sign => a.signum(),
        Sqrt => a.sqrt(),
        Exp => a.exp(),
        ExpM1 => a.exp_m1(),
        Ln => a.ln(),
        Ln1p => a.ln_1p(),
        Sin => a.sin(),
        Cos => a.cos(),
        Tan => a.tan(),
        Asin => a.asin(),
        Acos => a.acos(),
        Atan => a.atan(),
        Sinh => a.sinh(),
        Cosh => a.cosh(),
        Tanh => a.tanh(),
        Independent | Dynamic | CondExp | Compare | CumSum | Load | Store | Discrete | Call => {
            unreachable!("{op:?} is not an elementary opcode")
        }
    }
}
