//! Tracked values.
//!
//! [`Tracked<B>`] pairs a base value with an optional binding to a slot of a
//! recording tape. Arithmetic between unbound values is plain `B` arithmetic;
//! as soon as an operand is bound to the tape recording on this thread, the
//! operation is appended to that tape and the result is bound to its new slot.

use std::fmt::{self, Display};

use crate::base::{Base, CompareOp};
use crate::error::{AdError, Result};
use crate::opcode::{self, Arg, OpCode};
use crate::tape::thread_local;
use crate::tape::{Recorder, TapeId};

/// How a [`Tracked`] value relates to a tape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    /// Constant parameter. Never differentiated.
    Unbound,
    /// Depends on the independent variables of `tape`.
    Variable { tape: TapeId, slot: u32 },
    /// Depends only on the dynamic parameters of `tape`.
    Dynamic { tape: TapeId, slot: u32 },
}

impl Binding {
    #[inline]
    pub fn tape(&self) -> Option<TapeId> {
        match *self {
            Binding::Unbound => None,
            Binding::Variable { tape, .. } | Binding::Dynamic { tape, .. } => Some(tape),
        }
    }
}

/// A base value that records the operations applied to it.
///
/// Operators panic on usage errors (a value from another live tape); use the
/// `try_*` methods to get a [`Result`] instead.
#[derive(Clone, Copy)]
pub struct Tracked<B: Base> {
    pub(crate) value: B,
    pub(crate) binding: Binding,
}

/// An operand resolved against the active tape.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Operand<B> {
    Constant(B),
    Slot { slot: u32, variable: bool },
}

/// Where a recorded operation put its results.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Emitted {
    pub(crate) tape: TapeId,
    pub(crate) slot: u32,
    pub(crate) variable: bool,
}

impl Emitted {
    #[inline]
    pub(crate) fn binding(&self, offset: u32) -> Binding {
        let slot = self.slot + offset;
        if self.variable {
            Binding::Variable { tape: self.tape, slot }
        } else {
            Binding::Dynamic { tape: self.tape, slot }
        }
    }
}

#[inline]
pub(crate) fn or_panic<T>(result: Result<T>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("{e}"),
    }
}

/// Append `op` over `operands` to the active tape unless every operand
/// resolves to a constant.
///
/// `head` supplies the leading immediate arguments; returning `None` from it
/// skips the recording.
pub(crate) fn emit<B: Base>(
    op: OpCode,
    operands: &[Tracked<B>],
    result_count: u32,
    head: impl FnOnce(&mut Recorder<B>) -> Option<Vec<Arg>>,
) -> Result<Option<Emitted>> {
    if operands.iter().all(|t| t.binding == Binding::Unbound) {
        return Ok(None);
    }
    let Some(shared) = thread_local::active::<B>() else {
        for t in operands {
            t.resolve(None)?;
        }
        return Ok(None);
    };
    let mut rec = shared.borrow_mut();
    let tape = rec.id;
    let resolved = operands
        .iter()
        .map(|t| t.resolve(Some(tape)))
        .collect::<Result<Vec<_>>>()?;
    if resolved.iter().all(|o| matches!(o, Operand::Constant(_))) {
        return Ok(None);
    }
    let Some(mut args) = head(&mut *rec) else {
        return Ok(None);
    };
    let mut variable = false;
    for operand in resolved {
        args.push(match operand {
            Operand::Constant(v) => rec.constant(v),
            Operand::Slot { slot, variable: v } => {
                variable |= v;
                Arg::Slot(slot)
            }
        });
    }
    let slot = rec.push(op, &args, result_count, variable);
    Ok(Some(Emitted {
        tape,
        slot,
        variable,
    }))
}

/// Record a single-result (primary) operation with no immediate arguments.
fn record_op<B: Base>(op: OpCode, operands: &[Tracked<B>], value: B) -> Result<Tracked<B>> {
    let result_count = op.result_count().unwrap_or(1);
    let emitted = emit(op, operands, result_count, |_| Some(Vec::new()))?;
    Ok(match emitted {
        Some(e) => Tracked::bound(value, e.binding(0)),
        None => Tracked::constant(value),
    })
}

impl<B: Base> Tracked<B> {
    /// An unbound constant.
    #[inline]
    pub fn constant(value: B) -> Self {
        Tracked {
            value,
            binding: Binding::Unbound,
        }
    }

    #[inline]
    pub(crate) fn bound(value: B, binding: Binding) -> Self {
        Tracked { value, binding }
    }

    /// The base value.
    ///
    /// Fails with [`AdError::PrematureRead`] while the tape this value is
    /// bound to is still recording: the value is only known for the inputs
    /// used during recording.
    pub fn value(&self) -> Result<B> {
        match self.binding.tape() {
            Some(tape) if thread_local::is_live(tape) => Err(AdError::PrematureRead { tape }),
            _ => Ok(self.value),
        }
    }

    /// The binding, reported as [`Binding::Unbound`] once the tape has
    /// closed or aborted.
    pub fn binding(&self) -> Binding {
        match self.binding.tape() {
            Some(tape) if thread_local::is_live(tape) => self.binding,
            _ => Binding::Unbound,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.binding(), Binding::Variable { .. })
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.binding(), Binding::Dynamic { .. })
    }

    pub fn is_constant(&self) -> bool {
        self.binding() == Binding::Unbound
    }

    /// Resolve against the tape `active` (this thread's recording tape).
    pub(crate) fn resolve(&self, active: Option<TapeId>) -> Result<Operand<B>> {
        match self.binding {
            Binding::Unbound => Ok(Operand::Constant(self.value)),
            Binding::Variable { tape, slot } if Some(tape) == active => Ok(Operand::Slot {
                slot,
                variable: true,
            }),
            Binding::Dynamic { tape, slot } if Some(tape) == active => Ok(Operand::Slot {
                slot,
                variable: false,
            }),
            Binding::Variable { tape, .. } | Binding::Dynamic { tape, .. } => {
                if thread_local::is_live(tape) {
                    Err(AdError::CrossTape { active, found: tape })
                } else {
                    Ok(Operand::Constant(self.value))
                }
            }
        }
    }

    #[inline]
    fn is_literal(&self, pred: impl Fn(&B) -> bool) -> bool {
        self.binding == Binding::Unbound && pred(&self.value)
    }

    // ── Recording entry points ──

    /// Apply a unary elementary opcode.
    pub fn try_unary(self, op: OpCode) -> Result<Self> {
        if !op.is_unary() {
            return Err(AdError::InvalidOperation { op, operands: 1 });
        }
        let value = opcode::evaluate(op, self.value, self.value);
        record_op(op, &[self], value)
    }

    /// Apply a binary elementary opcode.
    pub fn try_binary(self, op: OpCode, rhs: Self) -> Result<Self> {
        match op {
            OpCode::Add => self.try_add(rhs),
            OpCode::Sub => self.try_sub(rhs),
            OpCode::Mul => self.try_mul(rhs),
            OpCode::Div => self.try_div(rhs),
            OpCode::Azmul => self.try_azmul(rhs),
            OpCode::Pow => self.try_powf(rhs),
            _ => Err(AdError::InvalidOperation { op, operands: 2 }),
        }
    }

    fn binary(self, op: OpCode, rhs: Self) -> Result<Self> {
        let value = opcode::evaluate(op, self.value, rhs.value);
        record_op(op, &[self, rhs], value)
    }

    pub fn try_add(self, rhs: Self) -> Result<Self> {
        if rhs.is_literal(B::is_identical_zero) {
            return Ok(self);
        }
        if self.is_literal(B::is_identical_zero) {
            return Ok(rhs);
        }
        self.binary(OpCode::Add, rhs)
    }

    pub fn try_sub(self, rhs: Self) -> Result<Self> {
        if rhs.is_literal(B::is_identical_zero) {
            return Ok(self);
        }
        self.binary(OpCode::Sub, rhs)
    }

    /// `x * 0` is recorded rather than folded so that NaN and infinity in
    /// `x` still propagate; use [`azmul`](Self::azmul) for an absorbing zero.
    pub fn try_mul(self, rhs: Self) -> Result<Self> {
        if rhs.is_literal(B::is_identical_one) {
            return Ok(self);
        }
        if self.is_literal(B::is_identical_one) {
            return Ok(rhs);
        }
        self.binary(OpCode::Mul, rhs)
    }

    pub fn try_div(self, rhs: Self) -> Result<Self> {
        if rhs.is_literal(B::is_identical_one) {
            return Ok(self);
        }
        self.binary(OpCode::Div, rhs)
    }

    pub fn try_neg(self) -> Result<Self> {
        self.try_unary(OpCode::Neg)
    }

    pub fn try_azmul(self, rhs: Self) -> Result<Self> {
        if self.is_literal(B::is_identical_zero) {
            return Ok(Tracked::constant(B::zero()));
        }
        self.binary(OpCode::Azmul, rhs)
    }

    pub fn try_powf(self, exponent: Self) -> Result<Self> {
        if exponent.is_literal(B::is_identical_one) {
            return Ok(self);
        }
        self.binary(OpCode::Pow, exponent)
    }

    /// Integer power as repeated multiplication.
    pub fn try_powi(self, n: i32) -> Result<Self> {
        let mut result = Tracked::constant(B::one());
        let mut base = self;
        let mut e = n.unsigned_abs();
        while e > 0 {
            if e & 1 == 1 {
                result = result.try_mul(base)?;
            }
            e >>= 1;
            if e > 0 {
                base = base.try_mul(base)?;
            }
        }
        if n < 0 {
            Tracked::constant(B::one()).try_div(result)
        } else {
            Ok(result)
        }
    }

    /// Evaluate `self op rhs`, recording a compare operation when either
    /// side is bound and the tape records comparisons.
    pub fn try_compare(self, op: CompareOp, rhs: Self) -> Result<bool> {
        let outcome = B::compare(op, self.value, rhs.value)?;
        emit(OpCode::Compare, &[self, rhs], 0, |rec| {
            rec.options
                .record_compare
                .then(|| vec![Arg::Imm(op.code()), Arg::Imm(outcome as u32)])
        })?;
        Ok(outcome)
    }

    // ── Elementary functions ──

    pub fn abs(self) -> Self {
        or_panic(self.try_unary(OpCode::Abs))
    }
    /// Sign with `signum(0) == 0`; zero derivative.
    pub fn signum(self) -> Self {
        or_panic(self.try_unary(OpCode::Sign))
    }
    pub fn sqrt(self) -> Self {
        or_panic(self.try_unary(OpCode::Sqrt))
    }
    pub fn exp(self) -> Self {
        or_panic(self.try_unary(OpCode::Exp))
    }
    pub fn exp_m1(self) -> Self {
        or_panic(self.try_unary(OpCode::ExpM1))
    }
    pub fn ln(self) -> Self {
        or_panic(self.try_unary(OpCode::Ln))
    }
    pub fn ln_1p(self) -> Self {
        or_panic(self.try_unary(OpCode::Ln1p))
    }
    pub fn sin(self) -> Self {
        or_panic(self.try_unary(OpCode::Sin))
    }
    pub fn cos(self) -> Self {
        or_panic(self.try_unary(OpCode::Cos))
    }
    pub fn tan(self) -> Self {
        or_panic(self.try_unary(OpCode::Tan))
    }
    pub fn asin(self) -> Self {
        or_panic(self.try_unary(OpCode::Asin))
    }
    pub fn acos(self) -> Self {
        or_panic(self.try_unary(OpCode::Acos))
    }
    pub fn atan(self) -> Self {
        or_panic(self.try_unary(OpCode::Atan))
    }
    pub fn sinh(self) -> Self {
        or_panic(self.try_unary(OpCode::Sinh))
    }
    pub fn cosh(self) -> Self {
        or_panic(self.try_unary(OpCode::Cosh))
    }
    pub fn tanh(self) -> Self {
        or_panic(self.try_unary(OpCode::Tanh))
    }
    pub fn powf(self, exponent: Self) -> Self {
        or_panic(self.try_powf(exponent))
    }
    pub fn powi(self, n: i32) -> Self {
        or_panic(self.try_powi(n))
    }

    /// Absolute-zero multiply: `0` whenever `self` is zero, even when `rhs`
    /// is infinite or NaN.
    pub fn azmul(self, rhs: Self) -> Self {
        or_panic(self.try_azmul(rhs))
    }
}

/// `if left op right { if_true } else { if_false }`, recorded as a single
/// conditional expression that is re-decided on every replay.
///
/// When both comparison operands are constants the branch is chosen now and
/// nothing is recorded.
pub fn try_cond_exp<B: Base>(
    op: CompareOp,
    left: Tracked<B>,
    right: Tracked<B>,
    if_true: Tracked<B>,
    if_false: Tracked<B>,
) -> Result<Tracked<B>> {
    let active = thread_local::active_id::<B>();
    let l = left.resolve(active)?;
    let r = right.resolve(active)?;
    if matches!((l, r), (Operand::Constant(_), Operand::Constant(_))) {
        let outcome = B::compare(op, left.value, right.value)?;
        return Ok(if outcome { if_true } else { if_false });
    }
    let value = B::cond_exp(op, left.value, right.value, if_true.value, if_false.value)?;
    let emitted = emit(OpCode::CondExp, &[left, right, if_true, if_false], 1, |_| {
        Some(vec![Arg::Imm(op.code())])
    })?;
    Ok(match emitted {
        Some(e) => Tracked::bound(value, e.binding(0)),
        None => Tracked::constant(value),
    })
}

/// Panicking form of [`try_cond_exp`].
pub fn cond_exp<B: Base>(
    op: CompareOp,
    left: Tracked<B>,
    right: Tracked<B>,
    if_true: Tracked<B>,
    if_false: Tracked<B>,
) -> Tracked<B> {
    or_panic(try_cond_exp(op, left, right, if_true, if_false))
}

impl<B: Base> From<B> for Tracked<B> {
    #[inline]
    fn from(value: B) -> Self {
        Tracked::constant(value)
    }
}

impl<B: Base> Default for Tracked<B> {
    fn default() -> Self {
        Tracked::constant(B::zero())
    }
}

impl<B: Base> fmt::Debug for Tracked<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding {
            Binding::Unbound => write!(f, "Tracked({:?})", self.value),
            Binding::Variable { tape, slot } => {
                write!(f, "Tracked({:?} @ var {tape}:{slot})", self.value)
            }
            Binding::Dynamic { tape, slot } => {
                write!(f, "Tracked({:?} @ dyn {tape}:{slot})", self.value)
            }
        }
    }
}

impl<B: Base + Display> Display for Tracked<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}
