use crate::error::EvalError;

const MAX_STACK: usize = 256;
const LOOP_BUDGET: u32 = 1 << 20;

pub const MEGABUF_BLOCK: usize = 1 << 16;
pub const MEGABUF_BLOCKS: usize = 16;
pub const MEGABUF_LEN: usize = MEGABUF_BLOCK * MEGABUF_BLOCKS;

// Matches the rounding slack EEL applies to buffer indices.
const INDEX_EPSILON: f64 = 0.0001;
const EQ_EPSILON: f64 = 0.00001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Buf {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fn1 {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Exp,
    Log,
    Log10,
    Abs,
    Sign,
    Floor,
    Ceil,
    Int,
    Sqr,
    Fract,
    Rand,
    RandInt,
    BNot,
    InvSqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fn2 {
    Atan2,
    Pow,
    Min,
    Max,
    Sigmoid,
    BOr,
    BAnd,
    Div,
    Mod,
    Equal,
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    Const(f64),
    Load(u16),
    /// Writes the top of stack into a slot and leaves the stored value.
    Store(u16),
    LoadBuf(Buf),
    /// `[index, value] -> [value]`
    StoreBuf(Buf),
    Pop,
    Dup,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Not,
    Truthy,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitAnd,
    Call1(Fn1),
    Call2(Fn2),
    Clamp,
    Jump(u32),
    JumpIfZero(u32),
    Tick,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub(crate) ops: Vec<Op>,
}

impl Program {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Flat numeric memory addressed by floored index, allocated in blocks on first write.
#[derive(Debug, Clone, Default)]
pub struct MegaBuf {
    blocks: Vec<Option<Box<[f64]>>>,
}

impl MegaBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    pub fn allocated_blocks(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    fn slot(index: f64) -> Option<(usize, usize)> {
        let i = (index + INDEX_EPSILON).floor();
        if !(0.0..MEGABUF_LEN as f64).contains(&i) {
            return None;
        }
        let i = i as usize;
        Some((i / MEGABUF_BLOCK, i % MEGABUF_BLOCK))
    }

    pub fn get(&self, index: f64) -> f64 {
        let Some((b, o)) = Self::slot(index) else {
            return 0.0;
        };
        match self.blocks.get(b) {
            Some(Some(block)) => block[o],
            _ => 0.0,
        }
    }

    /// Returns the previous value, or `None` when the index is out of range.
    pub fn set(&mut self, index: f64, value: f64) -> Option<f64> {
        let (b, o) = Self::slot(index)?;
        if self.blocks.len() <= b {
            self.blocks.resize_with(b + 1, || None);
        }
        let block = self.blocks[b].get_or_insert_with(|| vec![0.0; MEGABUF_BLOCK].into_boxed_slice());
        Some(std::mem::replace(&mut block[o], value))
    }
}

pub struct ExecEnv<'a> {
    pub vars: &'a mut [f64],
    pub megabuf: &'a mut MegaBuf,
    pub gmegabuf: &'a mut MegaBuf,
}

enum Undo {
    Slot(u16, f64),
    Buf(Buf, f64, f64),
}

/// Reusable evaluator state; one per runtime, shared by all of its programs.
#[derive(Default)]
pub struct Vm {
    stack: Vec<f64>,
    journal: Vec<Undo>,
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(64),
            journal: Vec::with_capacity(64),
        }
    }

    /// Runs `prog`; on failure every store it made is rolled back.
    pub fn run(&mut self, prog: &Program, env: &mut ExecEnv<'_>) -> Result<f64, EvalError> {
        self.stack.clear();
        self.journal.clear();
        match self.exec(prog, env) {
            Ok(v) => Ok(v),
            Err(e) => {
                for undo in self.journal.drain(..).rev() {
                    match undo {
                        Undo::Slot(s, old) => env.vars[s as usize] = old,
                        Undo::Buf(Buf::Local, i, old) => {
                            env.megabuf.set(i, old);
                        }
                        Undo::Buf(Buf::Global, i, old) => {
                            env.gmegabuf.set(i, old);
                        }
                    }
                }
                Err(e)
            }
        }
    }

    fn exec(&mut self, prog: &Program, env: &mut ExecEnv<'_>) -> Result<f64, EvalError> {
        let ops = &prog.ops;
        let stack = &mut self.stack;
        let mut ip = 0usize;
        let mut budget = LOOP_BUDGET;

        while ip < ops.len() {
            if stack.len() >= MAX_STACK {
                return Err(EvalError::StackOverflow);
            }
            match ops[ip] {
                Op::Const(v) => stack.push(v),
                Op::Load(s) => stack.push(env.vars[s as usize]),
                Op::Store(s) => {
                    let slot = &mut env.vars[s as usize];
                    let top = stack.last_mut().ok_or(EvalError::StackUnderflow)?;
                    if top.is_finite() {
                        self.journal.push(Undo::Slot(s, *slot));
                        *slot = *top;
                    } else {
                        *top = *slot;
                    }
                }
                Op::LoadBuf(buf) => {
                    let i = pop(stack)?;
                    let mem = match buf {
                        Buf::Local => &*env.megabuf,
                        Buf::Global => &*env.gmegabuf,
                    };
                    stack.push(mem.get(i));
                }
                Op::StoreBuf(buf) => {
                    let v = pop(stack)?;
                    let i = pop(stack)?;
                    let mem = match buf {
                        Buf::Local => &mut *env.megabuf,
                        Buf::Global => &mut *env.gmegabuf,
                    };
                    if v.is_finite() {
                        if let Some(old) = mem.set(i, v) {
                            self.journal.push(Undo::Buf(buf, i, old));
                        }
                        stack.push(v);
                    } else {
                        stack.push(mem.get(i));
                    }
                }
                Op::Pop => {
                    pop(stack)?;
                }
                Op::Dup => {
                    let v = *stack.last().ok_or(EvalError::StackUnderflow)?;
                    stack.push(v);
                }
                Op::Add => binop(stack, |a, b| a + b)?,
                Op::Sub => binop(stack, |a, b| a - b)?,
                Op::Mul => binop(stack, |a, b| a * b)?,
                Op::Div => binop(stack, safe_div)?,
                Op::Mod => binop(stack, int_mod)?,
                Op::Pow => binop(stack, f64::powf)?,
                Op::Neg => unary(stack, |a| -a)?,
                Op::Not => unary(stack, |a| flag(a == 0.0))?,
                Op::Truthy => unary(stack, |a| flag(a != 0.0))?,
                Op::Eq => binop(stack, |a, b| flag((a - b).abs() < EQ_EPSILON))?,
                Op::Ne => binop(stack, |a, b| flag((a - b).abs() >= EQ_EPSILON))?,
                Op::Lt => binop(stack, |a, b| flag(a < b))?,
                Op::Le => binop(stack, |a, b| flag(a <= b))?,
                Op::Gt => binop(stack, |a, b| flag(a > b))?,
                Op::Ge => binop(stack, |a, b| flag(a >= b))?,
                Op::BitOr => binop(stack, |a, b| ((a as i64) | (b as i64)) as f64)?,
                Op::BitAnd => binop(stack, |a, b| ((a as i64) & (b as i64)) as f64)?,
                Op::Call1(f) => unary(stack, |a| call1(f, a))?,
                Op::Call2(f) => binop(stack, |a, b| call2(f, a, b))?,
                Op::Clamp => {
                    let hi = pop(stack)?;
                    let lo = pop(stack)?;
                    let x = pop(stack)?;
                    stack.push(if x < lo { lo } else if x > hi { hi } else { x });
                }
                Op::Jump(to) => {
                    ip = to as usize;
                    continue;
                }
                Op::JumpIfZero(to) => {
                    if pop(stack)? == 0.0 {
                        ip = to as usize;
                        continue;
                    }
                }
                Op::Tick => {
                    budget = budget.checked_sub(1).ok_or(EvalError::LoopBudget)?;
                }
            }
            ip += 1;
        }

        Ok(stack.pop().unwrap_or(0.0))
    }
}

fn pop(stack: &mut Vec<f64>) -> Result<f64, EvalError> {
    stack.pop().ok_or(EvalError::StackUnderflow)
}

fn unary(stack: &mut Vec<f64>, f: impl Fn(f64) -> f64) -> Result<(), EvalError> {
    let a = pop(stack)?;
    stack.push(f(a));
    Ok(())
}

fn binop(stack: &mut Vec<f64>, f: impl Fn(f64, f64) -> f64) -> Result<(), EvalError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    stack.push(f(a, b));
    Ok(())
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 { 0.0 } else { a / b }
}

fn int_mod(a: f64, b: f64) -> f64 {
    let b = b as i64;
    if b == 0 {
        return 0.0;
    }
    (a as i64).checked_rem(b).map_or(0.0, |r| r as f64)
}

fn rand_upto(x: f64) -> f64 {
    let xf = x.floor();
    if xf < 1.0 {
        fastrand::f64()
    } else {
        fastrand::f64() * xf
    }
}

fn call1(f: Fn1, a: f64) -> f64 {
    match f {
        Fn1::Sin => a.sin(),
        Fn1::Cos => a.cos(),
        Fn1::Tan => a.tan(),
        Fn1::Asin => a.asin(),
        Fn1::Acos => a.acos(),
        Fn1::Atan => a.atan(),
        Fn1::Sqrt => a.abs().sqrt(),
        Fn1::Exp => a.exp(),
        Fn1::Log => a.abs().ln(),
        Fn1::Log10 => a.abs().log10(),
        Fn1::Abs => a.abs(),
        Fn1::Sign => {
            if a > 0.0 {
                1.0
            } else if a < 0.0 {
                -1.0
            } else {
                0.0
            }
        }
        Fn1::Floor => a.floor(),
        Fn1::Ceil => a.ceil(),
        Fn1::Int => a.trunc(),
        Fn1::Sqr => a * a,
        Fn1::Fract => a - a.floor(),
        Fn1::Rand => rand_upto(a),
        Fn1::RandInt => (fastrand::f64() * a.floor().max(0.0)).floor(),
        Fn1::BNot => flag(a == 0.0),
        Fn1::InvSqrt => 1.0 / a.abs().sqrt(),
    }
}

fn call2(f: Fn2, a: f64, b: f64) -> f64 {
    match f {
        Fn2::Atan2 => a.atan2(b),
        Fn2::Pow => a.powf(b),
        Fn2::Min => a.min(b),
        Fn2::Max => a.max(b),
        Fn2::Sigmoid => {
            let t = 1.0 + (-a * b).exp();
            if t.abs() > EQ_EPSILON { 1.0 / t } else { 0.0 }
        }
        Fn2::BOr => flag(a != 0.0 || b != 0.0),
        Fn2::BAnd => flag(a != 0.0 && b != 0.0),
        Fn2::Div => safe_div(a, b),
        Fn2::Mod => int_mod(a, b),
        Fn2::Equal => flag((a - b).abs() < EQ_EPSILON),
        Fn2::Above => flag(a > b),
        Fn2::Below => flag(a < b),
    }
}
