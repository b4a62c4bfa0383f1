use crate::eqn::parser::{BinOp, Expr, UnOp, parse};
use crate::eqn::vm::{Buf, Fn1, Fn2, Op, Program};
use crate::error::CompileError;
use std::collections::HashMap;

const HIDDEN_PREFIX: char = '\u{1}';

/// Name to slot index map for one scripting context.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    names: Vec<String>,
    index: HashMap<String, u16>,
    hidden: usize,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.index.get(name).copied()
    }

    pub fn name(&self, slot: u16) -> Option<&str> {
        self.names.get(slot as usize).map(String::as_str)
    }

    pub fn intern(&mut self, name: &str) -> Result<u16, CompileError> {
        if let Some(s) = self.index.get(name) {
            return Ok(*s);
        }
        let slot = u16::try_from(self.names.len()).map_err(|_| CompileError::TooManySlots)?;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), slot);
        Ok(slot)
    }

    /// Interns a name known ahead of compilation. Reserved names are few enough
    /// that they can never exhaust the slot space.
    pub fn reserve(&mut self, name: &str) -> u16 {
        if let Some(s) = self.index.get(name) {
            return *s;
        }
        let slot = self.names.len().min(u16::MAX as usize) as u16;
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), slot);
        slot
    }

    fn hidden(&mut self) -> Result<u16, CompileError> {
        self.hidden += 1;
        let name = format!("{HIDDEN_PREFIX}tmp{}", self.hidden);
        self.intern(&name)
    }

    /// Slots introduced by expressions rather than reserved up front.
    pub fn user_slots(&self, reserved: usize) -> impl Iterator<Item = (u16, &str)> {
        self.names
            .iter()
            .enumerate()
            .skip(reserved)
            .filter(|(_, n)| !n.starts_with(HIDDEN_PREFIX))
            .map(|(i, n)| (i as u16, n.as_str()))
    }
}

pub fn compile(src: &str, table: &mut SlotTable) -> Result<Program, CompileError> {
    if src.trim().is_empty() {
        return Ok(Program::noop());
    }
    let ast = parse(src)?;
    let mut c = Compiler {
        table,
        ops: Vec::new(),
    };
    c.expr(&ast)?;
    Ok(Program { ops: c.ops })
}

struct Compiler<'t> {
    table: &'t mut SlotTable,
    ops: Vec<Op>,
}

impl Compiler<'_> {
    fn here(&self) -> u32 {
        self.ops.len() as u32
    }

    fn placeholder(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    fn patch(&mut self, at: usize) {
        let to = self.here();
        match &mut self.ops[at] {
            Op::Jump(t) | Op::JumpIfZero(t) => *t = to,
            _ => {}
        }
    }

    fn expr(&mut self, e: &Expr) -> Result<(), CompileError> {
        match e {
            Expr::Num(n) => self.ops.push(Op::Const(*n)),
            Expr::Var(name) => {
                let s = self.table.intern(name)?;
                self.ops.push(Op::Load(s));
            }
            Expr::Seq(items) => {
                for (i, item) in items.iter().enumerate() {
                    self.expr(item)?;
                    if i + 1 < items.len() {
                        self.ops.push(Op::Pop);
                    }
                }
                if items.is_empty() {
                    self.ops.push(Op::Const(0.0));
                }
            }
            Expr::Unary(op, inner) => {
                self.expr(inner)?;
                self.ops.push(match op {
                    UnOp::Neg => Op::Neg,
                    UnOp::Not => Op::Not,
                });
            }
            Expr::Binary(op, a, b) => {
                self.expr(a)?;
                self.expr(b)?;
                self.ops.push(bin_op(*op));
            }
            Expr::And(a, b) => {
                self.expr(a)?;
                let short = self.placeholder(Op::JumpIfZero(0));
                self.expr(b)?;
                self.ops.push(Op::Truthy);
                let end = self.placeholder(Op::Jump(0));
                self.patch(short);
                self.ops.push(Op::Const(0.0));
                self.patch(end);
            }
            Expr::Or(a, b) => {
                self.expr(a)?;
                let rhs = self.placeholder(Op::JumpIfZero(0));
                self.ops.push(Op::Const(1.0));
                let end = self.placeholder(Op::Jump(0));
                self.patch(rhs);
                self.expr(b)?;
                self.ops.push(Op::Truthy);
                self.patch(end);
            }
            Expr::Ternary(c, a, b) | Expr::If(c, a, Some(b)) => self.branch(c, a, Some(&**b))?,
            Expr::If(c, a, None) => self.branch(c, a, None)?,
            Expr::While(cond, body) => {
                let top = self.here();
                self.ops.push(Op::Tick);
                self.expr(cond)?;
                let exit = self.placeholder(Op::JumpIfZero(0));
                self.expr(body)?;
                self.ops.push(Op::Pop);
                self.ops.push(Op::Jump(top));
                self.patch(exit);
                self.ops.push(Op::Const(0.0));
            }
            Expr::Index { buf, index, pos } => {
                let b = buffer(buf, *pos)?;
                self.expr(index)?;
                self.ops.push(Op::LoadBuf(b));
            }
            Expr::Assign {
                target,
                op,
                value,
                pos,
            } => self.assign(target, *op, value, *pos)?,
            Expr::Call { name, args, pos } => self.call(name, args, *pos)?,
        }
        Ok(())
    }

    fn branch(&mut self, c: &Expr, a: &Expr, b: Option<&Expr>) -> Result<(), CompileError> {
        self.expr(c)?;
        let other = self.placeholder(Op::JumpIfZero(0));
        self.expr(a)?;
        let end = self.placeholder(Op::Jump(0));
        self.patch(other);
        match b {
            Some(b) => self.expr(b)?,
            None => self.ops.push(Op::Const(0.0)),
        }
        self.patch(end);
        Ok(())
    }

    fn assign(
        &mut self,
        target: &Expr,
        op: Option<BinOp>,
        value: &Expr,
        pos: usize,
    ) -> Result<(), CompileError> {
        match target {
            Expr::Var(name) => {
                let s = self.table.intern(name)?;
                if let Some(op) = op {
                    self.ops.push(Op::Load(s));
                    self.expr(value)?;
                    self.ops.push(bin_op(op));
                } else {
                    self.expr(value)?;
                }
                self.ops.push(Op::Store(s));
                Ok(())
            }
            Expr::Index { buf, index, pos } => {
                let b = buffer(buf, *pos)?;
                self.buffer_store(b, index, op, value)
            }
            Expr::Call { name, args, pos } if args.len() == 1 => {
                let b = buffer(name, *pos)?;
                self.buffer_store(b, &args[0], op, value)
            }
            _ => Err(CompileError::NotAssignable { pos }),
        }
    }

    fn buffer_store(
        &mut self,
        b: Buf,
        index: &Expr,
        op: Option<BinOp>,
        value: &Expr,
    ) -> Result<(), CompileError> {
        self.expr(index)?;
        if let Some(op) = op {
            self.ops.push(Op::Dup);
            self.ops.push(Op::LoadBuf(b));
            self.expr(value)?;
            self.ops.push(bin_op(op));
        } else {
            self.expr(value)?;
        }
        self.ops.push(Op::StoreBuf(b));
        Ok(())
    }

    fn call(&mut self, name: &str, args: &[Expr], pos: usize) -> Result<(), CompileError> {
        let arity = |expected: usize| -> Result<(), CompileError> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(CompileError::Arity {
                    name: name.to_string(),
                    expected,
                    got: args.len(),
                })
            }
        };

        match name {
            "if" => {
                if args.len() != 2 {
                    arity(3)?;
                }
                return self.branch(&args[0], &args[1], args.get(2));
            }
            "loop" => {
                arity(2)?;
                return self.counted_loop(&args[0], &args[1]);
            }
            "while" => {
                arity(1)?;
                let top = self.here();
                self.ops.push(Op::Tick);
                self.expr(&args[0])?;
                let exit = self.placeholder(Op::JumpIfZero(0));
                self.ops.push(Op::Jump(top));
                self.patch(exit);
                self.ops.push(Op::Const(0.0));
                return Ok(());
            }
            "exec2" | "exec3" => {
                arity(if name == "exec2" { 2 } else { 3 })?;
                return self.expr(&Expr::Seq(args.to_vec()));
            }
            "megabuf" | "gmegabuf" => {
                arity(1)?;
                let b = buffer(name, pos)?;
                self.expr(&args[0])?;
                self.ops.push(Op::LoadBuf(b));
                return Ok(());
            }
            "bitor" | "bitand" => {
                arity(2)?;
                self.expr(&args[0])?;
                self.expr(&args[1])?;
                self.ops.push(if name == "bitor" { Op::BitOr } else { Op::BitAnd });
                return Ok(());
            }
            "clamp" => {
                arity(3)?;
                for a in args {
                    self.expr(a)?;
                }
                self.ops.push(Op::Clamp);
                return Ok(());
            }
            _ => {}
        }

        if let Some(f) = fn1(name) {
            arity(1)?;
            self.expr(&args[0])?;
            self.ops.push(Op::Call1(f));
            return Ok(());
        }
        if let Some(f) = fn2(name) {
            arity(2)?;
            self.expr(&args[0])?;
            self.expr(&args[1])?;
            self.ops.push(Op::Call2(f));
            return Ok(());
        }
        Err(CompileError::UnknownFunction {
            name: name.to_string(),
            pos,
        })
    }

    fn counted_loop(&mut self, count: &Expr, body: &Expr) -> Result<(), CompileError> {
        let counter = self.table.hidden()?;
        self.expr(count)?;
        self.ops.push(Op::Call1(Fn1::Floor));
        self.ops.push(Op::Store(counter));
        self.ops.push(Op::Pop);

        let top = self.here();
        self.ops.push(Op::Load(counter));
        self.ops.push(Op::Const(0.0));
        self.ops.push(Op::Gt);
        let exit = self.placeholder(Op::JumpIfZero(0));
        self.ops.push(Op::Tick);
        self.expr(body)?;
        self.ops.push(Op::Pop);
        self.ops.push(Op::Load(counter));
        self.ops.push(Op::Const(1.0));
        self.ops.push(Op::Sub);
        self.ops.push(Op::Store(counter));
        self.ops.push(Op::Pop);
        self.ops.push(Op::Jump(top));
        self.patch(exit);
        self.ops.push(Op::Const(0.0));
        Ok(())
    }
}

fn buffer(name: &str, pos: usize) -> Result<Buf, CompileError> {
    match name {
        "megabuf" => Ok(Buf::Local),
        "gmegabuf" => Ok(Buf::Global),
        _ => Err(CompileError::UnknownFunction {
            name: name.to_string(),
            pos,
        }),
    }
}

fn bin_op(op: BinOp) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Sub => Op::Sub,
        BinOp::Mul => Op::Mul,
        BinOp::Div => Op::Div,
        BinOp::Mod => Op::Mod,
        BinOp::Pow => Op::Pow,
        BinOp::Eq => Op::Eq,
        BinOp::Ne => Op::Ne,
        BinOp::Lt => Op::Lt,
        BinOp::Le => Op::Le,
        BinOp::Gt => Op::Gt,
        BinOp::Ge => Op::Ge,
        BinOp::BitOr => Op::BitOr,
        BinOp::BitAnd => Op::BitAnd,
    }
}

fn fn1(name: &str) -> Option<Fn1> {
    Some(match name {
        "sin" => Fn1::Sin,
        "cos" => Fn1::Cos,
        "tan" => Fn1::Tan,
        "asin" => Fn1::Asin,
        "acos" => Fn1::Acos,
        "atan" => Fn1::Atan,
        "sqrt" => Fn1::Sqrt,
        "exp" => Fn1::Exp,
        "log" => Fn1::Log,
        "log10" => Fn1::Log10,
        "abs" => Fn1::Abs,
        "sign" => Fn1::Sign,
        "floor" => Fn1::Floor,
        "ceil" => Fn1::Ceil,
        "int" => Fn1::Int,
        "sqr" => Fn1::Sqr,
        "fract" => Fn1::Fract,
        "rand" => Fn1::Rand,
        "randint" => Fn1::RandInt,
        "bnot" => Fn1::BNot,
        "invsqrt" => Fn1::InvSqrt,
        _ => return None,
    })
}

fn fn2(name: &str) -> Option<Fn2> {
    Some(match name {
        "atan2" => Fn2::Atan2,
        "pow" => Fn2::Pow,
        "min" => Fn2::Min,
        "max" => Fn2::Max,
        "sigmoid" => Fn2::Sigmoid,
        "bor" => Fn2::BOr,
        "band" => Fn2::BAnd,
        "div" => Fn2::Div,
        "mod" => Fn2::Mod,
        "equal" => Fn2::Equal,
        "above" => Fn2::Above,
        "below" => Fn2::Below,
        _ => return None,
    })
}
