use crate::eqn::lexer::{Tok, Token, tokenize};
use crate::error::CompileError;

const MAX_DEPTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BitOr,
    BitAnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Call {
        name: String,
        args: Vec<Expr>,
        pos: usize,
    },
    Index {
        buf: String,
        index: Box<Expr>,
        pos: usize,
    },
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Assign {
        target: Box<Expr>,
        op: Option<BinOp>,
        value: Box<Expr>,
        pos: usize,
    },
    Seq(Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    While(Box<Expr>, Box<Expr>),
}

pub fn parse(src: &str) -> Result<Expr, CompileError> {
    let tokens = tokenize(src)?;
    let mut p = Parser {
        tokens,
        at: 0,
        depth: 0,
    };
    let body = p.seq()?;
    p.expect_eof()?;
    Ok(body)
}

struct Parser {
    tokens: Vec<Token>,
    at: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.at.min(self.tokens.len() - 1)].tok
    }

    fn peek_at(&self, ahead: usize) -> &Tok {
        &self.tokens[(self.at + ahead).min(self.tokens.len() - 1)].tok
    }

    fn pos(&self) -> usize {
        self.tokens[self.at.min(self.tokens.len() - 1)].pos
    }

    fn bump(&mut self) -> Tok {
        let t = self.peek().clone();
        if self.at < self.tokens.len() - 1 {
            self.at += 1;
        }
        t
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn eat(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, op: &'static str) -> Result<(), CompileError> {
        if self.eat(op) {
            Ok(())
        } else {
            Err(self.unexpected(op))
        }
    }

    fn expect_eof(&mut self) -> Result<(), CompileError> {
        match self.peek() {
            Tok::Eof => Ok(()),
            _ => Err(self.unexpected("end of input")),
        }
    }

    fn unexpected(&self, expected: &'static str) -> CompileError {
        let found = match self.peek() {
            Tok::Num(n) => n.to_string(),
            Tok::Ident(s) => s.clone(),
            Tok::Op(o) => (*o).to_string(),
            Tok::Eof => "end of input".to_string(),
        };
        CompileError::Expected {
            expected,
            found,
            pos: self.pos(),
        }
    }

    fn enter(&mut self) -> Result<(), CompileError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CompileError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn at_seq_end(&self) -> bool {
        matches!(self.peek(), Tok::Eof) || self.is_op(")") || self.is_op("}") || self.is_op(",")
    }

    // Statements separated by `;`; a block statement may omit its `;`.
    fn seq(&mut self) -> Result<Expr, CompileError> {
        let mut items = Vec::new();
        loop {
            while self.eat(";") {}
            if self.at_seq_end() {
                break;
            }
            let (stmt, was_block) = self.statement()?;
            items.push(stmt);
            if self.eat(";") || was_block {
                continue;
            }
            break;
        }
        Ok(match items.len() {
            0 => Expr::Num(0.0),
            1 => items.remove(0),
            _ => Expr::Seq(items),
        })
    }

    fn statement(&mut self) -> Result<(Expr, bool), CompileError> {
        self.enter()?;
        let out = self.statement_inner();
        self.leave();
        out
    }

    fn statement_inner(&mut self) -> Result<(Expr, bool), CompileError> {
        if self.eat("{") {
            let body = self.seq()?;
            self.expect("}")?;
            return Ok((body, true));
        }
        let keyword = match self.peek() {
            Tok::Ident(s) => s.clone(),
            _ => return Ok((self.expr()?, false)),
        };
        match keyword.as_str() {
            "var" | "let" | "const" if matches!(self.peek_at(1), Tok::Ident(_)) => {
                self.bump();
                Ok((self.expr()?, false))
            }
            "for" if matches!(self.peek_at(1), Tok::Op("(")) => {
                self.bump();
                self.expect("(")?;
                let init = self.optional_clause(";")?;
                self.expect(";")?;
                let cond = self.optional_clause(";")?;
                self.expect(";")?;
                let step = self.optional_clause(")")?;
                self.expect(")")?;
                let (body, _) = self.statement()?;
                let cond = cond.unwrap_or(Expr::Num(1.0));
                let mut body_items = vec![body];
                body_items.extend(step);
                let looped = Expr::While(Box::new(cond), Box::new(Expr::Seq(body_items)));
                let mut items = Vec::new();
                items.extend(init);
                items.push(looped);
                Ok((Expr::Seq(items), true))
            }
            "if" | "while" if matches!(self.peek_at(1), Tok::Op("(")) => {
                let pos = self.pos();
                self.bump();
                let args = self.call_args()?;
                if args.len() == 1 && self.starts_statement() {
                    let cond = args.into_iter().next().unwrap_or(Expr::Num(0.0));
                    let (then, _) = self.statement()?;
                    if keyword == "while" {
                        return Ok((Expr::While(Box::new(cond), Box::new(then)), true));
                    }
                    while self.eat(";") {}
                    let otherwise = if matches!(self.peek(), Tok::Ident(s) if s == "else") {
                        self.bump();
                        Some(Box::new(self.statement()?.0))
                    } else {
                        None
                    };
                    return Ok((Expr::If(Box::new(cond), Box::new(then), otherwise), true));
                }
                let call = Expr::Call {
                    name: keyword,
                    args,
                    pos,
                };
                Ok((self.continue_expr(call)?, false))
            }
            _ => Ok((self.expr()?, false)),
        }
    }

    fn optional_clause(&mut self, end: &str) -> Result<Option<Expr>, CompileError> {
        if self.is_op(end) {
            return Ok(None);
        }
        let mut items = vec![self.expr()?];
        while self.eat(",") {
            items.push(self.expr()?);
        }
        Ok(Some(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Seq(items)
        }))
    }

    fn starts_statement(&self) -> bool {
        match self.peek() {
            Tok::Num(_) | Tok::Ident(_) => true,
            Tok::Op(o) => matches!(*o, "{" | "(" | "-" | "+" | "!"),
            Tok::Eof => false,
        }
    }

    // An EEL-style `if(...)`/`while(...)` call used as the head of a larger expression.
    fn continue_expr(&mut self, head: Expr) -> Result<Expr, CompileError> {
        let mut lhs = head;
        loop {
            let op = match self.peek() {
                Tok::Op(o) => *o,
                _ => break,
            };
            let bin = match op {
                "+" => BinOp::Add,
                "-" => BinOp::Sub,
                "*" => BinOp::Mul,
                "/" => BinOp::Div,
                "%" => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary(bin, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn expr(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let out = self.assign();
        self.leave();
        out
    }

    fn assign(&mut self) -> Result<Expr, CompileError> {
        let pos = self.pos();
        let lhs = self.ternary()?;
        let op = match self.peek() {
            Tok::Op("=") => None,
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("%=") => Some(BinOp::Mod),
            Tok::Op("^=") => Some(BinOp::Pow),
            _ => return Ok(lhs),
        };
        if !is_assignable(&lhs) {
            return Err(CompileError::NotAssignable { pos });
        }
        self.bump();
        let value = self.expr()?;
        Ok(Expr::Assign {
            target: Box::new(lhs),
            op,
            value: Box::new(value),
            pos,
        })
    }

    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let cond = self.or()?;
        if !self.eat("?") {
            return Ok(cond);
        }
        let a = self.expr()?;
        self.expect(":")?;
        let b = self.expr()?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(a), Box::new(b)))
    }

    fn or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.and()?;
        while self.eat("||") {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.bit_or()?;
        while self.eat("&&") {
            let rhs = self.bit_or()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.bit_and()?;
        while self.eat("|") {
            let rhs = self.bit_and()?;
            lhs = Expr::Binary(BinOp::BitOr, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn bit_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.equality()?;
        while self.eat("&") {
            let rhs = self.equality()?;
            lhs = Expr::Binary(BinOp::BitAnd, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek() {
                Tok::Op("==") | Tok::Op("===") => BinOp::Eq,
                Tok::Op("!=") | Tok::Op("!==") => BinOp::Ne,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn relational(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek() {
                Tok::Op("<") => BinOp::Lt,
                Tok::Op("<=") => BinOp::Le,
                Tok::Op(">") => BinOp::Gt,
                Tok::Op(">=") => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("%") => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        self.enter()?;
        let out = if self.eat("-") {
            self.unary().map(|e| match e {
                Expr::Num(n) => Expr::Num(-n),
                e => Expr::Unary(UnOp::Neg, Box::new(e)),
            })
        } else if self.eat("+") {
            self.unary()
        } else if self.eat("!") {
            self.unary().map(|e| Expr::Unary(UnOp::Not, Box::new(e)))
        } else {
            self.power()
        };
        self.leave();
        out
    }

    fn power(&mut self) -> Result<Expr, CompileError> {
        let base = self.postfix()?;
        if self.eat("^") {
            let exp = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut e = self.primary()?;
        while self.is_op("[") {
            let pos = self.pos();
            let buf = match &e {
                Expr::Var(name) => name.clone(),
                _ => return Err(self.unexpected("buffer name before [")),
            };
            self.bump();
            let index = self.expr()?;
            self.expect("]")?;
            e = Expr::Index {
                buf,
                index: Box::new(index),
                pos,
            };
        }
        Ok(e)
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        let pos = self.pos();
        match self.peek().clone() {
            Tok::Num(n) => {
                self.bump();
                Ok(Expr::Num(n))
            }
            Tok::Op("(") => {
                self.bump();
                let inner = self.seq()?;
                self.expect(")")?;
                Ok(inner)
            }
            Tok::Ident(name) => {
                self.bump();
                let prefixed = (name == "a" || name == "math")
                    && self.is_op(".")
                    && matches!(self.peek_at(1), Tok::Ident(_));
                if !prefixed {
                    return self.named(name, pos);
                }
                self.bump();
                let Tok::Ident(field) = self.bump() else {
                    return Err(self.unexpected("identifier"));
                };
                match (name.as_str(), field.as_str()) {
                    ("math", "pi") => Ok(Expr::Num(std::f64::consts::PI)),
                    ("math", "e") => Ok(Expr::Num(std::f64::consts::E)),
                    _ => self.named(field, pos),
                }
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn named(&mut self, name: String, pos: usize) -> Result<Expr, CompileError> {
        if self.is_op("(") {
            let args = self.call_args()?;
            return Ok(Expr::Call { name, args, pos });
        }
        Ok(Expr::Var(name))
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect("(")?;
        let mut args = Vec::new();
        if self.eat(")") {
            return Ok(args);
        }
        loop {
            args.push(self.seq()?);
            if self.eat(",") {
                continue;
            }
            self.expect(")")?;
            return Ok(args);
        }
    }
}

fn is_assignable(e: &Expr) -> bool {
    match e {
        Expr::Var(_) | Expr::Index { .. } => true,
        Expr::Call { name, args, .. } => {
            (name == "megabuf" || name == "gmegabuf") && args.len() == 1
        }
        _ => false,
    }
}
