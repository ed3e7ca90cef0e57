//! Trajectory script compiler.
//!
//! A script assigns the next position from the current one:
//!
//! ```text
//! # advance one column per tick, weaving up and down
//! x = x + 1
//! y = y + (t % 2) * 2 - 1
//! ```
//!
//! Operands are `x`, `y`, `t` (tick) and integer literals; operators are
//! `+ - * / %`, unary minus and parentheses, plus `abs(e)`, `min(a, b)` and
//! `max(a, b)`. Both assignments read the incoming position. Output is a
//! flat RV32IM image following the tower calling convention.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use crate::isa::{AluOp, BranchCond, Instruction, Reg, assemble, reg};
use crate::logic::SYSCALL_RETURN;

use super::{CompilationGateway, CompileError};

/// In-process compiler for trajectory scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptGateway;

impl CompilationGateway for ScriptGateway {
    fn compile(&self, source: &str) -> Result<Vec<u8>, CompileError> {
        compile_script(source)
    }
}

/// Compile a trajectory script into a flat image.
///
/// # Errors
///
/// Syntax errors, duplicate assignments, literals outside `i32`, and
/// expressions nested deeper than the register pool.
pub fn compile_script(source: &str) -> Result<Vec<u8>, CompileError> {
    let tokens = lex(source)?;
    let script = Parser { tokens, pos: 0 }.script()?;
    let mut emitter = Emitter::default();
    let x = script.x.unwrap_or(Expr::Var(reg::A1));
    let y = script.y.unwrap_or(Expr::Var(reg::A2));
    emitter.expr(&x, 0)?;
    emitter.expr(&y, 1)?;
    emitter.mv(reg::A0, POOL[0]);
    emitter.mv(reg::A1, POOL[1]);
    emitter.li(reg::A7, SYSCALL_RETURN as i32);
    emitter.code.push(Instruction::Ecall);
    assemble(&emitter.code).map_err(|e| CompileError::general(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Num(i64),
    Ident(String),
    Sym(char),
    End,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

fn lex(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw.split('#').next().unwrap_or_default();
        let text = text.split("//").next().unwrap_or_default();
        let mut chars = text.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
            } else if c.is_ascii_digit() {
                let mut value: i64 = 0;
                while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(i64::from(d)))
                        .ok_or_else(|| CompileError::at(line, "integer literal too large"))?;
                    chars.next();
                }
                tokens.push(Token {
                    tok: Tok::Num(value),
                    line,
                });
            } else if c.is_ascii_alphabetic() || c == '_' {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if !(c.is_ascii_alphanumeric() || c == '_') {
                        break;
                    }
                    name.push(c);
                    chars.next();
                }
                tokens.push(Token {
                    tok: Tok::Ident(name),
                    line,
                });
            } else if "+-*/%(),=;".contains(c) {
                chars.next();
                let tok = if c == ';' { Tok::End } else { Tok::Sym(c) };
                tokens.push(Token { tok, line });
            } else {
                return Err(CompileError::at(line, format!("unexpected character {c:?}")));
            }
        }
        tokens.push(Token {
            tok: Tok::End,
            line,
        });
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Abs,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Num(i32),
    /// Input register holding `t`, `x` or `y`.
    Var(Reg),
    Neg(Box<Expr>),
    Bin(AluOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Default)]
struct Script {
    x: Option<Expr>,
    y: Option<Expr>,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        self.pos += 1;
        tok
    }

    fn expect(&mut self, sym: char) -> Result<(), CompileError> {
        let line = self.line();
        match self.next() {
            Some(Tok::Sym(c)) if c == sym => Ok(()),
            other => Err(CompileError::at(
                line,
                format!("expected '{sym}', found {}", describe(other.as_ref())),
            )),
        }
    }

    fn script(mut self) -> Result<Script, CompileError> {
        let mut script = Script::default();
        while let Some(tok) = self.peek() {
            if *tok == Tok::End {
                self.pos += 1;
                continue;
            }
            let line = self.line();
            let slot = match self.next() {
                Some(Tok::Ident(name)) if name == "x" => &mut script.x,
                Some(Tok::Ident(name)) if name == "y" => &mut script.y,
                other => {
                    return Err(CompileError::at(
                        line,
                        format!("expected 'x =' or 'y =', found {}", describe(other.as_ref())),
                    ));
                }
            };
            if slot.is_some() {
                return Err(CompileError::at(line, "coordinate assigned twice"));
            }
            self.expect('=')?;
            *slot = Some(self.sum()?);
            let line = self.line();
            match self.next() {
                None | Some(Tok::End) => {}
                Some(other) => {
                    return Err(CompileError::at(
                        line,
                        format!("unexpected {} after expression", describe(Some(&other))),
                    ));
                }
            }
        }
        if script.x.is_none() && script.y.is_none() {
            return Err(CompileError::general("script assigns neither x nor y"));
        }
        Ok(script)
    }

    fn sum(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Sym('+')) => AluOp::Add,
                Some(Tok::Sym('-')) => AluOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(self.product()?));
        }
    }

    fn product(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Tok::Sym('*')) => AluOp::Mul,
                Some(Tok::Sym('/')) => AluOp::Div,
                Some(Tok::Sym('%')) => AluOp::Rem,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        if self.peek() == Some(&Tok::Sym('-')) {
            self.pos += 1;
            return match self.peek() {
                // Folded so that i32::MIN can be written.
                Some(Tok::Num(n)) => {
                    let n = -*n;
                    let line = self.line();
                    self.pos += 1;
                    literal(n, line)
                }
                _ => Ok(Expr::Neg(Box::new(self.unary()?))),
            };
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, CompileError> {
        let line = self.line();
        match self.next() {
            Some(Tok::Num(n)) => literal(n, line),
            Some(Tok::Sym('(')) => {
                let inner = self.sum()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some(Tok::Ident(name)) => match name.as_str() {
                "t" => Ok(Expr::Var(reg::A0)),
                "x" => Ok(Expr::Var(reg::A1)),
                "y" => Ok(Expr::Var(reg::A2)),
                "abs" => self.call(Func::Abs, 1, line),
                "min" => self.call(Func::Min, 2, line),
                "max" => self.call(Func::Max, 2, line),
                _ => Err(CompileError::at(line, format!("unknown name '{name}'"))),
            },
            other => Err(CompileError::at(
                line,
                format!("expected a value, found {}", describe(other.as_ref())),
            )),
        }
    }

    fn call(&mut self, func: Func, arity: usize, line: usize) -> Result<Expr, CompileError> {
        self.expect('(')?;
        let mut args = vec![self.sum()?];
        while self.peek() == Some(&Tok::Sym(',')) {
            self.pos += 1;
            args.push(self.sum()?);
        }
        self.expect(')')?;
        if args.len() != arity {
            return Err(CompileError::at(
                line,
                format!("{func:?} takes {arity} argument(s), got {}", args.len()).to_lowercase(),
            ));
        }
        Ok(Expr::Call(func, args))
    }
}

fn literal(n: i64, line: usize) -> Result<Expr, CompileError> {
    i32::try_from(n)
        .map(Expr::Num)
        .map_err(|_| CompileError::at(line, format!("literal {n} does not fit in 32 bits")))
}

fn describe(tok: Option<&Tok>) -> String {
    match tok {
        None => "end of input".into(),
        Some(Tok::End) => "end of statement".into(),
        Some(Tok::Num(n)) => format!("number {n}"),
        Some(Tok::Ident(name)) => format!("'{name}'"),
        Some(Tok::Sym(c)) => format!("'{c}'"),
    }
}

/// Scratch registers, by expression depth. Inputs `a0`-`a2` and the
/// syscall register `a7` are never written before the epilogue.
const POOL: [Reg; 22] = [
    5, 6, 7, 28, 29, 30, 31, 8, 9, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 13, 14, 15,
];

#[derive(Debug, Default)]
struct Emitter {
    code: Vec<Instruction>,
}

impl Emitter {
    fn slot(depth: usize) -> Result<Reg, CompileError> {
        POOL.get(depth)
            .copied()
            .ok_or_else(|| CompileError::general("expression nests too deeply"))
    }

    fn mv(&mut self, rd: Reg, rs: Reg) {
        self.code.push(Instruction::OpImm {
            op: AluOp::Add,
            rd,
            rs1: rs,
            imm: 0,
        });
    }

    fn li(&mut self, rd: Reg, value: i32) {
        if (-2048..2048).contains(&value) {
            self.code.push(Instruction::OpImm {
                op: AluOp::Add,
                rd,
                rs1: reg::ZERO,
                imm: value,
            });
            return;
        }
        let upper = value.wrapping_add(0x800) & !0xFFF;
        let lower = value.wrapping_sub(upper);
        self.code.push(Instruction::Lui { rd, imm: upper });
        if lower != 0 {
            self.code.push(Instruction::OpImm {
                op: AluOp::Add,
                rd,
                rs1: rd,
                imm: lower,
            });
        }
    }

    fn op(&mut self, op: AluOp, rd: Reg, rs2: Reg) {
        self.code.push(Instruction::Op {
            op,
            rd,
            rs1: rd,
            rs2,
        });
    }

    /// Evaluate `expr` into `POOL[depth]`, clobbering only deeper slots.
    fn expr(&mut self, expr: &Expr, depth: usize) -> Result<(), CompileError> {
        let rd = Self::slot(depth)?;
        match expr {
            Expr::Num(n) => self.li(rd, *n),
            Expr::Var(input) => self.mv(rd, *input),
            Expr::Neg(inner) => {
                self.expr(inner, depth)?;
                self.code.push(Instruction::Op {
                    op: AluOp::Sub,
                    rd,
                    rs1: reg::ZERO,
                    rs2: rd,
                });
            }
            Expr::Bin(op, lhs, rhs) => {
                self.expr(lhs, depth)?;
                self.expr(rhs, depth + 1)?;
                self.op(*op, rd, Self::slot(depth + 1)?);
            }
            Expr::Call(Func::Abs, args) => {
                let tmp = Self::slot(depth + 1)?;
                self.expr(&args[0], depth)?;
                self.code.push(Instruction::OpImm {
                    op: AluOp::Sra,
                    rd: tmp,
                    rs1: rd,
                    imm: 31,
                });
                self.op(AluOp::Xor, rd, tmp);
                self.op(AluOp::Sub, rd, tmp);
            }
            Expr::Call(func @ (Func::Min | Func::Max), args) => {
                let other = Self::slot(depth + 1)?;
                self.expr(&args[0], depth)?;
                self.expr(&args[1], depth + 1)?;
                let keep = if *func == Func::Min {
                    BranchCond::Lt
                } else {
                    BranchCond::Ge
                };
                // Skip the copy when the left operand already wins.
                self.code.push(Instruction::Branch {
                    cond: keep,
                    rs1: rd,
                    rs2: other,
                    imm: 8,
                });
                self.mv(rd, other);
            }
        }
        Ok(())
    }
}
