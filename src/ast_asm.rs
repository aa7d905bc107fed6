//! AST for x86_64 assembly
//!
//! ASDL:
//!   program = Program(function_definition)
//!   function_definition = Function(identifier name, instruction* instructions)
//!   instruction = Mov(operand src, operand dst)
//!               | Unary(unary_operator, operand)
//!               | Binary(binary_operator, operand, operand)
//!               | Cmp(operand, operand)
//!               | Idiv(operand)
//!               | Cdq
//!               | Jmp(identifier)
//!               | JmpCC(cond_code, identifier)
//!               | SetCC(cond_code, operand)
//!               | Label(identifier)
//!               | AllocateStack(int)
//!               | Ret
//!   unary_operator = Neg | Not
//!   binary_operator = Add | Sub | Mult
//!   operand = Imm(int) | Reg(reg) | Pseudo(identifier) | Stack(int)
//!   cond_code = E | NE | L | LE | G | GE
//!   reg = AX | DX | R10 | R11
//!
//! Register Usage:
//!
//!   AX: return value / idiv quotient
//!   DX: division remainder
//!   R10: scratch, source operand of rewritten instructions
//!   R11: scratch, destination operand of rewritten instructions

use crate::emitter::abi::LABEL_PREFIX;
use crate::lexer::Constant;
use std::fmt::{Display, Formatter};

pub(crate) const STACK_SLOT_SIZE: usize = 4; // 4 bytes per temporary variable
pub(crate) const ABI_STACK_ALIGNMENT: usize = 16; // 16 byte alignment for stack

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct Program {
    pub(crate) function_definition: Function,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct Function {
    pub(crate) name: Identifier,
    pub(crate) instructions: Vec<Instruction>,
    /// Frame size in bytes, known after stack allocation
    pub(crate) stack_size: Option<usize>,
}

#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub(crate) struct Identifier(pub(crate) String);

impl Identifier {
    pub(crate) fn as_label_symbol(&self) -> String {
        format!("{LABEL_PREFIX}{}", self.0)
    }
}

impl<T> From<T> for Identifier
where
    T: Into<String>,
{
    fn from(value: T) -> Self {
        Identifier(value.into())
    }
}

/// Stack offset in bytes, relative to the frame base pointer
#[derive(Debug, PartialEq, Clone, Copy, Hash, Eq)]
pub(crate) struct Offset(pub(crate) isize);

impl Display for Offset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{0}", self.0)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum Instruction {
    Mov {
        src: Operand,
        dst: Operand,
    },
    Unary {
        op: UnaryOperator,
        dst: Operand,
    },
    Binary {
        op: BinaryOperator,
        src: Operand,
        dst: Operand,
    },
    Cmp {
        src1: Operand,
        src2: Operand,
    },
    Idiv(Operand),
    Cdq,
    Jmp {
        target: Identifier,
    },
    JmpCC {
        cc: ConditionCode,
        target: Identifier,
    },
    SetCC {
        cc: ConditionCode,
        dst: Operand,
    },
    Label(Identifier),
    /// Allocate stack space in bytes
    AllocateStack(usize),
    Ret,
}

impl Instruction {
    pub(crate) fn emit(&self) -> String {
        match self {
            Instruction::Mov { src, dst } => format!("movl {src}, {dst}"),
            Instruction::Unary { op, dst } => format!("{op} {dst}"),
            Instruction::Binary { op, src, dst } => format!("{op} {src}, {dst}"),
            Instruction::Cmp { src1, src2 } => format!("cmpl {src1}, {src2}"),
            Instruction::Idiv(src) => format!("idivl {src}"),
            Instruction::Cdq => "cdq".into(),
            Instruction::Jmp { target } => format!("jmp {}", target.as_label_symbol()),
            Instruction::JmpCC { cc, target } => {
                format!("j{cc} {}", target.as_label_symbol())
            }
            Instruction::SetCC { cc, dst } => match dst {
                // setcc writes a single byte
                Operand::Reg(r) => format!("set{cc} %{}", r.one_byte()),
                Operand::Stack(offset) => format!("set{cc} {offset}(%rbp)"),
                _ => panic!("Invalid operand for SetCC: {dst:?}"),
            },
            Instruction::Label(label) => format!("{}:", label.as_label_symbol()),
            Instruction::AllocateStack(size) => format!("subq ${size}, %rsp"),
            Instruction::Ret => "ret".into(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum UnaryOperator {
    Neg,
    Not,
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Neg => write!(f, "negl"),
            UnaryOperator::Not => write!(f, "notl"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum BinaryOperator {
    Add,
    Sub,
    Mult,
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Add => write!(f, "addl"),
            BinaryOperator::Sub => write!(f, "subl"),
            BinaryOperator::Mult => write!(f, "imull"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum Operand {
    Imm(Constant),
    Reg(Reg),
    Pseudo(Identifier),
    Stack(Offset),
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Imm(i) => write!(f, "${i}"),
            Operand::Reg(reg) => write!(f, "%{reg}"),
            Operand::Pseudo(id) => panic!("Pseudo operand {} survived stack allocation", id.0),
            Operand::Stack(n) => write!(f, "{n}(%rbp)"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub(crate) enum Reg {
    AX,
    DX,
    R10,
    R11,
}

impl Display for Reg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // 32-bit registers
        match self {
            Reg::AX => write!(f, "eax"),
            Reg::DX => write!(f, "edx"),
            Reg::R10 => write!(f, "r10d"),
            Reg::R11 => write!(f, "r11d"),
        }
    }
}

impl Reg {
    pub(crate) fn one_byte(&self) -> &'static str {
        match self {
            Reg::AX => "al",
            Reg::DX => "dl",
            Reg::R10 => "r10b",
            Reg::R11 => "r11b",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConditionCode {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl Display for ConditionCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionCode::Equal => write!(f, "e"),
            ConditionCode::NotEqual => write!(f, "ne"),
            ConditionCode::LessThan => write!(f, "l"),
            ConditionCode::LessOrEqual => write!(f, "le"),
            ConditionCode::GreaterThan => write!(f, "g"),
            ConditionCode::GreaterOrEqual => write!(f, "ge"),
        }
    }
}
