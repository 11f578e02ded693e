//! IR instruction definitions

use super::types::LlType;
use std::fmt;

/// Reference to a block of the enclosing function definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(pub u32);

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%B{}", self.0)
    }
}

/// Operand of an instruction
#[derive(Debug, Clone, PartialEq)]
pub enum LlValue {
    /// Result of an instruction or phi (`%N`)
    Local(u32),
    /// Function argument (`%argN`)
    Arg(u32),
    /// Integer constant
    Int(i64),
    /// Floating point constant
    Float(f64),
    /// `true` / `false`
    Bool(bool),
    /// Null pointer
    Null,
    /// Undefined value
    Undef,
    /// Global symbol (`@name`)
    Global(String),
}

impl fmt::Display for LlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlValue::Local(n) => write!(f, "%{}", n),
            LlValue::Arg(n) => write!(f, "%arg{}", n),
            LlValue::Int(v) => write!(f, "{}", v),
            LlValue::Float(v) => write!(f, "{:e}", v),
            LlValue::Bool(v) => write!(f, "{}", v),
            LlValue::Null => write!(f, "null"),
            LlValue::Undef => write!(f, "undef"),
            LlValue::Global(name) => write!(f, "@\"{}\"", name),
        }
    }
}

/// Two-operand operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    And,
    Or,
    Xor,
    Shl,
    AShr,
    LShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl BinOp {
    /// Textual opcode
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::UDiv => "udiv",
            BinOp::SRem => "srem",
            BinOp::URem => "urem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::AShr => "ashr",
            BinOp::LShr => "lshr",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
            BinOp::FRem => "frem",
        }
    }
}

/// Integer comparison conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ICmpCond {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl ICmpCond {
    /// Textual condition code
    pub fn mnemonic(self) -> &'static str {
        match self {
            ICmpCond::Eq => "eq",
            ICmpCond::Ne => "ne",
            ICmpCond::Slt => "slt",
            ICmpCond::Sle => "sle",
            ICmpCond::Sgt => "sgt",
            ICmpCond::Sge => "sge",
            ICmpCond::Ult => "ult",
            ICmpCond::Ule => "ule",
            ICmpCond::Ugt => "ugt",
            ICmpCond::Uge => "uge",
        }
    }
}

/// Ordered float comparison conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FCmpCond {
    Oeq,
    One,
    Olt,
    Ole,
    Ogt,
    Oge,
}

impl FCmpCond {
    /// Textual condition code
    pub fn mnemonic(self) -> &'static str {
        match self {
            FCmpCond::Oeq => "oeq",
            FCmpCond::One => "one",
            FCmpCond::Olt => "olt",
            FCmpCond::Ole => "ole",
            FCmpCond::Ogt => "ogt",
            FCmpCond::Oge => "oge",
        }
    }
}

/// Conversion opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastOp {
    Sext,
    Zext,
    Trunc,
    FpExt,
    FpTrunc,
    FpToSi,
    FpToUi,
    SiToFp,
    UiToFp,
    Bitcast,
}

impl CastOp {
    /// Textual opcode
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::Sext => "sext",
            CastOp::Zext => "zext",
            CastOp::Trunc => "trunc",
            CastOp::FpExt => "fpext",
            CastOp::FpTrunc => "fptrunc",
            CastOp::FpToSi => "fptosi",
            CastOp::FpToUi => "fptoui",
            CastOp::SiToFp => "sitofp",
            CastOp::UiToFp => "uitofp",
            CastOp::Bitcast => "bitcast",
        }
    }
}

/// Atomic ordering of a memory instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOrdering {
    Acquire,
    Release,
    SeqCst,
}

impl fmt::Display for AtomicOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicOrdering::Acquire => write!(f, "acquire"),
            AtomicOrdering::Release => write!(f, "release"),
            AtomicOrdering::SeqCst => write!(f, "seq_cst"),
        }
    }
}

/// Non-phi, non-terminator instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `%result = op ty lhs, rhs`
    Binary {
        result: u32,
        op: BinOp,
        ty: LlType,
        lhs: LlValue,
        rhs: LlValue,
    },
    /// `%result = icmp cond ty lhs, rhs`
    ICmp {
        result: u32,
        cond: ICmpCond,
        ty: LlType,
        lhs: LlValue,
        rhs: LlValue,
    },
    /// `%result = fcmp cond ty lhs, rhs`
    FCmp {
        result: u32,
        cond: FCmpCond,
        ty: LlType,
        lhs: LlValue,
        rhs: LlValue,
    },
    /// `%result = fneg ty value`
    FNeg {
        result: u32,
        ty: LlType,
        value: LlValue,
    },
    /// `%result = op from value to to`
    Cast {
        result: u32,
        op: CastOp,
        from: LlType,
        value: LlValue,
        to: LlType,
    },
    /// `%result = select i1 cond, ty a, ty b`
    Select {
        result: u32,
        condition: LlValue,
        ty: LlType,
        if_true: LlValue,
        if_false: LlValue,
    },
    /// `%result = load [atomic] ty, ty* ptr [ordering]`
    Load {
        result: u32,
        ty: LlType,
        ptr: LlValue,
        ordering: Option<AtomicOrdering>,
    },
    /// `store [atomic] ty value, ty* ptr [ordering]`
    Store {
        ty: LlType,
        value: LlValue,
        ptr: LlValue,
        ordering: Option<AtomicOrdering>,
    },
    /// `fence ordering`
    Fence { ordering: AtomicOrdering },
    /// `[%result =] call ret @callee(args)`
    Call {
        result: Option<u32>,
        ret: LlType,
        callee: String,
        args: Vec<(LlType, LlValue)>,
    },
}

/// Phi at the head of a block
#[derive(Debug, Clone, PartialEq)]
pub struct Phi {
    /// Result local
    pub result: u32,
    /// Type of every incoming value
    pub ty: LlType,
    /// (value, predecessor) pairs
    pub incoming: Vec<(LlValue, BlockRef)>,
}

impl Phi {
    /// Add an incoming item
    pub fn item(&mut self, value: LlValue, from: BlockRef) {
        self.incoming.push((value, from));
    }
}

/// Block terminator
#[derive(Debug, Clone, PartialEq)]
pub enum TerminatorInst {
    /// `br label %target`
    Br(BlockRef),
    /// `br i1 cond, label %t, label %f`
    CondBr {
        condition: LlValue,
        if_true: BlockRef,
        if_false: BlockRef,
    },
    /// `ret void`
    Ret,
    /// `ret ty value`
    RetValue { ty: LlType, value: LlValue },
    /// `unreachable`
    Unreachable,
}
