/// Bit-vector operations with a bit-vector result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
}

impl BvOp {
    pub fn smtlib_name(self) -> &'static str {
        match self {
            BvOp::Add => "bvadd",
            BvOp::Sub => "bvsub",
            BvOp::Mul => "bvmul",
            BvOp::UDiv => "bvudiv",
            BvOp::SDiv => "bvsdiv",
            BvOp::URem => "bvurem",
            BvOp::SRem => "bvsrem",
            BvOp::And => "bvand",
            BvOp::Or => "bvor",
            BvOp::Xor => "bvxor",
            BvOp::Shl => "bvshl",
            BvOp::LShr => "bvlshr",
            BvOp::AShr => "bvashr",
        }
    }
}

/// Bit-vector comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvCmp {
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl BvCmp {
    pub fn smtlib_name(self) -> &'static str {
        match self {
            BvCmp::Ult => "bvult",
            BvCmp::Ule => "bvule",
            BvCmp::Ugt => "bvugt",
            BvCmp::Uge => "bvuge",
            BvCmp::Slt => "bvslt",
            BvCmp::Sle => "bvsle",
            BvCmp::Sgt => "bvsgt",
            BvCmp::Sge => "bvsge",
        }
    }
}

/// Abstract SMT term representation, solver-agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtTerm {
    /// Variable reference by name.
    Var(String),
    BoolLit(bool),
    BvLit { value: u64, width: u32 },

    // Boolean logic
    And(Vec<SmtTerm>),
    Or(Vec<SmtTerm>),
    Not(Box<SmtTerm>),
    Implies(Box<SmtTerm>, Box<SmtTerm>),

    Eq(Box<SmtTerm>, Box<SmtTerm>),
    Ite(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),

    // Bit-vectors
    BvNeg(Box<SmtTerm>),
    BvNot(Box<SmtTerm>),
    BvBin(BvOp, Box<SmtTerm>, Box<SmtTerm>),
    BvCmp(BvCmp, Box<SmtTerm>, Box<SmtTerm>),
    /// Bits `high..=low` of the operand.
    Extract { high: u32, low: u32, term: Box<SmtTerm> },
    /// Concatenation; the first operand ends up in the most significant bits.
    Concat(Vec<SmtTerm>),
    ZeroExt { extra: u32, term: Box<SmtTerm> },
    SignExt { extra: u32, term: Box<SmtTerm> },

    // Arrays
    Select(Box<SmtTerm>, Box<SmtTerm>),
    Store(Box<SmtTerm>, Box<SmtTerm>, Box<SmtTerm>),
}

#[allow(clippy::should_implement_trait)]
impl SmtTerm {
    pub fn var(name: impl Into<String>) -> Self {
        SmtTerm::Var(name.into())
    }

    pub fn bool(b: bool) -> Self {
        SmtTerm::BoolLit(b)
    }

    pub fn bv(value: u64, width: u32) -> Self {
        let value = if width >= 64 {
            value
        } else {
            value & ((1u64 << width) - 1)
        };
        SmtTerm::BvLit { value, width }
    }

    pub fn and(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::And(terms)
    }

    pub fn or(terms: Vec<SmtTerm>) -> Self {
        SmtTerm::Or(terms)
    }

    pub fn not(self) -> Self {
        SmtTerm::Not(Box::new(self))
    }

    pub fn implies(self, other: SmtTerm) -> Self {
        SmtTerm::Implies(Box::new(self), Box::new(other))
    }

    pub fn eq(self, other: SmtTerm) -> Self {
        SmtTerm::Eq(Box::new(self), Box::new(other))
    }

    pub fn ite(cond: SmtTerm, then: SmtTerm, otherwise: SmtTerm) -> Self {
        SmtTerm::Ite(Box::new(cond), Box::new(then), Box::new(otherwise))
    }

    pub fn bv_bin(self, op: BvOp, other: SmtTerm) -> Self {
        SmtTerm::BvBin(op, Box::new(self), Box::new(other))
    }

    pub fn bv_cmp(self, op: BvCmp, other: SmtTerm) -> Self {
        SmtTerm::BvCmp(op, Box::new(self), Box::new(other))
    }

    pub fn extract(self, high: u32, low: u32) -> Self {
        SmtTerm::Extract {
            high,
            low,
            term: Box::new(self),
        }
    }

    pub fn zero_ext(self, extra: u32) -> Self {
        if extra == 0 {
            return self;
        }
        SmtTerm::ZeroExt {
            extra,
            term: Box::new(self),
        }
    }

    pub fn sign_ext(self, extra: u32) -> Self {
        if extra == 0 {
            return self;
        }
        SmtTerm::SignExt {
            extra,
            term: Box::new(self),
        }
    }

    pub fn select(self, index: SmtTerm) -> Self {
        SmtTerm::Select(Box::new(self), Box::new(index))
    }

    pub fn store(self, index: SmtTerm, value: SmtTerm) -> Self {
        SmtTerm::Store(Box::new(self), Box::new(index), Box::new(value))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SmtTerm::BoolLit(b) => Some(*b),
            _ => None,
        }
    }
}
