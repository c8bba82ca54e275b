//! Typed expressions with simplifying constructors.
//!
//! The smart constructors (`Expr::and`, `Expr::binary`, ...) fold constants and
//! apply a small set of local rewrites. Symbolic execution relies on this to
//! detect infeasible guards and trivially true assertions without a solver.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Type;

static BOOL_TYPE: Type = Type::Bool;

/// Truncate `value` to its low `width` bits.
pub fn mask(value: u64, width: u32) -> u64 {
    if width >= 64 {
        value
    } else {
        value & ((1u64 << width) - 1)
    }
}

/// Interpret the low `width` bits of `value` as a two's complement number.
pub fn sign_extend(value: u64, width: u32) -> i64 {
    if width == 0 {
        return 0;
    }
    if width >= 64 {
        return value as i64;
    }
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    Neg,
    BitNot,
    /// Conversion to the expression's type.
    Cast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Implies,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }

    /// Operators whose operands and result share one bit-vector type.
    pub fn is_bitvector_op(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Div
                | BinaryOp::Rem
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Implies => "==>",
        }
    }
}

/// Expression over program variables (or SSA symbols after renaming).
///
/// Constants store their value truncated to the type width; booleans are the
/// constants 0 and 1 of type [`Type::Bool`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Symbol {
        name: String,
        ty: Type,
    },
    Constant {
        value: u64,
        ty: Type,
    },
    /// An unconstrained value, replaced by a fresh free symbol when executed.
    Nondet {
        ty: Type,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        ty: Type,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        ty: Type,
    },
    And {
        operands: Vec<Expr>,
    },
    Or {
        operands: Vec<Expr>,
    },
    Ite {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
        ty: Type,
    },
    Member {
        compound: Box<Expr>,
        component: String,
        ty: Type,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
        ty: Type,
    },
    StructLit {
        components: Vec<(String, Expr)>,
        ty: Type,
    },
    /// Copy of `compound` with one member replaced.
    WithMember {
        compound: Box<Expr>,
        component: String,
        value: Box<Expr>,
    },
    /// Copy of `array` with one element replaced.
    WithIndex {
        array: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn symbol(name: impl Into<String>, ty: Type) -> Self {
        Expr::Symbol {
            name: name.into(),
            ty,
        }
    }

    pub fn constant(value: u64, ty: Type) -> Self {
        let value = match &ty {
            Type::Bool => u64::from(value != 0),
            other => match other.scalar_width() {
                Some(width) => mask(value, width),
                None => value,
            },
        };
        Expr::Constant { value, ty }
    }

    /// Signed constant, stored in two's complement.
    pub fn signed(value: i64, ty: Type) -> Self {
        Expr::constant(value as u64, ty)
    }

    pub fn bool(value: bool) -> Self {
        Expr::Constant {
            value: u64::from(value),
            ty: Type::Bool,
        }
    }

    pub fn nondet(ty: Type) -> Self {
        Expr::Nondet { ty }
    }

    pub fn ty(&self) -> &Type {
        match self {
            Expr::Symbol { ty, .. }
            | Expr::Constant { ty, .. }
            | Expr::Nondet { ty }
            | Expr::Unary { ty, .. }
            | Expr::Binary { ty, .. }
            | Expr::Ite { ty, .. }
            | Expr::Member { ty, .. }
            | Expr::Index { ty, .. }
            | Expr::StructLit { ty, .. } => ty,
            Expr::And { .. } | Expr::Or { .. } => &BOOL_TYPE,
            Expr::WithMember { compound, .. } => compound.ty(),
            Expr::WithIndex { array, .. } => array.ty(),
        }
    }

    pub fn as_constant(&self) -> Option<u64> {
        match self {
            Expr::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Constant {
                value,
                ty: Type::Bool,
            } => Some(*value != 0),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.as_bool() == Some(false)
    }

    pub fn symbol_name(&self) -> Option<&str> {
        match self {
            Expr::Symbol { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn not(operand: Expr) -> Expr {
        match operand {
            Expr::Constant {
                value,
                ty: Type::Bool,
            } => Expr::bool(value == 0),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
                ..
            } => *operand,
            other => Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(other),
                ty: Type::Bool,
            },
        }
    }

    /// Conjunction. Nested conjunctions are flattened, duplicates dropped and
    /// a complementary pair collapses to false.
    pub fn and(operands: Vec<Expr>) -> Expr {
        Expr::junction(operands, true)
    }

    pub fn or(operands: Vec<Expr>) -> Expr {
        Expr::junction(operands, false)
    }

    fn junction(operands: Vec<Expr>, is_and: bool) -> Expr {
        let neutral = is_and;
        let mut flat: Vec<Expr> = Vec::with_capacity(operands.len());
        let mut stack: Vec<Expr> = operands.into_iter().rev().collect();
        while let Some(op) = stack.pop() {
            match op {
                Expr::And { operands } if is_and => stack.extend(operands.into_iter().rev()),
                Expr::Or { operands } if !is_and => stack.extend(operands.into_iter().rev()),
                other => match other.as_bool() {
                    Some(b) if b == neutral => {}
                    Some(_) => return Expr::bool(!neutral),
                    None => {
                        if !flat.contains(&other) {
                            flat.push(other);
                        }
                    }
                },
            }
        }
        for (i, a) in flat.iter().enumerate() {
            for b in &flat[i + 1..] {
                if is_negation_of(a, b) {
                    return Expr::bool(!neutral);
                }
            }
        }
        match flat.len() {
            0 => Expr::bool(neutral),
            1 => flat.pop().unwrap_or_else(|| Expr::bool(neutral)),
            _ if is_and => Expr::And { operands: flat },
            _ => Expr::Or { operands: flat },
        }
    }

    pub fn implies(lhs: Expr, rhs: Expr) -> Expr {
        if lhs.is_false() || rhs.is_true() {
            return Expr::bool(true);
        }
        if lhs.is_true() {
            return rhs;
        }
        if rhs.is_false() {
            return Expr::not(lhs);
        }
        if lhs == rhs && !lhs.contains_nondet() {
            return Expr::bool(true);
        }
        Expr::Binary {
            op: BinaryOp::Implies,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty: Type::Bool,
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            return Expr::bool(a == b);
        }
        if lhs == rhs && !lhs.contains_nondet() {
            return Expr::bool(true);
        }
        if lhs.ty().is_bool() {
            match (lhs.as_bool(), rhs.as_bool()) {
                (_, Some(true)) => return lhs,
                (_, Some(false)) => return Expr::not(lhs),
                (Some(true), _) => return rhs,
                (Some(false), _) => return Expr::not(rhs),
                _ => {}
            }
        }
        Expr::Binary {
            op: BinaryOp::Eq,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty: Type::Bool,
        }
    }

    pub fn ite(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        match cond.as_bool() {
            Some(true) => return then,
            Some(false) => return otherwise,
            None => {}
        }
        if then == otherwise && !then.contains_nondet() {
            return then;
        }
        if then.ty().is_bool() {
            match (then.as_bool(), otherwise.as_bool()) {
                (Some(true), Some(false)) => return cond,
                (Some(false), Some(true)) => return Expr::not(cond),
                _ => {}
            }
        }
        let ty = then.ty().clone();
        Expr::Ite {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
            ty,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        match op {
            BinaryOp::Eq => return Expr::eq(lhs, rhs),
            BinaryOp::NotEq => return Expr::not(Expr::eq(lhs, rhs)),
            BinaryOp::Implies => return Expr::implies(lhs, rhs),
            _ => {}
        }
        let ty = if op.is_comparison() {
            Type::Bool
        } else {
            lhs.ty().clone()
        };
        if let (Some(a), Some(b)) = (lhs.as_constant(), rhs.as_constant()) {
            if let Some(value) = fold_binary(op, lhs.ty(), a, b) {
                return Expr::constant(value, ty);
            }
        }
        let rhs_zero = rhs.as_constant() == Some(0);
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::BitOr | BinaryOp::BitXor if rhs_zero => {
                return lhs
            }
            BinaryOp::Shl | BinaryOp::Shr if rhs_zero => return lhs,
            BinaryOp::Add if lhs.as_constant() == Some(0) => return rhs,
            BinaryOp::Mul if rhs.as_constant() == Some(1) => return lhs,
            _ => {}
        }
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            ty,
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr, ty: Type) -> Expr {
        match op {
            UnaryOp::Not => Expr::not(operand),
            UnaryOp::Cast => Expr::cast(operand, ty),
            UnaryOp::Neg | UnaryOp::BitNot => {
                if let (Some(v), Some(width)) = (operand.as_constant(), ty.scalar_width()) {
                    let folded = match op {
                        UnaryOp::Neg => v.wrapping_neg(),
                        _ => !v,
                    };
                    return Expr::constant(mask(folded, width), ty);
                }
                Expr::Unary {
                    op,
                    operand: Box::new(operand),
                    ty,
                }
            }
        }
    }

    pub fn cast(operand: Expr, ty: Type) -> Expr {
        if operand.ty() == &ty {
            return operand;
        }
        if let Some(v) = operand.as_constant() {
            let source = operand.ty();
            let value = match (source, &ty) {
                (_, Type::Bool) => u64::from(v != 0),
                (Type::Signed(w), _) => sign_extend(v, *w) as u64,
                _ => v,
            };
            if ty.is_scalar() {
                return Expr::constant(value, ty);
            }
        }
        Expr::Unary {
            op: UnaryOp::Cast,
            operand: Box::new(operand),
            ty,
        }
    }

    pub fn member(compound: Expr, component: impl Into<String>, ty: Type) -> Expr {
        let component = component.into();
        match compound {
            Expr::StructLit { components, ty: lit_ty } => {
                match components.iter().position(|(name, _)| *name == component) {
                    Some(pos) => components
                        .into_iter()
                        .nth(pos)
                        .map(|(_, value)| value)
                        .unwrap_or_else(|| Expr::nondet(ty)),
                    None => Expr::Member {
                        compound: Box::new(Expr::StructLit {
                            components,
                            ty: lit_ty,
                        }),
                        component,
                        ty,
                    },
                }
            }
            Expr::WithMember {
                compound,
                component: updated,
                value,
            } => {
                if updated == component {
                    *value
                } else {
                    Expr::member(*compound, component, ty)
                }
            }
            other => Expr::Member {
                compound: Box::new(other),
                component,
                ty,
            },
        }
    }

    pub fn index(array: Expr, index: Expr) -> Expr {
        let ty = array.ty().element().cloned().unwrap_or(Type::Bool);
        match array {
            Expr::WithIndex {
                array: inner,
                index: updated,
                value,
            } => {
                if *updated == index && !index.contains_nondet() {
                    return *value;
                }
                match (updated.as_constant(), index.as_constant()) {
                    (Some(a), Some(b)) if a != b => Expr::index(*inner, index),
                    _ => Expr::Index {
                        array: Box::new(Expr::WithIndex {
                            array: inner,
                            index: updated,
                            value,
                        }),
                        index: Box::new(index),
                        ty,
                    },
                }
            }
            other => Expr::Index {
                array: Box::new(other),
                index: Box::new(index),
                ty,
            },
        }
    }

    pub fn struct_lit(components: Vec<(String, Expr)>, ty: Type) -> Expr {
        Expr::StructLit { components, ty }
    }

    pub fn with_member(compound: Expr, component: impl Into<String>, value: Expr) -> Expr {
        Expr::WithMember {
            compound: Box::new(compound),
            component: component.into(),
            value: Box::new(value),
        }
    }

    pub fn with_index(array: Expr, index: Expr, value: Expr) -> Expr {
        Expr::WithIndex {
            array: Box::new(array),
            index: Box::new(index),
            value: Box::new(value),
        }
    }

    /// Rebuild the expression bottom-up through the smart constructors.
    ///
    /// `f` is consulted first at every node; returning `Some` replaces the
    /// whole subtree without descending into it.
    pub fn rewrite<F>(&self, f: &mut F) -> Expr
    where
        F: FnMut(&Expr) -> Option<Expr>,
    {
        if let Some(replacement) = f(self) {
            return replacement;
        }
        match self {
            Expr::Symbol { .. } | Expr::Constant { .. } | Expr::Nondet { .. } => self.clone(),
            Expr::Unary { op, operand, ty } => Expr::unary(*op, operand.rewrite(f), ty.clone()),
            Expr::Binary { op, lhs, rhs, .. } => Expr::binary(*op, lhs.rewrite(f), rhs.rewrite(f)),
            Expr::And { operands } => Expr::and(operands.iter().map(|o| o.rewrite(f)).collect()),
            Expr::Or { operands } => Expr::or(operands.iter().map(|o| o.rewrite(f)).collect()),
            Expr::Ite {
                cond,
                then,
                otherwise,
                ..
            } => Expr::ite(cond.rewrite(f), then.rewrite(f), otherwise.rewrite(f)),
            Expr::Member {
                compound,
                component,
                ty,
            } => Expr::member(compound.rewrite(f), component.clone(), ty.clone()),
            Expr::Index { array, index, .. } => Expr::index(array.rewrite(f), index.rewrite(f)),
            Expr::StructLit { components, ty } => Expr::struct_lit(
                components
                    .iter()
                    .map(|(name, value)| (name.clone(), value.rewrite(f)))
                    .collect(),
                ty.clone(),
            ),
            Expr::WithMember {
                compound,
                component,
                value,
            } => Expr::with_member(compound.rewrite(f), component.clone(), value.rewrite(f)),
            Expr::WithIndex {
                array,
                index,
                value,
            } => Expr::with_index(array.rewrite(f), index.rewrite(f), value.rewrite(f)),
        }
    }

    pub fn simplify(&self) -> Expr {
        self.rewrite(&mut |_| None)
    }

    /// Replace symbols by name. Symbols for which `f` returns `None` are kept.
    pub fn rename_symbols<F>(&self, f: &mut F) -> Expr
    where
        F: FnMut(&str, &Type) -> Option<Expr>,
    {
        self.rewrite(&mut |e| match e {
            Expr::Symbol { name, ty } => f(name, ty),
            _ => None,
        })
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Symbol { .. } | Expr::Constant { .. } | Expr::Nondet { .. } => Vec::new(),
            Expr::Unary { operand, .. } => vec![operand],
            Expr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            Expr::And { operands } | Expr::Or { operands } => operands.iter().collect(),
            Expr::Ite {
                cond,
                then,
                otherwise,
                ..
            } => vec![cond, then, otherwise],
            Expr::Member { compound, .. } => vec![compound],
            Expr::Index { array, index, .. } => vec![array, index],
            Expr::StructLit { components, .. } => components.iter().map(|(_, v)| v).collect(),
            Expr::WithMember {
                compound, value, ..
            } => vec![compound, value],
            Expr::WithIndex {
                array,
                index,
                value,
            } => vec![array, index, value],
        }
    }

    pub fn for_each_symbol<F>(&self, f: &mut F)
    where
        F: FnMut(&str, &Type),
    {
        if let Expr::Symbol { name, ty } = self {
            f(name, ty);
        }
        for child in self.children() {
            child.for_each_symbol(f);
        }
    }

    pub fn contains_nondet(&self) -> bool {
        matches!(self, Expr::Nondet { .. }) || self.children().iter().any(|c| c.contains_nondet())
    }

    /// Number of nodes.
    pub fn size(&self) -> usize {
        1 + self.children().iter().map(|c| c.size()).sum::<usize>()
    }
}

fn is_negation_of(a: &Expr, b: &Expr) -> bool {
    let negates = |x: &Expr, y: &Expr| {
        matches!(x, Expr::Unary { op: UnaryOp::Not, operand, .. } if operand.as_ref() == y)
    };
    negates(a, b) || negates(b, a)
}

fn fold_binary(op: BinaryOp, operand_ty: &Type, a: u64, b: u64) -> Option<u64> {
    let width = operand_ty.scalar_width()?;
    if width > 64 {
        return None;
    }
    let signed = operand_ty.is_signed();
    let (sa, sb) = (sign_extend(a, width), sign_extend(b, width));
    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return None,
        BinaryOp::Div if signed => sa.wrapping_div(sb) as u64,
        BinaryOp::Div => a / b,
        BinaryOp::Rem if signed => sa.wrapping_rem(sb) as u64,
        BinaryOp::Rem => a % b,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl if b >= u64::from(width) => 0,
        BinaryOp::Shl => a << b,
        BinaryOp::Shr if signed => {
            let amount = b.min(u64::from(width) - 1);
            (sa >> amount) as u64
        }
        BinaryOp::Shr if b >= u64::from(width) => 0,
        BinaryOp::Shr => a >> b,
        BinaryOp::Lt => u64::from(if signed { sa < sb } else { a < b }),
        BinaryOp::Le => u64::from(if signed { sa <= sb } else { a <= b }),
        BinaryOp::Gt => u64::from(if signed { sa > sb } else { a > b }),
        BinaryOp::Ge => u64::from(if signed { sa >= sb } else { a >= b }),
        BinaryOp::Eq => u64::from(a == b),
        BinaryOp::NotEq => u64::from(a != b),
        BinaryOp::Implies => u64::from(a == 0 || b != 0),
    };
    Some(if op.is_comparison() {
        value
    } else {
        mask(value, width)
    })
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Symbol { name, .. } => write!(f, "{name}"),
            Expr::Constant { value, ty } => match ty {
                Type::Bool => write!(f, "{}", *value != 0),
                Type::Signed(w) => write!(f, "{}", sign_extend(*value, *w)),
                _ => write!(f, "{value}"),
            },
            Expr::Nondet { ty } => write!(f, "nondet<{ty}>"),
            Expr::Unary { op, operand, ty } => match op {
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::Neg => write!(f, "-{operand}"),
                UnaryOp::BitNot => write!(f, "~{operand}"),
                UnaryOp::Cast => write!(f, "({ty}){operand}"),
            },
            Expr::Binary { op, lhs, rhs, .. } => write!(f, "({lhs} {} {rhs})", op.symbol()),
            Expr::And { operands } | Expr::Or { operands } => {
                let sep = if matches!(self, Expr::And { .. }) {
                    " && "
                } else {
                    " || "
                };
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{sep}")?;
                    }
                    write!(f, "{operand}")?;
                }
                write!(f, ")")
            }
            Expr::Ite {
                cond,
                then,
                otherwise,
                ..
            } => write!(f, "({cond} ? {then} : {otherwise})"),
            Expr::Member {
                compound,
                component,
                ..
            } => write!(f, "{compound}.{component}"),
            Expr::Index { array, index, .. } => write!(f, "{array}[{index}]"),
            Expr::StructLit { components, .. } => {
                write!(f, "{{")?;
                for (i, (name, value)) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, ".{name} = {value}")?;
                }
                write!(f, "}}")
            }
            Expr::WithMember {
                compound,
                component,
                value,
            } => write!(f, "({compound} with .{component} = {value})"),
            Expr::WithIndex {
                array,
                index,
                value,
            } => write!(f, "({array} with [{index}] = {value})"),
        }
    }
}
