//! Translation of IR expressions into solver terms.

use bmcheck_ir::expr::{BinaryOp, Expr, UnaryOp};
use bmcheck_ir::types::Type;
use indexmap::IndexMap;

use crate::error::EncodingError;
use crate::sorts::SmtSort;
use crate::struct_encoding::StructEncoder;
use crate::terms::{BvCmp, BvOp, SmtTerm};

/// A translated expression together with the symbols it mentions.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub term: SmtTerm,
    pub declarations: Vec<(String, SmtSort)>,
}

pub struct ExprEncoder<'e, 't> {
    structs: &'e StructEncoder<'t>,
}

impl<'e, 't> ExprEncoder<'e, 't> {
    pub fn new(structs: &'e StructEncoder<'t>) -> Self {
        Self { structs }
    }

    pub fn translate(&self, expr: &Expr) -> Result<Translation, EncodingError> {
        let mut decls = IndexMap::new();
        let term = self.translate_into(expr, &mut decls)?;
        Ok(Translation {
            term,
            declarations: decls.into_iter().collect(),
        })
    }

    /// Translate a boolean expression, rejecting other sorts.
    pub fn translate_bool(&self, expr: &Expr) -> Result<Translation, EncodingError> {
        if !expr.ty().is_bool() {
            return Err(EncodingError::SortMismatch(format!(
                "expected a boolean expression, found `{}`",
                expr.ty()
            )));
        }
        self.translate(expr)
    }

    /// Translate, recording each symbol's sort in `decls`.
    pub fn translate_into(
        &self,
        expr: &Expr,
        decls: &mut IndexMap<String, SmtSort>,
    ) -> Result<SmtTerm, EncodingError> {
        match expr {
            Expr::Symbol { name, ty } => {
                let sort = self.structs.sort_of(ty)?;
                match decls.get(name) {
                    Some(existing) if *existing != sort => {
                        return Err(EncodingError::SortMismatch(format!(
                            "symbol `{name}` used as {existing} and {sort}"
                        )));
                    }
                    Some(_) => {}
                    None => {
                        decls.insert(name.clone(), sort);
                    }
                }
                Ok(SmtTerm::var(name.clone()))
            }
            Expr::Constant { value, ty } => match ty {
                Type::Bool => Ok(SmtTerm::bool(*value != 0)),
                Type::Array { .. } => Err(EncodingError::Unsupported(
                    "array constants".into(),
                )),
                other => Ok(SmtTerm::bv(*value, self.structs.width_of(other)?)),
            },
            Expr::Nondet { ty } => Err(EncodingError::Unsupported(format!(
                "nondeterministic `{ty}` left in an executed expression"
            ))),
            Expr::Unary { op, operand, ty } => {
                let inner = self.translate_into(operand, decls)?;
                match op {
                    UnaryOp::Not => Ok(inner.not()),
                    UnaryOp::Neg => Ok(SmtTerm::BvNeg(Box::new(inner))),
                    UnaryOp::BitNot => Ok(SmtTerm::BvNot(Box::new(inner))),
                    UnaryOp::Cast => self.cast(inner, operand.ty(), ty),
                }
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                let l = self.translate_into(lhs, decls)?;
                let r = self.translate_into(rhs, decls)?;
                self.binary(*op, l, r, lhs.ty(), rhs.ty())
            }
            Expr::And { operands } => Ok(SmtTerm::and(
                operands
                    .iter()
                    .map(|o| self.translate_into(o, decls))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Or { operands } => Ok(SmtTerm::or(
                operands
                    .iter()
                    .map(|o| self.translate_into(o, decls))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::Ite {
                cond,
                then,
                otherwise,
                ..
            } => Ok(SmtTerm::ite(
                self.translate_into(cond, decls)?,
                self.translate_into(then, decls)?,
                self.translate_into(otherwise, decls)?,
            )),
            Expr::Member {
                compound,
                component,
                ty,
            } => {
                let id = match compound.ty() {
                    Type::Struct(id) => *id,
                    other => {
                        return Err(EncodingError::SortMismatch(format!(
                            "member `{component}` of non-struct `{other}`"
                        )))
                    }
                };
                let (offset, width) = self.structs.member_offset(id, component)?;
                let bits = self
                    .translate_into(compound, decls)?
                    .extract(offset + width - 1, offset);
                Ok(from_bits(bits, ty))
            }
            Expr::Index { array, index, .. } => {
                let a = self.translate_into(array, decls)?;
                let i = self.index_term(array.ty(), index, decls)?;
                Ok(a.select(i))
            }
            Expr::StructLit { components, ty } => {
                let Type::Struct(id) = ty else {
                    return Err(EncodingError::SortMismatch(format!(
                        "struct literal of type `{ty}`"
                    )));
                };
                let layout = self.structs.layout(*id)?;
                let mut parts = Vec::with_capacity(components.len());
                for member in &layout.members {
                    let value = components
                        .iter()
                        .find(|(name, _)| *name == member.name)
                        .map(|(_, value)| value)
                        .ok_or_else(|| {
                            EncodingError::Unsupported(format!(
                                "struct literal lacks member `{}`",
                                member.name
                            ))
                        })?;
                    parts.push(to_bits(self.translate_into(value, decls)?, &member.ty));
                }
                Ok(concat(parts))
            }
            Expr::WithMember {
                compound,
                component,
                value,
            } => {
                let id = match compound.ty() {
                    Type::Struct(id) => *id,
                    other => {
                        return Err(EncodingError::SortMismatch(format!(
                            "member update on non-struct `{other}`"
                        )))
                    }
                };
                let layout = self.structs.layout(id)?;
                let (offset, width) = self.structs.member_offset(id, component)?;
                let whole = self.translate_into(compound, decls)?;
                let new_bits = to_bits(self.translate_into(value, decls)?, value.ty());
                let mut parts = Vec::with_capacity(3);
                if offset + width < layout.width {
                    parts.push(whole.clone().extract(layout.width - 1, offset + width));
                }
                parts.push(new_bits);
                if offset > 0 {
                    parts.push(whole.extract(offset - 1, 0));
                }
                Ok(concat(parts))
            }
            Expr::WithIndex {
                array,
                index,
                value,
            } => {
                let a = self.translate_into(array, decls)?;
                let i = self.index_term(array.ty(), index, decls)?;
                let v = self.translate_into(value, decls)?;
                Ok(a.store(i, v))
            }
        }
    }

    fn index_term(
        &self,
        array_ty: &Type,
        index: &Expr,
        decls: &mut IndexMap<String, SmtSort>,
    ) -> Result<SmtTerm, EncodingError> {
        let target = match self.structs.sort_of(array_ty)? {
            SmtSort::Array(index_sort, _) => index_sort.bv_width().ok_or_else(|| {
                EncodingError::SortMismatch(format!("array `{array_ty}` has a non bit-vector index"))
            })?,
            other => {
                return Err(EncodingError::SortMismatch(format!(
                    "indexing into non-array sort {other}"
                )))
            }
        };
        let term = self.translate_into(index, decls)?;
        let width = self.structs.width_of(index.ty())?;
        Ok(resize(term, width, target, index.ty().is_signed()))
    }

    fn cast(&self, term: SmtTerm, from: &Type, to: &Type) -> Result<SmtTerm, EncodingError> {
        match (from, to) {
            (Type::Bool, Type::Bool) => Ok(term),
            (Type::Bool, _) => {
                let width = self.structs.width_of(to)?;
                Ok(SmtTerm::ite(term, SmtTerm::bv(1, width), SmtTerm::bv(0, width)))
            }
            (_, Type::Bool) => {
                let width = self.structs.width_of(from)?;
                Ok(term.eq(SmtTerm::bv(0, width)).not())
            }
            _ => {
                let source = self.structs.width_of(from)?;
                let target = self.structs.width_of(to)?;
                Ok(resize(term, source, target, from.is_signed()))
            }
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        l: SmtTerm,
        r: SmtTerm,
        lhs_ty: &Type,
        rhs_ty: &Type,
    ) -> Result<SmtTerm, EncodingError> {
        let signed = lhs_ty.is_signed();
        let bv = |op: BvOp| Ok(l.clone().bv_bin(op, r.clone()));
        let cmp = |unsigned: BvCmp, signed_op: BvCmp| {
            Ok(l.clone().bv_cmp(if signed { signed_op } else { unsigned }, r.clone()))
        };
        match op {
            BinaryOp::Add => bv(BvOp::Add),
            BinaryOp::Sub => bv(BvOp::Sub),
            BinaryOp::Mul => bv(BvOp::Mul),
            BinaryOp::Div => bv(if signed { BvOp::SDiv } else { BvOp::UDiv }),
            BinaryOp::Rem => bv(if signed { BvOp::SRem } else { BvOp::URem }),
            BinaryOp::BitAnd => bv(BvOp::And),
            BinaryOp::BitOr => bv(BvOp::Or),
            BinaryOp::BitXor => bv(BvOp::Xor),
            BinaryOp::Shl | BinaryOp::Shr => {
                let width = self.structs.width_of(lhs_ty)?;
                let amount_width = self.structs.width_of(rhs_ty)?;
                let arithmetic = signed && op == BinaryOp::Shr;
                let op = match op {
                    BinaryOp::Shl => BvOp::Shl,
                    _ if arithmetic => BvOp::AShr,
                    _ => BvOp::LShr,
                };
                // Amounts are unsigned. A wider amount may exceed the width of
                // the value, so shift at the amount's width and keep the low
                // bits.
                if amount_width > width {
                    let widened = resize(l, width, amount_width, arithmetic);
                    return Ok(widened.bv_bin(op, r).extract(width - 1, 0));
                }
                let amount = resize(r, amount_width, width, false);
                Ok(l.bv_bin(op, amount))
            }
            BinaryOp::Eq => Ok(l.eq(r)),
            BinaryOp::NotEq => Ok(l.eq(r).not()),
            BinaryOp::Lt => cmp(BvCmp::Ult, BvCmp::Slt),
            BinaryOp::Le => cmp(BvCmp::Ule, BvCmp::Sle),
            BinaryOp::Gt => cmp(BvCmp::Ugt, BvCmp::Sgt),
            BinaryOp::Ge => cmp(BvCmp::Uge, BvCmp::Sge),
            BinaryOp::Implies => Ok(l.implies(r)),
        }
    }
}

/// Change a bit-vector's width by extension or truncation.
fn resize(term: SmtTerm, from: u32, to: u32, signed: bool) -> SmtTerm {
    use std::cmp::Ordering;
    match to.cmp(&from) {
        Ordering::Equal => term,
        Ordering::Greater if signed => term.sign_ext(to - from),
        Ordering::Greater => term.zero_ext(to - from),
        Ordering::Less => term.extract(to - 1, 0),
    }
}

/// Bits of a struct member value as stored in the enclosing bit-vector.
fn to_bits(term: SmtTerm, ty: &Type) -> SmtTerm {
    if ty.is_bool() {
        SmtTerm::ite(term, SmtTerm::bv(1, 1), SmtTerm::bv(0, 1))
    } else {
        term
    }
}

fn from_bits(bits: SmtTerm, ty: &Type) -> SmtTerm {
    if ty.is_bool() {
        bits.eq(SmtTerm::bv(1, 1))
    } else {
        bits
    }
}

fn concat(mut parts: Vec<SmtTerm>) -> SmtTerm {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        SmtTerm::Concat(parts)
    }
}
