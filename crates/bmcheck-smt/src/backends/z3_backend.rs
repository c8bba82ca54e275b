use std::collections::HashMap;

use thiserror::Error;
use z3::ast::{Array, Ast, Dynamic, BV};
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::{BvCmp, BvOp, SmtTerm};

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Sort mismatch: {0}")]
    SortMismatch(String),
}

pub struct Z3Solver {
    solver: z3::Solver,
    vars: HashMap<String, Z3Term>,
    last_model: Option<z3::Model>,
    params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            vars: HashMap::new(),
            last_model: None,
            params: None,
        }
    }

    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        if timeout_secs == 0 {
            return Self::new();
        }
        let solver = z3::Solver::new();
        let mut params = z3::Params::new();
        let timeout_ms = timeout_secs.saturating_mul(1000).min(u64::from(u32::MAX)) as u32;
        params.set_u32("timeout", timeout_ms);
        solver.set_params(&params);
        Self {
            solver,
            vars: HashMap::new(),
            last_model: None,
            params: Some(params),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new()
    }

    fn z3_sort(sort: &SmtSort) -> z3::Sort {
        match sort {
            SmtSort::Bool => z3::Sort::bool(),
            SmtSort::BitVec(w) => z3::Sort::bitvector(*w),
            SmtSort::Array(index, element) => {
                z3::Sort::array(&Self::z3_sort(index), &Self::z3_sort(element))
            }
        }
    }

    fn translate_bv(&self, term: &SmtTerm) -> Result<BV, Z3Error> {
        self.translate_term(term)?.into_bv()
    }

    fn translate_bool(&self, term: &SmtTerm) -> Result<z3::ast::Bool, Z3Error> {
        self.translate_term(term)?.into_bool()
    }

    fn translate_term(&self, term: &SmtTerm) -> Result<Z3Term, Z3Error> {
        match term {
            SmtTerm::Var(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| Z3Error::UnknownVariable(name.clone())),
            SmtTerm::BoolLit(b) => Ok(Z3Term::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::BvLit { value, width } => Ok(Z3Term::Bv(BV::from_u64(*value, *width))),
            SmtTerm::And(terms) => {
                let bools = terms
                    .iter()
                    .map(|t| self.translate_bool(t))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools = terms
                    .iter()
                    .map(|t| self.translate_bool(t))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => Ok(Z3Term::Bool(self.translate_bool(inner)?.not())),
            SmtTerm::Implies(lhs, rhs) => {
                let l = self.translate_bool(lhs)?;
                let r = self.translate_bool(rhs)?;
                Ok(Z3Term::Bool(l.implies(&r)))
            }
            SmtTerm::Eq(lhs, rhs) => {
                let l = self.translate_term(lhs)?;
                let r = self.translate_term(rhs)?;
                match (l, r) {
                    (Z3Term::Bool(a), Z3Term::Bool(b)) => Ok(Z3Term::Bool(a.eq(&b))),
                    (Z3Term::Bv(a), Z3Term::Bv(b)) => Ok(Z3Term::Bool(a.eq(&b))),
                    (Z3Term::Array(a), Z3Term::Array(b)) => Ok(Z3Term::Bool(a.eq(&b))),
                    _ => Err(Z3Error::SortMismatch("operands of =".into())),
                }
            }
            SmtTerm::Ite(cond, then, els) => {
                let c = self.translate_bool(cond)?;
                let t = self.translate_term(then)?;
                let e = self.translate_term(els)?;
                match (t, e) {
                    (Z3Term::Bool(a), Z3Term::Bool(b)) => Ok(Z3Term::Bool(c.ite(&a, &b))),
                    (Z3Term::Bv(a), Z3Term::Bv(b)) => Ok(Z3Term::Bv(c.ite(&a, &b))),
                    (Z3Term::Array(a), Z3Term::Array(b)) => Ok(Z3Term::Array(c.ite(&a, &b))),
                    _ => Err(Z3Error::SortMismatch("branches of ite".into())),
                }
            }
            SmtTerm::BvNeg(inner) => Ok(Z3Term::Bv(self.translate_bv(inner)?.bvneg())),
            SmtTerm::BvNot(inner) => Ok(Z3Term::Bv(self.translate_bv(inner)?.bvnot())),
            SmtTerm::BvBin(op, lhs, rhs) => {
                let l = self.translate_bv(lhs)?;
                let r = self.translate_bv(rhs)?;
                let out = match op {
                    BvOp::Add => l.bvadd(&r),
                    BvOp::Sub => l.bvsub(&r),
                    BvOp::Mul => l.bvmul(&r),
                    BvOp::UDiv => l.bvudiv(&r),
                    BvOp::SDiv => l.bvsdiv(&r),
                    BvOp::URem => l.bvurem(&r),
                    BvOp::SRem => l.bvsrem(&r),
                    BvOp::And => l.bvand(&r),
                    BvOp::Or => l.bvor(&r),
                    BvOp::Xor => l.bvxor(&r),
                    BvOp::Shl => l.bvshl(&r),
                    BvOp::LShr => l.bvlshr(&r),
                    BvOp::AShr => l.bvashr(&r),
                };
                Ok(Z3Term::Bv(out))
            }
            SmtTerm::BvCmp(op, lhs, rhs) => {
                let l = self.translate_bv(lhs)?;
                let r = self.translate_bv(rhs)?;
                let out = match op {
                    BvCmp::Ult => l.bvult(&r),
                    BvCmp::Ule => l.bvule(&r),
                    BvCmp::Ugt => l.bvugt(&r),
                    BvCmp::Uge => l.bvuge(&r),
                    BvCmp::Slt => l.bvslt(&r),
                    BvCmp::Sle => l.bvsle(&r),
                    BvCmp::Sgt => l.bvsgt(&r),
                    BvCmp::Sge => l.bvsge(&r),
                };
                Ok(Z3Term::Bool(out))
            }
            SmtTerm::Extract { high, low, term } => {
                Ok(Z3Term::Bv(self.translate_bv(term)?.extract(*high, *low)))
            }
            SmtTerm::Concat(terms) => {
                let mut iter = terms.iter();
                let first = iter
                    .next()
                    .ok_or_else(|| Z3Error::Internal("empty concat".into()))?;
                let mut acc = self.translate_bv(first)?;
                for t in iter {
                    acc = acc.concat(&self.translate_bv(t)?);
                }
                Ok(Z3Term::Bv(acc))
            }
            SmtTerm::ZeroExt { extra, term } => {
                Ok(Z3Term::Bv(self.translate_bv(term)?.zero_ext(*extra)))
            }
            SmtTerm::SignExt { extra, term } => {
                Ok(Z3Term::Bv(self.translate_bv(term)?.sign_ext(*extra)))
            }
            SmtTerm::Select(array, index) => {
                let a = self.translate_term(array)?.into_array()?;
                let i = self.translate_term(index)?.into_dynamic();
                Z3Term::from_dynamic(a.select(&i))
            }
            SmtTerm::Store(array, index, value) => {
                let a = self.translate_term(array)?.into_array()?;
                let i = self.translate_term(index)?.into_dynamic();
                let v = self.translate_term(value)?.into_dynamic();
                Ok(Z3Term::Array(a.store(&i, &v)))
            }
        }
    }

    fn eval(model: &z3::Model, term: &Z3Term) -> Option<ModelValue> {
        match term {
            Z3Term::Bool(b) => model
                .eval::<z3::ast::Bool>(b, true)
                .and_then(|v| v.as_bool())
                .map(ModelValue::Bool),
            Z3Term::Bv(bv) => {
                let width = bv.get_size();
                model
                    .eval::<BV>(bv, true)
                    .and_then(|v| v.as_u64())
                    .map(|value| ModelValue::BitVec { value, width })
            }
            Z3Term::Array(_) => None,
        }
    }

    fn record(&mut self, result: Z3SatResult) -> SatResult {
        self.last_model = None;
        match result {
            Z3SatResult::Sat => {
                self.last_model = self.solver.get_model();
                SatResult::Sat
            }
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => {
                let reason = self
                    .solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "Z3 returned unknown".into());
                SatResult::Unknown(reason)
            }
        }
    }
}

#[derive(Clone)]
enum Z3Term {
    Bool(z3::ast::Bool),
    Bv(BV),
    Array(Array),
}

impl Z3Term {
    fn from_dynamic(d: Dynamic) -> Result<Self, Z3Error> {
        if let Some(b) = d.as_bool() {
            Ok(Z3Term::Bool(b))
        } else if let Some(bv) = d.as_bv() {
            Ok(Z3Term::Bv(bv))
        } else if let Some(a) = d.as_array() {
            Ok(Z3Term::Array(a))
        } else {
            Err(Z3Error::SortMismatch("unsupported array element sort".into()))
        }
    }

    fn into_dynamic(self) -> Dynamic {
        match self {
            Z3Term::Bool(b) => Dynamic::from_ast(&b),
            Z3Term::Bv(bv) => Dynamic::from_ast(&bv),
            Z3Term::Array(a) => Dynamic::from_ast(&a),
        }
    }

    fn into_bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            _ => Err(Z3Error::SortMismatch("expected Bool".into())),
        }
    }

    fn into_bv(self) -> Result<BV, Z3Error> {
        match self {
            Z3Term::Bv(bv) => Ok(bv),
            _ => Err(Z3Error::SortMismatch("expected bit-vector".into())),
        }
    }

    fn into_array(self) -> Result<Array, Z3Error> {
        match self {
            Z3Term::Array(a) => Ok(a),
            _ => Err(Z3Error::SortMismatch("expected array".into())),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        let var = match sort {
            SmtSort::Bool => Z3Term::Bool(z3::ast::Bool::new_const(name)),
            SmtSort::BitVec(w) => Z3Term::Bv(BV::new_const(name, *w)),
            SmtSort::Array(index, element) => Z3Term::Array(Array::new_const(
                name,
                &Self::z3_sort(index),
                &Self::z3_sort(element),
            )),
        };
        self.vars.insert(name.to_string(), var);
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let z3_term = self.translate_bool(term)?;
        self.last_model = None;
        self.solver.assert(&z3_term);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.last_model = None;
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.last_model = None;
        self.solver.pop(1);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        let result = self.solver.check();
        Ok(self.record(result))
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let result = self.check_sat()?;
        if result != SatResult::Sat {
            return Ok((result, None));
        }
        let z3_model = self
            .last_model
            .as_ref()
            .ok_or_else(|| Z3Error::Internal("SAT but no model available".into()))?;
        let mut values = HashMap::new();
        for &(name, _) in var_names {
            if let Some(var) = self.vars.get(name) {
                if let Some(value) = Self::eval(z3_model, var) {
                    values.insert(name.to_string(), value);
                }
            }
        }
        Ok((SatResult::Sat, Some(Model { values })))
    }

    fn get_value(&mut self, term: &SmtTerm) -> Result<Option<ModelValue>, Z3Error> {
        let Some(model) = self.last_model.as_ref() else {
            return Ok(None);
        };
        let z3_term = self.translate_term(term)?;
        Ok(Self::eval(model, &z3_term))
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // Z3 may drop per-solver parameters on reset; reapply timeout if configured.
        if let Some(params) = &self.params {
            self.solver.set_params(params);
        }
        self.vars.clear();
        self.last_model = None;
        Ok(())
    }
}
