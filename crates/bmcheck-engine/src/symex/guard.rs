//! Path guards kept as a list of conjuncts.
//!
//! Sibling paths share the conjuncts accumulated before they split, so a
//! merge keeps the common prefix and disjoins only the differing tails.

use bmcheck_ir::expr::Expr;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Guard {
    conjuncts: Vec<Expr>,
}

impl Guard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            conjuncts: vec![Expr::bool(false)],
        }
    }

    pub fn is_false(&self) -> bool {
        matches!(self.conjuncts.as_slice(), [only] if only.is_false())
    }

    pub fn is_true(&self) -> bool {
        self.conjuncts.is_empty()
    }

    pub fn add(&mut self, condition: Expr) {
        if self.is_false() || condition.is_true() {
            return;
        }
        if condition.is_false() {
            *self = Self::unreachable();
            return;
        }
        if let Expr::And { operands } = condition {
            for operand in operands {
                self.add(operand);
            }
            return;
        }
        if self.conjuncts.contains(&condition) {
            return;
        }
        let negated = Expr::not(condition.clone());
        if self.conjuncts.contains(&negated) {
            *self = Self::unreachable();
            return;
        }
        self.conjuncts.push(condition);
    }

    pub fn with(&self, condition: Expr) -> Guard {
        let mut guard = self.clone();
        guard.add(condition);
        guard
    }

    pub fn as_expr(&self) -> Expr {
        Expr::and(self.conjuncts.clone())
    }

    pub fn conjuncts(&self) -> &[Expr] {
        &self.conjuncts
    }

    /// Size in expression nodes, compared against the complexity limit.
    pub fn size(&self) -> usize {
        self.conjuncts.iter().map(Expr::size).sum()
    }

    fn common_prefix(&self, other: &Guard) -> usize {
        self.conjuncts
            .iter()
            .zip(&other.conjuncts)
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// The conjuncts of `self` beyond those it shares with `other`.
    pub fn difference(&self, other: &Guard) -> Expr {
        let n = self.common_prefix(other);
        Expr::and(self.conjuncts[n..].to_vec())
    }

    /// Disjunction of two guards, factoring out the shared prefix.
    pub fn merge(&self, other: &Guard) -> Guard {
        if self.is_false() {
            return other.clone();
        }
        if other.is_false() {
            return self.clone();
        }
        let n = self.common_prefix(other);
        let mut merged = Guard {
            conjuncts: self.conjuncts[..n].to_vec(),
        };
        merged.add(Expr::or(vec![
            Expr::and(self.conjuncts[n..].to_vec()),
            Expr::and(other.conjuncts[n..].to_vec()),
        ]));
        merged
    }
}
