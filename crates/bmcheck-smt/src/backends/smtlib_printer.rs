use std::borrow::Cow;

use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

/// Quote a symbol with `|...|` unless it is a valid SMT-LIB2 simple symbol.
pub fn quote_symbol(name: &str) -> Cow<'_, str> {
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c));
    if simple {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("|{}|", name.replace('|', "_")))
    }
}

/// Print an SmtTerm as SMT-LIB2 format.
pub fn to_smtlib(term: &SmtTerm) -> String {
    match term {
        SmtTerm::Var(name) => quote_symbol(name).into_owned(),
        SmtTerm::BoolLit(b) => {
            if *b {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        SmtTerm::BvLit { value, width } => format!("(_ bv{value} {width})"),
        SmtTerm::And(terms) => {
            if terms.is_empty() {
                "true".to_string()
            } else if terms.len() == 1 {
                to_smtlib(&terms[0])
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(and {})", inner.join(" "))
            }
        }
        SmtTerm::Or(terms) => {
            if terms.is_empty() {
                "false".to_string()
            } else if terms.len() == 1 {
                to_smtlib(&terms[0])
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(or {})", inner.join(" "))
            }
        }
        SmtTerm::Not(inner) => format!("(not {})", to_smtlib(inner)),
        SmtTerm::Implies(lhs, rhs) => format!("(=> {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Eq(lhs, rhs) => format!("(= {} {})", to_smtlib(lhs), to_smtlib(rhs)),
        SmtTerm::Ite(cond, then, els) => format!(
            "(ite {} {} {})",
            to_smtlib(cond),
            to_smtlib(then),
            to_smtlib(els)
        ),
        SmtTerm::BvNeg(inner) => format!("(bvneg {})", to_smtlib(inner)),
        SmtTerm::BvNot(inner) => format!("(bvnot {})", to_smtlib(inner)),
        SmtTerm::BvBin(op, lhs, rhs) => {
            format!("({} {} {})", op.smtlib_name(), to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::BvCmp(op, lhs, rhs) => {
            format!("({} {} {})", op.smtlib_name(), to_smtlib(lhs), to_smtlib(rhs))
        }
        SmtTerm::Extract { high, low, term } => {
            format!("((_ extract {high} {low}) {})", to_smtlib(term))
        }
        SmtTerm::Concat(terms) => {
            if terms.len() == 1 {
                to_smtlib(&terms[0])
            } else {
                let inner: Vec<String> = terms.iter().map(to_smtlib).collect();
                format!("(concat {})", inner.join(" "))
            }
        }
        SmtTerm::ZeroExt { extra, term } => {
            format!("((_ zero_extend {extra}) {})", to_smtlib(term))
        }
        SmtTerm::SignExt { extra, term } => {
            format!("((_ sign_extend {extra}) {})", to_smtlib(term))
        }
        SmtTerm::Select(array, index) => {
            format!("(select {} {})", to_smtlib(array), to_smtlib(index))
        }
        SmtTerm::Store(array, index, value) => format!(
            "(store {} {} {})",
            to_smtlib(array),
            to_smtlib(index),
            to_smtlib(value)
        ),
    }
}

/// Print a sort as SMT-LIB2 format.
pub fn sort_to_smtlib(sort: &SmtSort) -> String {
    sort.to_string()
}
