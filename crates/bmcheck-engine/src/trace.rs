//! Counterexample traces read off a satisfying model.

use std::fmt;

use bmcheck_ir::expr::{sign_extend, Expr};
use bmcheck_ir::program::SourceLocation;
use bmcheck_ir::types::{Type, TypeTable};
use serde::Serialize;

use crate::equation::{Equation, StepKind, ThreadId};

/// Longest array prefix rendered in a trace.
pub const MAX_ARRAY_ELEMENTS: u64 = 64;

/// Source of concrete values, normally the solver's current model.
pub trait ModelQuery {
    /// Value of a scalar (bool or bit-vector) expression, or `None` when the
    /// model does not determine it.
    fn scalar_value(&mut self, expr: &Expr) -> Option<ConcreteValue>;

    fn types(&self) -> &TypeTable;

    /// Value of any expression. Structs are read member by member, arrays
    /// element by element.
    fn value_of(&mut self, expr: &Expr) -> Option<ConcreteValue> {
        match expr.ty() {
            Type::Struct(id) => {
                let components: Vec<(String, Type)> = self
                    .types()
                    .get(*id)?
                    .components
                    .iter()
                    .map(|c| (c.name.clone(), c.ty.clone()))
                    .collect();
                let mut members = Vec::with_capacity(components.len());
                for (name, ty) in components {
                    let value = self.value_of(&Expr::member(expr.clone(), name.clone(), ty))?;
                    members.push((name, value));
                }
                Some(ConcreteValue::Struct(members))
            }
            Type::Array { size, .. } => {
                let len = expr.ty().array_len()?.min(MAX_ARRAY_ELEMENTS);
                let index_ty = size.ty().clone();
                let mut elements = Vec::with_capacity(len as usize);
                for i in 0..len {
                    let element = Expr::index(expr.clone(), Expr::constant(i, index_ty.clone()));
                    elements.push(self.value_of(&element)?);
                }
                Some(ConcreteValue::Array(elements))
            }
            _ => self.scalar_value(expr),
        }
    }

    fn holds(&mut self, expr: &Expr) -> Option<bool> {
        match self.scalar_value(expr)? {
            ConcreteValue::Bool(b) => Some(b),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ConcreteValue {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Bits { value: u64, width: u32 },
    Struct(Vec<(String, ConcreteValue)>),
    Array(Vec<ConcreteValue>),
}

impl ConcreteValue {
    /// Interpret raw model bits according to `ty`.
    pub fn from_bits(ty: &Type, value: u64) -> Option<Self> {
        match ty {
            Type::Bool => Some(ConcreteValue::Bool(value != 0)),
            Type::Unsigned(_) => Some(ConcreteValue::Unsigned(value)),
            Type::Signed(w) => Some(ConcreteValue::Signed(sign_extend(value, *w))),
            Type::BitVector(w) => Some(ConcreteValue::Bits { value, width: *w }),
            Type::Struct(_) | Type::Array { .. } => None,
        }
    }
}

impl fmt::Display for ConcreteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteValue::Bool(b) => write!(f, "{b}"),
            ConcreteValue::Unsigned(v) => write!(f, "{v}"),
            ConcreteValue::Signed(v) => write!(f, "{v}"),
            ConcreteValue::Bits { value, width } => {
                let digits = (*width as usize).div_ceil(4).max(1);
                write!(f, "0x{value:0digits$x}")
            }
            ConcreteValue::Struct(members) => {
                write!(f, "{{ ")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, ".{name} = {value}")?;
                }
                write!(f, " }}")
            }
            ConcreteValue::Array(elements) => {
                write!(f, "[")?;
                for (i, value) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventKind {
    Assignment,
    Call,
    Return,
    Output,
    Assumption,
    FailedAssertion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub step: usize,
    pub location: SourceLocation,
    pub thread: ThreadId,
    pub kind: TraceEventKind,
    pub description: String,
    /// Assigned variable and its value, for assignment events.
    pub value: Option<(String, ConcreteValue)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub property: String,
    pub events: Vec<TraceEvent>,
}

impl Trace {
    pub fn failed_assertion(&self) -> Option<&TraceEvent> {
        self.events
            .last()
            .filter(|e| e.kind == TraceEventKind::FailedAssertion)
    }
}

/// Strip SSA decoration: `x@2!3` becomes `x`.
fn display_name(source: &str) -> &str {
    source.split(['@', '!']).next().unwrap_or(source)
}

fn render_values(query: &mut dyn ModelQuery, values: &[Expr]) -> String {
    values
        .iter()
        .map(|v| match query.value_of(v) {
            Some(value) => value.to_string(),
            None => "?".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Walk the live steps taken under the model and collect what a user needs
/// to replay the violation of `property`.
pub fn build_trace(equation: &Equation, query: &mut dyn ModelQuery, property: &str) -> Trace {
    let mut events = Vec::new();
    for (index, step) in equation.live_steps() {
        if query.holds(&step.guard) != Some(true) {
            continue;
        }
        let event = |kind, description: String, value| TraceEvent {
            step: index,
            location: step.location.clone(),
            thread: step.thread,
            kind,
            description,
            value,
        };
        match &step.kind {
            StepKind::Assignment {
                lhs,
                ty,
                kind,
                source,
                ..
            } if kind.is_visible() => {
                let Some(value) = query.value_of(&Expr::symbol(lhs.clone(), ty.clone())) else {
                    continue;
                };
                let name = display_name(source).to_string();
                events.push(event(
                    TraceEventKind::Assignment,
                    format!("{name} = {value}"),
                    Some((name, value)),
                ));
            }
            StepKind::FunctionCall {
                function,
                arguments,
            } => {
                let args = render_values(query, arguments);
                events.push(event(
                    TraceEventKind::Call,
                    format!("call {function}({args})"),
                    None,
                ));
            }
            StepKind::FunctionReturn { function } => {
                events.push(event(TraceEventKind::Return, format!("return from {function}"), None));
            }
            StepKind::Output { label, values } => {
                let rendered = render_values(query, values);
                events.push(event(
                    TraceEventKind::Output,
                    format!("output {label}: {rendered}"),
                    None,
                ));
            }
            StepKind::Assume { condition } if condition.is_false() => {
                events.push(event(
                    TraceEventKind::Assumption,
                    "assume(false)".to_string(),
                    None,
                ));
            }
            StepKind::Assert {
                condition,
                property: id,
                message,
                ..
            } if id == property => {
                if query.holds(condition) == Some(false) {
                    let description = if message.is_empty() {
                        format!("assertion {property} violated")
                    } else {
                        format!("assertion {property} violated: {message}")
                    };
                    events.push(event(TraceEventKind::FailedAssertion, description, None));
                    break;
                }
            }
            _ => {}
        }
    }
    Trace {
        property: property.to_string(),
        events,
    }
}

pub fn format_trace(trace: &Trace) -> String {
    let mut out = format!("Counterexample for {}:\n", trace.property);
    for (n, event) in trace.events.iter().enumerate() {
        out.push_str(&format!(
            "  {n:>3}. [thread {}] {}: {}\n",
            event.thread, event.location, event.description
        ));
    }
    out
}
