//! Functions, instructions and whole programs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::expr::Expr;
use crate::types::{Type, TypeTable};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.file, self.line, self.function)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    /// Initial value; globals without one start nondeterministic.
    #[serde(default)]
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InstructionKind {
    Skip,
    /// Start of a local's lifetime; the local becomes nondeterministic.
    Decl {
        name: String,
    },
    Dead {
        name: String,
    },
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
    Assume {
        condition: Expr,
    },
    Assert {
        condition: Expr,
        property: String,
        #[serde(default)]
        description: String,
    },
    /// Jump to instruction `target` when `condition` holds.
    Goto {
        target: usize,
        condition: Expr,
    },
    Call {
        #[serde(default)]
        lhs: Option<Expr>,
        function: String,
        #[serde(default)]
        arguments: Vec<Expr>,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
    },
    StartThread {
        function: String,
    },
    Output {
        label: String,
        #[serde(default)]
        values: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(flatten)]
    pub kind: InstructionKind,
    #[serde(default)]
    pub location: SourceLocation,
}

impl Instruction {
    pub fn new(kind: InstructionKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }

    pub fn is_backward_goto(&self, pc: usize) -> bool {
        matches!(self.kind, InstructionKind::Goto { target, .. } if target <= pc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Variable>,
    #[serde(default)]
    pub locals: Vec<Variable>,
    #[serde(default)]
    pub return_type: Option<Type>,
    /// `None` for functions without a body; calls to them return a
    /// nondeterministic value.
    #[serde(default)]
    pub body: Option<Vec<Instruction>>,
}

impl Function {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.parameters
            .iter()
            .chain(self.locals.iter())
            .find(|v| v.name == name)
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.body.as_deref().unwrap_or(&[])
    }

    /// Loop identifiers `"<function>.<n>"` keyed by back-edge pc, in
    /// instruction order.
    pub fn loop_ids(&self) -> Vec<(usize, String)> {
        self.instructions()
            .iter()
            .enumerate()
            .filter(|(pc, instr)| instr.is_backward_goto(*pc))
            .enumerate()
            .map(|(n, (pc, _))| (pc, format!("{}.{n}", self.name)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub types: TypeTable,
    #[serde(default)]
    pub globals: Vec<Global>,
    pub functions: IndexMap<String, Function>,
    pub entry: String,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    /// All assertion property ids with their description and location, in
    /// program order.
    pub fn assertions(&self) -> Vec<(&str, &str, &SourceLocation)> {
        self.functions
            .values()
            .flat_map(|f| f.instructions())
            .filter_map(|instr| match &instr.kind {
                InstructionKind::Assert {
                    property,
                    description,
                    ..
                } => Some((property.as_str(), description.as_str(), &instr.location)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goto(target: usize) -> Instruction {
        Instruction::new(
            InstructionKind::Goto {
                target,
                condition: Expr::bool(true),
            },
            SourceLocation::default(),
        )
    }

    fn skip() -> Instruction {
        Instruction::new(InstructionKind::Skip, SourceLocation::default())
    }

    #[test]
    fn loop_ids_count_back_edges_only() {
        let f = Function {
            name: "main".into(),
            parameters: vec![],
            locals: vec![],
            return_type: None,
            body: Some(vec![skip(), goto(4), goto(0), skip(), goto(3)]),
        };
        assert_eq!(
            f.loop_ids(),
            vec![(2, "main.0".to_string()), (4, "main.1".to_string())]
        );
    }

    #[test]
    fn instruction_json_is_flat() {
        let json = serde_json::json!({
            "op": "assert",
            "condition": { "kind": "constant", "value": 1, "ty": "bool" },
            "property": "main.assertion.1",
            "location": { "file": "a.c", "function": "main", "line": 3 }
        });
        let instr: Instruction = serde_json::from_value(json).expect("deserialize");
        match instr.kind {
            InstructionKind::Assert {
                property,
                description,
                ..
            } => {
                assert_eq!(property, "main.assertion.1");
                assert!(description.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(instr.location.line, 3);
    }
}
