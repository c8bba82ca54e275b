//! Builder for function bodies with symbolic jump labels.

use indexmap::IndexMap;

use crate::expr::Expr;
use crate::program::{Function, Instruction, InstructionKind, SourceLocation, Variable};
use crate::types::Type;
use crate::validation::ValidationError;

#[derive(Debug, Clone)]
enum PendingKind {
    Ready(InstructionKind),
    Goto { label: String, condition: Expr },
}

/// Builds a [`Function`] instruction by instruction. Gotos name labels that
/// may be placed before or after them; [`FunctionBuilder::build`] resolves
/// them to instruction indices.
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    name: String,
    file: String,
    parameters: Vec<Variable>,
    locals: Vec<Variable>,
    return_type: Option<Type>,
    body: Vec<(PendingKind, SourceLocation)>,
    labels: IndexMap<String, usize>,
    line: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: "main.c".into(),
            parameters: Vec::new(),
            locals: Vec::new(),
            return_type: None,
            body: Vec::new(),
            labels: IndexMap::new(),
            line: 0,
        }
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = file.into();
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.parameters.push(Variable::new(name, ty));
        self
    }

    pub fn local(mut self, name: impl Into<String>, ty: Type) -> Self {
        self.locals.push(Variable::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: Type) -> Self {
        self.return_type = Some(ty);
        self
    }

    /// Set the source line for subsequent instructions. Without it, each
    /// instruction gets the next line number.
    pub fn at_line(&mut self, line: u32) -> &mut Self {
        self.line = line.saturating_sub(1);
        self
    }

    pub fn label(&mut self, label: impl Into<String>) -> &mut Self {
        self.labels.insert(label.into(), self.body.len());
        self
    }

    fn push(&mut self, kind: PendingKind) -> &mut Self {
        self.line += 1;
        let location = SourceLocation::new(self.file.clone(), self.name.clone(), self.line);
        self.body.push((kind, location));
        self
    }

    pub fn instr(&mut self, kind: InstructionKind) -> &mut Self {
        self.push(PendingKind::Ready(kind))
    }

    pub fn skip(&mut self) -> &mut Self {
        self.instr(InstructionKind::Skip)
    }

    pub fn decl(&mut self, name: impl Into<String>) -> &mut Self {
        self.instr(InstructionKind::Decl { name: name.into() })
    }

    pub fn dead(&mut self, name: impl Into<String>) -> &mut Self {
        self.instr(InstructionKind::Dead { name: name.into() })
    }

    pub fn assign(&mut self, lhs: Expr, rhs: Expr) -> &mut Self {
        self.instr(InstructionKind::Assign { lhs, rhs })
    }

    pub fn assume(&mut self, condition: Expr) -> &mut Self {
        self.instr(InstructionKind::Assume { condition })
    }

    pub fn assert(&mut self, property: impl Into<String>, condition: Expr) -> &mut Self {
        let property = property.into();
        self.instr(InstructionKind::Assert {
            condition,
            description: format!("assertion {property}"),
            property,
        })
    }

    pub fn goto(&mut self, label: impl Into<String>, condition: Expr) -> &mut Self {
        self.push(PendingKind::Goto {
            label: label.into(),
            condition,
        })
    }

    pub fn call(
        &mut self,
        lhs: Option<Expr>,
        function: impl Into<String>,
        arguments: Vec<Expr>,
    ) -> &mut Self {
        self.instr(InstructionKind::Call {
            lhs,
            function: function.into(),
            arguments,
        })
    }

    pub fn ret(&mut self, value: Option<Expr>) -> &mut Self {
        self.instr(InstructionKind::Return { value })
    }

    pub fn start_thread(&mut self, function: impl Into<String>) -> &mut Self {
        self.instr(InstructionKind::StartThread {
            function: function.into(),
        })
    }

    pub fn output(&mut self, label: impl Into<String>, values: Vec<Expr>) -> &mut Self {
        self.instr(InstructionKind::Output {
            label: label.into(),
            values,
        })
    }

    pub fn build(&self) -> Result<Function, ValidationError> {
        let mut body = Vec::with_capacity(self.body.len());
        for (kind, location) in &self.body {
            let kind = match kind {
                PendingKind::Ready(kind) => kind.clone(),
                PendingKind::Goto { label, condition } => {
                    let target = self.labels.get(label).copied().ok_or_else(|| {
                        ValidationError::UnknownLabel {
                            function: self.name.clone(),
                            label: label.clone(),
                        }
                    })?;
                    InstructionKind::Goto {
                        target,
                        condition: condition.clone(),
                    }
                }
            };
            body.push(Instruction::new(kind, location.clone()));
        }
        Ok(Function {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            locals: self.locals.clone(),
            return_type: self.return_type.clone(),
            body: Some(body),
        })
    }
}
