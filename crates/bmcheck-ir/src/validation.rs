//! Structural validity of instruction programs.

use std::collections::HashSet;
use thiserror::Error;

use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::program::{Function, InstructionKind, Program, SourceLocation};
use crate::types::{Type, TypeTable};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("struct `{0}` is defined more than once")]
    DuplicateStruct(String),
    #[error("unknown struct `{0}`")]
    UnknownStruct(String),
    #[error("structs contain themselves: {}", .0.join(", "))]
    RecursiveStruct(Vec<String>),
    #[error("struct resolution did not reach a fixed point after {0} passes")]
    FixpointLimit(usize),
    #[error("invalid type `{ty}`: {reason}")]
    InvalidType { ty: Type, reason: String },
    #[error("entry function `{0}` does not exist")]
    UnknownEntry(String),
    #[error("{location}: call to unknown function `{callee}`")]
    UnknownCallee {
        location: SourceLocation,
        callee: String,
    },
    #[error("{location}: `{callee}` expects {expected} arguments, got {found}")]
    ArityMismatch {
        location: SourceLocation,
        callee: String,
        expected: usize,
        found: usize,
    },
    #[error("function `{function}`: goto at {pc} targets {target}, outside the body")]
    GotoOutOfRange {
        function: String,
        pc: usize,
        target: usize,
    },
    #[error("function `{function}`: unknown label `{label}`")]
    UnknownLabel { function: String, label: String },
    #[error("{location}: {context} must be boolean, found `{found}`")]
    NonBoolean {
        location: SourceLocation,
        context: String,
        found: Type,
    },
    #[error("{location}: {context}: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        location: SourceLocation,
        context: String,
        expected: Type,
        found: Type,
    },
    #[error("{location}: unknown variable `{name}`")]
    UnknownVariable {
        location: SourceLocation,
        name: String,
    },
    #[error("{location}: `{expr}` is not assignable")]
    InvalidLvalue {
        location: SourceLocation,
        expr: String,
    },
    #[error("{location}: struct has no member `{component}`")]
    UnknownComponent {
        location: SourceLocation,
        component: String,
    },
    #[error("variable `{0}` is declared more than once")]
    DuplicateVariable(String),
    #[error("property `{0}` is asserted by more than one instruction")]
    DuplicateProperty(String),
    #[error("thread function `{0}` must not take parameters")]
    ThreadWithParameters(String),
}

/// Check the structural contract the symbolic executor relies on.
///
/// Returns the first violation found.
pub fn validate_program(program: &Program) -> Result<(), ValidationError> {
    program.types.check_well_founded()?;
    for (_, def) in program.types.iter() {
        for component in &def.components {
            check_type(&program.types, &component.ty)?;
        }
    }
    if program.function(&program.entry).is_none() {
        return Err(ValidationError::UnknownEntry(program.entry.clone()));
    }

    let mut globals = HashSet::new();
    for global in &program.globals {
        if !globals.insert(global.name.as_str()) {
            return Err(ValidationError::DuplicateVariable(global.name.clone()));
        }
        check_type(&program.types, &global.ty)?;
    }
    for global in &program.globals {
        if let Some(init) = &global.init {
            let scope = Scope {
                program,
                function: None,
                location: SourceLocation::new("<globals>", "", 0),
            };
            scope.expect_type(init, &global.ty, "initial value")?;
        }
    }

    let mut properties = HashSet::new();
    for function in program.functions.values() {
        validate_function(program, function, &mut properties)?;
    }
    Ok(())
}

fn check_type(types: &TypeTable, ty: &Type) -> Result<(), ValidationError> {
    match ty {
        Type::Bool => Ok(()),
        Type::Unsigned(w) | Type::Signed(w) | Type::BitVector(w) => {
            if (1..=64).contains(w) {
                Ok(())
            } else {
                Err(ValidationError::InvalidType {
                    ty: ty.clone(),
                    reason: "bit widths must be between 1 and 64".into(),
                })
            }
        }
        Type::Struct(id) => match types.get(*id) {
            Some(_) => Ok(()),
            None => Err(ValidationError::UnknownStruct(id.to_string())),
        },
        Type::Array { element, size } => {
            if !size.ty().is_bitvector() {
                return Err(ValidationError::InvalidType {
                    ty: ty.clone(),
                    reason: "array size must be a bit-vector".into(),
                });
            }
            check_type(types, element)
        }
    }
}

fn validate_function<'p>(
    program: &'p Program,
    function: &'p Function,
    properties: &mut HashSet<&'p str>,
) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for var in function.parameters.iter().chain(&function.locals) {
        if !names.insert(var.name.as_str()) {
            return Err(ValidationError::DuplicateVariable(format!(
                "{}::{}",
                function.name, var.name
            )));
        }
        check_type(&program.types, &var.ty)?;
    }
    if let Some(ty) = &function.return_type {
        check_type(&program.types, ty)?;
    }

    let body = function.instructions();
    for (pc, instr) in body.iter().enumerate() {
        let scope = Scope {
            program,
            function: Some(function),
            location: instr.location.clone(),
        };
        match &instr.kind {
            InstructionKind::Skip => {}
            InstructionKind::Decl { name } | InstructionKind::Dead { name } => {
                if !function.locals.iter().any(|v| &v.name == name) {
                    return Err(ValidationError::UnknownVariable {
                        location: instr.location.clone(),
                        name: name.clone(),
                    });
                }
            }
            InstructionKind::Assign { lhs, rhs } => {
                scope.check_lvalue(lhs)?;
                scope.expect_type(rhs, lhs.ty(), "assignment")?;
            }
            InstructionKind::Assume { condition } => scope.expect_bool(condition, "assumption")?,
            InstructionKind::Assert {
                condition,
                property,
                ..
            } => {
                scope.expect_bool(condition, "assertion")?;
                if !properties.insert(property.as_str()) {
                    return Err(ValidationError::DuplicateProperty(property.clone()));
                }
            }
            InstructionKind::Goto { target, condition } => {
                if *target > body.len() {
                    return Err(ValidationError::GotoOutOfRange {
                        function: function.name.clone(),
                        pc,
                        target: *target,
                    });
                }
                scope.expect_bool(condition, "goto condition")?;
            }
            InstructionKind::Call {
                lhs,
                function: callee,
                arguments,
            } => {
                let target = program.function(callee).ok_or_else(|| {
                    ValidationError::UnknownCallee {
                        location: instr.location.clone(),
                        callee: callee.clone(),
                    }
                })?;
                if target.parameters.len() != arguments.len() {
                    return Err(ValidationError::ArityMismatch {
                        location: instr.location.clone(),
                        callee: callee.clone(),
                        expected: target.parameters.len(),
                        found: arguments.len(),
                    });
                }
                for (param, arg) in target.parameters.iter().zip(arguments) {
                    scope.expect_type(arg, &param.ty, "argument")?;
                }
                if let Some(lhs) = lhs {
                    scope.check_lvalue(lhs)?;
                    match &target.return_type {
                        Some(ty) if ty == lhs.ty() => {}
                        Some(ty) => {
                            return Err(scope.mismatch("return value", ty, lhs.ty()));
                        }
                        None => {
                            return Err(ValidationError::InvalidLvalue {
                                location: instr.location.clone(),
                                expr: format!("{lhs} = {callee}(..) without return value"),
                            });
                        }
                    }
                }
            }
            InstructionKind::Return { value } => {
                if let (Some(value), Some(ty)) = (value, &function.return_type) {
                    scope.expect_type(value, ty, "return")?;
                } else if let Some(value) = value {
                    scope.check_expr(value)?;
                }
            }
            InstructionKind::StartThread { function: callee } => {
                let target = program.function(callee).ok_or_else(|| {
                    ValidationError::UnknownCallee {
                        location: instr.location.clone(),
                        callee: callee.clone(),
                    }
                })?;
                if !target.parameters.is_empty() {
                    return Err(ValidationError::ThreadWithParameters(callee.clone()));
                }
            }
            InstructionKind::Output { values, .. } => {
                for value in values {
                    scope.check_expr(value)?;
                }
            }
        }
    }
    Ok(())
}

struct Scope<'p> {
    program: &'p Program,
    function: Option<&'p Function>,
    location: SourceLocation,
}

impl Scope<'_> {
    fn mismatch(&self, context: &str, expected: &Type, found: &Type) -> ValidationError {
        ValidationError::TypeMismatch {
            location: self.location.clone(),
            context: context.to_string(),
            expected: expected.clone(),
            found: found.clone(),
        }
    }

    fn expect_type(&self, expr: &Expr, expected: &Type, context: &str) -> Result<(), ValidationError> {
        self.check_expr(expr)?;
        if expr.ty() != expected {
            return Err(self.mismatch(context, expected, expr.ty()));
        }
        Ok(())
    }

    fn expect_bool(&self, expr: &Expr, context: &str) -> Result<(), ValidationError> {
        self.check_expr(expr)?;
        if !expr.ty().is_bool() {
            return Err(ValidationError::NonBoolean {
                location: self.location.clone(),
                context: context.to_string(),
                found: expr.ty().clone(),
            });
        }
        Ok(())
    }

    fn expect_bitvector(&self, expr: &Expr, context: &str) -> Result<(), ValidationError> {
        self.check_expr(expr)?;
        if !expr.ty().is_bitvector() {
            let width = expr.ty().scalar_width().unwrap_or(1);
            return Err(self.mismatch(context, &Type::BitVector(width), expr.ty()));
        }
        Ok(())
    }

    fn declared_type(&self, name: &str) -> Option<&Type> {
        self.function
            .and_then(|f| f.variable(name))
            .map(|v| &v.ty)
            .or_else(|| self.program.global(name).map(|g| &g.ty))
    }

    fn component_type(&self, compound: &Type, component: &str) -> Result<&Type, ValidationError> {
        let def = match compound {
            Type::Struct(id) => self.program.types.get(*id),
            _ => None,
        };
        def.and_then(|def| def.component(component))
            .map(|(_, c)| &c.ty)
            .ok_or_else(|| ValidationError::UnknownComponent {
                location: self.location.clone(),
                component: component.to_string(),
            })
    }

    fn check_lvalue(&self, expr: &Expr) -> Result<(), ValidationError> {
        match expr {
            Expr::Symbol { .. } => self.check_expr(expr),
            Expr::Member { compound, .. } | Expr::Index { array: compound, .. } => {
                self.check_expr(expr)?;
                self.check_lvalue(compound)
            }
            other => Err(ValidationError::InvalidLvalue {
                location: self.location.clone(),
                expr: other.to_string(),
            }),
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<(), ValidationError> {
        match expr {
            Expr::Symbol { name, ty } => match self.declared_type(name) {
                Some(declared) if declared == ty => Ok(()),
                Some(declared) => Err(self.mismatch(name, declared, ty)),
                None => Err(ValidationError::UnknownVariable {
                    location: self.location.clone(),
                    name: name.clone(),
                }),
            },
            Expr::Constant { ty, .. } | Expr::Nondet { ty } => {
                check_type(&self.program.types, ty)
            }
            Expr::Unary { op, operand, ty } => match op {
                UnaryOp::Not => self.expect_bool(operand, "negation"),
                UnaryOp::Neg | UnaryOp::BitNot => self.expect_type(operand, ty, "unary operand"),
                UnaryOp::Cast => {
                    self.check_expr(operand)?;
                    check_type(&self.program.types, ty)?;
                    if operand.ty().is_scalar() && ty.is_scalar() {
                        Ok(())
                    } else {
                        Err(self.mismatch("cast", ty, operand.ty()))
                    }
                }
            },
            Expr::Binary { op, lhs, rhs, ty } => {
                if *op == BinaryOp::Implies {
                    self.expect_bool(lhs, "implication")?;
                    return self.expect_bool(rhs, "implication");
                }
                if matches!(op, BinaryOp::Eq | BinaryOp::NotEq) {
                    self.check_expr(lhs)?;
                    return self.expect_type(rhs, lhs.ty(), "comparison");
                }
                self.expect_bitvector(lhs, "operand")?;
                if op.is_shift() {
                    self.expect_bitvector(rhs, "shift amount")?;
                } else {
                    self.expect_type(rhs, lhs.ty(), "operand")?;
                }
                let expected = if op.is_comparison() {
                    &Type::Bool
                } else {
                    lhs.ty()
                };
                if ty != expected {
                    return Err(self.mismatch("result", expected, ty));
                }
                Ok(())
            }
            Expr::And { operands } | Expr::Or { operands } => operands
                .iter()
                .try_for_each(|o| self.expect_bool(o, "connective operand")),
            Expr::Ite {
                cond,
                then,
                otherwise,
                ty,
            } => {
                self.expect_bool(cond, "if-then-else condition")?;
                self.expect_type(then, ty, "if-then-else branch")?;
                self.expect_type(otherwise, ty, "if-then-else branch")
            }
            Expr::Member {
                compound,
                component,
                ty,
            } => {
                self.check_expr(compound)?;
                let expected = self.component_type(compound.ty(), component)?;
                if expected != ty {
                    return Err(self.mismatch(component, expected, ty));
                }
                Ok(())
            }
            Expr::Index { array, index, ty } => {
                self.check_expr(array)?;
                self.expect_bitvector(index, "array index")?;
                match array.ty().element() {
                    Some(element) if element == ty => Ok(()),
                    Some(element) => Err(self.mismatch("array element", element, ty)),
                    None => Err(ValidationError::InvalidLvalue {
                        location: self.location.clone(),
                        expr: format!("{array} is not an array"),
                    }),
                }
            }
            Expr::StructLit { components, ty } => {
                let def = match ty {
                    Type::Struct(id) => self.program.types.get(*id),
                    _ => None,
                };
                let Some(def) = def else {
                    return Err(ValidationError::InvalidType {
                        ty: ty.clone(),
                        reason: "struct literal of non-struct type".into(),
                    });
                };
                if def.components.len() != components.len() {
                    return Err(ValidationError::InvalidType {
                        ty: ty.clone(),
                        reason: format!(
                            "struct literal has {} members, `{}` has {}",
                            components.len(),
                            def.name,
                            def.components.len()
                        ),
                    });
                }
                for (declared, (name, value)) in def.components.iter().zip(components) {
                    if &declared.name != name {
                        return Err(ValidationError::UnknownComponent {
                            location: self.location.clone(),
                            component: name.clone(),
                        });
                    }
                    self.expect_type(value, &declared.ty, name)?;
                }
                Ok(())
            }
            Expr::WithMember {
                compound,
                component,
                value,
            } => {
                self.check_expr(compound)?;
                let expected = self.component_type(compound.ty(), component)?;
                self.expect_type(value, expected, component)
            }
            Expr::WithIndex {
                array,
                index,
                value,
            } => {
                self.check_expr(array)?;
                self.expect_bitvector(index, "array index")?;
                match array.ty().element() {
                    Some(element) => self.expect_type(value, element, "array element"),
                    None => Err(ValidationError::InvalidLvalue {
                        location: self.location.clone(),
                        expr: format!("{array} is not an array"),
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use crate::program::Global;
    use crate::types::Component;
    use indexmap::IndexMap;

    fn int(name: &str) -> Expr {
        Expr::symbol(name, Type::Signed(32))
    }

    fn c(v: i64) -> Expr {
        Expr::signed(v, Type::Signed(32))
    }

    fn program(functions: Vec<Function>) -> Program {
        let mut map = IndexMap::new();
        for f in functions {
            map.insert(f.name.clone(), f);
        }
        Program {
            types: TypeTable::new(),
            globals: vec![Global {
                name: "g".into(),
                ty: Type::Signed(32),
                init: Some(c(0)),
            }],
            functions: map,
            entry: "main".into(),
        }
    }

    #[test]
    fn well_formed_program_passes() {
        let mut f = FunctionBuilder::new("main").local("x", Type::Signed(32));
        f.decl("x")
            .assign(int("x"), c(1))
            .assign(int("g"), Expr::binary(BinaryOp::Add, int("x"), int("g")))
            .assert("main.1", Expr::binary(BinaryOp::Gt, int("g"), c(0)));
        let p = program(vec![f.build().expect("builds")]);
        assert!(validate_program(&p).is_ok());
    }

    #[test]
    fn non_boolean_assertion_is_rejected() {
        let mut f = FunctionBuilder::new("main");
        f.assert("main.1", int("g"));
        let p = program(vec![f.build().expect("builds")]);
        assert!(matches!(
            validate_program(&p),
            Err(ValidationError::NonBoolean { .. })
        ));
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let callee = FunctionBuilder::new("inc")
            .param("a", Type::Signed(32))
            .returns(Type::Signed(32));
        let mut main = FunctionBuilder::new("main");
        main.call(Some(int("g")), "inc", vec![]);
        let p = program(vec![
            main.build().expect("builds"),
            callee.build().expect("builds"),
        ]);
        assert!(matches!(
            validate_program(&p),
            Err(ValidationError::ArityMismatch {
                expected: 1,
                found: 0,
                ..
            })
        ));
    }

    #[test]
    fn goto_past_end_is_rejected() {
        let mut f = FunctionBuilder::new("main")
            .build()
            .expect("empty body");
        f.body = Some(vec![crate::program::Instruction::new(
            InstructionKind::Goto {
                target: 7,
                condition: Expr::bool(true),
            },
            SourceLocation::default(),
        )]);
        let p = program(vec![f]);
        assert!(matches!(
            validate_program(&p),
            Err(ValidationError::GotoOutOfRange { target: 7, .. })
        ));
    }

    #[test]
    fn duplicate_property_ids_are_rejected() {
        let mut f = FunctionBuilder::new("main");
        f.assert("p", Expr::bool(true)).assert("p", Expr::bool(true));
        let p = program(vec![f.build().expect("builds")]);
        assert!(matches!(
            validate_program(&p),
            Err(ValidationError::DuplicateProperty(id)) if id == "p"
        ));
    }

    #[test]
    fn member_access_is_checked_against_the_struct() {
        let mut p = program(vec![]);
        let pair = p
            .types
            .insert(
                "pair",
                vec![
                    Component::new("a", Type::Unsigned(8)),
                    Component::new("b", Type::Signed(16)),
                ],
            )
            .expect("insert");
        let s = Expr::symbol("s", Type::Struct(pair));
        let mut ok = FunctionBuilder::new("main").local("s", Type::Struct(pair));
        ok.assign(
            Expr::member(s.clone(), "a", Type::Unsigned(8)),
            Expr::constant(3, Type::Unsigned(8)),
        );
        p.functions.insert("main".into(), ok.build().expect("builds"));
        assert!(validate_program(&p).is_ok());

        let mut bad = FunctionBuilder::new("main").local("s", Type::Struct(pair));
        bad.assign(
            Expr::member(s, "zz", Type::Unsigned(8)),
            Expr::constant(3, Type::Unsigned(8)),
        );
        p.functions.insert("main".into(), bad.build().expect("builds"));
        assert!(matches!(
            validate_program(&p),
            Err(ValidationError::UnknownComponent { component, .. }) if component == "zz"
        ));
    }

    #[test]
    fn thread_entry_with_parameters_is_rejected() {
        let worker = FunctionBuilder::new("worker").param("a", Type::Bool);
        let mut main = FunctionBuilder::new("main");
        main.start_thread("worker");
        let p = program(vec![
            main.build().expect("builds"),
            worker.build().expect("builds"),
        ]);
        assert!(matches!(
            validate_program(&p),
            Err(ValidationError::ThreadWithParameters(name)) if name == "worker"
        ));
    }
}
