//! Types and the struct definition arena.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::expr::Expr;
use crate::validation::ValidationError;

/// Index of a struct definition in a [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub usize);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value type of the instruction language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Type {
    Bool,
    /// Unsigned integer of the given bit width.
    Unsigned(u32),
    /// Two's complement signed integer of the given bit width.
    Signed(u32),
    /// Raw bit-vector without arithmetic interpretation.
    BitVector(u32),
    /// Named struct, resolved through the program's [`TypeTable`].
    Struct(TypeId),
    /// Fixed-size array. The size is kept as an expression so that encoders
    /// can carry it through unchanged.
    Array { element: Box<Type>, size: Box<Expr> },
}

impl Type {
    pub fn array(element: Type, size: Expr) -> Self {
        Type::Array {
            element: Box::new(element),
            size: Box::new(size),
        }
    }

    /// Array whose size is a 32-bit signed constant, the usual index type.
    pub fn array_of_len(element: Type, len: u64) -> Self {
        Type::array(element, Expr::constant(len, Type::Signed(32)))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_bitvector(&self) -> bool {
        matches!(
            self,
            Type::Unsigned(_) | Type::Signed(_) | Type::BitVector(_)
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Type::Signed(_))
    }

    pub fn is_scalar(&self) -> bool {
        self.is_bool() || self.is_bitvector()
    }

    /// Bit width of a scalar type; `Bool` counts as one bit.
    pub fn scalar_width(&self) -> Option<u32> {
        match self {
            Type::Bool => Some(1),
            Type::Unsigned(w) | Type::Signed(w) | Type::BitVector(w) => Some(*w),
            Type::Struct(_) | Type::Array { .. } => None,
        }
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Number of elements when the array size is a constant.
    pub fn array_len(&self) -> Option<u64> {
        match self {
            Type::Array { size, .. } => size.as_constant(),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Unsigned(w) => write!(f, "u{w}"),
            Type::Signed(w) => write!(f, "s{w}"),
            Type::BitVector(w) => write!(f, "bv{w}"),
            Type::Struct(id) => write!(f, "struct{id}"),
            Type::Array { element, size } => write!(f, "{element}[{size}]"),
        }
    }
}

/// A data member of a struct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub ty: Type,
}

impl Component {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A method member. Methods take no space in the value layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub signature: String,
}

/// A resolved struct definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    pub components: Vec<Component>,
    #[serde(default)]
    pub methods: Vec<Method>,
}

impl StructDef {
    pub fn component(&self, name: &str) -> Option<(usize, &Component)> {
        self.components
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }
}

/// Member type in a struct declaration, before struct names are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclType {
    Resolved(Type),
    Named(String),
    Array { element: Box<DeclType>, len: u64 },
}

/// Member of a struct declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentDecl {
    Data { name: String, ty: DeclType },
    Method { name: String, signature: String },
}

/// Unresolved struct declaration as produced by a front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub components: Vec<ComponentDecl>,
}

/// Split declared members into data members and methods, preserving order.
pub fn split_components(components: Vec<ComponentDecl>) -> (Vec<(String, DeclType)>, Vec<Method>) {
    let mut data = Vec::new();
    let mut methods = Vec::new();
    for component in components {
        match component {
            ComponentDecl::Data { name, ty } => data.push((name, ty)),
            ComponentDecl::Method { name, signature } => methods.push(Method { name, signature }),
        }
    }
    (data, methods)
}

fn named_references(ty: &DeclType, out: &mut Vec<String>) {
    match ty {
        DeclType::Resolved(_) => {}
        DeclType::Named(name) => out.push(name.clone()),
        DeclType::Array { element, .. } => named_references(element, out),
    }
}

/// Arena of struct definitions with an injective name index.
///
/// Members may only refer to structs defined before them, so a struct can
/// never (transitively) contain itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeTable {
    structs: Vec<StructDef>,
    by_name: IndexMap<String, TypeId>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a struct whose member types are already resolved.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        components: Vec<Component>,
    ) -> Result<TypeId, ValidationError> {
        self.insert_with_methods(name, components, Vec::new())
    }

    pub fn insert_with_methods(
        &mut self,
        name: impl Into<String>,
        components: Vec<Component>,
        methods: Vec<Method>,
    ) -> Result<TypeId, ValidationError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(ValidationError::DuplicateStruct(name));
        }
        for component in &components {
            self.check_member_type(&name, &component.ty, self.structs.len())?;
        }
        let id = TypeId(self.structs.len());
        self.structs.push(StructDef {
            name: name.clone(),
            components,
            methods,
        });
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Build a table from declarations that reference each other by name.
    ///
    /// Declarations are processed as a worklist: a declaration whose named
    /// members are not yet defined is deferred to the next pass. A pass that
    /// defines nothing means the remaining structs contain themselves.
    pub fn from_declarations(decls: Vec<StructDecl>) -> Result<Self, ValidationError> {
        let declared: Vec<&str> = decls.iter().map(|d| d.name.as_str()).collect();
        for decl in &decls {
            for component in &decl.components {
                if let ComponentDecl::Data { ty, .. } = component {
                    let mut refs = Vec::new();
                    named_references(ty, &mut refs);
                    if let Some(missing) = refs.iter().find(|r| !declared.contains(&r.as_str())) {
                        return Err(ValidationError::UnknownStruct(missing.clone()));
                    }
                }
            }
        }

        let mut table = TypeTable::new();
        let max_passes = decls.len() + 1;
        let mut worklist = decls;
        let mut passes = 0;
        while !worklist.is_empty() {
            passes += 1;
            if passes > max_passes {
                return Err(ValidationError::FixpointLimit(max_passes));
            }
            let mut deferred = Vec::new();
            let before = worklist.len();
            for decl in worklist {
                let ready = decl.components.iter().all(|component| match component {
                    ComponentDecl::Data { ty, .. } => {
                        let mut refs = Vec::new();
                        named_references(ty, &mut refs);
                        refs.iter().all(|r| table.by_name.contains_key(r))
                    }
                    ComponentDecl::Method { .. } => true,
                });
                if ready {
                    let (data, methods) = split_components(decl.components);
                    let components = data
                        .into_iter()
                        .map(|(name, ty)| {
                            table
                                .resolve_decl_type(&ty)
                                .map(|ty| Component { name, ty })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    table.insert_with_methods(decl.name, components, methods)?;
                } else {
                    deferred.push(decl);
                }
            }
            if deferred.len() == before {
                let names = deferred.into_iter().map(|d| d.name).collect();
                return Err(ValidationError::RecursiveStruct(names));
            }
            worklist = deferred;
        }
        Ok(table)
    }

    fn resolve_decl_type(&self, ty: &DeclType) -> Result<Type, ValidationError> {
        match ty {
            DeclType::Resolved(ty) => Ok(ty.clone()),
            DeclType::Named(name) => self
                .lookup(name)
                .map(Type::Struct)
                .ok_or_else(|| ValidationError::UnknownStruct(name.clone())),
            DeclType::Array { element, len } => {
                Ok(Type::array_of_len(self.resolve_decl_type(element)?, *len))
            }
        }
    }

    fn check_member_type(&self, owner: &str, ty: &Type, limit: usize) -> Result<(), ValidationError> {
        match ty {
            Type::Struct(id) if id.0 >= limit => {
                Err(ValidationError::RecursiveStruct(vec![owner.to_string()]))
            }
            Type::Array { element, .. } => self.check_member_type(owner, element, limit),
            _ => Ok(()),
        }
    }

    /// Check that every member refers only to structs defined before its
    /// owner. Tables built through [`TypeTable::insert`] always pass; tables
    /// deserialized from untrusted input might not.
    pub fn check_well_founded(&self) -> Result<(), ValidationError> {
        for (idx, def) in self.structs.iter().enumerate() {
            if self.by_name.get(&def.name) != Some(&TypeId(idx)) {
                return Err(ValidationError::DuplicateStruct(def.name.clone()));
            }
            for component in &def.components {
                self.check_member_type(&def.name, &component.ty, idx)?;
            }
        }
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: TypeId) -> Option<&StructDef> {
        self.structs.get(id.0)
    }

    pub fn name_of(&self, id: TypeId) -> Option<&str> {
        self.get(id).map(|def| def.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.structs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &StructDef)> {
        self.structs.iter().enumerate().map(|(i, def)| (TypeId(i), def))
    }
}
