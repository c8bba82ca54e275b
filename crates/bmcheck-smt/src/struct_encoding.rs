//! Flattening of struct types into bit-vectors.
//!
//! A struct value is the concatenation of its data members, the first member
//! in the most significant bits. Boolean members take one bit. Arrays keep
//! their size expression and have their element type encoded recursively.
//! Layouts are computed on first use and cached per struct id.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bmcheck_ir::types::{Type, TypeId, TypeTable};
use tracing::debug;

use crate::error::EncodingError;
use crate::sorts::SmtSort;

/// Placement of one data member inside its struct's bit-vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout {
    pub name: String,
    /// Index of the lowest bit occupied by the member.
    pub offset: u32,
    pub width: u32,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub width: u32,
    pub members: Vec<MemberLayout>,
}

impl StructLayout {
    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Type encoder bound to one type table. The layout cache lives as long as
/// the encoder, i.e. one checking run.
pub struct StructEncoder<'t> {
    types: &'t TypeTable,
    cache: RefCell<HashMap<TypeId, Rc<StructLayout>>>,
}

impl<'t> StructEncoder<'t> {
    pub fn new(types: &'t TypeTable) -> Self {
        Self {
            types,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn types(&self) -> &'t TypeTable {
        self.types
    }

    /// Encode a type: structs become bit-vectors of their total width, arrays
    /// are encoded element-wise, everything else is returned unchanged.
    pub fn encode(&self, ty: &Type) -> Result<Type, EncodingError> {
        match ty {
            Type::Bool | Type::Unsigned(_) | Type::Signed(_) | Type::BitVector(_) => Ok(ty.clone()),
            Type::Struct(id) => Ok(Type::BitVector(self.layout(*id)?.width)),
            Type::Array { element, size } => Ok(Type::Array {
                element: Box::new(self.encode(element)?),
                size: size.clone(),
            }),
        }
    }

    /// Bit width of a scalar or struct type.
    pub fn width_of(&self, ty: &Type) -> Result<u32, EncodingError> {
        match ty {
            Type::Struct(id) => Ok(self.layout(*id)?.width),
            Type::Array { .. } => Err(EncodingError::Unsupported(format!(
                "array type `{ty}` has no bit width"
            ))),
            scalar => scalar
                .scalar_width()
                .ok_or_else(|| EncodingError::Unsupported(format!("type `{scalar}`"))),
        }
    }

    /// Lowest bit and width of `member` within struct `id`.
    pub fn member_offset(&self, id: TypeId, member: &str) -> Result<(u32, u32), EncodingError> {
        let layout = self.layout(id)?;
        layout
            .member(member)
            .map(|m| (m.offset, m.width))
            .ok_or_else(|| {
                EncodingError::Unsupported(format!("struct {id} has no member `{member}`"))
            })
    }

    /// SMT sort of a (not yet encoded) type.
    pub fn sort_of(&self, ty: &Type) -> Result<SmtSort, EncodingError> {
        match ty {
            Type::Bool => Ok(SmtSort::Bool),
            Type::Array { element, size } => {
                let index_width = size.ty().scalar_width().ok_or_else(|| {
                    EncodingError::Unsupported(format!("array size `{size}` is not a bit-vector"))
                })?;
                Ok(SmtSort::array(
                    SmtSort::BitVec(index_width),
                    self.sort_of(element)?,
                ))
            }
            other => Ok(SmtSort::BitVec(self.width_of(other)?)),
        }
    }

    pub fn layout(&self, id: TypeId) -> Result<Rc<StructLayout>, EncodingError> {
        if let Some(layout) = self.cache.borrow().get(&id) {
            return Ok(Rc::clone(layout));
        }
        let def = self.types.get(id).ok_or(EncodingError::UnknownStruct(id))?;
        let mut widths = Vec::with_capacity(def.components.len());
        for component in &def.components {
            if matches!(component.ty, Type::Array { .. }) {
                return Err(EncodingError::Unsupported(format!(
                    "struct `{}` has array member `{}`",
                    def.name, component.name
                )));
            }
            widths.push(self.width_of(&component.ty)?);
        }
        let width: u32 = widths.iter().sum();
        if width == 0 {
            return Err(EncodingError::Unsupported(format!(
                "struct `{}` has no data members",
                def.name
            )));
        }
        let mut members = Vec::with_capacity(widths.len());
        let mut high = width;
        for (component, member_width) in def.components.iter().zip(widths) {
            high -= member_width;
            members.push(MemberLayout {
                name: component.name.clone(),
                offset: high,
                width: member_width,
                ty: component.ty.clone(),
            });
        }
        debug!(struct_name = %def.name, width, "computed struct layout");
        let layout = Rc::new(StructLayout { width, members });
        self.cache
            .borrow_mut()
            .entry(id)
            .or_insert_with(|| Rc::clone(&layout));
        Ok(layout)
    }

    pub fn cached_layouts(&self) -> usize {
        self.cache.borrow().len()
    }
}
