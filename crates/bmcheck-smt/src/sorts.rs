/// SMT sorts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    BitVec(u32),
    /// Array from index sort to element sort.
    Array(Box<SmtSort>, Box<SmtSort>),
}

impl SmtSort {
    pub fn array(index: SmtSort, element: SmtSort) -> Self {
        SmtSort::Array(Box::new(index), Box::new(element))
    }

    pub fn bv_width(&self) -> Option<u32> {
        match self {
            SmtSort::BitVec(w) => Some(*w),
            _ => None,
        }
    }
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::BitVec(w) => write!(f, "(_ BitVec {w})"),
            SmtSort::Array(index, element) => write!(f, "(Array {index} {element})"),
        }
    }
}
