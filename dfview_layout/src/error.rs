use std::{error::Error, fmt};

use dfview_schema::SchemaLookupError;

/// Computing or querying a memory layout failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// A compound contains itself by value, directly or through its parent.
    CyclicDependency(String),
    /// A static array has no extent and no index enum to derive one from.
    MissingExtent(String),
    /// The type was not part of the schema this layout was computed from.
    MissingLayout(String),
    /// A container's type parameters do not fit its kind.
    InvalidContainer(String),
    /// A compound names a parent that is not a compound.
    ParentNotCompound {
        /// The inheriting compound.
        compound: String,
        /// The offending parent name.
        parent: String,
    },
    /// A path item was applied to an incompatible type.
    NotAStaticArray(String),
    /// A named index was used on an array without an index enum.
    IndexWithoutEnum(String),
    /// A named index does not exist in the array's index enum.
    UnknownEnumValue {
        /// The index enum name.
        index_enum: String,
        /// The missing value name.
        value: String,
    },
    /// An index does not fit the array extent.
    IndexOutOfBounds {
        /// The requested index.
        index: i64,
        /// The array extent.
        extent: usize,
    },
    /// A name or member failed to resolve against the schema.
    Lookup(SchemaLookupError),
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::CyclicDependency(name) => {
                write!(f, "cyclic dependency while laying out {}", name)
            }
            LayoutError::MissingExtent(name) => {
                write!(f, "missing extent for static array {}", name)
            }
            LayoutError::MissingLayout(name) => write!(f, "no layout computed for {}", name),
            LayoutError::InvalidContainer(name) => {
                write!(f, "invalid type parameters for container {}", name)
            }
            LayoutError::ParentNotCompound { compound, parent } => {
                write!(f, "parent {} of {} is not a compound", parent, compound)
            }
            LayoutError::NotAStaticArray(name) => {
                write!(f, "index needs a static array, found {}", name)
            }
            LayoutError::IndexWithoutEnum(name) => {
                write!(f, "named index on array {} without an index enum", name)
            }
            LayoutError::UnknownEnumValue { index_enum, value } => {
                write!(f, "enum {} has no value named {}", index_enum, value)
            }
            LayoutError::IndexOutOfBounds { index, extent } => {
                write!(f, "index {} out of bounds for extent {}", index, extent)
            }
            LayoutError::Lookup(error) => write!(f, "{}", error),
        }
    }
}

impl Error for LayoutError {}

impl From<SchemaLookupError> for LayoutError {
    fn from(v: SchemaLookupError) -> Self {
        Self::Lookup(v)
    }
}
