use std::{error::Error, fmt, io, path::PathBuf};

/// Loading df-structures XML failed.
#[derive(Debug)]
pub enum SchemaError {
    /// A file or directory could not be read.
    Io {
        /// The offending path.
        path: PathBuf,
        /// The underlying error.
        error: io::Error,
    },
    /// The XML was read but contained errors; each has been logged.
    Invalid {
        /// How many errors were logged.
        errors: usize,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Io { path, error } => {
                write!(f, "failed to read {}: {}", path.display(), error)
            }
            SchemaError::Invalid { errors } => {
                write!(f, "failed to load structures xml ({} errors logged)", errors)
            }
        }
    }
}

impl Error for SchemaError {}

/// A name or path failed to resolve against the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaLookupError {
    /// The path has no items or does not start with an identifier.
    EmptyPath,
    /// No global object with this name.
    UndefinedGlobal(String),
    /// No type with this name.
    UndefinedType(String),
    /// A member access was applied to a non-compound type.
    NotACompound(String),
    /// An index was applied to a non-container type.
    NotAContainer(String),
    /// The compound has no member with this name.
    MemberNotFound {
        /// The compound that was searched.
        compound: String,
        /// The missing member name.
        member: String,
    },
}

impl fmt::Display for SchemaLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaLookupError::EmptyPath => {
                write!(f, "path must begin with an identifier")
            }
            SchemaLookupError::UndefinedGlobal(name) => {
                write!(f, "undefined global object: {}", name)
            }
            SchemaLookupError::UndefinedType(name) => write!(f, "undefined type: {}", name),
            SchemaLookupError::NotACompound(name) => {
                write!(f, "member access needs a compound, found {}", name)
            }
            SchemaLookupError::NotAContainer(name) => {
                write!(f, "index needs a container, found {}", name)
            }
            SchemaLookupError::MemberNotFound { compound, member } => {
                write!(f, "member {} not found in {}", member, compound)
            }
        }
    }
}

impl Error for SchemaLookupError {}
