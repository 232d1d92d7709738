use std::{error::Error, fmt};

use dfview_abi::AbiError;
use dfview_layout::LayoutError;
use dfview_memory::MemoryError;
use dfview_schema::SchemaLookupError;

/// Building a reader failed.
///
/// Construction errors are fatal: they bubble out of the factory and the
/// partially built reader is discarded.
#[derive(Debug, Clone)]
pub enum ReaderError {
    /// The schema type cannot be decoded into the host type.
    TypeMismatch {
        /// What went wrong.
        message: String,
        /// The schema type involved.
        df_type: String,
        /// The host type involved.
        host_type: &'static str,
    },
    /// The host integer is narrower than the schema cell.
    StorageTooSmall {
        /// Bytes available in the host type.
        host: usize,
        /// Bytes required by the schema type.
        needed: usize,
        /// The host type involved.
        host_type: &'static str,
    },
    /// One or more field bindings failed; each was logged.
    FieldErrors {
        /// The schema compound being bound.
        compound: String,
        /// The host type involved.
        host_type: &'static str,
    },
    /// A polymorphic registry asks for base fallback but has no concrete
    /// base.
    AbstractBaseFallback {
        /// The host type involved.
        host_type: &'static str,
    },
    /// The current version has no address for this global object.
    MissingGlobalAddress(String),
    /// A name or path failed to resolve.
    Lookup(SchemaLookupError),
    /// Layout information is missing or inconsistent.
    Layout(LayoutError),
    /// No ABI could be selected or applied.
    Abi(AbiError),
    /// An external shared-object cache was attached twice for one type.
    DuplicateSharedCache(&'static str),
}

impl ReaderError {
    pub(crate) fn type_mismatch(
        message: impl Into<String>,
        df_type: impl fmt::Display,
        host_type: &'static str,
    ) -> Self {
        ReaderError::TypeMismatch {
            message: message.into(),
            df_type: df_type.to_string(),
            host_type,
        }
    }
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReaderError::TypeMismatch {
                message,
                df_type,
                host_type,
            } => write!(f, "{} (df: {}, local: {})", message, df_type, host_type),
            ReaderError::StorageTooSmall {
                host,
                needed,
                host_type,
            } => write!(
                f,
                "storage is too small ({} bytes in {}, must be at least {})",
                host, host_type, needed
            ),
            ReaderError::FieldErrors {
                compound,
                host_type,
            } => write!(f, "nested errors in {} (local: {})", compound, host_type),
            ReaderError::AbstractBaseFallback { host_type } => {
                write!(f, "base fallback on abstract base type {}", host_type)
            }
            ReaderError::MissingGlobalAddress(name) => {
                write!(f, "global object address not found: {}", name)
            }
            ReaderError::Lookup(error) => write!(f, "{}", error),
            ReaderError::Layout(error) => write!(f, "{}", error),
            ReaderError::Abi(error) => write!(f, "{}", error),
            ReaderError::DuplicateSharedCache(host_type) => {
                write!(f, "duplicate shared object cache for {}", host_type)
            }
        }
    }
}

impl Error for ReaderError {}

impl From<SchemaLookupError> for ReaderError {
    fn from(v: SchemaLookupError) -> Self {
        Self::Lookup(v)
    }
}

impl From<LayoutError> for ReaderError {
    fn from(v: LayoutError) -> Self {
        Self::Layout(v)
    }
}

impl From<AbiError> for ReaderError {
    fn from(v: AbiError) -> Self {
        Self::Abi(v)
    }
}

/// A read operation failed.
///
/// Individual read failures inside a batch are logged; the batch reports a
/// single boolean outcome.
#[derive(Debug, Clone)]
pub enum ReadError {
    /// The process back-end failed.
    Memory(MemoryError),
    /// A cell could not be decoded.
    Abi(AbiError),
    /// The decoder for this representation intentionally does not exist.
    NotImplemented(&'static str),
    /// A union or variant discriminator selects no alternative.
    InvalidDiscriminator {
        /// The discriminator value.
        value: i64,
        /// The number of alternatives.
        count: usize,
    },
    /// A per-item discriminator sequence does not match the container
    /// length.
    DiscriminatorCount {
        /// Items in the container.
        expected: usize,
        /// Discriminators supplied.
        actual: usize,
    },
    /// One or more fields of a compound failed to read; each was logged.
    InvalidField,
    /// A vtable address matched no registered class.
    CastError {
        /// The vtable address after base offset correction.
        vtable: u64,
    },
    /// An abstract type would have to be materialised.
    AbstractType,
    /// The same address was shared-read as two different base types.
    SharedTypeMismatch {
        /// The contested address.
        address: u64,
    },
    /// A reader could not be built for this read.
    Construction(String),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadError::Memory(error) => write!(f, "{}", error),
            ReadError::Abi(error) => write!(f, "{}", error),
            ReadError::NotImplemented(what) => write!(f, "not implemented: {}", what),
            ReadError::InvalidDiscriminator { value, count } => {
                write!(f, "invalid discriminator {} for {} alternatives", value, count)
            }
            ReadError::DiscriminatorCount { expected, actual } => write!(
                f,
                "discriminator count {} does not match item count {}",
                actual, expected
            ),
            ReadError::InvalidField => write!(f, "invalid field"),
            ReadError::CastError { vtable } => {
                write!(f, "unknown vtable address {:#x}", vtable)
            }
            ReadError::AbstractType => write!(f, "trying to instantiate an abstract type"),
            ReadError::SharedTypeMismatch { address } => {
                write!(f, "shared object type mismatch at {:#x}", address)
            }
            ReadError::Construction(message) => write!(f, "{}", message),
        }
    }
}

impl Error for ReadError {}

impl From<MemoryError> for ReadError {
    fn from(v: MemoryError) -> Self {
        Self::Memory(v)
    }
}

impl From<AbiError> for ReadError {
    fn from(v: AbiError) -> Self {
        Self::Abi(v)
    }
}

impl From<ReaderError> for ReadError {
    fn from(v: ReaderError) -> Self {
        Self::Construction(v.to_string())
    }
}
