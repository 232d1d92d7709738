use std::{error::Error, fmt};

use dfview_memory::MemoryError;

/// Errors when decoding data according to an ABI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// A pointer is misaligned.
    UnalignedPointer,
    /// A pointer is invalid.
    InvalidPointer,
    /// A container length is invalid or too big.
    InvalidLength,
    /// A container capacity is invalid or too big.
    InvalidCapacity,
    /// No ABI is known for this version name.
    UnsupportedVersion(String),
    /// Reading backing storage from the target failed.
    Memory(MemoryError),
}

impl fmt::Display for AbiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiError::UnalignedPointer => write!(f, "unaligned pointer"),
            AbiError::InvalidPointer => write!(f, "invalid pointer"),
            AbiError::InvalidLength => write!(f, "invalid length"),
            AbiError::InvalidCapacity => write!(f, "invalid capacity"),
            AbiError::UnsupportedVersion(name) => {
                write!(f, "unsupported abi for {}", name)
            }
            AbiError::Memory(error) => write!(f, "{}", error),
        }
    }
}

impl Error for AbiError {}

impl From<MemoryError> for AbiError {
    fn from(v: MemoryError) -> Self {
        Self::Memory(v)
    }
}
