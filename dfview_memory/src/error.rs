use std::{error::Error, fmt};

/// An error while reading target process memory.
///
/// Clonable so that a single failed read shared by several waiters can be
/// reported to each of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The address range is not readable in the target.
    InvalidAddress {
        /// Start of the requested range.
        address: u64,
        /// Length of the requested range.
        len: usize,
    },
    /// The operating system rejected the read.
    Os {
        /// The raw OS error code.
        code: i32,
        /// The formatted OS error message.
        message: String,
    },
    /// The read completed with fewer bytes than requested.
    ShortRead {
        /// Start of the requested range.
        address: u64,
        /// Bytes requested.
        requested: usize,
        /// Bytes delivered.
        delivered: usize,
    },
    /// The batch holding this read was dropped before it completed.
    Interrupted,
}

impl MemoryError {
    /// Wrap the current OS error.
    #[cfg(target_os = "linux")]
    pub(crate) fn last_os_error() -> Self {
        let err = std::io::Error::last_os_error();
        MemoryError::Os {
            code: err.raw_os_error().unwrap_or(0),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::InvalidAddress { address, len } => {
                write!(f, "invalid address range {:#x}..{:#x}", address, address + *len as u64)
            }
            MemoryError::Os { code, message } => write!(f, "read failed ({}): {}", code, message),
            MemoryError::ShortRead {
                address,
                requested,
                delivered,
            } => write!(
                f,
                "short read at {:#x}: {} of {} bytes",
                address, delivered, requested
            ),
            MemoryError::Interrupted => write!(f, "read batch dropped before completion"),
        }
    }
}

impl Error for MemoryError {}

/// An error while stopping or resuming the target process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessError {
    /// The raw OS error code, if one applies.
    pub code: i32,
    /// A human readable description.
    pub message: String,
}

impl ProcessError {
    /// Wrap the current OS error.
    #[cfg(target_os = "linux")]
    pub(crate) fn last_os_error() -> Self {
        let err = std::io::Error::last_os_error();
        ProcessError {
            code: err.raw_os_error().unwrap_or(0),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process control failed ({}): {}", self.code, self.message)
    }
}

impl Error for ProcessError {}
