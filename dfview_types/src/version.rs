use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One identified build of the game.
///
/// Carries the tables used to locate global objects and vtables in that
/// build's address space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Human readable name, e.g. `v0.47.05 linux64`.
    pub name: String,
    /// Binary identifier: a 4-byte big-endian PE timestamp or a 16-byte ELF
    /// MD5 checksum.
    pub id: Vec<u8>,
    /// Addresses of global objects.
    pub global_addresses: IndexMap<String, u64>,
    /// Addresses of vtables for classes.
    pub vtable_addresses: IndexMap<String, u64>,
}

impl VersionInfo {
    /// Create an empty version record.
    pub fn new(name: impl Into<String>) -> Self {
        VersionInfo {
            name: name.into(),
            id: Vec::new(),
            global_addresses: IndexMap::new(),
            vtable_addresses: IndexMap::new(),
        }
    }

    /// Whether this version matches a binary identifier.
    pub fn matches_id(&self, id: &[u8]) -> bool {
        !self.id.is_empty() && self.id == id
    }
}
