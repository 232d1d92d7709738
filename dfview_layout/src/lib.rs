//! Sizes, alignments and offsets for all types and compound members.
//!
//! The [Abi](dfview_abi::Abi) knows the layout of primitives and standard
//! containers; [MemoryLayout] extends that to every type reachable from a
//! schema: compounds get member offsets computed with the compiler's layout
//! rules, arrays multiply out their item layout, and pointer targets are
//! deferred so that cyclic type graphs terminate.
//!
//! A layout only makes sense together with the schema it was computed from;
//! lookups on types from another schema report a missing layout.

pub use error::LayoutError;
pub use solver::{CompoundLayout, MemoryLayout};

mod error;
mod offset;
mod solver;

#[cfg(test)]
mod tests;
