//! Typed readers for Dwarf Fortress memory.
//!
//! A [Readable] host type knows which [ItemReader] decodes one cell of
//! target memory into it. Item readers compose: vectors build their item's
//! reader, struct readers bind host fields to schema members through paths,
//! union readers pick an alternative from a discriminator, and polymorphic
//! pointers dispatch on the vtable address found in the object.
//!
//! A [ReaderFactory] owns the computed [MemoryLayout](dfview_layout::MemoryLayout)
//! and caches struct and polymorphic readers per host type. A [ReadSession]
//! borrows the factory and a process, stops the process for its lifetime,
//! and drives any number of concurrent reads through it.

pub use containers::{ArrayReader, VecReader};
pub use error::{ReadError, ReaderError};
pub use factory::ReaderFactory;
pub use global::global_pointer;
pub use pointers::{poly_pointee_reader, BoxReader, PointeeRead, RcReader, StaticPointeeReader};
pub use poly::{Fallback, PolyItemReader, PolyReadable, PolyReader, PolySpec};
pub use scalars::{FlagArrayReader, FromScalar, IntReader};
pub use session::{ReadSession, SharedObjectCache, TypedPointer};
pub use strings::StringReader;
pub use structure::{ReadableStruct, StructItemReader, StructReader, StructSpec};
pub use traits::{DiscriminatedReader, ItemReader, Readable};
pub use unions::{ReadableUnion, UnionItemReader, UnionReader, UnionSpec};
pub use value::FlagArray;

mod containers;
mod error;
mod factory;
mod global;
mod pointers;
mod poly;
mod scalars;
mod session;
mod strings;
mod structure;
mod traits;
mod unions;
mod value;
