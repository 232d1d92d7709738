//! Read typed data out of a running Dwarf Fortress process.
//!
//! This crate ties the pieces together and re-exports the commonly used
//! types:
//!
//! - [Schema] loads df-structures XML and the known versions.
//! - [Abi] and [MemoryLayout] turn the schema into concrete offsets.
//! - [ReaderFactory] and [ReadSession] decode process memory into host
//!   values declared with [ReadableStruct] and friends.
//! - [NativeProcess](dfview_memory::NativeProcess) (Linux),
//!   [SparseMemory], [CachingReader] and [VectorizingReader] provide and
//!   wrap the process back-end.

pub use dfview_abi::{Abi, AbiError, Arch, Compiler, StringRepr, TypeInfo};
pub use dfview_layout::{CompoundLayout, LayoutError, MemoryLayout};
pub use dfview_memory::{
    drive, CachingReader, MemView, MemoryError, MemoryReader, ProcessError, ReadRequest,
    SparseMemory, VectorizingReader,
};
#[cfg(target_os = "linux")]
pub use dfview_memory::NativeProcess;
pub use dfview_path::{parse_path, path, DisplayPath, PathItem, PathParseError};
pub use dfview_reader::{
    poly_pointee_reader, DiscriminatedReader, Fallback, FlagArray, FromScalar, ItemReader,
    PointeeRead, PolyItemReader, PolyReadable, PolySpec, ReadError, ReadSession, Readable,
    ReadableStruct, ReadableUnion, ReaderError, ReaderFactory, SharedObjectCache,
    StructItemReader, StructSpec, TypedPointer, UnionItemReader, UnionSpec,
};
pub use dfview_schema::{Schema, SchemaError, SchemaLookupError};
pub use dfview_types::{
    AttrValue, BitfieldType, CompoundType, DfContainerKind, DfContainerType, DfType, EnumType,
    FlagBit, Member, PaddingType, PointerType, PrimitiveKind, StaticArrayType, StdContainerKind,
    StdContainerType, TypeLookup, TypeRef, VersionInfo,
};
