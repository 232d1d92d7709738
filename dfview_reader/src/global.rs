use dfview_memory::MemoryReader;
use dfview_path::PathItem;
use dfview_schema::SchemaLookupError;

use crate::{ReaderError, ReaderFactory, TypedPointer};

/// Resolve a path against the global object table to an address and type.
///
/// The first item must name a global object recorded in the factory's
/// version; the rest walks into it with the layout's offsets. When a
/// `process` is given, its base offset is applied to the address.
pub fn global_pointer<'s>(
    factory: &ReaderFactory<'s>,
    path: &[PathItem],
    process: Option<&dyn MemoryReader>,
) -> Result<TypedPointer<'s>, ReaderError> {
    let (first, rest) = path
        .split_first()
        .ok_or(ReaderError::Lookup(SchemaLookupError::EmptyPath))?;
    let name = match first {
        PathItem::Field(name) => name,
        _ => return Err(ReaderError::Lookup(SchemaLookupError::EmptyPath)),
    };

    let base = factory
        .version()
        .global_addresses
        .get(name)
        .copied()
        .ok_or_else(|| ReaderError::MissingGlobalAddress(name.clone()))?;
    let address = base.wrapping_add(process.map_or(0, |p| p.base_offset()) as u64);

    let global_type = factory
        .schema()
        .global_object_type(name)
        .ok_or_else(|| ReaderError::Lookup(SchemaLookupError::UndefinedGlobal(name.clone())))?;
    let root = factory.schema().resolve(global_type)?;

    if rest.is_empty() {
        return Ok(TypedPointer { address, ty: root });
    }
    let compound = root.as_compound().ok_or_else(|| {
        ReaderError::Lookup(SchemaLookupError::NotACompound(root.kind_name().to_string()))
    })?;
    let (ty, offset) = factory
        .layout()
        .offset_of(factory.schema(), compound, rest)?;
    Ok(TypedPointer {
        address: address + offset as u64,
        ty,
    })
}
