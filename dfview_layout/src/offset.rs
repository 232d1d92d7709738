use dfview_path::PathItem;
use dfview_schema::{Schema, SchemaLookupError};
use dfview_types::{CompoundType, DfType};

use crate::{LayoutError, MemoryLayout};

impl MemoryLayout {
    /// Find the member of `base` designated by `path` and return its type
    /// and byte offset.
    ///
    /// Identifiers dive through anonymous nested compounds until the named
    /// member is found; `(name)` stops at the outermost member containing
    /// `name`; indices step into static arrays, by integer or by the name of
    /// an index-enum value.
    pub fn offset_of<'a>(
        &self,
        schema: &'a Schema,
        base: &'a CompoundType,
        path: &[PathItem],
    ) -> Result<(&'a DfType, usize), LayoutError> {
        let mut compound = Some(base);
        let mut current: Option<&'a DfType> = None;
        let mut offset = 0usize;

        for item in path {
            match item {
                PathItem::Field(name) => {
                    let here = self.expect_compound(compound, current)?;
                    let found = here.search_member(schema, name);
                    if found.is_empty() {
                        return Err(SchemaLookupError::MemberNotFound {
                            compound: here.debug_name.clone(),
                            member: name.clone(),
                        }
                        .into());
                    }
                    for (parent, index) in found {
                        let layout = self.compound_layout(parent)?;
                        offset += layout.member_offsets[index];
                        current = Some(schema.resolve(&parent.members[index].type_ref)?);
                    }
                    compound = None;
                }
                PathItem::ContainerOf(name) => {
                    let here = self.expect_compound(compound, current)?;
                    let found = here.search_member(schema, name);
                    let index = match found.first() {
                        Some((_, index)) => *index,
                        None => {
                            return Err(SchemaLookupError::MemberNotFound {
                                compound: here.debug_name.clone(),
                                member: name.clone(),
                            }
                            .into())
                        }
                    };
                    let layout = self.compound_layout(here)?;
                    offset += layout.member_offsets[index];
                    current = Some(schema.resolve(&here.members[index].type_ref)?);
                    compound = None;
                }
                PathItem::Index(_) | PathItem::EnumIndex(_) => {
                    let here = current.ok_or_else(|| {
                        LayoutError::NotAStaticArray("<path start>".to_string())
                    })?;
                    let array = match here {
                        DfType::StaticArray(array) => array,
                        other => {
                            return Err(LayoutError::NotAStaticArray(
                                other.kind_name().to_string(),
                            ))
                        }
                    };
                    let extent = array
                        .extent
                        .ok_or_else(|| LayoutError::MissingExtent(array.debug_name.clone()))?;
                    let index = match item {
                        PathItem::Index(index) => *index as i64,
                        PathItem::EnumIndex(value) => {
                            let enum_name = array.index_enum.as_ref().ok_or_else(|| {
                                LayoutError::IndexWithoutEnum(array.debug_name.clone())
                            })?;
                            let index_enum = schema.find_enum(enum_name).ok_or_else(|| {
                                LayoutError::Lookup(SchemaLookupError::UndefinedType(
                                    enum_name.clone(),
                                ))
                            })?;
                            index_enum.value_of(value).ok_or_else(|| {
                                LayoutError::UnknownEnumValue {
                                    index_enum: enum_name.clone(),
                                    value: value.clone(),
                                }
                            })?
                        }
                        PathItem::Field(_) | PathItem::ContainerOf(_) => unreachable!(),
                    };
                    if index < 0 || index as usize >= extent {
                        return Err(LayoutError::IndexOutOfBounds { index, extent });
                    }
                    let item_ty = schema.resolve(&array.item)?;
                    let item_info = self.type_info(item_ty)?;
                    offset += index as usize * item_info.size;
                    current = Some(item_ty);
                    compound = None;
                }
            }
        }

        match current {
            Some(ty) => Ok((ty, offset)),
            None => Err(SchemaLookupError::EmptyPath.into()),
        }
    }

    fn expect_compound<'a>(
        &self,
        start: Option<&'a CompoundType>,
        current: Option<&'a DfType>,
    ) -> Result<&'a CompoundType, LayoutError> {
        match (start, current) {
            (Some(compound), _) => Ok(compound),
            (None, Some(DfType::Compound(compound))) => Ok(compound),
            (None, Some(other)) => {
                Err(SchemaLookupError::NotACompound(other.kind_name().to_string()).into())
            }
            (None, None) => Err(SchemaLookupError::EmptyPath.into()),
        }
    }
}
