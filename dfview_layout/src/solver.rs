use std::collections::{HashMap, HashSet};

use dfview_abi::{Abi, Compiler, TypeInfo};
use dfview_schema::Schema;
use dfview_types::{CompoundType, DfType, TypeLookup, TypeRef};

use crate::LayoutError;

/// Identity of a type within one schema.
///
/// Named types and anonymous owned types both live at stable addresses for
/// the schema's lifetime, so the address is the identity. Keys are never
/// dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TypeKey(usize);

impl TypeKey {
    fn of(ty: &DfType) -> Self {
        TypeKey(ty as *const DfType as usize)
    }

    fn of_compound(compound: &CompoundType) -> Self {
        TypeKey(compound as *const CompoundType as usize)
    }
}

/// Extra layout information for a compound in addition to size and
/// alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundLayout {
    /// Size of the compound without its trailing padding.
    ///
    /// Derived classes start here under the GNU ABI.
    pub unaligned_size: usize,
    /// Offset of each member, indexed like the compound's member list.
    pub member_offsets: Vec<usize>,
}

/// Sizes, alignments and offsets for every type of one schema under one ABI.
#[derive(Debug)]
pub struct MemoryLayout {
    abi: Abi,
    type_info: HashMap<TypeKey, TypeInfo>,
    compound_info: HashMap<TypeKey, TypeInfo>,
    compound_layout: HashMap<TypeKey, CompoundLayout>,
}

impl MemoryLayout {
    /// Compute layout for every type reachable from `schema`'s named types
    /// and global objects.
    pub fn new(schema: &Schema, abi: Abi) -> Result<Self, LayoutError> {
        let mut solver = Solver {
            schema,
            abi,
            layout: MemoryLayout {
                abi,
                type_info: HashMap::new(),
                compound_info: HashMap::new(),
                compound_layout: HashMap::new(),
            },
            in_progress: HashSet::new(),
            queue: Vec::new(),
        };

        for (_, ty) in schema.all_types() {
            solver.queue.push(ty);
        }
        for (_, type_ref) in schema.global_objects() {
            let ty = schema.resolve(type_ref)?;
            solver.queue.push(ty);
        }
        while let Some(ty) = solver.queue.pop() {
            solver.info_of(ty)?;
        }

        Ok(solver.layout)
    }

    /// The ABI this layout was computed with.
    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Size and alignment of `ty`.
    pub fn type_info(&self, ty: &DfType) -> Result<TypeInfo, LayoutError> {
        self.type_info
            .get(&TypeKey::of(ty))
            .copied()
            .ok_or_else(|| LayoutError::MissingLayout(ty.kind_name().to_string()))
    }

    /// Size and alignment of a compound, usable for the synthesised header
    /// compounds of engine containers as well.
    pub fn compound_info(&self, compound: &CompoundType) -> Result<TypeInfo, LayoutError> {
        self.compound_info
            .get(&TypeKey::of_compound(compound))
            .copied()
            .ok_or_else(|| LayoutError::MissingLayout(compound.debug_name.clone()))
    }

    /// Unaligned size and member offsets of a compound.
    pub fn compound_layout(&self, compound: &CompoundType) -> Result<&CompoundLayout, LayoutError> {
        self.compound_layout
            .get(&TypeKey::of_compound(compound))
            .ok_or_else(|| LayoutError::MissingLayout(compound.debug_name.clone()))
    }
}

struct Solver<'a> {
    schema: &'a Schema,
    abi: Abi,
    layout: MemoryLayout,
    in_progress: HashSet<TypeKey>,
    queue: Vec<&'a DfType>,
}

impl<'a> Solver<'a> {
    /// Queue a referenced type for later resolution instead of requiring it
    /// now. This breaks cycles at pointers.
    fn defer(&mut self, type_ref: &'a TypeRef) -> Result<(), LayoutError> {
        let ty = self.schema.resolve(type_ref)?;
        if !self.layout.type_info.contains_key(&TypeKey::of(ty)) {
            self.queue.push(ty);
        }
        Ok(())
    }

    fn info_of(&mut self, ty: &'a DfType) -> Result<TypeInfo, LayoutError> {
        if let Some(info) = self.layout.type_info.get(&TypeKey::of(ty)) {
            return Ok(*info);
        }
        let info = match ty {
            DfType::Primitive(kind) => self.abi.primitive_info(*kind),
            DfType::Enum(parsed) => self.abi.primitive_info(parsed.base),
            DfType::Bitfield(parsed) => self.abi.primitive_info(parsed.base),
            DfType::Padding(padding) => TypeInfo::new(padding.size, padding.align),
            DfType::Pointer(pointer) => {
                if let Some(item) = &pointer.item {
                    self.defer(item)?;
                }
                self.abi.pointer()
            }
            DfType::StaticArray(array) => {
                let item = self.schema.resolve(&array.item)?;
                let item_info = self.info_of(item)?;
                let extent = array
                    .extent
                    .ok_or_else(|| LayoutError::MissingExtent(array.debug_name.clone()))?;
                TypeInfo::new(extent * item_info.size, item_info.align)
            }
            DfType::StdContainer(container) => {
                if container.kind.requires_complete_params() {
                    let mut params = Vec::with_capacity(container.type_params.len());
                    for param in &container.type_params {
                        let param_ty = self.schema.resolve(param)?;
                        params.push(self.info_of(param_ty)?);
                    }
                    self.abi
                        .parametric_container_info(container.kind, &params)
                        .ok_or_else(|| {
                            LayoutError::InvalidContainer(container.debug_name.clone())
                        })?
                } else {
                    for param in &container.type_params {
                        self.defer(param)?;
                    }
                    self.abi
                        .std_container_info(container.kind)
                        .ok_or_else(|| {
                            LayoutError::InvalidContainer(container.debug_name.clone())
                        })?
                }
            }
            DfType::DfContainer(container) => {
                if let Some(item) = &container.item {
                    self.defer(item)?;
                }
                self.compound_info_of(&container.header)?
            }
            DfType::Compound(compound) => self.compound_info_of(compound)?,
        };
        self.layout.type_info.insert(TypeKey::of(ty), info);
        Ok(info)
    }

    fn compound_info_of(&mut self, compound: &'a CompoundType) -> Result<TypeInfo, LayoutError> {
        let key = TypeKey::of_compound(compound);
        if let Some(info) = self.layout.compound_info.get(&key) {
            return Ok(*info);
        }
        if !self.in_progress.insert(key) {
            return Err(LayoutError::CyclicDependency(compound.debug_name.clone()));
        }

        let mut offset = 0usize;
        let mut align = 1usize;
        let mut union_size = 0usize;

        if let Some(parent_name) = &compound.parent {
            let parent_ty = self
                .schema
                .type_by_name(parent_name)
                .ok_or_else(|| LayoutError::ParentNotCompound {
                    compound: compound.debug_name.clone(),
                    parent: parent_name.clone(),
                })?;
            let parent = parent_ty
                .as_compound()
                .ok_or_else(|| LayoutError::ParentNotCompound {
                    compound: compound.debug_name.clone(),
                    parent: parent_name.clone(),
                })?;
            let parent_info = self.compound_info_of(parent)?;
            let parent_layout = self.layout.compound_layout(parent)?;
            // The GNU ABI reuses the parent's trailing padding for the first
            // members of a derived class.
            offset = match self.abi.compiler {
                Compiler::Gnu => parent_layout.unaligned_size,
                Compiler::Msvc => parent_info.size,
            };
            align = parent_info.align;
        } else if compound.vtable {
            let pointer = self.abi.pointer();
            offset = pointer.size;
            align = pointer.align;
        }

        let mut member_offsets = Vec::with_capacity(compound.members.len());
        for member in &compound.members {
            let member_ty = self.schema.resolve(&member.type_ref)?;
            let member_info = self.info_of(member_ty)?;
            let member_offset = align_up(offset, member_info.align);
            member_offsets.push(member_offset);
            if compound.is_union {
                union_size = union_size.max(member_info.size);
            } else {
                offset = member_offset + member_info.size;
            }
            align = align.max(member_info.align);
        }

        let unaligned_size = if compound.is_union { union_size } else { offset };
        let info = TypeInfo::new(align_up(unaligned_size, align), align);
        self.layout.compound_layout.insert(
            key,
            CompoundLayout {
                unaligned_size,
                member_offsets,
            },
        );
        self.layout.compound_info.insert(key, info);
        self.in_progress.remove(&key);
        Ok(info)
    }
}

pub(crate) fn align_up(offset: usize, align: usize) -> usize {
    if align <= 1 {
        offset
    } else {
        (offset + align - 1) / align * align
    }
}
