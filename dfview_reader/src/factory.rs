use std::{
    any::{Any, TypeId},
    cell::RefCell,
    collections::HashMap,
    rc::Rc,
};

use dfview_abi::Abi;
use dfview_layout::MemoryLayout;
use dfview_schema::Schema;
use dfview_types::{DfType, VersionInfo};

use crate::{
    poly::PolyReader,
    structure::{new_struct_reader, StructReader},
    unions::{new_union_reader, UnionReader},
    ItemReader, PolyReadable, Readable, ReadableStruct, ReadableUnion, ReaderError,
};

/// Creates and caches readers for one schema, version and ABI.
///
/// The factory picks the ABI from the version name, computes the memory
/// layout once, and hands out struct, union and polymorphic readers cached
/// by host type identity. Reader construction failures are logged and
/// returned; the partial reader is discarded.
pub struct ReaderFactory<'s> {
    schema: &'s Schema,
    version: &'s VersionInfo,
    abi: Abi,
    layout: MemoryLayout,
    struct_readers: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    union_readers: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    poly_readers: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl<'s> ReaderFactory<'s> {
    /// Build a factory for `schema` using `version`.
    ///
    /// Fails if no ABI matches the version name or the layout cannot be
    /// computed.
    pub fn new(schema: &'s Schema, version: &'s VersionInfo) -> Result<Self, ReaderError> {
        let abi = Abi::from_version_name(&version.name)?;
        let layout = MemoryLayout::new(schema, abi)?;
        Ok(ReaderFactory {
            schema,
            version,
            abi,
            layout,
            struct_readers: RefCell::new(HashMap::new()),
            union_readers: RefCell::new(HashMap::new()),
            poly_readers: RefCell::new(HashMap::new()),
        })
    }

    /// The schema readers are built against.
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// The version readers are built against.
    pub fn version(&self) -> &'s VersionInfo {
        self.version
    }

    /// The selected ABI.
    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// The computed layout.
    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Build an item reader for host type `T` from the schema type `ty`.
    pub fn item_reader<T: Readable>(&self, ty: &DfType) -> Result<T::Reader, ReaderError> {
        T::Reader::new(self, ty)
    }

    /// The cached struct reader for `T`, built on first use.
    pub fn struct_reader<T: ReadableStruct>(&self) -> Result<Rc<StructReader<T>>, ReaderError> {
        let key = TypeId::of::<T>();
        if let Some(cached) = self.struct_readers.borrow().get(&key) {
            if let Ok(reader) = Rc::clone(cached).downcast::<StructReader<T>>() {
                return Ok(reader);
            }
        }

        let spec = T::spec();
        let compound = self.schema.find_compound_by_path(&spec.type_path)?;
        let info = self.layout.compound_info(compound)?;
        let reader = Rc::new(new_struct_reader(&spec, compound, info));
        // Insert before binding fields so self-referential host types can
        // resolve their own reader while it is being built.
        self.struct_readers
            .borrow_mut()
            .insert(key, reader.clone() as Rc<dyn Any>);

        let mut fields = Vec::with_capacity(spec.fields.len());
        let mut failed = false;
        for (label, ctor) in &spec.fields {
            match ctor(self, compound) {
                Ok(field) => fields.push(field),
                Err(error) => {
                    log::error!(
                        "{} in {} (local: {}): {}",
                        label,
                        compound.debug_name,
                        std::any::type_name::<T>(),
                        error
                    );
                    failed = true;
                }
            }
        }
        if failed {
            self.struct_readers.borrow_mut().remove(&key);
            return Err(ReaderError::FieldErrors {
                compound: compound.debug_name.clone(),
                host_type: std::any::type_name::<T>(),
            });
        }
        let _ = reader.fields.set(fields);
        Ok(reader)
    }

    /// The cached union reader for `T`, built on first use.
    pub fn union_reader<T: ReadableUnion>(&self) -> Result<Rc<UnionReader<T>>, ReaderError> {
        let key = TypeId::of::<T>();
        if let Some(cached) = self.union_readers.borrow().get(&key) {
            if let Ok(reader) = Rc::clone(cached).downcast::<UnionReader<T>>() {
                return Ok(reader);
            }
        }

        let spec = T::spec();
        let compound = self.schema.find_compound_by_path(&spec.type_path)?;
        if !compound.is_union {
            return Err(ReaderError::type_mismatch(
                format!("{} is not a union", compound.debug_name),
                compound.debug_name.clone(),
                std::any::type_name::<T>(),
            ));
        }
        if compound.members.len() != spec.alts.len() {
            return Err(ReaderError::type_mismatch(
                format!(
                    "{} has {} members but the host has {} alternatives",
                    compound.debug_name,
                    compound.members.len(),
                    spec.alts.len()
                ),
                compound.debug_name.clone(),
                std::any::type_name::<T>(),
            ));
        }
        let info = self.layout.compound_info(compound)?;
        let reader = Rc::new(new_union_reader(&spec, compound, info));
        self.union_readers
            .borrow_mut()
            .insert(key, reader.clone() as Rc<dyn Any>);

        let mut alts = Vec::with_capacity(spec.alts.len());
        let mut build = || -> Result<(), ReaderError> {
            for (member, ctor) in compound.members.iter().zip(&spec.alts) {
                let member_ty = self.schema.resolve(&member.type_ref)?;
                alts.push(ctor(self, member_ty)?);
            }
            Ok(())
        };
        match build() {
            Ok(()) => {
                let _ = reader.alts.set(alts);
                Ok(reader)
            }
            Err(error) => {
                self.union_readers.borrow_mut().remove(&key);
                Err(error)
            }
        }
    }

    /// The cached polymorphic reader for the base type `T`, built on first
    /// use.
    pub fn poly_reader<T: PolyReadable>(&self) -> Result<Rc<PolyReader<T>>, ReaderError> {
        let key = TypeId::of::<T>();
        if let Some(cached) = self.poly_readers.borrow().get(&key) {
            if let Ok(reader) = Rc::clone(cached).downcast::<PolyReader<T>>() {
                return Ok(reader);
            }
        }

        let spec = T::poly_spec();
        if spec.fallback == crate::Fallback::Base && spec.base_is_abstract {
            return Err(ReaderError::AbstractBaseFallback {
                host_type: std::any::type_name::<T>(),
            });
        }
        let reader = Rc::new(PolyReader::<T>::empty(spec.fallback));
        self.poly_readers
            .borrow_mut()
            .insert(key, reader.clone() as Rc<dyn Any>);

        let mut entries = Vec::with_capacity(spec.entries.len());
        let mut build = || -> Result<(), ReaderError> {
            for ctor in &spec.entries {
                entries.push(ctor(self)?);
            }
            Ok(())
        };
        match build() {
            Ok(()) => {
                let _ = reader.entries.set(entries);
                Ok(reader)
            }
            Err(error) => {
                self.poly_readers.borrow_mut().remove(&key);
                Err(error)
            }
        }
    }
}
