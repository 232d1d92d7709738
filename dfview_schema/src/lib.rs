//! Loading and querying df-structures XML.
//!
//! [Schema::load] reads every `df.*.xml` file in a directory plus
//! `symbols.xml` and produces an immutable [Schema]: a name table of types, a
//! table of global objects, and the known game versions. References between
//! types are checked in a second pass once every file has been read, so
//! definition order does not matter.
//!
//! Errors are reported through the `log` facade as they are found; loading
//! fails at the end if any were reported.

pub use error::{SchemaError, SchemaLookupError};

use indexmap::IndexMap;
use serde::Serialize;

use dfview_path::PathItem;
use dfview_types::{CompoundType, DfType, EnumType, TypeLookup, TypeRef, VersionInfo};

mod error;
mod load;
mod resolve;
mod symbols;

pub(crate) struct ErrorLog {
    current_file: String,
    errors: usize,
}

impl ErrorLog {
    fn new() -> Self {
        ErrorLog {
            current_file: String::new(),
            errors: 0,
        }
    }

    fn error(&mut self, message: impl AsRef<str>) {
        self.errors += 1;
        log::error!("{}", message.as_ref());
    }

    fn error_at(&mut self, node: &roxmltree::Node<'_, '_>, message: impl AsRef<str>) {
        self.errors += 1;
        log::error!(
            "{} (in {}:{})",
            message.as_ref(),
            self.current_file,
            node.range().start
        );
    }
}

/// Data loaded from df-structures XML.
#[derive(Debug, Default, Serialize)]
pub struct Schema {
    pub(crate) types: IndexMap<String, Box<DfType>>,
    pub(crate) globals: IndexMap<String, TypeRef>,
    pub(crate) versions: Vec<VersionInfo>,
}

impl TypeLookup for Schema {
    fn type_by_name(&self, name: &str) -> Option<&DfType> {
        self.types.get(name).map(|ty| &**ty)
    }
}

impl Schema {
    /// All named types, built-in primitives included.
    pub fn all_types(&self) -> impl Iterator<Item = (&str, &DfType)> {
        self.types.iter().map(|(name, ty)| (name.as_str(), &**ty))
    }

    /// Find the compound type named `name`.
    pub fn find_compound(&self, name: &str) -> Option<&CompoundType> {
        self.type_by_name(name).and_then(DfType::as_compound)
    }

    /// Find the enum type named `name`.
    pub fn find_enum(&self, name: &str) -> Option<&EnumType> {
        self.type_by_name(name).and_then(DfType::as_enum)
    }

    /// All global objects with their types.
    pub fn global_objects(&self) -> impl Iterator<Item = (&str, &TypeRef)> {
        self.globals.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    /// The type of the global object named `name`.
    pub fn global_object_type(&self, name: &str) -> Option<&TypeRef> {
        self.globals.get(name)
    }

    /// The type of the global object or member designated by `path`.
    pub fn global_object_type_by_path(
        &self,
        path: &[PathItem],
    ) -> Result<&DfType, SchemaLookupError> {
        let (first, rest) = match path.split_first() {
            Some(split) => split,
            None => return Err(SchemaLookupError::EmptyPath),
        };
        let name = match first {
            PathItem::Field(name) => name,
            _ => return Err(SchemaLookupError::EmptyPath),
        };
        let root = self
            .globals
            .get(name)
            .ok_or_else(|| SchemaLookupError::UndefinedGlobal(name.clone()))?;
        let root = self.resolve(root)?;
        self.find_child_type(root, rest)
    }

    /// The compound designated by `path`, diving through containers.
    pub fn find_compound_by_path(
        &self,
        path: &[PathItem],
    ) -> Result<&CompoundType, SchemaLookupError> {
        let (first, rest) = match path.split_first() {
            Some(split) => split,
            None => return Err(SchemaLookupError::EmptyPath),
        };
        let name = match first {
            PathItem::Field(name) => name,
            _ => return Err(SchemaLookupError::EmptyPath),
        };
        let root = self
            .type_by_name(name)
            .ok_or_else(|| SchemaLookupError::UndefinedType(name.clone()))?;
        let mut ty = self.find_child_type(root, rest)?;
        while let Some(item) = ty.item_type() {
            ty = self.resolve(item)?;
        }
        ty.as_compound()
            .ok_or_else(|| SchemaLookupError::NotACompound(ty.kind_name().to_string()))
    }

    /// The subtype of `ty` designated by `path`.
    ///
    /// Identifiers and container-of items dive through container item types
    /// before looking up the member; index items step into the container.
    pub fn find_child_type<'a>(
        &'a self,
        ty: &'a DfType,
        path: &[PathItem],
    ) -> Result<&'a DfType, SchemaLookupError> {
        let mut ty = ty;
        for item in path {
            match item {
                PathItem::Field(name) | PathItem::ContainerOf(name) => {
                    while let Some(inner) = ty.item_type() {
                        ty = self.resolve(inner)?;
                    }
                    let compound = ty
                        .as_compound()
                        .ok_or_else(|| SchemaLookupError::NotACompound(ty.kind_name().to_string()))?;
                    let found = compound.search_member(self, name);
                    let (parent, index) = match item {
                        PathItem::Field(_) => found.last(),
                        _ => found.first(),
                    }
                    .ok_or_else(|| SchemaLookupError::MemberNotFound {
                        compound: compound.debug_name.clone(),
                        member: name.clone(),
                    })?;
                    ty = self.resolve(&parent.members[*index].type_ref)?;
                }
                PathItem::Index(_) | PathItem::EnumIndex(_) => {
                    let inner = ty
                        .item_type()
                        .ok_or_else(|| SchemaLookupError::NotAContainer(ty.kind_name().to_string()))?;
                    ty = self.resolve(inner)?;
                }
            }
        }
        Ok(ty)
    }

    /// Parse a textual index for a container.
    ///
    /// When the container carries an index enum, value names convert to
    /// their integral value; plain integers parse for any container.
    pub fn parse_container_index(&self, ty: &DfType, index: &str) -> Option<i64> {
        let index_enum = match ty {
            DfType::StaticArray(array) => array.index_enum.as_deref(),
            DfType::StdContainer(container) => container.index_enum.as_deref(),
            DfType::DfContainer(container) => container.index_enum.as_deref(),
            _ => None,
        };
        if let Some(value) = index_enum
            .and_then(|name| self.find_enum(name))
            .and_then(|index_enum| index_enum.value_of(index))
        {
            return Some(value);
        }
        load::parse_int(index)
    }

    /// Resolve a type reference against this schema.
    pub fn resolve<'a>(&'a self, type_ref: &'a TypeRef) -> Result<&'a DfType, SchemaLookupError> {
        type_ref
            .resolve(self)
            .map_err(|err| SchemaLookupError::UndefinedType(err.name))
    }

    /// All known versions.
    pub fn versions(&self) -> &[VersionInfo] {
        &self.versions
    }

    /// The version named `name`.
    pub fn version_by_name(&self, name: &str) -> Option<&VersionInfo> {
        self.versions.iter().find(|version| version.name == name)
    }

    /// The version whose binary identifier matches `id`.
    pub fn version_by_id(&self, id: &[u8]) -> Option<&VersionInfo> {
        self.versions.iter().find(|version| version.matches_id(id))
    }
}
