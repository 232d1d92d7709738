use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{PrimitiveKind, UnresolvedTypeRef};

/// A Dwarf Fortress data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DfType {
    /// A primitive or opaque blob type.
    Primitive(PrimitiveKind),
    /// An enumerated type with an integer base.
    Enum(EnumType),
    /// A bitfield with an integer base.
    Bitfield(BitfieldType),
    /// A struct, class or union.
    Compound(CompoundType),
    /// A raw pointer, `T *`.
    Pointer(PointerType),
    /// A fixed-extent array, `T[n]`.
    StaticArray(StaticArrayType),
    /// A container from the C++ standard library.
    StdContainer(StdContainerType),
    /// A container specific to the game engine.
    DfContainer(DfContainerType),
    /// Explicit padding with unknown content.
    Padding(PaddingType),
}

/// A reference to a type: either by name into the schema's name table, or an
/// anonymous type owned in place.
///
/// After the schema's resolve pass, every named reference is known to exist,
/// so [TypeRef::resolve] only fails on a schema that failed to load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeRef {
    /// A reference to a named type.
    Named(String),
    /// An anonymous type owned by the referencing type.
    Owned(Box<DfType>),
}

/// Resolves type names to type definitions.
///
/// Implemented by the schema; passed into any operation that may need to
/// follow a [TypeRef::Named] reference.
pub trait TypeLookup {
    /// Look up a named type definition.
    fn type_by_name(&self, name: &str) -> Option<&DfType>;
}

impl TypeRef {
    /// Create a reference to a named type.
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    /// Create a reference owning an anonymous type.
    pub fn owned(ty: DfType) -> Self {
        TypeRef::Owned(Box::new(ty))
    }

    /// The referenced name, or None for owned anonymous types.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            TypeRef::Owned(_) => None,
        }
    }

    /// Resolve the reference to the type it designates.
    pub fn resolve<'a>(&'a self, lookup: &'a dyn TypeLookup) -> Result<&'a DfType, UnresolvedTypeRef> {
        match self {
            TypeRef::Named(name) => lookup
                .type_by_name(name)
                .ok_or_else(|| UnresolvedTypeRef { name: name.clone() }),
            TypeRef::Owned(ty) => Ok(ty),
        }
    }
}

/// An enumerated type.
///
/// Item order follows the source; values need not be dense or positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumType {
    /// Name for diagnostics.
    pub debug_name: String,
    /// The integer base type.
    pub base: PrimitiveKind,
    /// Items by name. Unnamed gap placeholders share the empty-string key.
    pub items: IndexMap<String, EnumItem>,
    /// Declared attributes by name.
    pub attributes: IndexMap<String, EnumAttribute>,
    /// The last inserted value plus one.
    pub count: i64,
}

/// One value of an [EnumType].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumItem {
    /// Integral value for this item.
    pub value: i64,
    /// Attribute values that are not defaulted.
    pub attributes: IndexMap<String, AttrValue>,
}

/// An attribute declared by an `enum-attr` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumAttribute {
    /// The attribute's type: an integral primitive or another enum.
    ///
    /// When absent, values stay unparsed strings.
    pub type_ref: Option<TypeRef>,
    /// Default value for items that do not override it.
    pub default_value: Option<AttrValue>,
}

/// A typed enum attribute value.
///
/// Values are stored as [AttrValue::Str] while loading and converted once the
/// attribute's type reference has been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// An unparsed or string-typed value.
    Str(String),
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    Int(i64),
    /// An unsigned integer value.
    UInt(u64),
    /// A cross-reference into another enum.
    EnumValue {
        /// The name of the referenced item.
        item: String,
        /// The referenced item's integral value.
        value: i64,
    },
}

impl EnumType {
    /// Find an item's value by name.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.items.get(name).map(|item| item.value)
    }
}

/// A bitfield type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BitfieldType {
    /// Name for diagnostics.
    pub debug_name: String,
    /// The integer base type.
    pub base: PrimitiveKind,
    /// Flags in source order. Flags need not be contiguous.
    pub flags: Vec<FlagBit>,
}

/// One flag of a [BitfieldType].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagBit {
    /// The flag name. Unnamed bits are placeholders.
    pub name: Option<String>,
    /// First bit.
    pub offset: u32,
    /// Bit count.
    pub count: u32,
}

/// A struct, class or union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompoundType {
    /// Name for diagnostics.
    pub debug_name: String,
    /// Symbol name used to look up the vtable address, when it differs from
    /// the type name.
    pub symbol: Option<String>,
    /// Members in declaration order.
    pub members: Vec<Member>,
    /// The name of the parent compound if this one inherits.
    pub parent: Option<String>,
    /// The compound has a vtable.
    pub vtable: bool,
    /// Virtual methods in declaration order.
    pub vmethods: Vec<VMethod>,
    /// The compound is a union.
    pub is_union: bool,
}

/// A member of a [CompoundType].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// The member name, or None for anonymous members.
    pub name: Option<String>,
    /// The member type.
    pub type_ref: TypeRef,
}

/// A virtual method of a [CompoundType].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMethod {
    /// The method name. Empty for destructors.
    pub name: String,
    /// The method is the destructor.
    pub is_destructor: bool,
    /// Return type, if any.
    pub return_type: Option<TypeRef>,
    /// Parameter names and types.
    pub args: Vec<(String, TypeRef)>,
}

impl CompoundType {
    /// Create an empty compound.
    pub fn new(debug_name: impl Into<String>) -> Self {
        CompoundType {
            debug_name: debug_name.into(),
            symbol: None,
            members: Vec::new(),
            parent: None,
            vtable: false,
            vmethods: Vec::new(),
            is_union: false,
        }
    }

    /// Append a member.
    pub fn add_member(&mut self, name: impl Into<String>, type_ref: TypeRef) {
        self.members.push(Member {
            name: Some(name.into()),
            type_ref,
        });
    }

    /// Find a member by name, diving through anonymous compound members.
    ///
    /// Returns the full path to the member: each entry is the containing
    /// compound and the member index within it. The first entry's compound is
    /// `self`. The result has one entry for direct members and is empty if
    /// the name was not found.
    pub fn search_member<'a>(
        &'a self,
        lookup: &'a dyn TypeLookup,
        name: &str,
    ) -> Vec<(&'a CompoundType, usize)> {
        let mut stack: Vec<(&CompoundType, usize)> = vec![(self, usize::MAX)];
        loop {
            let (compound, index) = match stack.last_mut() {
                Some(top) => {
                    top.1 = top.1.wrapping_add(1);
                    (top.0, top.1)
                }
                None => break,
            };
            if index >= compound.members.len() {
                stack.pop();
                continue;
            }
            let member = &compound.members[index];
            match &member.name {
                None => {
                    if let Ok(DfType::Compound(anon)) = member.type_ref.resolve(lookup) {
                        stack.push((anon, usize::MAX));
                    }
                }
                Some(member_name) if member_name == name => return stack,
                Some(_) => {}
            }
        }
        Vec::new()
    }

    /// Find a virtual method by name.
    pub fn method(&self, name: &str) -> Option<&VMethod> {
        self.vmethods.iter().find(|m| m.name == name)
    }

    /// Find the index of a virtual method by name.
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.vmethods.iter().position(|m| m.name == name)
    }
}

/// A raw pointer type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerType {
    /// Name for diagnostics.
    pub debug_name: String,
    /// The pointee type. None for the generic untyped pointer.
    pub item: Option<TypeRef>,
    /// The pointer addresses an array of items rather than a single one.
    pub is_array: bool,
    /// The pointer may contain invalid values.
    pub has_bad_pointers: bool,
}

impl PointerType {
    /// The generic pointer with unknown pointee.
    pub fn generic() -> Self {
        PointerType {
            debug_name: "generic_pointer".into(),
            item: None,
            is_array: false,
            has_bad_pointers: false,
        }
    }

    /// A pointer to `item`.
    pub fn to(debug_name: impl Into<String>, item: TypeRef) -> Self {
        PointerType {
            debug_name: debug_name.into(),
            item: Some(item),
            is_array: false,
            has_bad_pointers: false,
        }
    }
}

/// A fixed-extent array type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticArrayType {
    /// Name for diagnostics.
    pub debug_name: String,
    /// The item type.
    pub item: TypeRef,
    /// The extent. None until the resolve pass derives it from `index_enum`.
    pub extent: Option<usize>,
    /// The enum indexing this array, by name.
    pub index_enum: Option<String>,
}

/// The kinds of standard library containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StdContainerKind {
    /// `std::shared_ptr<T>`
    SharedPtr,
    /// `std::weak_ptr<T>`
    WeakPtr,
    /// `std::vector<T>`
    Vector,
    /// `std::deque<T>`
    Deque,
    /// `std::set<T>`
    Set,
    /// `std::optional<T>`
    Optional,
    /// `std::map<K, V>`
    Map,
    /// `std::unordered_map<K, V>`
    UnorderedMap,
    /// `std::future<T>`
    Future,
    /// `std::variant<Ts...>`
    Variant,
}

/// Every std container kind, in declaration order.
pub const STD_CONTAINER_KINDS: [StdContainerKind; 10] = [
    StdContainerKind::SharedPtr,
    StdContainerKind::WeakPtr,
    StdContainerKind::Vector,
    StdContainerKind::Deque,
    StdContainerKind::Set,
    StdContainerKind::Optional,
    StdContainerKind::Map,
    StdContainerKind::UnorderedMap,
    StdContainerKind::Future,
    StdContainerKind::Variant,
];

impl StdContainerKind {
    /// Find the container kind for an xml tag name.
    pub fn from_tag_name(name: &str) -> Option<StdContainerKind> {
        Some(match name {
            "stl-shared-ptr" => Self::SharedPtr,
            "stl-weak-ptr" => Self::WeakPtr,
            "stl-vector" => Self::Vector,
            "stl-deque" => Self::Deque,
            "stl-set" => Self::Set,
            "stl-optional" => Self::Optional,
            "stl-map" => Self::Map,
            "stl-unordered-map" => Self::UnorderedMap,
            "stl-future" => Self::Future,
            "stl-variant" => Self::Variant,
            _ => return None,
        })
    }

    /// The xml tag name for this container kind.
    pub fn tag_name(self) -> &'static str {
        match self {
            Self::SharedPtr => "stl-shared-ptr",
            Self::WeakPtr => "stl-weak-ptr",
            Self::Vector => "stl-vector",
            Self::Deque => "stl-deque",
            Self::Set => "stl-set",
            Self::Optional => "stl-optional",
            Self::Map => "stl-map",
            Self::UnorderedMap => "stl-unordered-map",
            Self::Future => "stl-future",
            Self::Variant => "stl-variant",
        }
    }

    /// Whether the container's own footprint depends on its parameter types.
    pub fn requires_complete_params(self) -> bool {
        matches!(self, Self::Optional | Self::Variant)
    }
}

/// A standard library container type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdContainerType {
    /// Name for diagnostics.
    pub debug_name: String,
    /// The container kind.
    pub kind: StdContainerKind,
    /// Parameter types. The first one is the item type.
    pub type_params: Vec<TypeRef>,
    /// The enum indexing this container, by name.
    pub index_enum: Option<String>,
    /// The container may hold invalid pointers.
    pub has_bad_pointers: bool,
}

impl StdContainerType {
    /// The container item type (the first parameter type).
    pub fn item_type(&self) -> Option<&TypeRef> {
        self.type_params.first()
    }
}

/// The kinds of engine-specific containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DfContainerKind {
    /// `struct { uint8_t *bits; uint32_t size; }`, usually with an index enum.
    FlagArray,
    /// `struct { T *data; uint16_t size; }`, contiguous storage.
    Array,
    /// `struct { T *item; node *prev; node *next; }`, an intrusive list node.
    LinkedList,
}

impl DfContainerKind {
    /// Find the container kind for an xml tag name.
    pub fn from_tag_name(name: &str) -> Option<DfContainerKind> {
        Some(match name {
            "df-flagarray" => Self::FlagArray,
            "df-array" => Self::Array,
            "df-linked-list-type" => Self::LinkedList,
            _ => return None,
        })
    }

    /// The xml tag name for this container kind.
    pub fn tag_name(self) -> &'static str {
        match self {
            Self::FlagArray => "df-flagarray",
            Self::Array => "df-array",
            Self::LinkedList => "df-linked-list-type",
        }
    }
}

/// Member indices within the synthesised header compounds.
pub mod df_container_members {
    /// `flag_array::bits`
    pub const FLAG_ARRAY_BITS: usize = 0;
    /// `flag_array::size`
    pub const FLAG_ARRAY_SIZE: usize = 1;
    /// `array::data`
    pub const ARRAY_DATA: usize = 0;
    /// `array::size`
    pub const ARRAY_SIZE: usize = 1;
    /// `linked_list::item`
    pub const LINKED_LIST_ITEM: usize = 0;
    /// `linked_list::prev`
    pub const LINKED_LIST_PREV: usize = 1;
    /// `linked_list::next`
    pub const LINKED_LIST_NEXT: usize = 2;
}

/// An engine-specific container type.
///
/// Each carries a synthesised header compound describing its in-memory
/// representation, which the layout solver and readers use directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DfContainerType {
    /// Name for diagnostics.
    pub debug_name: String,
    /// The container kind.
    pub kind: DfContainerKind,
    /// The item type. For linked lists this is a pointer to the node item.
    pub item: Option<TypeRef>,
    /// The enum indexing this container, by name.
    pub index_enum: Option<String>,
    /// The synthesised header compound.
    pub header: Box<CompoundType>,
}

impl DfContainerType {
    /// Build a flag array container.
    pub fn flag_array(debug_name: impl Into<String>, index_enum: Option<String>) -> Self {
        let debug_name = debug_name.into();
        let mut header = CompoundType::new(debug_name.clone());
        header.add_member(
            "bits",
            TypeRef::owned(DfType::Pointer(PointerType::to(
                format!("{}.bits", debug_name),
                TypeRef::owned(DfType::Primitive(PrimitiveKind::UInt8)),
            ))),
        );
        header.add_member("size", TypeRef::owned(DfType::Primitive(PrimitiveKind::UInt32)));
        DfContainerType {
            debug_name,
            kind: DfContainerKind::FlagArray,
            item: None,
            index_enum,
            header: Box::new(header),
        }
    }

    /// Build a contiguous array container with items of the named type.
    pub fn array(debug_name: impl Into<String>, item_type_name: impl Into<String>) -> Self {
        let debug_name = debug_name.into();
        let item_type_name = item_type_name.into();
        let mut header = CompoundType::new(debug_name.clone());
        header.add_member(
            "data",
            TypeRef::owned(DfType::Pointer(PointerType::to(
                format!("{}.data", debug_name),
                TypeRef::named(item_type_name.clone()),
            ))),
        );
        header.add_member("size", TypeRef::owned(DfType::Primitive(PrimitiveKind::UInt16)));
        DfContainerType {
            debug_name,
            kind: DfContainerKind::Array,
            item: Some(TypeRef::named(item_type_name)),
            index_enum: None,
            header: Box::new(header),
        }
    }

    /// Build a linked list node type.
    ///
    /// `self_name` is the name this node type is registered under; the
    /// `prev`/`next` members refer back to it through the name table.
    pub fn linked_list(
        self_name: impl Into<String>,
        item_type_name: impl Into<String>,
    ) -> Self {
        let self_name = self_name.into();
        let item_type_name = item_type_name.into();
        let mut header = CompoundType::new(self_name.clone());
        let item_ptr = TypeRef::owned(DfType::Pointer(PointerType::to(
            format!("{}.item", self_name),
            TypeRef::named(item_type_name),
        )));
        header.members.push(Member {
            name: Some("item".into()),
            type_ref: item_ptr.clone(),
        });
        for link in ["prev", "next"] {
            header.add_member(
                link,
                TypeRef::owned(DfType::Pointer(PointerType::to(
                    format!("{}.{}", self_name, link),
                    TypeRef::named(self_name.clone()),
                ))),
            );
        }
        DfContainerType {
            debug_name: self_name,
            kind: DfContainerKind::LinkedList,
            item: Some(item_ptr),
            index_enum: None,
            header: Box::new(header),
        }
    }
}

/// Explicit padding with unknown content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingType {
    /// Padding size in bytes.
    pub size: usize,
    /// Padding alignment.
    pub align: usize,
}

impl DfType {
    /// A short kind name for diagnostics.
    pub fn kind_name(&self) -> &str {
        match self {
            DfType::Primitive(kind) => kind.tag_name(),
            DfType::Enum(e) => &e.debug_name,
            DfType::Bitfield(b) => &b.debug_name,
            DfType::Compound(c) => &c.debug_name,
            DfType::Pointer(p) => &p.debug_name,
            DfType::StaticArray(a) => &a.debug_name,
            DfType::StdContainer(c) => &c.debug_name,
            DfType::DfContainer(c) => &c.debug_name,
            DfType::Padding(_) => "padding",
        }
    }

    /// Return the compound if this is a compound type.
    pub fn as_compound(&self) -> Option<&CompoundType> {
        match self {
            DfType::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    /// Return the enum if this is an enum type.
    pub fn as_enum(&self) -> Option<&EnumType> {
        match self {
            DfType::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Return the bitfield if this is a bitfield type.
    pub fn as_bitfield(&self) -> Option<&BitfieldType> {
        match self {
            DfType::Bitfield(b) => Some(b),
            _ => None,
        }
    }

    /// The contained item type for pointer, array and container types.
    pub fn item_type(&self) -> Option<&TypeRef> {
        match self {
            DfType::Pointer(p) => p.item.as_ref(),
            DfType::StaticArray(a) => Some(&a.item),
            DfType::StdContainer(c) => c.item_type(),
            DfType::DfContainer(c) => c.item.as_ref(),
            _ => None,
        }
    }

    /// Return true if this is any container-like type.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            DfType::Pointer(_)
                | DfType::StaticArray(_)
                | DfType::StdContainer(_)
                | DfType::DfContainer(_)
        )
    }
}

impl fmt::Display for DfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoLookup;
    impl TypeLookup for NoLookup {
        fn type_by_name(&self, _name: &str) -> Option<&DfType> {
            None
        }
    }

    fn int_member(name: &str) -> Member {
        Member {
            name: Some(name.into()),
            type_ref: TypeRef::owned(DfType::Primitive(PrimitiveKind::Int32)),
        }
    }

    #[test]
    fn search_direct_member() {
        let mut compound = CompoundType::new("outer");
        compound.members.push(int_member("x"));
        compound.members.push(int_member("y"));

        let path = compound.search_member(&NoLookup, "y");
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].1, 1);
    }

    #[test]
    fn search_through_anonymous_compound() {
        let mut inner = CompoundType::new("outer.anon");
        inner.members.push(int_member("hidden"));
        let mut compound = CompoundType::new("outer");
        compound.members.push(int_member("x"));
        compound.members.push(Member {
            name: None,
            type_ref: TypeRef::owned(DfType::Compound(inner)),
        });

        let path = compound.search_member(&NoLookup, "hidden");
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].1, 1);
        assert_eq!(path[1].1, 0);
        assert!(compound.search_member(&NoLookup, "missing").is_empty());
    }

    #[test]
    fn linked_list_node_shape() {
        let node = DfContainerType::linked_list("unit_list", "unit");
        assert_eq!(node.header.members.len(), 3);
        assert_eq!(node.header.members[2].name.as_deref(), Some("next"));
        match node.header.members[1].type_ref.resolve(&NoLookup).unwrap() {
            DfType::Pointer(p) => {
                assert_eq!(p.item.as_ref().and_then(|t| t.name()), Some("unit_list"));
            }
            other => panic!("expected pointer, got {}", other),
        }
    }
}
