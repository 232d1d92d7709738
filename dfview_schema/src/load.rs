use std::{fs, path::Path};

use roxmltree::{Document, Node};

use dfview_types::{
    CompoundType, DfContainerType, DfType, EnumItem, EnumType, Member, PaddingType, PointerType,
    PrimitiveKind, StaticArrayType, StdContainerKind, StdContainerType, TypeRef, VMethod,
    AttrValue, BitfieldType, EnumAttribute, FlagBit, PRIMITIVE_KINDS,
};
use indexmap::IndexMap;

use crate::{resolve, symbols, ErrorLog, Schema, SchemaError};

// Element tags carrying no type information.
const IGNORE_TAGS: [&str; 4] = ["code-helper", "custom-methods", "comment", "extra-include"];

fn is_ignored(tag: &str) -> bool {
    IGNORE_TAGS.contains(&tag)
}

fn element_children<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

/// Parse an integer accepting decimal and `0x` hexadecimal forms.
pub(crate) fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let magnitude = parse_uint(digits)?;
    let magnitude = i64::try_from(magnitude).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse an unsigned integer accepting decimal and `0x` hexadecimal forms.
pub(crate) fn parse_uint(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

impl Schema {
    /// Load structures from every `df.*.xml` file in `dir` plus
    /// `symbols.xml`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Schema, SchemaError> {
        let dir = dir.as_ref();
        let io_error = |path: &Path, error| SchemaError::Io {
            path: path.to_path_buf(),
            error,
        };

        let mut sources = Vec::new();
        let entries = fs::read_dir(dir).map_err(|error| io_error(dir, error))?;
        for entry in entries {
            let entry = entry.map_err(|error| io_error(dir, error))?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if filename.starts_with("df.") && filename.ends_with(".xml") {
                let path = entry.path();
                let content = fs::read_to_string(&path).map_err(|error| io_error(&path, error))?;
                sources.push((filename, content));
            }
        }
        sources.sort_by(|a, b| a.0.cmp(&b.0));

        let symbols = fs::read_to_string(dir.join("symbols.xml")).ok();

        Schema::load_from_strings(
            sources.iter().map(|(name, content)| (name.as_str(), content.as_str())),
            symbols.as_deref(),
        )
    }

    /// Load structures from in-memory `(filename, content)` pairs.
    ///
    /// `symbols` is the content of `symbols.xml`; None reports a missing
    /// file.
    pub fn load_from_strings<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
        symbols: Option<&str>,
    ) -> Result<Schema, SchemaError> {
        let mut log = ErrorLog::new();
        let mut schema = Schema::default();

        for kind in PRIMITIVE_KINDS {
            schema
                .types
                .insert(kind.tag_name().to_string(), Box::new(DfType::Primitive(kind)));
        }
        schema.types.insert(
            "pointer".to_string(),
            Box::new(DfType::Pointer(PointerType::generic())),
        );

        let mut other_vectors = Vec::new();
        for (filename, content) in sources {
            log.current_file = filename.to_string();
            let doc = match Document::parse(content) {
                Ok(doc) => doc,
                Err(error) => {
                    log.error(format!("Failed to parse {}: {}.", filename, error));
                    continue;
                }
            };
            for element in element_children(doc.root_element()) {
                load_top_level(&mut schema, &mut other_vectors, element, &mut log);
            }
        }

        for builder in other_vectors {
            builder.apply(&mut schema, &mut log);
        }

        resolve::resolve(&mut schema, &mut log);

        match symbols {
            Some(content) => symbols::load_symbols(&mut schema, content, &mut log),
            None => {
                log.current_file = "symbols.xml".to_string();
                log.error("Failed to read symbols.xml");
            }
        }

        if log.errors > 0 {
            Err(SchemaError::Invalid { errors: log.errors })
        } else {
            Ok(schema)
        }
    }

    fn add_type(&mut self, element: &Node<'_, '_>, ty: DfType, log: &mut ErrorLog) {
        let name = match element.attribute("type-name") {
            Some(name) => name,
            None => {
                log.error_at(element, "Missing type-name attribute.");
                return;
            }
        };
        if self.types.contains_key(name) {
            log.error_at(element, format!("Duplicated type {}.", name));
        } else {
            self.types.insert(name.to_string(), Box::new(ty));
        }
    }
}

fn load_top_level(
    schema: &mut Schema,
    other_vectors: &mut Vec<OtherVectorsBuilder>,
    element: Node<'_, '_>,
    log: &mut ErrorLog,
) {
    let tag = element.tag_name().name();
    let type_name = element.attribute("type-name").unwrap_or_default();
    match tag {
        "struct-type" => {
            let compound = parse_compound(type_name, &element, log, false);
            schema.add_type(&element, DfType::Compound(compound), log);
        }
        "class-type" => {
            let compound = parse_compound(type_name, &element, log, true);
            schema.add_type(&element, DfType::Compound(compound), log);
        }
        "enum-type" => {
            let parsed = parse_enum(type_name, &element, log);
            schema.add_type(&element, DfType::Enum(parsed), log);
        }
        "bitfield-type" => {
            let parsed = parse_bitfield(type_name, &element, log);
            schema.add_type(&element, DfType::Bitfield(parsed), log);
        }
        "df-linked-list-type" => {
            let item = element.attribute("item-type").unwrap_or_default();
            let node_type = DfContainerType::linked_list(type_name, item);
            schema.add_type(&element, DfType::DfContainer(node_type), log);
        }
        "df-other-vectors-type" => {
            let compound = CompoundType::new(type_name);
            schema.add_type(&element, DfType::Compound(compound), log);
            other_vectors.push(OtherVectorsBuilder::new(type_name, &element, log));
        }
        "global-object" => {
            let name = match element.attribute("name") {
                Some(name) => name,
                None => {
                    log.error_at(&element, "Missing global-object name.");
                    return;
                }
            };
            let type_ref = match element.attribute("type-name") {
                Some(type_name) => TypeRef::named(type_name),
                None => TypeRef::owned(DfType::Compound(parse_compound(name, &element, log, false))),
            };
            schema.globals.entry(name.to_string()).or_insert(type_ref);
        }
        _ => log.error_at(&element, format!("Unknown type tag: {}.", tag)),
    }
}

/// Appends the members of a `df-other-vectors-type` compound once its index
/// enum is known.
struct OtherVectorsBuilder {
    compound_name: String,
    index_enum: String,
    item_type: String,
    overrides: Vec<Member>,
}

impl OtherVectorsBuilder {
    fn new(compound_name: &str, element: &Node<'_, '_>, log: &mut ErrorLog) -> Self {
        let mut overrides = Vec::new();
        for child in element_children(*element) {
            if child.tag_name().name() != "stl-vector" {
                continue;
            }
            let name = child.attribute("name").unwrap_or_default();
            overrides.push(parse_member(compound_name, name, &child, log));
        }
        OtherVectorsBuilder {
            compound_name: compound_name.to_string(),
            index_enum: element.attribute("index-enum").unwrap_or_default().to_string(),
            item_type: element.attribute("item-type").unwrap_or_default().to_string(),
            overrides,
        }
    }

    fn apply(self, schema: &mut Schema, log: &mut ErrorLog) {
        // Collect the enum value names in value order before mutating the
        // compound.
        let names: Vec<String> = match schema.find_enum(&self.index_enum) {
            Some(index_enum) => {
                let mut names = Vec::new();
                for (name, item) in &index_enum.items {
                    if item.value < 0 {
                        continue;
                    }
                    let index = item.value as usize;
                    if index >= names.len() {
                        names.resize(index + 1, String::new());
                    }
                    names[index] = name.clone();
                }
                names
            }
            None => {
                log.error(format!(
                    "Cannot resolve {} index enum reference to {}",
                    self.compound_name, self.index_enum
                ));
                return;
            }
        };

        let mut overrides = self.overrides;
        let mut members = Vec::new();
        for name in names {
            if name.is_empty() {
                log.error(format!(
                    "missing name for member {} in other-vectors compound {}",
                    members.len(),
                    self.compound_name
                ));
            }
            let position = overrides
                .iter()
                .position(|member| member.name.as_deref() == Some(name.as_str()));
            match position {
                Some(position) => members.push(overrides.remove(position)),
                None => members.push(Member {
                    name: if name.is_empty() { None } else { Some(name.clone()) },
                    type_ref: TypeRef::owned(DfType::StdContainer(StdContainerType {
                        debug_name: format!("{}.{}", self.compound_name, name),
                        kind: StdContainerKind::Vector,
                        type_params: vec![TypeRef::owned(DfType::Pointer(PointerType::to(
                            format!("{}.{}", self.compound_name, name),
                            TypeRef::named(self.item_type.clone()),
                        )))],
                        index_enum: None,
                        has_bad_pointers: false,
                    })),
                }),
            }
        }

        match schema.types.get_mut(&self.compound_name).map(|ty| &mut **ty) {
            Some(DfType::Compound(compound)) => compound.members = members,
            _ => log.error(format!(
                "other-vectors compound {} was not registered",
                self.compound_name
            )),
        }
    }
}

/// Build the type for a member or parameter element.
pub(crate) fn make_type(debug_name: &str, element: &Node<'_, '_>, log: &mut ErrorLog) -> TypeRef {
    let tag = element.tag_name().name();
    let type_name = element.attribute("type-name");
    if tag == "compound" {
        return match type_name {
            Some(name) => TypeRef::named(name),
            None => TypeRef::owned(DfType::Compound(parse_compound(debug_name, element, log, false))),
        };
    }
    if tag == "df-linked-list" {
        return TypeRef::named(type_name.unwrap_or_default());
    }
    if let Some(kind) = StdContainerKind::from_tag_name(tag) {
        return TypeRef::owned(DfType::StdContainer(parse_std_container(
            debug_name, element, log, kind,
        )));
    }
    match tag {
        "df-array" => {
            let item = element.attribute("type-name").unwrap_or_default();
            TypeRef::owned(DfType::DfContainer(DfContainerType::array(debug_name, item)))
        }
        "df-flagarray" => {
            let index_enum = element.attribute("index-enum").map(str::to_string);
            TypeRef::owned(DfType::DfContainer(DfContainerType::flag_array(
                debug_name, index_enum,
            )))
        }
        "pointer" => TypeRef::owned(DfType::Pointer(parse_pointer(debug_name, element, log))),
        "static-array" => {
            TypeRef::owned(DfType::StaticArray(parse_static_array(debug_name, element, log)))
        }
        "static-string" => {
            let extent = element
                .attribute("size")
                .and_then(parse_uint)
                .unwrap_or(0) as usize;
            TypeRef::owned(DfType::StaticArray(StaticArrayType {
                debug_name: debug_name.to_string(),
                item: TypeRef::owned(DfType::Primitive(PrimitiveKind::Char)),
                extent: Some(extent),
                index_enum: None,
            }))
        }
        "padding" => {
            let size = element.attribute("size").and_then(parse_uint).unwrap_or(0) as usize;
            let align = element.attribute("align").and_then(parse_uint).unwrap_or(1) as usize;
            TypeRef::owned(DfType::Padding(PaddingType { size, align }))
        }
        "enum" | "bitfield" => match type_name {
            Some(name) => {
                if let Some(base_type_name) = element.attribute("base-type") {
                    match PrimitiveKind::from_tag_name(base_type_name) {
                        Some(base) => TypeRef::owned(DfType::Primitive(base)),
                        None => {
                            log.error_at(
                                element,
                                format!(
                                    "{}: enum/bitfield base type \"{}\" is not a primitive type.",
                                    debug_name, base_type_name
                                ),
                            );
                            TypeRef::owned(DfType::Primitive(PrimitiveKind::Int32))
                        }
                    }
                } else {
                    TypeRef::named(name)
                }
            }
            None => {
                if tag == "enum" {
                    TypeRef::owned(DfType::Enum(parse_enum(debug_name, element, log)))
                } else {
                    TypeRef::owned(DfType::Bitfield(parse_bitfield(debug_name, element, log)))
                }
            }
        },
        // Primitives and unknown tags resolve through the name table, where
        // unknown names are reported.
        _ => TypeRef::named(tag),
    }
}

/// Build the item type of a container element.
///
/// `pointer_recurse` is set when the same element is parsed again for a
/// container of pointers.
fn make_item_type(
    debug_name: &str,
    element: &Node<'_, '_>,
    log: &mut ErrorLog,
    pointer_recurse: bool,
) -> TypeRef {
    if let Some(type_name) = element.attribute("type-name") {
        return TypeRef::named(type_name);
    }
    if let Some(pointee) = element.attribute("pointer-type") {
        if pointer_recurse {
            return TypeRef::named(pointee);
        }
        return TypeRef::owned(DfType::Pointer(parse_pointer(debug_name, element, log)));
    }
    let mut compound = parse_compound(debug_name, element, log, false);
    if compound.members.len() == 1 {
        compound.members.remove(0).type_ref
    } else {
        TypeRef::owned(DfType::Compound(compound))
    }
}

fn parse_pointer(debug_name: &str, element: &Node<'_, '_>, log: &mut ErrorLog) -> PointerType {
    PointerType {
        debug_name: debug_name.to_string(),
        item: Some(make_item_type(debug_name, element, log, true)),
        is_array: element.attribute("is-array") == Some("true"),
        has_bad_pointers: element.attribute("has-bad-pointers") == Some("true"),
    }
}

fn parse_static_array(
    debug_name: &str,
    element: &Node<'_, '_>,
    log: &mut ErrorLog,
) -> StaticArrayType {
    StaticArrayType {
        debug_name: debug_name.to_string(),
        item: make_item_type(debug_name, element, log, false),
        extent: element
            .attribute("count")
            .and_then(parse_uint)
            .map(|count| count as usize),
        index_enum: element.attribute("index-enum").map(str::to_string),
    }
}

fn parse_std_container(
    debug_name: &str,
    element: &Node<'_, '_>,
    log: &mut ErrorLog,
    kind: StdContainerKind,
) -> StdContainerType {
    let type_params = if kind == StdContainerKind::Variant {
        // Each alternative is its own parameter.
        match element.attribute("type-name") {
            Some(type_name) => vec![TypeRef::named(type_name)],
            None => element_children(*element)
                .filter(|child| !is_ignored(child.tag_name().name()))
                .map(|child| make_type(debug_name, &child, log))
                .collect(),
        }
    } else {
        vec![make_item_type(debug_name, element, log, false)]
    };
    StdContainerType {
        debug_name: debug_name.to_string(),
        kind,
        type_params,
        index_enum: element.attribute("index-enum").map(str::to_string),
        has_bad_pointers: element.attribute("has-bad-pointers") == Some("true"),
    }
}

fn parse_member(
    parent_name: &str,
    name: &str,
    element: &Node<'_, '_>,
    log: &mut ErrorLog,
) -> Member {
    let member_debug_name = format!("{}.{}", parent_name, name);
    Member {
        name: if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        },
        type_ref: make_type(&member_debug_name, element, log),
    }
}

pub(crate) fn parse_compound(
    debug_name: &str,
    element: &Node<'_, '_>,
    log: &mut ErrorLog,
    vtable: bool,
) -> CompoundType {
    let mut compound = CompoundType::new(debug_name);
    compound.vtable = vtable;
    compound.parent = element.attribute("inherits-from").map(str::to_string);
    compound.is_union = element.attribute("is-union") == Some("true");
    compound.symbol = element.attribute("original-name").map(str::to_string);

    for child in element_children(*element) {
        let tag = child.tag_name().name();
        if tag == "virtual-methods" {
            if !vtable {
                log.error_at(
                    &child,
                    format!("{}: Adding virtual methods without a vtable", debug_name),
                );
                continue;
            }
            for method in element_children(child).filter(|m| m.tag_name().name() == "vmethod") {
                let parsed = parse_vmethod(debug_name, &method, log);
                compound.vmethods.push(parsed);
            }
        } else if !is_ignored(tag) {
            let name = child.attribute("name").unwrap_or_default();
            compound.members.push(parse_member(debug_name, name, &child, log));
        }
    }
    compound
}

fn parse_vmethod(parent_name: &str, element: &Node<'_, '_>, log: &mut ErrorLog) -> VMethod {
    let mut method = VMethod {
        name: String::new(),
        is_destructor: false,
        return_type: None,
        args: Vec::new(),
    };
    if let Some(is_destructor) = element.attribute("is-destructor") {
        method.is_destructor = is_destructor == "true";
    } else {
        method.name = element.attribute("name").unwrap_or_default().to_string();
    }
    if let Some(ret_type) = element.attribute("ret-type") {
        method.return_type = Some(TypeRef::named(ret_type));
    }
    for child in element_children(*element) {
        let tag = child.tag_name().name();
        if tag == "ret-type" {
            if let Some(type_name) = child.attribute("type-name") {
                method.return_type = Some(TypeRef::named(type_name));
            } else if let Some(inner) = element_children(child).next() {
                let debug_name = format!("{}::{} return", parent_name, method.name);
                method.return_type = Some(make_type(&debug_name, &inner, log));
            } else {
                log.error_at(
                    &child,
                    format!("{}::{}: Empty ret-type element", parent_name, method.name),
                );
            }
        } else if !is_ignored(tag) {
            let param_name = child.attribute("name").unwrap_or_default();
            let debug_name = format!("{}::{} parameter {}", parent_name, method.name, param_name);
            method
                .args
                .push((param_name.to_string(), make_type(&debug_name, &child, log)));
        }
    }
    method
}

pub(crate) fn parse_enum(debug_name: &str, element: &Node<'_, '_>, log: &mut ErrorLog) -> EnumType {
    let base = parse_base_type(debug_name, element, log);
    let mut items: IndexMap<String, EnumItem> = IndexMap::new();
    let mut attributes: IndexMap<String, EnumAttribute> = IndexMap::new();
    let mut count: i64 = 0;
    let mut next_value: i64 = 0;

    for child in element_children(*element) {
        match child.tag_name().name() {
            "enum-item" => {
                if let Some(value) = child.attribute("value").and_then(parse_int) {
                    next_value = value;
                }
                let name = child.attribute("name");
                let key = name.unwrap_or_default().to_string();
                let value = next_value;
                next_value += 1;
                if items.contains_key(&key) {
                    // Unnamed items are gap placeholders and overwrite
                    // themselves silently.
                    if let Some(name) = name {
                        log.error_at(
                            &child,
                            format!("{}: Duplicate enum item: {}.", debug_name, name),
                        );
                    }
                    continue;
                }
                let mut item_attributes = IndexMap::new();
                for attr in
                    element_children(child).filter(|n| n.tag_name().name() == "item-attr")
                {
                    item_attributes.insert(
                        attr.attribute("name").unwrap_or_default().to_string(),
                        AttrValue::Str(attr.attribute("value").unwrap_or_default().to_string()),
                    );
                }
                items.insert(
                    key,
                    EnumItem {
                        value,
                        attributes: item_attributes,
                    },
                );
                count = next_value;
            }
            "enum-attr" => {
                let name = child.attribute("name").unwrap_or_default().to_string();
                if attributes.contains_key(&name) {
                    log.error_at(
                        &child,
                        format!("{}: Duplicate attribute name: {}.", debug_name, name),
                    );
                    continue;
                }
                attributes.insert(
                    name,
                    EnumAttribute {
                        type_ref: child.attribute("type-name").map(TypeRef::named),
                        default_value: child
                            .attribute("default-value")
                            .map(|value| AttrValue::Str(value.to_string())),
                    },
                );
            }
            _ => {}
        }
    }

    EnumType {
        debug_name: debug_name.to_string(),
        base,
        items,
        attributes,
        count,
    }
}

pub(crate) fn parse_bitfield(
    debug_name: &str,
    element: &Node<'_, '_>,
    log: &mut ErrorLog,
) -> BitfieldType {
    let base = parse_base_type(debug_name, element, log);
    let mut flags = Vec::new();
    let mut offset = 0u32;
    for child in element_children(*element) {
        if child.tag_name().name() != "flag-bit" {
            continue;
        }
        let flag_count = child
            .attribute("count")
            .and_then(parse_uint)
            .map(|count| count as u32)
            .unwrap_or(1);
        flags.push(FlagBit {
            name: child.attribute("name").map(str::to_string),
            offset,
            count: flag_count,
        });
        offset += flag_count;
    }
    BitfieldType {
        debug_name: debug_name.to_string(),
        base,
        flags,
    }
}

fn parse_base_type(debug_name: &str, element: &Node<'_, '_>, log: &mut ErrorLog) -> PrimitiveKind {
    let base_name = element.attribute("base-type").unwrap_or("uint32_t");
    match PrimitiveKind::from_tag_name(base_name) {
        Some(base) if base.is_integral() => base,
        _ => {
            log.error_at(
                element,
                format!("{}: Invalid base type \"{}\".", debug_name, base_name),
            );
            PrimitiveKind::UInt32
        }
    }
}
