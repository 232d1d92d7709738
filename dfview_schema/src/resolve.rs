//! Second pass over a loaded schema: checks every by-name reference, derives
//! missing array extents, and converts enum attribute values to their typed
//! form.

use std::collections::{HashMap, HashSet};

use dfview_types::{
    AttrValue, BitfieldType, CompoundType, DfType, EnumType, PrimitiveKind, StaticArrayType,
    TypeRef,
};

use crate::{
    load::{parse_int, parse_uint},
    ErrorLog, Schema,
};

struct EnumSnapshot {
    count: i64,
    values: HashMap<String, i64>,
}

struct Snapshot {
    names: HashSet<String>,
    enums: HashMap<String, EnumSnapshot>,
    compounds: HashSet<String>,
}

fn make_snapshot(schema: &Schema) -> Snapshot {
    let mut snapshot = Snapshot {
        names: HashSet::new(),
        enums: HashMap::new(),
        compounds: HashSet::new(),
    };
    for (name, ty) in schema.all_types() {
        snapshot.names.insert(name.to_string());
        match ty {
            DfType::Enum(parsed) => {
                snapshot.enums.insert(
                    name.to_string(),
                    EnumSnapshot {
                        count: parsed.count,
                        values: parsed
                            .items
                            .iter()
                            .map(|(item_name, item)| (item_name.clone(), item.value))
                            .collect(),
                    },
                );
            }
            DfType::Compound(_) => {
                snapshot.compounds.insert(name.to_string());
            }
            _ => {}
        }
    }
    snapshot
}

pub(crate) fn resolve(schema: &mut Schema, log: &mut ErrorLog) {
    log.current_file = String::new();
    let snapshot = make_snapshot(schema);

    let mut types = std::mem::take(&mut schema.types);
    for ty in types.values_mut() {
        resolve_type(ty, &snapshot, log);
    }
    schema.types = types;

    let mut globals = std::mem::take(&mut schema.globals);
    for (name, type_ref) in globals.iter_mut() {
        resolve_ref(name, type_ref, &snapshot, log);
    }
    schema.globals = globals;
}

fn resolve_ref(owner: &str, type_ref: &mut TypeRef, snapshot: &Snapshot, log: &mut ErrorLog) {
    match type_ref {
        TypeRef::Named(name) => {
            if !snapshot.names.contains(name.as_str()) {
                log.error(format!("Cannot resolve {} reference to {}", owner, name));
            }
        }
        TypeRef::Owned(ty) => resolve_type(ty, snapshot, log),
    }
}

fn resolve_type(ty: &mut DfType, snapshot: &Snapshot, log: &mut ErrorLog) {
    match ty {
        DfType::Primitive(_) | DfType::Padding(_) => {}
        DfType::Enum(parsed) => resolve_enum(parsed, snapshot, log),
        DfType::Bitfield(parsed) => check_bitfield(parsed, log),
        DfType::Compound(compound) => resolve_compound(compound, snapshot, log),
        DfType::Pointer(pointer) => {
            if let Some(item) = &mut pointer.item {
                resolve_ref(&pointer.debug_name, item, snapshot, log);
            }
        }
        DfType::StaticArray(array) => resolve_static_array(array, snapshot, log),
        DfType::StdContainer(container) => {
            for param in &mut container.type_params {
                resolve_ref(&container.debug_name, param, snapshot, log);
            }
            check_index_enum(&container.debug_name, &container.index_enum, snapshot, log);
        }
        DfType::DfContainer(container) => {
            if let Some(item) = &mut container.item {
                resolve_ref(&container.debug_name, item, snapshot, log);
            }
            check_index_enum(&container.debug_name, &container.index_enum, snapshot, log);
            resolve_compound(&mut container.header, snapshot, log);
        }
    }
}

fn resolve_compound(compound: &mut CompoundType, snapshot: &Snapshot, log: &mut ErrorLog) {
    if let Some(parent) = &compound.parent {
        if !snapshot.compounds.contains(parent.as_str()) {
            log.error(format!(
                "Cannot resolve {} parent reference to {}",
                compound.debug_name, parent
            ));
        }
    }
    for index in 0..compound.members.len() {
        let owner = match &compound.members[index].name {
            Some(name) => format!("{}.{}", compound.debug_name, name),
            None => compound.debug_name.clone(),
        };
        resolve_ref(&owner, &mut compound.members[index].type_ref, snapshot, log);
    }
    for method in &mut compound.vmethods {
        let owner = format!("{}::{}", compound.debug_name, method.name);
        if let Some(return_type) = &mut method.return_type {
            resolve_ref(&owner, return_type, snapshot, log);
        }
        for (_, arg_type) in &mut method.args {
            resolve_ref(&owner, arg_type, snapshot, log);
        }
    }
}

fn resolve_static_array(array: &mut StaticArrayType, snapshot: &Snapshot, log: &mut ErrorLog) {
    resolve_ref(&array.debug_name, &mut array.item, snapshot, log);
    check_index_enum(&array.debug_name, &array.index_enum, snapshot, log);
    if array.extent.is_none() {
        if let Some(index_enum) = &array.index_enum {
            if let Some(snapshot) = snapshot.enums.get(index_enum) {
                array.extent = Some(snapshot.count.max(0) as usize);
            }
        }
    }
    if array.extent.is_none() {
        log.error(format!("Missing extent for static array {}", array.debug_name));
    }
}

fn check_index_enum(
    owner: &str,
    index_enum: &Option<String>,
    snapshot: &Snapshot,
    log: &mut ErrorLog,
) {
    if let Some(name) = index_enum {
        if !snapshot.enums.contains_key(name.as_str()) {
            log.error(format!("Cannot resolve {} index enum reference to {}", owner, name));
        }
    }
}

fn check_bitfield(bitfield: &BitfieldType, log: &mut ErrorLog) {
    if let Some(size) = bitfield.base.fixed_size() {
        let base_bits = 8 * size as u32;
        for flag in &bitfield.flags {
            if flag.offset + flag.count > base_bits {
                log.error(format!(
                    "{}: flag {} does not fit in {} bits",
                    bitfield.debug_name,
                    flag.name.as_deref().unwrap_or("<anon>"),
                    base_bits
                ));
            }
        }
    }
}

fn resolve_enum(parsed: &mut EnumType, snapshot: &Snapshot, log: &mut ErrorLog) {
    // Check attribute types and convert declared defaults.
    for (attr_name, attribute) in &mut parsed.attributes {
        let Some(type_ref) = attribute.type_ref.clone() else {
            continue;
        };
        if let TypeRef::Named(name) = &type_ref {
            if !snapshot.names.contains(name.as_str()) {
                log.error(format!(
                    "Cannot resolve {} attribute {} type reference to {}",
                    parsed.debug_name, attr_name, name
                ));
                attribute.type_ref = None;
                continue;
            }
        }
        if let Some(AttrValue::Str(raw)) = attribute.default_value.clone() {
            match parse_attr_value(&type_ref, &raw, snapshot) {
                Ok(value) => attribute.default_value = Some(value),
                Err(message) => log.error(format!(
                    "{}: Failed to parse default value for attribute {}: {}.",
                    parsed.debug_name, attr_name, message
                )),
            }
        }
    }

    // Convert per-item attribute values with the declared types.
    let attr_types: Vec<(String, Option<TypeRef>)> = parsed
        .attributes
        .iter()
        .map(|(name, attribute)| (name.clone(), attribute.type_ref.clone()))
        .collect();
    for (item_name, item) in &mut parsed.items {
        for (attr_name, value) in &mut item.attributes {
            let declared = attr_types.iter().find(|(name, _)| name == attr_name);
            match declared {
                None => log.error(format!(
                    "{}: Unknown enum attribute {}.",
                    parsed.debug_name, attr_name
                )),
                Some((_, Some(type_ref))) => {
                    if let AttrValue::Str(raw) = value.clone() {
                        match parse_attr_value(type_ref, &raw, snapshot) {
                            Ok(parsed_value) => *value = parsed_value,
                            Err(message) => log.error(format!(
                                "{}: Failed to parse value for attribute {} of item {}: {}.",
                                parsed.debug_name, attr_name, item_name, message
                            )),
                        }
                    }
                }
                Some((_, None)) => {}
            }
        }
    }
}

fn parse_attr_value(
    type_ref: &TypeRef,
    raw: &str,
    snapshot: &Snapshot,
) -> Result<AttrValue, String> {
    let primitive = match type_ref {
        TypeRef::Named(name) => {
            if let Some(target) = snapshot.enums.get(name.as_str()) {
                let value = target
                    .values
                    .get(raw)
                    .ok_or_else(|| format!("Unknown enum value: {}", raw))?;
                return Ok(AttrValue::EnumValue {
                    item: raw.to_string(),
                    value: *value,
                });
            }
            PrimitiveKind::from_tag_name(name)
                .ok_or_else(|| "invalid type for enum attribute value".to_string())?
        }
        TypeRef::Owned(ty) => match &**ty {
            DfType::Primitive(kind) => *kind,
            _ => return Err("invalid type for enum attribute value".to_string()),
        },
    };
    use PrimitiveKind::*;
    match primitive {
        Bool => match raw {
            "true" => Ok(AttrValue::Bool(true)),
            "false" => Ok(AttrValue::Bool(false)),
            _ => Err(format!("\"{}\" is not a boolean", raw)),
        },
        Int8 | UInt8 | Int16 | UInt16 | Int32 | UInt32 | Int64 | Long => parse_int(raw)
            .map(AttrValue::Int)
            .ok_or_else(|| format!("\"{}\" is not an integer", raw)),
        UInt64 => parse_uint(raw)
            .map(AttrValue::UInt)
            .ok_or_else(|| format!("\"{}\" is not an integer", raw)),
        _ => Err("invalid type for enum attribute value".to_string()),
    }
}
