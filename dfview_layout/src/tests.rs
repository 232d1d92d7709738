use dfview_abi::{Abi, TypeInfo, GCC_32, GCC_64, MSVC2015_64};
use dfview_path::path;
use dfview_schema::Schema;
use dfview_types::{DfType, TypeLookup};

use crate::{LayoutError, MemoryLayout};

fn schema(xml: &str) -> Schema {
    Schema::load_from_strings([("df.test.xml", xml)], Some("<data-definition/>")).unwrap()
}

fn layout(xml: &str, abi: Abi) -> (Schema, MemoryLayout) {
    let schema = schema(xml);
    let layout = MemoryLayout::new(&schema, abi).unwrap();
    (schema, layout)
}

#[test]
fn char_int_char_struct() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <struct-type type-name="mix">
                <int8_t name="a"/>
                <int32_t name="b"/>
                <int8_t name="c"/>
            </struct-type>
        </data-definition>"#,
        GCC_64,
    );
    let mix = schema.find_compound("mix").unwrap();
    let compound_layout = layout.compound_layout(mix).unwrap();
    assert_eq!(compound_layout.member_offsets, vec![0, 4, 8]);
    assert_eq!(compound_layout.unaligned_size, 9);
    assert_eq!(layout.compound_info(mix).unwrap(), TypeInfo::new(12, 4));
}

#[test]
fn nested_compound_offsets_msvc() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <struct-type type-name="a">
                <int32_t name="x"/>
                <compound name="inner">
                    <int8_t name="y"/>
                </compound>
                <int32_t name="z"/>
            </struct-type>
        </data-definition>"#,
        MSVC2015_64,
    );
    let a = schema.find_compound("a").unwrap();
    let compound_layout = layout.compound_layout(a).unwrap();
    assert_eq!(compound_layout.member_offsets, vec![0, 4, 8]);
    assert_eq!(layout.compound_info(a).unwrap(), TypeInfo::new(12, 4));
}

#[test]
fn gnu_reuses_parent_tail_padding() {
    let source = r#"<data-definition>
        <struct-type type-name="parent">
            <int32_t name="a"/>
            <int8_t name="b"/>
        </struct-type>
        <struct-type type-name="child" inherits-from="parent">
            <int8_t name="c"/>
        </struct-type>
    </data-definition>"#;

    let (schema, layout) = layout(source, GCC_64);
    let child = schema.find_compound("child").unwrap();
    assert_eq!(layout.compound_layout(child).unwrap().member_offsets, vec![5]);
    assert_eq!(layout.compound_info(child).unwrap(), TypeInfo::new(8, 4));

    let (schema, layout) = self::layout(source, MSVC2015_64);
    let child = schema.find_compound("child").unwrap();
    assert_eq!(layout.compound_layout(child).unwrap().member_offsets, vec![8]);
    assert_eq!(layout.compound_info(child).unwrap(), TypeInfo::new(12, 4));
}

#[test]
fn vtable_reserves_pointer_slot() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <class-type type-name="item">
                <int32_t name="id"/>
            </class-type>
        </data-definition>"#,
        GCC_64,
    );
    let item = schema.find_compound("item").unwrap();
    assert_eq!(layout.compound_layout(item).unwrap().member_offsets, vec![8]);
    assert_eq!(layout.compound_info(item).unwrap(), TypeInfo::new(16, 8));
}

#[test]
fn union_members_share_offset_zero() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <struct-type type-name="target" is-union="true">
                <int16_t name="creature_id"/>
                <int32_t name="poetic_form_id"/>
                <int8_t name="flag"/>
            </struct-type>
        </data-definition>"#,
        GCC_64,
    );
    let target = schema.find_compound("target").unwrap();
    let compound_layout = layout.compound_layout(target).unwrap();
    assert_eq!(compound_layout.member_offsets, vec![0, 0, 0]);
    assert_eq!(compound_layout.unaligned_size, 4);
    assert_eq!(layout.compound_info(target).unwrap(), TypeInfo::new(4, 4));
}

#[test]
fn linked_list_node_is_three_pointers() {
    let source = r#"<data-definition>
        <struct-type type-name="job"/>
        <df-linked-list-type type-name="job_list_link" item-type="job"/>
    </data-definition>"#;

    for (abi, pointer_size) in [(GCC_64, 8), (GCC_32, 4)] {
        let (schema, layout) = layout(source, abi);
        let node = schema.type_by_name("job_list_link").unwrap();
        assert_eq!(
            layout.type_info(node).unwrap(),
            TypeInfo::new(3 * pointer_size, pointer_size)
        );
    }
}

#[test]
fn pointer_cycles_terminate() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <struct-type type-name="a">
                <pointer name="next" type-name="b"/>
            </struct-type>
            <struct-type type-name="b">
                <pointer name="back" type-name="a"/>
            </struct-type>
        </data-definition>"#,
        GCC_64,
    );
    let a = schema.type_by_name("a").unwrap();
    let b = schema.type_by_name("b").unwrap();
    assert_eq!(layout.type_info(a).unwrap(), TypeInfo::new(8, 8));
    assert_eq!(layout.type_info(b).unwrap(), TypeInfo::new(8, 8));
}

#[test]
fn value_cycle_is_reported() {
    let schema = schema(
        r#"<data-definition>
            <struct-type type-name="a">
                <compound name="b" type-name="b"/>
            </struct-type>
            <struct-type type-name="b">
                <compound name="a" type-name="a"/>
            </struct-type>
        </data-definition>"#,
    );
    assert!(matches!(
        MemoryLayout::new(&schema, GCC_64),
        Err(LayoutError::CyclicDependency(_))
    ));
}

#[test]
fn optional_and_variant_use_parameter_layout() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <struct-type type-name="holder">
                <stl-optional name="maybe" type-name="int32_t"/>
                <stl-variant name="either">
                    <int16_t name="small"/>
                    <int64_t name="big"/>
                </stl-variant>
            </struct-type>
        </data-definition>"#,
        GCC_64,
    );
    let holder = schema.find_compound("holder").unwrap();
    let maybe = schema.resolve(&holder.members[0].type_ref).unwrap();
    assert_eq!(layout.type_info(maybe).unwrap(), TypeInfo::new(8, 4));
    let either = schema.resolve(&holder.members[1].type_ref).unwrap();
    assert_eq!(layout.type_info(either).unwrap(), TypeInfo::new(16, 8));
}

#[test]
fn layout_is_sound_for_every_type() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <enum-type type-name="labor">
                <enum-item name="MINE"/>
                <enum-item name="HAUL"/>
            </enum-type>
            <struct-type type-name="unit">
                <int32_t name="id"/>
                <stl-string name="name"/>
                <stl-vector name="inventory" pointer-type="unit"/>
                <static-array name="labors" type-name="bool" index-enum="labor"/>
                <df-flagarray name="flags"/>
                <compound name="status">
                    <int64_t name="when"/>
                    <int8_t name="level"/>
                </compound>
            </struct-type>
            <global-object name="world" type-name="unit"/>
        </data-definition>"#,
        GCC_64,
    );

    for (_, ty) in schema.all_types() {
        let info = layout.type_info(ty).unwrap();
        let align = info.align.max(1);
        assert_eq!(info.size % align, 0, "size of {} not a multiple of align", ty);
        if let DfType::Compound(compound) = ty {
            let compound_layout = layout.compound_layout(compound).unwrap();
            for (member, offset) in compound.members.iter().zip(&compound_layout.member_offsets) {
                let member_ty = schema.resolve(&member.type_ref).unwrap();
                let member_info = layout.type_info(member_ty).unwrap();
                assert_eq!(offset % member_info.align.max(1), 0);
                assert!(offset + member_info.size <= info.size);
            }
        }
    }
}

#[test]
fn offset_paths() {
    let (schema, layout) = layout(
        r#"<data-definition>
            <enum-type type-name="labor">
                <enum-item name="MINE"/>
                <enum-item name="HAUL"/>
                <enum-item name="PLANT"/>
            </enum-type>
            <struct-type type-name="unit">
                <int32_t name="id"/>
                <compound>
                    <int32_t name="race"/>
                    <int16_t name="caste"/>
                </compound>
                <static-array name="labor_points" type-name="int32_t" index-enum="labor"/>
            </struct-type>
        </data-definition>"#,
        GCC_64,
    );
    let unit = schema.find_compound("unit").unwrap();

    // Members inside the anonymous compound are reached by name.
    let (ty, offset) = layout.offset_of(&schema, unit, &path!(caste)).unwrap();
    assert_eq!(offset, 8);
    assert_eq!(ty.kind_name(), "int16_t");

    // The containing anonymous member itself is reached with (name).
    let (ty, offset) = layout.offset_of(&schema, unit, &path!((race))).unwrap();
    assert_eq!(offset, 4);
    assert!(matches!(ty, DfType::Compound(_)));

    let (_, offset) = layout
        .offset_of(&schema, unit, &path!(labor_points[2]))
        .unwrap();
    assert_eq!(offset, 12 + 8);
    let (_, offset) = layout
        .offset_of(&schema, unit, &path!(labor_points[PLANT]))
        .unwrap();
    assert_eq!(offset, 12 + 8);

    assert!(matches!(
        layout.offset_of(&schema, unit, &path!(labor_points[7])),
        Err(LayoutError::IndexOutOfBounds { .. })
    ));
    assert!(matches!(
        layout.offset_of(&schema, unit, &path!(nonsense)),
        Err(LayoutError::Lookup(_))
    ));
}
