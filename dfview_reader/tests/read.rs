//! End-to-end reads against a synthetic schema and a synthetic process
//! image.

use std::rc::Rc;

use dfview_memory::{CachingReader, MemoryReader, SparseMemory, VectorizingReader};
use dfview_path::path;
use dfview_reader::{
    poly_pointee_reader, Fallback, FlagArray, FromScalar, PointeeRead, PolyItemReader,
    PolyReadable, PolySpec, ReadError, ReadSession, Readable, ReadableStruct, ReadableUnion,
    ReaderError, ReaderFactory, StructItemReader, StructSpec, UnionItemReader, UnionSpec,
};
use dfview_schema::Schema;
use dfview_types::DfType;

const STRUCTURES: &str = r#"<data-definition>
    <enum-type type-name="job_kind" base-type="int16_t">
        <enum-item name="NONE"/>
        <enum-item name="MINE"/>
        <enum-item name="CARVE" value="5"/>
    </enum-type>
    <bitfield-type type-name="unit_flags" base-type="uint32_t">
        <flag-bit name="dead"/>
        <flag-bit name="hidden" count="2"/>
        <flag-bit name="tame"/>
    </bitfield-type>
    <struct-type type-name="language_name">
        <stl-string name="first_name"/>
        <static-string name="nickname" size="16"/>
    </struct-type>
    <struct-type type-name="unit">
        <int32_t name="id"/>
        <compound name="name" type-name="language_name"/>
        <enum name="job" type-name="job_kind"/>
        <bitfield name="flags" type-name="unit_flags"/>
        <stl-vector name="labors" type-name="int32_t"/>
    </struct-type>
    <struct-type type-name="world">
        <compound name="units">
            <stl-vector name="active" pointer-type="unit"/>
        </compound>
        <int32_t name="tick"/>
    </struct-type>
    <class-type type-name="itemdef" original-name="itemdefst">
        <int32_t name="subtype"/>
    </class-type>
    <class-type type-name="itemdef_ammost" inherits-from="itemdef">
        <int32_t name="damage"/>
    </class-type>
    <struct-type type-name="item_holder">
        <pointer name="first" type-name="itemdef"/>
        <pointer name="second" type-name="itemdef"/>
    </struct-type>
    <struct-type type-name="preference">
        <int16_t name="kind"/>
        <compound name="target" is-union="true">
            <int16_t name="creature_id"/>
            <int32_t name="poetic_form_id"/>
        </compound>
    </struct-type>
    <struct-type type-name="job">
        <int32_t name="id"/>
    </struct-type>
    <df-linked-list-type type-name="job_list_link" item-type="job"/>
    <struct-type type-name="job_holder">
        <df-linked-list name="list" type-name="job_list_link"/>
    </struct-type>
    <struct-type type-name="array_holder">
        <df-array name="values" type-name="int16_t"/>
        <df-flagarray name="flags"/>
    </struct-type>
    <struct-type type-name="shared_holder">
        <pointer name="a" type-name="job"/>
        <pointer name="b" type-name="job"/>
    </struct-type>
    <global-object name="world" type-name="world"/>
    <global-object name="prefs" type-name="preference"/>
    <global-object name="items" type-name="item_holder"/>
    <global-object name="jobs" type-name="job_holder"/>
    <global-object name="arrays" type-name="array_holder"/>
    <global-object name="shares" type-name="shared_holder"/>
</data-definition>"#;

const SYMBOLS: &str = r#"<data-definition>
    <symbol-table name="v0.50.07 linux64" os-type="linux">
        <md5-hash value="000102030405060708090a0b0c0d0e0f"/>
        <global-address name="world" value="0x10000"/>
        <global-address name="prefs" value="0x5000"/>
        <global-address name="items" value="0x3000"/>
        <global-address name="jobs" value="0x6000"/>
        <global-address name="arrays" value="0x7000"/>
        <global-address name="shares" value="0x6300"/>
        <vtable-address name="itemdefst" value="0xDEAD0000"/>
        <vtable-address name="itemdef_ammost" value="0xDEAD0100"/>
    </symbol-table>
</data-definition>"#;

fn binary_id() -> Vec<u8> {
    (0..16u8).collect()
}

fn load_schema() -> Schema {
    Schema::load_from_strings([("df.test.xml", STRUCTURES)], Some(SYMBOLS)).unwrap()
}

/// A 32-byte C++11 libstdc++ string cell with inline data.
fn sso_string(cell_address: u64, content: &str) -> Vec<u8> {
    assert!(content.len() <= 15);
    let mut cell = Vec::with_capacity(32);
    cell.extend_from_slice(&(cell_address + 16).to_le_bytes());
    cell.extend_from_slice(&(content.len() as u64).to_le_bytes());
    let mut inline = [0u8; 16];
    inline[..content.len()].copy_from_slice(content.as_bytes());
    cell.extend_from_slice(&inline);
    cell
}

fn fixed_string<const N: usize>(content: &str) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes[..content.len()].copy_from_slice(content.as_bytes());
    bytes
}

fn vector_header(begin: u64, len: u64, item_size: u64) -> Vec<u8> {
    let mut header = Vec::with_capacity(24);
    header.extend_from_slice(&begin.to_le_bytes());
    header.extend_from_slice(&(begin + len * item_size).to_le_bytes());
    header.extend_from_slice(&(begin + len * item_size).to_le_bytes());
    header
}

fn build_memory() -> SparseMemory {
    let mut memory = SparseMemory::with_id(binary_id());

    // world at 0x10000: units.active vector of two unit pointers and a null.
    let mut world = Vec::new();
    world.extend_from_slice(&vector_header(0x11000, 3, 8));
    world.extend_from_slice(&42i32.to_le_bytes());
    world.extend_from_slice(&[0u8; 4]);
    memory.insert(0x10000, world);
    let mut active = Vec::new();
    active.extend_from_slice(&0x4000u64.to_le_bytes());
    active.extend_from_slice(&0u64.to_le_bytes());
    active.extend_from_slice(&0x4100u64.to_le_bytes());
    memory.insert(0x11000, active);

    // Two units; offsets asserted in `unit_layout_offsets`.
    for (address, id, name, job, flags) in [
        (0x4000u64, 7i32, "Urist", 1i16, 0b1001u32),
        (0x4100u64, 8i32, "Catten", 5i16, 0),
    ] {
        let mut unit = Vec::new();
        unit.extend_from_slice(&id.to_le_bytes());
        unit.extend_from_slice(&[0u8; 4]);
        unit.extend_from_slice(&sso_string(address + 8, name));
        unit.extend_from_slice(&fixed_string::<16>("Nick"));
        unit.extend_from_slice(&job.to_le_bytes());
        unit.extend_from_slice(&[0u8; 2]);
        unit.extend_from_slice(&flags.to_le_bytes());
        unit.extend_from_slice(&vector_header(0x12000, 4, 4));
        memory.insert(address, unit);
    }
    let mut labors = Vec::new();
    for value in [1i32, 2, 3, 4] {
        labors.extend_from_slice(&value.to_le_bytes());
    }
    memory.insert(0x12000, labors);

    // preference at 0x5000: kind selects the poetic form alternative.
    let mut preference = Vec::new();
    preference.extend_from_slice(&2i16.to_le_bytes());
    preference.extend_from_slice(&[0u8; 2]);
    preference.extend_from_slice(&777i32.to_le_bytes());
    memory.insert(0x5000, preference);

    // item_holder at 0x3000: a known derived object and an unknown vtable.
    let mut holder = Vec::new();
    holder.extend_from_slice(&0x1000u64.to_le_bytes());
    holder.extend_from_slice(&0x2000u64.to_le_bytes());
    memory.insert(0x3000, holder);
    let mut ammo = Vec::new();
    ammo.extend_from_slice(&0xDEAD0100u64.to_le_bytes());
    ammo.extend_from_slice(&7i32.to_le_bytes());
    ammo.extend_from_slice(&42i32.to_le_bytes());
    memory.insert(0x1000, ammo);
    let mut unknown = Vec::new();
    unknown.extend_from_slice(&0xBBBB0000u64.to_le_bytes());
    unknown.extend_from_slice(&13i32.to_le_bytes());
    unknown.extend_from_slice(&99i32.to_le_bytes());
    memory.insert(0x2000, unknown);

    // job_holder at 0x6000: embedded head node, one heap node, one job.
    let mut head = Vec::new();
    head.extend_from_slice(&0u64.to_le_bytes());
    head.extend_from_slice(&0u64.to_le_bytes());
    head.extend_from_slice(&0x6100u64.to_le_bytes());
    memory.insert(0x6000, head);
    let mut node = Vec::new();
    node.extend_from_slice(&0x6200u64.to_le_bytes());
    node.extend_from_slice(&0x6000u64.to_le_bytes());
    node.extend_from_slice(&0u64.to_le_bytes());
    memory.insert(0x6100, node);
    memory.insert(0x6200, 9i32.to_le_bytes().to_vec());

    // array_holder at 0x7000: three int16 values and one byte of flags.
    let mut arrays = Vec::new();
    arrays.extend_from_slice(&0x7100u64.to_le_bytes());
    arrays.extend_from_slice(&3u16.to_le_bytes());
    arrays.extend_from_slice(&[0u8; 6]);
    arrays.extend_from_slice(&0x7200u64.to_le_bytes());
    arrays.extend_from_slice(&1u32.to_le_bytes());
    arrays.extend_from_slice(&[0u8; 4]);
    memory.insert(0x7000, arrays);
    let mut values = Vec::new();
    for value in [1i16, 2, 3] {
        values.extend_from_slice(&value.to_le_bytes());
    }
    memory.insert(0x7100, values);
    memory.insert(0x7200, vec![0b0000_0101u8]);

    // shared_holder at 0x6300: both pointers alias the same job.
    let mut shares = Vec::new();
    shares.extend_from_slice(&0x6200u64.to_le_bytes());
    shares.extend_from_slice(&0x6200u64.to_le_bytes());
    memory.insert(0x6300, shares);

    memory
}

// Host bindings.

#[derive(Debug, Clone, Default, PartialEq)]
struct LanguageName {
    first_name: String,
    nickname: String,
}

impl ReadableStruct for LanguageName {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(language_name))
            .field::<String>(path!(first_name), |t: &mut LanguageName| &mut t.first_name)
            .field::<String>(path!(nickname), |t| &mut t.nickname)
    }
}

impl Readable for LanguageName {
    type Reader = StructItemReader<Self>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(i16)]
enum JobKind {
    #[default]
    None = 0,
    Mine = 1,
    Carve = 5,
}

impl FromScalar for JobKind {
    fn from_scalar(raw: i64) -> Self {
        match raw {
            1 => JobKind::Mine,
            5 => JobKind::Carve,
            _ => JobKind::None,
        }
    }
}

impl Readable for JobKind {
    type Reader = dfview_reader::IntReader<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Unit {
    id: i32,
    name: LanguageName,
    job: JobKind,
    flags: u32,
    labors: Vec<i32>,
}

impl ReadableStruct for Unit {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(unit))
            .field::<i32>(path!(id), |t: &mut Unit| &mut t.id)
            .field::<LanguageName>(path!(name), |t| &mut t.name)
            .field::<JobKind>(path!(job), |t| &mut t.job)
            .field::<u32>(path!(flags), |t| &mut t.flags)
            .field::<Vec<i32>>(path!(labors), |t| &mut t.labors)
    }
}

impl Readable for Unit {
    type Reader = StructItemReader<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct World {
    active_units: Vec<Option<Box<Unit>>>,
    tick: i32,
}

impl ReadableStruct for World {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(world))
            .field::<Vec<Option<Box<Unit>>>>(path!(units.active), |t: &mut World| &mut t.active_units)
            .field::<i32>(path!(tick), |t| &mut t.tick)
    }
}

impl Readable for World {
    type Reader = StructItemReader<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ItemDefRaw {
    subtype: i32,
}

impl ReadableStruct for ItemDefRaw {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(itemdef)).field::<i32>(path!(subtype), |t| &mut t.subtype)
    }
}

impl Readable for ItemDefRaw {
    type Reader = StructItemReader<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ItemDefAmmo {
    base: ItemDefRaw,
    damage: i32,
}

impl ReadableStruct for ItemDefAmmo {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(itemdef_ammost))
            .base::<ItemDefRaw>(|t: &mut ItemDefAmmo| &mut t.base)
            .field::<i32>(path!(damage), |t| &mut t.damage)
    }
}

impl Readable for ItemDefAmmo {
    type Reader = StructItemReader<Self>;
}

macro_rules! itemdef_host {
    ($name:ident, $fallback:expr) => {
        #[derive(Debug, Clone, PartialEq)]
        enum $name {
            Def(ItemDefRaw),
            Ammo(ItemDefAmmo),
        }

        impl Default for $name {
            fn default() -> Self {
                $name::Def(ItemDefRaw::default())
            }
        }

        impl Readable for $name {
            type Reader = PolyItemReader<Self>;

            fn make_pointee_reader(
                factory: &ReaderFactory<'_>,
                pointer_ty: &DfType,
            ) -> Result<Rc<dyn PointeeRead<Self>>, ReaderError> {
                poly_pointee_reader::<Self>(factory, pointer_ty)
            }
        }

        impl PolyReadable for $name {
            fn poly_spec() -> PolySpec<Self> {
                PolySpec::base($name::Def)
                    .variant($name::Ammo)
                    .fallback($fallback)
            }
        }
    };
}

itemdef_host!(ItemDef, Fallback::Warn);
itemdef_host!(ItemDefNull, Fallback::Nullptr);
itemdef_host!(ItemDefStrict, Fallback::Error);

#[derive(Debug, Clone, Default, PartialEq)]
struct ItemHolder<P: Readable> {
    first: Option<Box<P>>,
    second: Option<Box<P>>,
}

impl<P: Readable + PartialEq + std::fmt::Debug> ReadableStruct for ItemHolder<P> {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(item_holder))
            .field::<Option<Box<P>>>(path!(first), |t: &mut ItemHolder<P>| &mut t.first)
            .field::<Option<Box<P>>>(path!(second), |t| &mut t.second)
    }
}

impl<P: Readable + PartialEq + std::fmt::Debug> Readable for ItemHolder<P> {
    type Reader = StructItemReader<Self>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Target {
    #[default]
    None,
    Creature(i16),
    PoeticForm(i32),
}

impl ReadableUnion for Target {
    fn spec() -> UnionSpec<Self> {
        UnionSpec::new(path!(preference.target))
            .alt::<i16>(Target::Creature)
            .alt::<i32>(Target::PoeticForm)
    }
}

impl Readable for Target {
    type Reader = UnionItemReader<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Preference {
    kind: i16,
    target: Target,
}

impl Preference {
    fn target_disc(&self) -> i64 {
        match self.kind {
            1 => 0,
            2 => 1,
            _ => -1,
        }
    }
}

impl ReadableStruct for Preference {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(preference))
            .sequenced()
            .field::<i16>(path!(kind), |t: &mut Preference| &mut t.kind)
            .field_with::<Target, i64>(path!(target), |t| &mut t.target, Preference::target_disc)
    }
}

impl Readable for Preference {
    type Reader = StructItemReader<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Job {
    id: i32,
}

impl ReadableStruct for Job {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(job)).field::<i32>(path!(id), |t| &mut t.id)
    }
}

impl Readable for Job {
    type Reader = StructItemReader<Self>;
}

// A second host bound to the same schema type, to provoke shared-object
// type mismatches.
#[derive(Debug, Clone, Default, PartialEq)]
struct JobAlias {
    id: i32,
}

impl ReadableStruct for JobAlias {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(job)).field::<i32>(path!(id), |t| &mut t.id)
    }
}

impl Readable for JobAlias {
    type Reader = StructItemReader<Self>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct ArrayHolder {
    values: Vec<i16>,
    flags: FlagArray,
}

impl ReadableStruct for ArrayHolder {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(array_holder))
            .field::<Vec<i16>>(path!(values), |t: &mut ArrayHolder| &mut t.values)
            .field::<FlagArray>(path!(flags), |t| &mut t.flags)
    }
}

impl Readable for ArrayHolder {
    type Reader = StructItemReader<Self>;
}

fn with_session<R>(body: impl FnOnce(&Schema, &ReaderFactory<'_>, &ReadSession<'_>) -> R) -> R {
    let schema = load_schema();
    let memory = build_memory();
    let version = schema.version_by_id(memory.id()).unwrap();
    let factory = ReaderFactory::new(&schema, version).unwrap();
    let session = ReadSession::new(&factory, &memory);
    body(&schema, &factory, &session)
}

#[test]
fn unit_layout_offsets() {
    with_session(|schema, factory, _session| {
        let unit = schema.find_compound("unit").unwrap();
        let layout = factory.layout().compound_layout(unit).unwrap();
        assert_eq!(layout.member_offsets, vec![0, 8, 56, 60, 64]);
        assert_eq!(factory.layout().compound_info(unit).unwrap().size, 88);
    });
}

#[test]
fn global_paths_resolve_addresses() {
    with_session(|_schema, _factory, session| {
        let tick = session.global(&path!(world.tick)).unwrap();
        assert_eq!(tick.address, 0x10000 + 24);
        assert_eq!(tick.ty.kind_name(), "int32_t");

        let name = session
            .global(&path!(world.units.active))
            .unwrap();
        assert_eq!(name.address, 0x10000);

        assert!(matches!(
            session.global(&path!(nonsense)),
            Err(ReaderError::MissingGlobalAddress(_))
        ));
    });
}

#[test]
fn read_world_tree() {
    with_session(|_schema, _factory, session| {
        let mut world = World::default();
        let pointer = session.global(&path!(world)).unwrap();
        assert!(session.sync(vec![session.read(pointer, &mut world)]));

        assert_eq!(world.tick, 42);
        assert_eq!(world.active_units.len(), 3);
        let first = world.active_units[0].as_ref().unwrap();
        assert_eq!(first.id, 7);
        assert_eq!(first.name.first_name, "Urist");
        assert_eq!(first.name.nickname, "Nick");
        assert_eq!(first.job, JobKind::Mine);
        assert_eq!(first.flags, 0b1001);
        assert_eq!(first.labors, vec![1, 2, 3, 4]);
        assert!(world.active_units[1].is_none());
        let third = world.active_units[2].as_ref().unwrap();
        assert_eq!(third.id, 8);
        assert_eq!(third.job, JobKind::Carve);
    });
}

#[test]
fn read_through_stacked_wrappers() {
    let schema = load_schema();
    let memory = build_memory();
    let stacked = CachingReader::new(VectorizingReader::new(memory));
    let version = schema.version_by_id(stacked.id()).unwrap();
    let factory = ReaderFactory::new(&schema, version).unwrap();
    let session = ReadSession::new(&factory, &stacked);

    let mut world = World::default();
    let pointer = session.global(&path!(world)).unwrap();
    assert!(session.sync(vec![session.read(pointer, &mut world)]));
    assert_eq!(world.active_units.len(), 3);
    assert_eq!(
        world.active_units[0].as_ref().unwrap().name.first_name,
        "Urist"
    );
}

#[test]
fn polymorphic_dispatch_picks_derived() {
    with_session(|_schema, _factory, session| {
        let mut holder = ItemHolder::<ItemDef>::default();
        let pointer = session.global(&path!(items)).unwrap();
        assert!(session.sync(vec![session.read(pointer, &mut holder)]));

        match holder.first.as_deref() {
            Some(ItemDef::Ammo(ammo)) => {
                assert_eq!(ammo.base.subtype, 7);
                assert_eq!(ammo.damage, 42);
            }
            other => panic!("expected ammo, got {:?}", other),
        }
        // Unknown vtable with the default policy falls back to the base.
        match holder.second.as_deref() {
            Some(ItemDef::Def(def)) => assert_eq!(def.subtype, 13),
            other => panic!("expected base fallback, got {:?}", other),
        }
    });
}

#[test]
fn polymorphic_fallback_policies() {
    with_session(|_schema, _factory, session| {
        let mut nulled = ItemHolder::<ItemDefNull>::default();
        let pointer = session.global(&path!(items)).unwrap();
        assert!(session.sync(vec![session.read(pointer, &mut nulled)]));
        assert!(matches!(nulled.first.as_deref(), Some(ItemDefNull::Ammo(_))));
        assert!(nulled.second.is_none());

        // The strict registry reports the unknown vtable and fails the batch.
        let mut strict = ItemHolder::<ItemDefStrict>::default();
        assert!(!session.sync(vec![session.read(pointer, &mut strict)]));
    });
}

#[test]
fn union_discriminator_selects_alternative() {
    with_session(|_schema, _factory, session| {
        let mut preference = Preference::default();
        let pointer = session.global(&path!(prefs)).unwrap();
        assert!(session.sync(vec![session.read(pointer, &mut preference)]));
        assert_eq!(preference.kind, 2);
        assert_eq!(preference.target, Target::PoeticForm(777));
    });
}

#[test]
fn linked_list_walk() {
    with_session(|_schema, _factory, session| {
        let mut jobs: Vec<Option<Box<Job>>> = Vec::new();
        let pointer = session.global(&path!(jobs.list)).unwrap();
        assert!(session.sync(vec![session.read(pointer, &mut jobs)]));
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].is_none());
        assert_eq!(jobs[1].as_deref(), Some(&Job { id: 9 }));
    });
}

#[test]
fn engine_array_and_flag_array() {
    with_session(|_schema, _factory, session| {
        let mut holder = ArrayHolder::default();
        let pointer = session.global(&path!(arrays)).unwrap();
        assert!(session.sync(vec![session.read(pointer, &mut holder)]));
        assert_eq!(holder.values, vec![1, 2, 3]);
        assert_eq!(holder.flags.len(), 8);
        assert!(holder.flags.is_set(0));
        assert!(!holder.flags.is_set(1));
        assert!(holder.flags.is_set(2));
    });
}

#[derive(Debug, Clone, Default)]
struct SharedHolder {
    a: Option<Rc<Job>>,
    b: Option<Rc<Job>>,
}

impl ReadableStruct for SharedHolder {
    fn spec() -> StructSpec<Self> {
        StructSpec::new(path!(shared_holder))
            .field::<Option<Rc<Job>>>(path!(a), |t: &mut SharedHolder| &mut t.a)
            .field::<Option<Rc<Job>>>(path!(b), |t| &mut t.b)
    }
}

impl Readable for SharedHolder {
    type Reader = StructItemReader<Self>;
}

#[test]
fn shared_pointers_are_deduplicated() {
    with_session(|_schema, _factory, session| {
        let mut holder = SharedHolder::default();
        let pointer = session.global(&path!(shares)).unwrap();
        assert!(session.sync(vec![session.read(pointer, &mut holder)]));
        let a = holder.a.unwrap();
        let b = holder.b.unwrap();
        assert_eq!(a.id, 9);
        assert!(Rc::ptr_eq(&a, &b));
    });
}

#[test]
fn shared_pointer_type_mismatch() {
    with_session(|_schema, _factory, session| {
        let pointer = session.global(&path!(shares.a)).unwrap();
        let mut first: Option<Rc<Job>> = None;
        assert!(session.sync(vec![session.read(pointer, &mut first)]));

        let mut second: Option<Rc<JobAlias>> = None;
        let result = session.sync(vec![session.read(pointer, &mut second)]);
        assert!(!result);
    });
}

#[test]
fn batch_outcome_reflects_failures() {
    with_session(|_schema, _factory, session| {
        let good = session.global(&path!(world.tick)).unwrap();
        let mut tick = 0i32;
        let mut missing = 0i32;
        let bad = dfview_reader::TypedPointer {
            address: 0xdead_0000_0000,
            ty: good.ty,
        };
        let ok = session.sync(vec![
            session.read(good, &mut tick),
            session.read(bad, &mut missing),
        ]);
        assert!(!ok);
        // The successful read still delivered its value.
        assert_eq!(tick, 42);
    });
}

#[test]
fn construction_type_mismatch_is_reported() {
    with_session(|_schema, _factory, session| {
        // Binding a string host to an integer cell fails at construction.
        let pointer = session.global(&path!(world.tick)).unwrap();
        let mut text = String::new();
        let result = futures::executor::block_on(session.read(pointer, &mut text));
        assert!(matches!(result, Err(ReadError::Construction(_))));
    });
}
