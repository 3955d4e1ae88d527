//! Workspace tests for the type registry and the object model.
//!
//! These exercise the public surface end to end: registration and
//! bootstrap, composite type names, text, binary and XML codecs, data views,
//! conversions and object lifetime.

use rtti::core::metadata::{Comment, Range};
use rtti::core::{
    ClassBuilder, ClassRef, Construct, Destruct, MetadataContainer, TextFlags, convert_data,
};
use rtti::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
struct Vector3 {
    x: f32,
    y: f32,
    z: f32,
}
impl_reflect!(Vector3);

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(i32)]
enum Quality {
    Low = 0,
    High = 2,
}
impl_reflect!(Quality);

struct Shape;
impl_reflect!(Shape);

unsafe fn zero_shape(data: *mut u8) {
    unsafe { data.write_bytes(0, 8) };
}

fn shape(name: &str, base: Option<&str>, concrete: bool) -> Type {
    let mut builder = ClassBuilder::raw(name, 8, 4).destruct_with(Destruct::Trivial);
    if let Some(base) = base {
        builder = builder.base_named(base);
    }
    if concrete {
        builder = builder.construct_with(Construct::Native(zero_shape));
    }
    builder.build().as_type()
}

fn registry() -> Arc<TypeRegistry> {
    let types = TypeRegistry::new(RegistryConfig::default());
    types.register_type(
        ClassBuilder::<Vector3>::new()
            .constructible()
            .cloneable()
            .comparable()
            .property(field!(Vector3, x))
            .property(field!(Vector3, y))
            .property(field!(Vector3, z))
            .build()
            .as_type(),
    );
    types.register_type(Type::new(
        EnumBuilder::<Quality>::new()
            .option("Low", Quality::Low)
            .option("High", Quality::High)
            .build(),
    ));
    types.register_type(shape("Shape", None, false));
    types.register_type(shape("Polygon", Some("Shape"), false));
    types.register_type(shape("Circle", Some("Shape"), true));
    types.register_type(shape("Square", Some("Polygon"), true));
    types.finish_bootstrap();
    types
}

fn convert<S: Reflect, D: Reflect + Clone>(types: &TypeRegistry, value: S) -> Option<D> {
    let src = DataHolder::of(types, value)?;
    let dest_type = types.type_of::<D>()?;
    let mut dest = DataHolder::new(&dest_type);
    let converted = unsafe { convert_data(src.data(), src.ty(), dest.data_mut(), &dest_type) };
    if converted { dest.get::<D>().cloned() } else { None }
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn find_type_is_idempotent() {
    let types = registry();
    let first = types.find_type("array<array<Vector3>>").unwrap();
    let count = types.type_count();
    let second = types.find_type("array<array<Vector3>>").unwrap();
    assert_eq!(first, second);
    assert_eq!(types.type_count(), count);
    assert_eq!(types.find_type("int"), types.type_of::<i32>());
}

#[test]
#[should_panic(expected = "already registered")]
fn duplicate_registration_is_fatal() {
    let types = registry();
    types.register_type(shape("Circle", None, true));
}

#[test]
fn duplicates_after_bootstrap_can_be_tolerated() {
    let types = TypeRegistry::new(RegistryConfig::default().with_fatal_after_bootstrap(false));
    let original = types.register_type(shape("Gear", None, true));
    types.finish_bootstrap();
    let kept = types.register_type(shape("Gear", None, true));
    assert_eq!(original, kept);
}

#[test]
fn composite_inner_types_resolve_recursively() {
    let types = registry();
    let nested = types.find_type("array<array<int>>").unwrap();
    let inner = nested.inner_type().unwrap();
    assert_eq!(inner.name(), "array<int>");
    assert_eq!(inner.inner_type().unwrap().name(), "int");
    assert_eq!(types.find_type("[4]float").unwrap().inner_type().unwrap().name(), "float");
    assert!(types.find_type("array<Missing>").is_none());
    assert!(types.find_type("array<int").is_none());
    assert!(types.find_type("[0]int").is_none());
}

#[test]
fn class_enumeration_is_memoized_and_indexed() {
    let types = registry();
    let base = types.find_class("Shape").unwrap();
    let names = |classes: Vec<ClassType>| -> Vec<String> {
        classes.iter().map(|c| c.name().to_owned()).collect()
    };

    let first = types.enum_derived_classes(&base);
    assert_eq!(names(first.clone()), ["Circle", "Square"]);
    assert_eq!(types.enum_derived_classes(&base), first);

    let all = types.enum_classes(&base, None, true, true);
    assert_eq!(names(all.clone()), ["Shape", "Polygon", "Circle", "Square"]);
    for (index, class) in all.iter().enumerate() {
        assert_eq!(class.user_index(), Some(index as u32));
    }

    types.register_type(shape("Hexagon", Some("Polygon"), true));
    assert_eq!(
        names(types.enum_derived_classes(&base)),
        ["Circle", "Square", "Hexagon"]
    );

    let polygons = |class: &ClassType| class.base_name() == Some("Polygon");
    let filtered = types.enum_classes(&base, Some(&polygons), false, false);
    assert_eq!(names(filtered), ["Square", "Hexagon"]);
}

#[test]
fn factory_lookup_rejects_abstract_and_unrelated() {
    let types = registry();
    let base = types.find_class("Polygon").unwrap();
    assert!(types.find_factory_class("Square", &base).is_some());
    assert!(types.find_factory_class("Polygon", &base).is_none());
    assert!(types.find_factory_class("Circle", &base).is_none());
    assert!(types.find_factory_class("", &base).is_none());
}

// ============================================================================
// Default Objects
// ============================================================================

#[test]
fn default_object_is_shared_across_threads() {
    let types = registry();
    let class = types.find_class("Vector3").unwrap();
    let addresses: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| class.default_object() as usize))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
    let default = unsafe { &*(class.default_object() as *const Vector3) };
    assert_eq!(default, &Vector3::default());
}

static GAUGE_CONSTRUCTS: AtomicUsize = AtomicUsize::new(0);
static GAUGE_DESTRUCTS: AtomicUsize = AtomicUsize::new(0);

unsafe fn construct_gauge(data: *mut u8) {
    unsafe { data.cast::<u64>().write(0x6a09_e667) };
    GAUGE_CONSTRUCTS.fetch_add(1, Ordering::SeqCst);
}

unsafe fn destruct_gauge(_data: *mut u8) {
    GAUGE_DESTRUCTS.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn racing_default_objects_destroy_every_losing_build() {
    let types = TypeRegistry::new(RegistryConfig::default());
    types.register_type(
        ClassBuilder::raw("Gauge", 8, 8)
            .construct_with(Construct::Native(construct_gauge))
            .destruct_with(Destruct::Native(destruct_gauge))
            .build()
            .as_type(),
    );
    types.finish_bootstrap();
    let class = types.find_class("Gauge").unwrap();

    let barrier = Barrier::new(8);
    let addresses: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    class.default_object() as usize
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(addresses.windows(2).all(|pair| pair[0] == pair[1]));
    let constructs = GAUGE_CONSTRUCTS.load(Ordering::SeqCst);
    assert!(constructs >= 1);
    assert_eq!(constructs, GAUGE_DESTRUCTS.load(Ordering::SeqCst) + 1);
    assert_eq!(unsafe { *(class.default_object() as *const u64) }, 0x6a09_e667);
}

// ============================================================================
// Text Format
// ============================================================================

#[test]
fn struct_text_lists_changed_members() {
    let types = registry();
    let mut value = DataHolder::of(&types, Vector3 { x: 1.0, y: 0.0, z: 2.5 }).unwrap();
    assert_eq!(value.to_text(), "(x=1)(z=2.5)");

    assert!(value.parse("(y=4)(w=9)"));
    assert_eq!(value.get::<Vector3>().unwrap(), &Vector3 { x: 1.0, y: 4.0, z: 2.5 });
}

#[test]
fn array_text() {
    let types = registry();
    let mut dynamic = DataHolder::new(&types.find_type("array<int>").unwrap());
    assert!(dynamic.parse("[1][2][3]"));
    assert_eq!(dynamic.get::<Array<i32>>().unwrap().as_slice(), &[1, 2, 3]);
    assert_eq!(dynamic.to_text(), "[1][2][3]");

    let mut fixed = DataHolder::of(&types, [9i32; 5]).unwrap();
    assert!(fixed.parse("[1][2]"));
    assert_eq!(fixed.get::<[i32; 5]>().unwrap(), &[1, 2, 0, 0, 0]);

    assert!(!dynamic.parse("[1][x]"));
    assert_eq!(dynamic.get::<Array<i32>>().unwrap().as_slice(), &[1, 2, 3]);
}

#[test]
fn class_reference_text() {
    let types = registry();
    let ty = types.find_type("class<Polygon>").unwrap();
    let mut holder = DataHolder::new(&ty);
    assert_eq!(holder.to_text(), "null");
    assert!(holder.parse("Square"));
    assert_eq!(holder.to_text(), "Square");
    assert!(!holder.parse("Circle"));
    assert!(!holder.parse(""));
    assert_eq!(holder.to_text(), "Square");

    let reference = ClassRef::<Shape>::new(
        types.find_class("Circle").unwrap(),
        &types.find_class("Shape").unwrap(),
    );
    assert!(reference.is_some_and(|r| !r.is_null()));
}

#[test]
fn enum_text_uses_option_names() {
    let types = registry();
    let ty = types.type_of::<Quality>().unwrap();
    let mut holder = DataHolder::new(&ty);
    assert_eq!(holder.to_text(), "Low");
    assert!(holder.parse("High"));
    assert_eq!(holder.get::<Quality>(), Some(&Quality::High));
    assert!(!holder.parse("Ultra"));

    let mut text = String::new();
    unsafe { ty.print_to_text(&mut text, holder.data(), TextFlags::empty()) };
    assert_eq!(text, "High");
}

// ============================================================================
// Conversions
// ============================================================================

#[test]
fn conversion_matrix() {
    let types = registry();
    assert_eq!(convert::<i32, u8>(&types, 300), Some(255));
    assert_eq!(convert::<i32, u32>(&types, -5), Some(0));
    assert_eq!(convert::<f64, bool>(&types, 2.0), Some(true));
    assert_eq!(convert::<bool, i32>(&types, true), Some(1));
    assert_eq!(convert::<i32, String>(&types, 42), Some("42".to_owned()));
    assert_eq!(convert::<String, i64>(&types, "17".to_owned()), Some(17));
    assert_eq!(convert::<String, i32>(&types, "x".to_owned()), None);
    assert_eq!(convert::<Quality, String>(&types, Quality::High), Some("High".to_owned()));
    assert_eq!(convert::<String, Quality>(&types, "High".to_owned()), Some(Quality::High));
    assert_eq!(convert::<i32, Quality>(&types, 2), Some(Quality::High));
    assert_eq!(convert::<Quality, i32>(&types, Quality::High), Some(2));
    assert_eq!(convert::<Vector3, i32>(&types, Vector3::default()), None);
}

// ============================================================================
// Metadata
// ============================================================================

#[test]
fn add_metadata_is_idempotent() {
    let container = MetadataContainer::new();
    let first = container.add_metadata::<Comment>();
    let second = container.add_metadata::<Comment>();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(container.len(), 1);
    assert!(container.metadata::<Range>().is_none());
}

#[test]
#[should_panic]
fn attaching_twice_is_fatal() {
    let container = MetadataContainer::new();
    container.attach(Comment::new("first"));
    container.attach(Comment::new("second"));
}

#[test]
#[should_panic]
fn required_metadata_must_exist() {
    MetadataContainer::new().require_metadata::<Range>();
}

// ============================================================================
// Objects
// ============================================================================

#[derive(Default)]
struct Lockbox {
    code: i32,
    cache: String,
}
impl_reflect!(Lockbox);

impl Object for Lockbox {
    fn on_property_changing(&self, _path: &str, value: ValueRef<'_>) -> bool {
        value.get::<i32>().is_none_or(|code| *code <= 9999)
    }
}

fn object_context() -> Context {
    let ctx = Context::default();
    ctx.register_class(
        ObjectClassBuilder::<Lockbox>::new()
            .constructible()
            .property(field!(Lockbox, code))
            .property(field!(Lockbox, cache).transient())
            .build(),
    )
    .unwrap();
    ctx.seal();
    ctx
}

#[test]
fn vetoed_writes_leave_the_value() {
    let ctx = object_context();
    let lockbox = ctx.create_object("Lockbox").unwrap();
    assert_eq!(lockbox.write_value("code", &12345i32), Err(DataViewError::IllegalOperation));
    assert_eq!(lockbox.read_value::<i32>("code").unwrap(), 0);
    assert!(!lockbox.is_modified());

    lockbox.write_value("code", &1234i32).unwrap();
    assert_eq!(lockbox.read_value::<i32>("code").unwrap(), 1234);
}

#[test]
fn parenting_to_a_descendant_is_rejected() {
    let ctx = object_context();
    let a = ctx.create_object("Lockbox").unwrap();
    let b = ctx.create_object("Lockbox").unwrap();
    b.set_parent(Some(&a)).unwrap();
    assert!(matches!(a.set_parent(Some(&b)), Err(ObjectError::ParentCycle { .. })));
    assert_eq!(a.parent_id(), None);
    assert_eq!(b.parent_id(), Some(a.id()));
}

#[test]
fn dropped_objects_are_not_found() {
    let ctx = object_context();
    let first = ctx.create_object("Lockbox").unwrap();
    let id = first.id();
    drop(first);
    assert!(ctx.objects().find_object(id).is_none());

    let second = ctx.create_object("Lockbox").unwrap();
    assert_ne!(second.id(), id);
    assert!(ctx.objects().find_object(second.id()).is_some());
}

#[test]
fn xml_round_trip_skips_transient_properties() {
    let ctx = object_context();
    let lockbox = ctx.create_object("Lockbox").unwrap();
    lockbox.write_value("code", &42i32).unwrap();
    lockbox.write::<Lockbox>().unwrap().cache = "scratch".into();

    let text = save_xml_string(&lockbox);
    assert_eq!(text, r#"<object class="Lockbox"><code>42</code></object>"#);

    let loaded = load_xml_str(ctx.objects(), &text).unwrap();
    let data = loaded.read::<Lockbox>().unwrap();
    assert_eq!(data.code, 42);
    assert!(data.cache.is_empty());
}

#[derive(Default)]
struct Label {
    text: String,
}
impl_reflect!(Label);
impl Object for Label {}

#[test]
fn xml_round_trip_keeps_blank_strings() {
    let ctx = Context::default();
    ctx.register_class(
        ObjectClassBuilder::<Label>::new()
            .constructible()
            .property(field!(Label, text))
            .build(),
    )
    .unwrap();
    ctx.seal();

    let label = ctx.objects().create_instance(Label { text: "  ".into() }).unwrap();
    let text = save_xml_string(&label);
    assert_eq!(text, r#"<object class="Label"><text>  </text></object>"#);
    let loaded = load_xml_str(ctx.objects(), &text).unwrap();
    assert_eq!(loaded.read::<Label>().unwrap().text, "  ");
}

#[test]
fn unknown_and_abstract_classes_fail_to_load() {
    let ctx = object_context();
    assert_eq!(
        load_xml_str(ctx.objects(), r#"<object class="Safe"/>"#).unwrap_err(),
        LoadError::UnknownClass("Safe".into())
    );
    assert_eq!(
        load_xml_str(ctx.objects(), r#"<object class="IObject"/>"#).unwrap_err(),
        LoadError::AbstractClass("IObject".into())
    );
}

// ============================================================================
// Schema Changes
// ============================================================================

#[derive(Default)]
struct SettingsV1 {
    level: String,
    title: String,
    scale: i32,
}
impl_reflect!(SettingsV1, "Settings");
impl Object for SettingsV1 {}

#[derive(Default)]
struct SettingsV2 {
    level: i32,
    caption: String,
    scale: f64,
    missing: Vec<String>,
    retyped: Vec<String>,
}
impl_reflect!(SettingsV2, "Settings");

impl Object for SettingsV2 {
    fn on_missing_property(&mut self, issue: &PropertyIssue) -> bool {
        self.missing.push(issue.property.clone());
        true
    }

    fn on_property_type_changed(&mut self, issue: &PropertyIssue) -> bool {
        assert_eq!(
            issue.kind,
            PropertyIssueKind::TypeChanged {
                stored_type: "string".into()
            }
        );
        self.retyped.push(issue.property.clone());
        true
    }
}

#[test]
fn binary_load_handles_renamed_and_retyped_properties() {
    let old = Context::default();
    old.register_class(
        ObjectClassBuilder::<SettingsV1>::new()
            .constructible()
            .property(field!(SettingsV1, level))
            .property(field!(SettingsV1, title))
            .property(field!(SettingsV1, scale))
            .build(),
    )
    .unwrap();
    old.seal();
    let settings = old
        .objects()
        .create_instance(SettingsV1 {
            level: "high".into(),
            title: "main".into(),
            scale: 3,
        })
        .unwrap();
    let bytes = save_binary(&settings);

    let new = Context::default();
    new.register_class(
        ObjectClassBuilder::<SettingsV2>::new()
            .constructible()
            .property(field!(SettingsV2, level))
            .property(field!(SettingsV2, caption))
            .property(field!(SettingsV2, scale))
            .build(),
    )
    .unwrap();
    new.seal();

    let loaded = load_binary(new.objects(), &bytes).unwrap();
    let data = loaded.read::<SettingsV2>().unwrap();
    assert_eq!(data.scale, 3.0);
    assert_eq!(data.level, 0);
    assert_eq!(data.missing, ["title"]);
    assert_eq!(data.retyped, ["level"]);
    assert!(!loaded.is_modified());
}
