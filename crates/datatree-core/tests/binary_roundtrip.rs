mod common;

use datatree_core::{BinaryDeserializer, BinarySerializer, DataTree, Serializer, Value};

use common::game;

#[test]
fn binary_round_trip_rebuilds_the_tree() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    tree.set(ann, &g.tags, vec!["vip".to_string()]).expect("tags");
    tree.set(world, &g.mode, 1).expect("mode");
    let stats = tree.get(ann, &g.unit_stats).expect("stats").expect("strict child");
    tree.set(stats, &g.armor, 0.25).expect("armor");
    let bytes = tree.to_binary(world).expect("serialize");

    let copy = tree.create(&g.world).expect("world");
    tree.from_binary(copy, &bytes, false).expect("deserialize");
    assert_eq!(tree.to_binary(copy).expect("serialize copy"), bytes);

    assert_eq!(tree.get(copy, &g.title).expect("title"), "arena");
    assert_eq!(tree.get(copy, &g.mode).expect("mode"), 1);
    let units = tree.get(copy, &g.units).expect("units");
    assert_eq!(units.len(), 3);
    assert_eq!(tree.get(units[0], &g.tags).expect("tags"), vec!["vip".to_string()]);
    assert_eq!(tree.resolve(copy, "units.0.stats.armor"), Some(Value::Float(0.25)));
    assert_eq!(tree.resolve(copy, "catalog.scout.cost"), Some(Value::Int32(10)));
    assert_eq!(tree.parent(units[2]).expect("parent"), Some(copy));
    assert_eq!(tree.hash(copy).expect("hash"), tree.hash(world).expect("hash"));
}

#[test]
fn full_mode_replaces_and_destroys_dropped_children() {
    let g = game();
    let mut tree = g.tree();
    let source = tree.create(&g.world).expect("world");
    g.add_unit(&mut tree, source, "solo", 9);
    let bytes = tree.to_binary(source).expect("serialize");

    let target = g.populated(&mut tree);
    let old_units = tree.get(target, &g.units).expect("units");
    tree.from_binary(target, &bytes, false).expect("deserialize");

    let units = tree.get(target, &g.units).expect("units");
    assert_eq!(units, vec![old_units[0]]);
    assert_eq!(tree.get(units[0], &g.name).expect("name"), "solo");
    assert!(!tree.contains(old_units[1]));
    assert!(!tree.contains(old_units[2]));
    assert_eq!(tree.get(target, &g.title).expect("title"), "");
    assert!(tree.get(target, &g.catalog).expect("catalog").is_empty());
}

#[test]
fn patch_mode_merges_into_existing_values() {
    let g = game();
    let mut tree = g.tree();
    let source = tree.create(&g.world).expect("world");
    g.add_unit(&mut tree, source, "", 9);
    let mut serializer = BinarySerializer::new().skip_defaults();
    tree.serialize(source, &mut serializer).expect("serialize");
    let bytes = serializer.finish();

    let target = g.populated(&mut tree);
    let units = tree.get(target, &g.units).expect("units");
    tree.from_binary(target, &bytes, true).expect("patch");

    assert_eq!(tree.get(target, &g.units).expect("units"), units);
    assert_eq!(tree.get(units[0], &g.level).expect("level"), 9);
    assert_eq!(tree.get(units[0], &g.name).expect("name"), "ann");
    assert_eq!(tree.get(units[1], &g.level).expect("level"), 2);
    assert_eq!(tree.get(target, &g.title).expect("title"), "arena");
    assert_eq!(tree.get(target, &g.catalog).expect("catalog").len(), 2);
}

#[test]
fn unreadable_values_do_not_stop_the_object() {
    common::init_tracing();
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);

    let mut serializer = BinarySerializer::new();
    serializer.write_object();
    serializer.write_key("bogus");
    serializer.write_array(1);
    serializer.write_i32(1);
    serializer.pop_array();
    serializer.pop_key();
    serializer.write_key("level");
    serializer.write_string("high");
    serializer.pop_key();
    serializer.write_key("label");
    serializer.write_string("renamed");
    serializer.pop_key();
    serializer.write_key("legacy");
    serializer.write_i32(5);
    serializer.pop_key();
    serializer.pop_object();
    let bytes = serializer.finish();

    let mut deserializer = BinaryDeserializer::new(&bytes);
    tree.deserialize(ann, &mut deserializer, true).expect("deserialize");
    assert_eq!(deserializer.remaining(), 0);
    assert_eq!(tree.get(ann, &g.level).expect("level"), 1);
    assert_eq!(tree.get(ann, &g.name).expect("name"), "renamed");
    assert_eq!(tree.get(ann, &g.legacy).expect("legacy"), 5);
}

#[test]
fn deprecated_fields_are_not_written() {
    let g = game();
    let mut tree = g.tree();
    let unit = tree.create(&g.unit).expect("unit");
    tree.set(unit, &g.legacy, 77).expect("legacy");
    let bytes = tree.to_binary(unit).expect("serialize");

    let copy = tree.create(&g.unit).expect("unit");
    tree.from_binary(copy, &bytes, false).expect("deserialize");
    assert_eq!(tree.get(copy, &g.legacy).expect("legacy"), 0);
}

#[test]
fn skipping_defaults_shrinks_output() {
    let g = game();
    let mut tree = g.tree();
    let unit = tree.create(&g.unit).expect("unit");

    let full = tree.to_binary(unit).expect("full");
    let mut serializer = BinarySerializer::new().skip_defaults();
    tree.serialize(unit, &mut serializer).expect("sparse");
    let sparse = serializer.finish();
    assert!(sparse.len() < full.len());

    let copy = tree.create(&g.unit).expect("unit");
    tree.from_binary(copy, &sparse, false).expect("deserialize");
    assert_eq!(tree.hash(copy).expect("hash"), tree.hash(unit).expect("hash"));
}

#[test]
fn garbage_is_not_an_object() {
    let g = game();
    let mut tree = g.tree();
    let unit = tree.create(&g.unit).expect("unit");
    assert!(tree.from_binary(unit, b"zz", false).is_err());
    assert!(tree.from_binary(unit, &[], true).is_err());
}

#[test]
fn hash_tracks_content_and_invalidates_ancestors() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let bob = g.unit_at(&tree, world, 1);
    let stats = tree.get(bob, &g.unit_stats).expect("stats").expect("strict child");

    let before = tree.hash(world).expect("hash");
    assert_eq!(before.len(), 64);
    assert_eq!(tree.hash(world).expect("cached"), before);
    assert_eq!(tree.compute_hash(world).expect("uncached"), before);

    tree.set(stats, &g.speed, 3).expect("speed");
    let after = tree.hash(world).expect("hash");
    assert_ne!(after, before);

    tree.set(stats, &g.speed, 0).expect("speed");
    assert_eq!(tree.hash(world).expect("hash"), before);
}

#[test]
fn hash_depends_on_type_and_values() {
    let g = game();
    let mut tree = g.tree();
    let a = tree.create(&g.stats).expect("stats");
    let b = tree.create(&g.stats).expect("stats");
    assert_eq!(tree.hash(a).expect("hash"), tree.hash(b).expect("hash"));

    let info = tree.create(&g.info).expect("info");
    assert_ne!(tree.hash(a).expect("hash"), tree.hash(info).expect("hash"));

    tree.set(b, &g.armor, 1.0).expect("armor");
    assert_ne!(tree.hash(a).expect("hash"), tree.hash(b).expect("hash"));
}

#[test]
fn imprint_is_cached_until_change() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let imprint = tree.imprint(world).expect("imprint");
    assert_eq!(imprint, tree.to_binary(world).expect("binary"));

    tree.set(world, &g.title, "other".to_string()).expect("title");
    assert_ne!(tree.imprint(world).expect("imprint"), imprint);
}

#[test]
fn copy_is_a_detached_deep_copy() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let before = tree.len();

    let copy = tree.copy(world).expect("copy");
    assert_eq!(tree.len(), before * 2);
    assert_eq!(tree.parent(copy).expect("parent"), None);
    assert_eq!(tree.hash(copy).expect("hash"), tree.hash(world).expect("hash"));

    let original = g.unit_at(&tree, world, 0);
    let copied = g.unit_at(&tree, copy, 0);
    assert_ne!(original, copied);
    tree.set(copied, &g.level, 99).expect("level");
    assert_eq!(tree.get(original, &g.level).expect("level"), 1);
}

#[test]
fn binary_is_independent_of_tree_instance() {
    let g = game();
    let mut first = g.tree();
    let mut second = DataTree::new(g.schema.clone());
    let spare = second.create(&g.info).expect("offset ids");
    let a = g.populated(&mut first);
    let b = g.populated(&mut second);
    assert_ne!(a, b);
    assert!(second.contains(spare));
    assert_eq!(first.to_binary(a).expect("a"), second.to_binary(b).expect("b"));
}
