mod common;

use datatree_core::events::ADDED;
use datatree_core::{BindFlags, DataError, Value};

use common::{game, log, recorder};

#[test]
fn push_attaches_and_names_children() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let bob = g.unit_at(&tree, world, 1);

    assert_eq!(tree.parent(bob).expect("parent"), Some(world));
    assert_eq!(tree.root(bob).expect("root"), Some(world));
    assert_eq!(tree.data_key(bob).expect("data key"), "1");
    assert_eq!(tree.collection_key(bob).expect("collection key"), "units");
    assert_eq!(tree.path_from_root(bob).expect("path"), "units.1");

    let stats = tree.get(bob, &g.unit_stats).expect("stats").expect("strict child");
    assert_eq!(tree.path_from_root(stats).expect("path"), "units.1.stats");
    assert_eq!(tree.top(stats).expect("top"), world);
    assert!(tree.is_ancestor(world, stats));

    let tank = tree.get(world, &g.catalog).expect("catalog")["tank"];
    assert_eq!(tree.path_from_root(tank).expect("path"), "catalog.tank");
}

#[test]
fn removing_an_element_renames_the_rest() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let cy = g.unit_at(&tree, world, 2);

    let removed = tree.remove_at(world, &g.units, 0).expect("remove");
    assert_eq!(removed, ann);
    assert!(tree.contains(ann));
    assert_eq!(tree.parent(ann).expect("parent"), None);
    assert_eq!(tree.root(ann).expect("root"), None);
    assert_eq!(tree.data_key(cy).expect("data key"), "1");

    assert_eq!(tree.destroy(cy), Err(DataError::StillAttached(cy)));
    tree.destroy(ann).expect("destroy detached");
    assert!(!tree.contains(ann));
}

#[test]
fn a_node_has_one_owner() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);

    let err = tree.set(world, &g.leader, Some(ann)).expect_err("already owned");
    assert_eq!(err, DataError::AlreadyAttached(ann));
    assert_eq!(tree.get(world, &g.leader).expect("leader"), None);

    let err = tree.push(world, &g.units, ann).expect_err("duplicate element");
    assert_eq!(err, DataError::AlreadyAttached(ann));
    assert_eq!(tree.get(world, &g.units).expect("units").len(), 3);
}

#[test]
fn moving_between_fields_detaches_first() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = tree.remove_at(world, &g.units, 0).expect("remove");

    tree.set(world, &g.leader, Some(ann)).expect("set leader");
    assert_eq!(tree.data_key(ann).expect("data key"), "leader");
    assert_eq!(tree.collection_key(ann).expect("collection key"), "");
    assert_eq!(tree.path_from_root(ann).expect("path"), "leader");
}

#[test]
fn cycles_are_rejected() {
    let g = game();
    let mut tree = g.tree();
    let outer = tree.create(&g.group).expect("outer");
    let inner = tree.create(&g.group).expect("inner");
    tree.push(outer, &g.members, inner).expect("nest");

    assert_eq!(tree.push(inner, &g.members, outer), Err(DataError::Cycle(outer)));
    assert_eq!(tree.push(inner, &g.members, inner), Err(DataError::Cycle(inner)));
    assert_eq!(tree.children(inner).expect("children"), Vec::new());
}

#[test]
fn strict_and_read_only_fields() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);

    assert!(matches!(tree.set(ann, &g.unit_stats, None), Err(DataError::StrictNull(_))));
    assert!(matches!(tree.set(world, &g.seed, 7), Err(DataError::ReadOnly(_))));

    let old = tree.get(ann, &g.unit_stats).expect("stats").expect("strict child");
    tree.set(old, &g.speed, 9).expect("speed");
    tree.reset_field(ann, &g.unit_stats).expect("reset");
    let fresh = tree.get(ann, &g.unit_stats).expect("stats").expect("strict child");
    assert_ne!(fresh, old);
    assert!(!tree.contains(old));
    assert_eq!(tree.get(fresh, &g.speed).expect("speed"), 0);
}

#[test]
fn map_keys_are_validated() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);

    let err = tree.insert_key(world, &g.scores, "two words", 1).expect_err("illegal key");
    assert!(matches!(err, DataError::IllegalKey { .. }));
    assert!(!tree.contains_key(world, &g.scores, "two words"));

    tree.insert_key(world, &g.scores, "blue-2_b", 4).expect("legal key");
    assert!(tree.contains_key(world, &g.scores, "blue-2_b"));
}

#[test]
fn setting_an_equal_value_is_silent() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let events = log();
    tree.bind(world, "titleChanged", None, BindFlags::IGNORE_FIELD_META, recorder(&events, "world"))
        .expect("bind");

    tree.set(world, &g.title, "duel".to_string()).expect("set");
    tree.set(world, &g.title, "duel".to_string()).expect("set again");
    assert_eq!(*events.borrow(), vec!["world:titleChanged".to_string()]);
    assert!(tree.is_dirty(world).expect("dirty"));
    tree.clear_dirty(world).expect("clear");
    assert!(!tree.is_dirty(world).expect("dirty"));
}

#[test]
fn lenient_trees_log_and_skip_violations() {
    common::init_tracing();
    let g = game();
    let mut tree = g.lenient_tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let events = log();
    tree.bind(world, ADDED, None, BindFlags::NONE, recorder(&events, "world"))
        .expect("bind");

    tree.set(world, &g.leader, Some(ann)).expect("skipped, not an error");
    assert_eq!(tree.get(world, &g.leader).expect("leader"), None);
    assert_eq!(tree.parent(ann).expect("parent"), Some(world));
    assert!(events.borrow().is_empty());

    tree.set(ann, &g.unit_stats, None).expect("skipped, not an error");
    assert!(tree.get(ann, &g.unit_stats).expect("stats").is_some());
}

#[test]
fn reset_restores_defaults() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let units = tree.get(world, &g.units).expect("units");

    tree.reset(world).expect("reset");
    assert_eq!(tree.get(world, &g.title).expect("title"), "");
    assert!(tree.get(world, &g.units).expect("units").is_empty());
    assert!(units.iter().all(|id| !tree.contains(*id)));
    assert_eq!(
        tree.value_by_name(world, "scores").expect("scores"),
        &Value::Mapping(Default::default())
    );
}

#[test]
fn sequence_indices_past_the_end_are_rejected() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let dee = tree.create(&g.unit).expect("unit");

    let err = tree.insert(world, &g.units, 4, dee).expect_err("insert past end");
    assert!(matches!(err, DataError::Path { ref path, .. } if path == "units.4"));
    let err = tree.remove_at(world, &g.units, 3).expect_err("remove past end");
    assert!(matches!(err, DataError::Path { ref path, .. } if path == "units.3"));

    tree.insert(world, &g.units, 3, dee).expect("insert at end");
    assert_eq!(g.unit_at(&tree, world, 3), dee);
    assert_eq!(tree.data_key(dee).expect("data key"), "3");
}
