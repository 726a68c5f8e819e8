mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use datatree_core::events::{
    ADDED, ADDED_TO_PARENT, ADDED_TO_ROOT, CHANGED, NAME_CHANGED, REMOVED, REMOVED_FROM_PARENT,
    REMOVED_FROM_ROOT,
};
use datatree_core::{
    BindCollection, BindFlags, BindHandle, DataTree, DispatchPolicy, Event, TreeConfig,
};

use common::{game, log, recorder};

#[test]
fn attach_events_arrive_in_order() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let unit = tree.create(&g.unit).expect("unit");
    let events = log();
    for ty in [NAME_CHANGED, ADDED_TO_PARENT, ADDED, ADDED_TO_ROOT] {
        tree.bind(unit, ty, None, BindFlags::NONE, recorder(&events, "unit")).expect("bind");
    }

    tree.push(world, &g.units, unit).expect("push");
    assert_eq!(
        *events.borrow(),
        vec!["unit:NameChanged", "unit:AddedToParent", "unit:Added", "unit:AddedToRoot"]
    );
}

#[test]
fn detach_events_reach_child_then_parent() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let stats = tree.get(ann, &g.unit_stats).expect("stats").expect("strict child");
    let events = log();
    for ty in [REMOVED_FROM_PARENT, REMOVED, REMOVED_FROM_ROOT] {
        tree.bind(ann, ty, None, BindFlags::NONE, recorder(&events, "ann")).expect("bind");
    }
    tree.bind(world, REMOVED, None, BindFlags::NONE, recorder(&events, "world")).expect("bind");
    tree.bind(stats, REMOVED_FROM_ROOT, None, BindFlags::NONE, recorder(&events, "stats"))
        .expect("bind");

    tree.remove_at(world, &g.units, 0).expect("remove");
    assert_eq!(
        *events.borrow(),
        vec![
            "ann:RemovedFromParent",
            "ann:Removed",
            "world:Removed",
            "ann:RemovedFromRoot",
            "stats:RemovedFromRoot",
        ]
    );
}

#[test]
fn bubbling_carries_target_and_previous() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let bob = g.unit_at(&tree, world, 1);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    tree.bind(world, "levelChanged", None, BindFlags::NONE, move |_, event| {
        sink.borrow_mut().push((event.target, event.current, event.previous));
    })
    .expect("bind");

    tree.set(bob, &g.level, 12).expect("level");
    assert_eq!(*seen.borrow(), vec![(bob, world, Some(bob))]);
}

#[test]
fn non_event_fields_need_ignore_field_meta() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let events = log();
    tree.bind(ann, "nameChanged", None, BindFlags::NONE, recorder(&events, "plain")).expect("bind");
    tree.bind(ann, "nameChanged", None, BindFlags::IGNORE_FIELD_META, recorder(&events, "meta"))
        .expect("bind");
    tree.bind(world, "nameChanged", None, BindFlags::IGNORE_FIELD_META, recorder(&events, "world"))
        .expect("bind");

    tree.set(ann, &g.name, "anna".to_string()).expect("name");
    assert_eq!(*events.borrow(), vec!["meta:nameChanged"]);
}

#[test]
fn container_listeners_only_hear_their_field() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let events = log();
    tree.on_children(world, ADDED, &g.units, BindFlags::NONE, recorder(&events, "units"))
        .expect("bind units");
    tree.on_children(world, ADDED, &g.catalog, BindFlags::NONE, recorder(&events, "catalog"))
        .expect("bind catalog");
    tree.on_change(world, &g.title, BindFlags::IGNORE_FIELD_META, recorder(&events, "title"))
        .expect("bind title");

    g.add_unit(&mut tree, world, "dee", 4);
    g.add_info(&mut tree, world, "medic", 5);
    assert_eq!(*events.borrow(), vec!["units:Added", "catalog:Added"]);

    tree.set(world, &g.title, "siege".to_string()).expect("title");
    assert_eq!(events.borrow().last().map(String::as_str), Some("title:titleChanged"));
}

#[test]
fn stop_propagation_keeps_event_local() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let events = log();
    let local = events.clone();
    tree.bind(ann, "levelChanged", None, BindFlags::NONE, move |_, event| {
        local.borrow_mut().push("ann".to_string());
        event.stop_propagation();
    })
    .expect("bind");
    tree.bind(world, "levelChanged", None, BindFlags::NONE, recorder(&events, "world"))
        .expect("bind");

    tree.set(ann, &g.level, 5).expect("level");
    assert_eq!(*events.borrow(), vec!["ann"]);
}

#[test]
fn stop_immediate_propagation_skips_later_listeners() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let events = log();
    tree.bind(ann, "levelChanged", None, BindFlags::NONE, |_: &mut DataTree, event: &mut Event| {
        event.stop_immediate_propagation();
    })
    .expect("bind");
    tree.bind(ann, "levelChanged", None, BindFlags::NONE, recorder(&events, "second"))
        .expect("bind");

    tree.set(ann, &g.level, 5).expect("level");
    assert!(events.borrow().is_empty());
}

#[test]
fn unbinding_inside_a_callback() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let calls = Rc::new(Cell::new(0));
    let slot: Rc<RefCell<Option<BindHandle>>> = Rc::new(RefCell::new(None));

    let counter = calls.clone();
    let own = slot.clone();
    let handle = tree
        .bind(ann, "levelChanged", None, BindFlags::NONE, move |_: &mut DataTree, _: &mut Event| {
            counter.set(counter.get() + 1);
            if let Some(handle) = own.borrow_mut().take() {
                handle.unbind();
            }
        })
        .expect("bind");
    *slot.borrow_mut() = Some(handle.clone());

    tree.set(ann, &g.level, 5).expect("first");
    tree.set(ann, &g.level, 6).expect("second");
    assert_eq!(calls.get(), 1);
    assert!(!handle.is_bound());
    assert!(!tree.is_bound(ann, "levelChanged", false));
}

#[test]
fn callbacks_may_mutate_the_tree() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let title = g.title.clone();
    tree.bind(ann, "levelChanged", None, BindFlags::NONE, move |tree, _| {
        tree.set(world, &title, "leveled".to_string()).expect("nested set");
    })
    .expect("bind");

    tree.set(ann, &g.level, 8).expect("level");
    assert_eq!(tree.get(world, &g.title).expect("title"), "leveled");
}

#[test]
fn deferred_and_non_deferred_listeners_in_a_batch() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let events = log();
    tree.bind(ann, "levelChanged", None, BindFlags::NONE, recorder(&events, "deferred"))
        .expect("bind");
    tree.bind(ann, "levelChanged", None, BindFlags::NON_DEFERRED, recorder(&events, "now"))
        .expect("bind");

    let during = tree.batch(|tree| {
        tree.set(ann, &g.level, 20).expect("level");
        events.borrow().clone()
    });
    assert_eq!(during, vec!["now:levelChanged"]);
    assert_eq!(*events.borrow(), vec!["now:levelChanged", "deferred:levelChanged"]);
}

#[test]
fn changed_is_raised_once_per_batch() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let events = log();
    tree.bind(ann, CHANGED, None, BindFlags::NONE, recorder(&events, "ann")).expect("bind");

    tree.batch(|tree| {
        tree.set(ann, &g.level, 2).expect("level");
        tree.set(ann, &g.name, "a".to_string()).expect("name");
        tree.set(ann, &g.kind, "tank".to_string()).expect("kind");
    });
    assert_eq!(*events.borrow(), vec!["ann:Changed"]);
    assert_eq!(tree.pending_changed(), 0);
}

#[test]
fn enqueue_policy_parks_changed_until_flush() {
    let g = game();
    let config = TreeConfig {
        dispatch: DispatchPolicy::Enqueue,
        ..TreeConfig::default()
    };
    let mut tree = DataTree::with_config(g.schema.clone(), config);
    let world = g.populated(&mut tree);
    tree.flush_deferred();
    let events = log();
    tree.bind(world, CHANGED, None, BindFlags::NONE, recorder(&events, "world")).expect("bind");

    tree.set(world, &g.title, "later".to_string()).expect("title");
    assert!(events.borrow().is_empty());
    assert_eq!(tree.pending_changed(), 1);

    tree.flush_deferred();
    assert_eq!(*events.borrow(), vec!["world:Changed"]);
    assert_eq!(tree.pending_changed(), 0);
}

#[test]
fn bind_collections_unbind_together() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let events = log();
    let mut bindings = BindCollection::new();
    bindings.push(
        tree.bind(world, "titleChanged", None, BindFlags::IGNORE_FIELD_META, recorder(&events, "a"))
            .expect("bind"),
    );
    bindings.push(
        tree.on_change(world, &g.title, BindFlags::IGNORE_FIELD_META, recorder(&events, "b"))
            .expect("bind"),
    );
    assert_eq!(bindings.len(), 2);
    assert!(tree.is_bound(world, "titleChanged", false));

    drop(bindings);
    tree.set(world, &g.title, "quiet".to_string()).expect("title");
    assert!(events.borrow().is_empty());
    assert!(!tree.is_bound(world, "titleChanged", false));
}

#[test]
fn unbind_all_and_broadcast() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let bob = g.unit_at(&tree, world, 1);
    let events = log();
    tree.bind(world, "Ping", None, BindFlags::NONE, recorder(&events, "world")).expect("bind");
    tree.bind(bob, "Ping", None, BindFlags::NONE, recorder(&events, "bob")).expect("bind");

    tree.broadcast(bob, Event::new("Ping", bob).bubbling());
    assert_eq!(*events.borrow(), vec!["bob:Ping", "world:Ping"]);
    assert!(tree.is_bound(bob, "Ping", true));

    tree.unbind_all(world, "Ping").expect("unbind");
    tree.broadcast(bob, Event::new("Ping", bob).bubbling());
    assert_eq!(events.borrow().len(), 3);
}

#[test]
fn reset_reports_each_removed_child_to_its_container() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let units = tree.get(world, &g.units).expect("units");
    let events = log();
    tree.on_children(world, REMOVED, &g.units, BindFlags::NONE, recorder(&events, "units"))
        .expect("bind units");
    tree.on_children(world, REMOVED, &g.catalog, BindFlags::NONE, recorder(&events, "catalog"))
        .expect("bind catalog");

    tree.reset(world).expect("reset");
    assert_eq!(
        *events.borrow(),
        vec![
            "units:Removed",
            "units:Removed",
            "units:Removed",
            "catalog:Removed",
            "catalog:Removed",
        ]
    );
    assert!(units.iter().all(|&unit| !tree.contains(unit)));
}

#[test]
fn full_read_reports_removed_units() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let empty = tree.create(&g.world).expect("empty world");
    let data = tree.to_binary(empty).expect("encode");
    let units = tree.get(world, &g.units).expect("units");
    let events = log();
    tree.on_children(world, REMOVED, &g.units, BindFlags::NONE, recorder(&events, "units"))
        .expect("bind units");

    tree.from_binary(world, &data, false).expect("full read");
    assert_eq!(*events.borrow(), vec!["units:Removed"; 3]);
    assert!(tree.get(world, &g.units).expect("units").is_empty());
    assert!(units.iter().all(|&unit| !tree.contains(unit)));
}

#[test]
fn children_dropped_in_a_batch_hear_their_own_removal() {
    let g = game();
    let mut tree = g.tree();
    let world = g.populated(&mut tree);
    let ann = g.unit_at(&tree, world, 0);
    let events = log();
    for ty in [REMOVED_FROM_PARENT, REMOVED, REMOVED_FROM_ROOT] {
        tree.bind(ann, ty, None, BindFlags::NONE, recorder(&events, "ann")).expect("bind");
    }

    tree.batch(|tree| tree.reset_field(world, &g.units)).expect("reset units");
    assert_eq!(
        *events.borrow(),
        vec!["ann:RemovedFromParent", "ann:Removed", "ann:RemovedFromRoot"]
    );
    assert!(!tree.contains(ann));
}
