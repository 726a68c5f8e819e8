#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use datatree_core::{
    DataTree, EnumType, Event, FieldHandle, FieldMeta, LinkHandle, LinkPath, LinkSpec, NodeId,
    NodeTypeRef, Registry, Schema, TreeConfig, ValueType,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A small game state: a root `World` owning `Unit`s in a sequence and
/// `Info` records in a keyed catalog that units link to by kind.
pub struct Game {
    pub schema: Arc<Schema>,
    pub world: NodeTypeRef,
    pub unit: NodeTypeRef,
    pub hero: NodeTypeRef,
    pub stats: NodeTypeRef,
    pub info: NodeTypeRef,
    pub group: NodeTypeRef,

    pub title: FieldHandle<String>,
    pub mode: FieldHandle<u8>,
    pub units: FieldHandle<Vec<NodeId>>,
    pub catalog: FieldHandle<BTreeMap<String, NodeId>>,
    pub scores: FieldHandle<BTreeMap<String, i32>>,
    pub leader: FieldHandle<Option<NodeId>>,
    pub seed: FieldHandle<i64>,

    pub name: FieldHandle<String>,
    pub level: FieldHandle<i32>,
    pub kind: FieldHandle<String>,
    pub tags: FieldHandle<Vec<String>>,
    pub unit_stats: FieldHandle<Option<NodeId>>,
    pub legacy: FieldHandle<i32>,
    pub info_link: LinkHandle<NodeId>,
    pub tag_infos: LinkHandle<Vec<Option<NodeId>>>,
    pub bonus: LinkHandle<i32>,

    pub speed: FieldHandle<i32>,
    pub armor: FieldHandle<f32>,
    pub cost: FieldHandle<i32>,
    pub members: FieldHandle<Vec<NodeId>>,
}

fn catalog_path() -> LinkPath {
    LinkPath::Static("catalog".to_string())
}

pub fn game() -> Game {
    let mut registry = Registry::new();

    let stats = registry.declare_type("Stats").expect("declare Stats");
    let speed = registry.field::<i32>(&stats, "speed", FieldMeta::new()).expect("speed");
    let armor = registry.field::<f32>(&stats, "armor", FieldMeta::new()).expect("armor");
    registry.finalize_type(&stats).expect("finalize Stats");

    let info = registry.declare_type("Info").expect("declare Info");
    let cost = registry.field::<i32>(&info, "cost", FieldMeta::new()).expect("cost");
    registry.finalize_type(&info).expect("finalize Info");

    let unit = registry.declare_type("Unit").expect("declare Unit");
    let name = registry
        .field::<String>(&unit, "name", FieldMeta::new().alias("label"))
        .expect("name");
    let level = registry
        .field::<i32>(&unit, "level", FieldMeta::new().event().bubbles())
        .expect("level");
    let kind = registry.field::<String>(&unit, "kind", FieldMeta::new()).expect("kind");
    let tags = registry.sequence::<String>(&unit, "tags", FieldMeta::new()).expect("tags");
    let unit_stats = registry
        .node(&unit, "stats", &stats, FieldMeta::new().strict())
        .expect("stats");
    let legacy = registry
        .field::<i32>(&unit, "legacy", FieldMeta::new().deprecated())
        .expect("legacy");
    let info_link = registry
        .link::<NodeId>(
            &unit,
            LinkSpec::new("info", "kind", catalog_path(), ValueType::Node(info.clone())),
        )
        .expect("info link");
    let tag_infos = registry
        .link::<Vec<Option<NodeId>>>(
            &unit,
            LinkSpec::new("tag_infos", "tags", catalog_path(), ValueType::Node(info.clone()))
                .nullable(),
        )
        .expect("tag_infos link");
    let bonus = registry
        .link::<i32>(
            &unit,
            LinkSpec::new("bonus", "kind", LinkPath::Abstract, ValueType::Int32).nullable(),
        )
        .expect("bonus link");
    registry.finalize_type(&unit).expect("finalize Unit");

    let hero = registry.declare_subtype("Hero", &unit).expect("declare Hero");
    registry
        .link::<i32>(
            &hero,
            LinkSpec::new("bonus", "kind", LinkPath::Static("scores".to_string()), ValueType::Int32)
                .nullable(),
        )
        .expect("override bonus");
    registry.finalize_type(&hero).expect("finalize Hero");

    let group = registry.declare_type("Group").expect("declare Group");
    let members = registry
        .node_sequence(&group, "members", &group, FieldMeta::new())
        .expect("members");
    registry.finalize_type(&group).expect("finalize Group");

    let world = registry.declare_root_type("World").expect("declare World");
    let title = registry.field::<String>(&world, "title", FieldMeta::new()).expect("title");
    let mode_type = EnumType::new("Mode", ["peace", "war"]);
    let mode = registry
        .enum_field(&world, "mode", &mode_type, FieldMeta::new())
        .expect("mode");
    let units = registry.node_sequence(&world, "units", &unit, FieldMeta::new()).expect("units");
    let catalog = registry.node_mapping(&world, "catalog", &info, FieldMeta::new())
        .expect("catalog");
    let scores = registry.mapping::<i32>(&world, "scores", FieldMeta::new()).expect("scores");
    let leader = registry.node(&world, "leader", &unit, FieldMeta::new()).expect("leader");
    let seed = registry
        .field::<i64>(&world, "seed", FieldMeta::new().read_only())
        .expect("seed");
    registry.finalize_type(&world).expect("finalize World");

    Game {
        schema: registry.compile().expect("compile"),
        world,
        unit,
        hero,
        stats,
        info,
        group,
        title,
        mode,
        units,
        catalog,
        scores,
        leader,
        seed,
        name,
        level,
        kind,
        tags,
        unit_stats,
        legacy,
        info_link,
        tag_infos,
        bonus,
        speed,
        armor,
        cost,
        members,
    }
}

impl Game {
    pub fn tree(&self) -> DataTree {
        DataTree::new(self.schema.clone())
    }

    pub fn lenient_tree(&self) -> DataTree {
        DataTree::with_config(self.schema.clone(), TreeConfig::lenient())
    }

    pub fn add_unit(&self, tree: &mut DataTree, world: NodeId, name: &str, level: i32) -> NodeId {
        let unit = tree.create(&self.unit).expect("create unit");
        tree.set(unit, &self.name, name.to_string()).expect("set name");
        tree.set(unit, &self.level, level).expect("set level");
        tree.push(world, &self.units, unit).expect("push unit");
        unit
    }

    pub fn add_info(&self, tree: &mut DataTree, world: NodeId, key: &str, cost: i32) -> NodeId {
        let info = tree.create(&self.info).expect("create info");
        tree.set(info, &self.cost, cost).expect("set cost");
        tree.insert_key(world, &self.catalog, key, info).expect("insert info");
        info
    }

    /// World with three units and a catalog of two entries.
    pub fn populated(&self, tree: &mut DataTree) -> NodeId {
        let world = tree.create(&self.world).expect("create world");
        tree.set(world, &self.title, "arena".to_string()).expect("set title");
        for (i, name) in ["ann", "bob", "cy"].iter().enumerate() {
            self.add_unit(tree, world, name, i as i32 + 1);
        }
        self.add_info(tree, world, "tank", 30);
        self.add_info(tree, world, "scout", 10);
        tree.insert_key(world, &self.scores, "red", 3).expect("score");
        world
    }

    pub fn unit_at(&self, tree: &DataTree, world: NodeId, index: usize) -> NodeId {
        tree.get(world, &self.units).expect("units")[index]
    }
}

/// Shared record of delivered events.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn recorder(log: &Log, label: &'static str) -> impl FnMut(&mut DataTree, &mut Event) + 'static {
    let log = log.clone();
    move |_: &mut DataTree, event: &mut Event| {
        log.borrow_mut().push(format!("{label}:{}", event.ty))
    }
}
