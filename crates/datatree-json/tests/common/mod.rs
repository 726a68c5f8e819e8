#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use datatree_core::{
    DataTree, EnumType, FieldHandle, FieldMeta, Name, NodeId, NodeTypeRef, Registry, Schema,
};

/// A `Roster` root owning `Member`s in a list and `Badge`s in a keyed map.
pub struct Roster {
    pub schema: Arc<Schema>,
    pub roster: NodeTypeRef,
    pub member: NodeTypeRef,
    pub badge: NodeTypeRef,

    pub title: FieldHandle<String>,
    pub season: FieldHandle<u8>,
    pub members: FieldHandle<Vec<NodeId>>,
    pub badges: FieldHandle<BTreeMap<String, NodeId>>,
    pub totals: FieldHandle<BTreeMap<String, i32>>,
    pub captain: FieldHandle<Option<NodeId>>,

    pub name: FieldHandle<String>,
    pub level: FieldHandle<i32>,
    pub active: FieldHandle<bool>,
    pub rank: FieldHandle<u8>,
    pub xp: FieldHandle<i64>,
    pub speed: FieldHandle<f32>,
    pub call_sign: FieldHandle<Name>,
    pub tags: FieldHandle<Vec<String>>,

    pub points: FieldHandle<i32>,
}

pub fn roster() -> Roster {
    let mut registry = Registry::new();

    let badge = registry.declare_type("Badge").expect("declare Badge");
    let points = registry.field::<i32>(&badge, "points", FieldMeta::new()).expect("points");
    registry.finalize_type(&badge).expect("finalize Badge");

    let member = registry.declare_type("Member").expect("declare Member");
    let name = registry
        .field::<String>(&member, "name", FieldMeta::new().alias("label"))
        .expect("name");
    let level = registry.field::<i32>(&member, "level", FieldMeta::new()).expect("level");
    let active = registry.field::<bool>(&member, "active", FieldMeta::new()).expect("active");
    let rank = registry.field::<u8>(&member, "rank", FieldMeta::new()).expect("rank");
    let xp = registry.field::<i64>(&member, "xp", FieldMeta::new()).expect("xp");
    let speed = registry.field::<f32>(&member, "speed", FieldMeta::new()).expect("speed");
    let call_sign = registry.field::<Name>(&member, "call_sign", FieldMeta::new())
        .expect("call_sign");
    let tags = registry.sequence::<String>(&member, "tags", FieldMeta::new()).expect("tags");
    registry.finalize_type(&member).expect("finalize Member");

    let roster = registry.declare_root_type("Roster").expect("declare Roster");
    let title = registry.field::<String>(&roster, "title", FieldMeta::new()).expect("title");
    let season_type = EnumType::new("Season", ["spring", "summer", "autumn"]);
    let season = registry
        .enum_field(&roster, "season", &season_type, FieldMeta::new())
        .expect("season");
    let members = registry
        .node_sequence(&roster, "members", &member, FieldMeta::new())
        .expect("members");
    let badges = registry.node_mapping(&roster, "badges", &badge, FieldMeta::new())
        .expect("badges");
    let totals = registry.mapping::<i32>(&roster, "totals", FieldMeta::new()).expect("totals");
    let captain = registry.node(&roster, "captain", &member, FieldMeta::new()).expect("captain");
    registry.finalize_type(&roster).expect("finalize Roster");

    Roster {
        schema: registry.compile().expect("compile"),
        roster,
        member,
        badge,
        title,
        season,
        members,
        badges,
        totals,
        captain,
        name,
        level,
        active,
        rank,
        xp,
        speed,
        call_sign,
        tags,
        points,
    }
}

impl Roster {
    pub fn tree(&self) -> DataTree {
        DataTree::new(self.schema.clone())
    }

    pub fn add_member(
        &self,
        tree: &mut DataTree,
        roster: NodeId,
        name: &str,
        level: i32,
    ) -> NodeId {
        let member = tree.create(&self.member).expect("create member");
        tree.set(member, &self.name, name.to_string()).expect("set name");
        tree.set(member, &self.level, level).expect("set level");
        tree.push(roster, &self.members, member).expect("push member");
        member
    }

    /// Roster "crew" in summer with three members, two badges and one total.
    pub fn populated(&self, tree: &mut DataTree) -> NodeId {
        let roster = tree.create(&self.roster).expect("create roster");
        tree.set(roster, &self.title, "crew".to_string()).expect("title");
        tree.set(roster, &self.season, 1).expect("season");
        for (i, name) in ["ann", "bob", "cy"].iter().enumerate() {
            self.add_member(tree, roster, name, i as i32 + 1);
        }
        for (key, points) in [("gold", 50), ("iron", 5)] {
            let badge = tree.create(&self.badge).expect("create badge");
            tree.set(badge, &self.points, points).expect("points");
            tree.insert_key(roster, &self.badges, key, badge).expect("insert badge");
        }
        tree.insert_key(roster, &self.totals, "wins", 7).expect("total");
        roster
    }

    pub fn member_at(&self, tree: &DataTree, roster: NodeId, index: usize) -> NodeId {
        tree.get(roster, &self.members).expect("members")[index]
    }
}
