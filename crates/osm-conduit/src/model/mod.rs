//! Geographic records carried by the built-in tasks.
//!
//! Entities serialize as tagged JSON objects, one per line in the JSON-lines
//! formats:
//!
//! ```json
//! {"type":"node","id":1,"version":2,"tags":{"amenity":"cafe"},"lat":51.5,"lon":-0.12}
//! {"type":"way","id":7,"version":1,"nodes":[1,2,3]}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub mod orderings;

pub type Tags = BTreeMap<String, String>;

/// Entity kinds in their canonical stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Node,
    Way,
    Relation,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Node => write!(f, "node"),
            EntityType::Way => write!(f, "way"),
            EntityType::Relation => write!(f, "relation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
    /// Ids of the nodes forming the way, in order
    #[serde(default)]
    pub nodes: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub member_type: EntityType,
    #[serde(rename = "ref")]
    pub member_ref: i64,
    #[serde(default)]
    pub role: String,
}

/// A node, way or relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Node(_) => EntityType::Node,
            Entity::Way(_) => EntityType::Way,
            Entity::Relation(_) => EntityType::Relation,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            Entity::Node(node) => node.id,
            Entity::Way(way) => way.id,
            Entity::Relation(relation) => relation.id,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Entity::Node(node) => node.version,
            Entity::Way(way) => way.version,
            Entity::Relation(relation) => relation.version,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Entity::Node(node) => node.timestamp,
            Entity::Way(way) => way.timestamp,
            Entity::Relation(relation) => relation.timestamp,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Entity::Node(node) => &node.tags,
            Entity::Way(way) => &way.tags,
            Entity::Relation(relation) => &relation.tags,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} v{}", self.entity_type(), self.id(), self.version())
    }
}

/// What a change does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Modify,
    Delete,
}

/// An entity together with the action applied to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntity {
    pub action: ChangeAction,
    pub entity: Entity,
}

impl ChangeEntity {
    pub fn new(action: ChangeAction, entity: Entity) -> Self {
        Self { action, entity }
    }
}
