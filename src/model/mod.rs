//! Entity records and the collections that hold them.
//!
//! Records serialize with the field names of the palace's data files
//! (`PinyinInitial`, `tone_sections`, `set_location`, ...), in declaration
//! order, so a saved collection diffs cleanly against the previous save.

pub mod normalize;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// The four kinds of entity in a palace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Actor,
    Set,
    Prop,
    Character,
}

impl EntityKind {
    /// Every kind, in the order collections are loaded and saved.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Actor,
        EntityKind::Set,
        EntityKind::Prop,
        EntityKind::Character,
    ];

    /// Name of the JSON document holding this kind's collection.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            EntityKind::Actor => "actors.json",
            EntityKind::Set => "sets.json",
            EntityKind::Prop => "props.json",
            EntityKind::Character => "characters.json",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Actor => "actor",
            EntityKind::Set => "set",
            EntityKind::Prop => "prop",
            EntityKind::Character => "character",
        };
        f.write_str(name)
    }
}

/// A person placed in the palace, usually one per pinyin initial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    #[serde(rename = "PinyinInitial")]
    pub pinyin_initial: Option<String>,
    pub image: Option<String>,
    /// Back-references kept for the data files;
    /// [`crate::repository::Repository::usage`] is authoritative.
    pub characters: Vec<String>,
}

/// A location, subdivided into tone sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Set {
    pub id: String,
    pub name: String,
    /// Section key (usually the tone number) to label.
    pub tone_sections: BTreeMap<String, String>,
    pub image: Option<String>,
    pub characters: Vec<String>,
}

/// Fixed set of prop categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropCategory {
    #[default]
    General,
    Weapon,
    Clothing,
    Artifact,
    Document,
}

impl PropCategory {
    pub const ALL: [PropCategory; 5] = [
        PropCategory::General,
        PropCategory::Weapon,
        PropCategory::Clothing,
        PropCategory::Artifact,
        PropCategory::Document,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PropCategory::General => "general",
            PropCategory::Weapon => "weapon",
            PropCategory::Clothing => "clothing",
            PropCategory::Artifact => "artifact",
            PropCategory::Document => "document",
        }
    }
}

impl fmt::Display for PropCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no [`PropCategory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown prop category '{0}' (expected general, weapon, clothing, artifact or document)")]
pub struct UnknownCategory(pub String);

impl FromStr for PropCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        PropCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// An object a character's scene can include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prop {
    pub id: String,
    pub name: String,
    pub category: PropCategory,
    pub components: Vec<String>,
    pub image: Option<String>,
    pub used_by: Vec<String>,
}

/// A Chinese character and the scene that encodes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Character {
    pub id: String,
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: String,
    #[serde(rename = "actor")]
    pub actor_id: String,
    #[serde(rename = "set_location")]
    pub set_id: String,
    pub tone_section: Option<String>,
    #[serde(rename = "props")]
    pub prop_ids: Vec<String>,
    pub plot: String,
    pub image: Option<String>,
    pub memory_scene: String,
    pub audio_file: String,
}

/// All four collections of a palace, in insertion order.
///
/// Cloning is a full deep copy; history snapshots rely on that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collections {
    pub actors: Vec<Actor>,
    pub sets: Vec<Set>,
    pub props: Vec<Prop>,
    pub characters: Vec<Character>,
}

impl Collections {
    /// Render one collection as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if a record cannot be serialized.
    pub fn to_json(&self, kind: EntityKind) -> Result<String, serde_json::Error> {
        match kind {
            EntityKind::Actor => serde_json::to_string_pretty(&self.actors),
            EntityKind::Set => serde_json::to_string_pretty(&self.sets),
            EntityKind::Prop => serde_json::to_string_pretty(&self.props),
            EntityKind::Character => serde_json::to_string_pretty(&self.characters),
        }
    }

    /// Number of records of `kind`.
    #[must_use]
    pub fn len(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Actor => self.actors.len(),
            EntityKind::Set => self.sets.len(),
            EntityKind::Prop => self.props.len(),
            EntityKind::Character => self.characters.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.into_iter().all(|kind| self.len(kind) == 0)
    }

    /// Ids of one collection, in order.
    pub fn ids(&self, kind: EntityKind) -> Box<dyn Iterator<Item = &str> + '_> {
        match kind {
            EntityKind::Actor => Box::new(self.actors.iter().map(|a| a.id.as_str())),
            EntityKind::Set => Box::new(self.sets.iter().map(|s| s.id.as_str())),
            EntityKind::Prop => Box::new(self.props.iter().map(|p| p.id.as_str())),
            EntityKind::Character => Box::new(self.characters.iter().map(|c| c.id.as_str())),
        }
    }
}

/// Next identifier for a collection: one past the largest numeric id.
///
/// Ids that do not parse as integers count as zero, so an empty collection
/// or one holding only non-numeric ids gets `"1"`. When the largest id is
/// `u64::MAX` the smallest unused positive id is returned instead.
#[must_use]
pub fn next_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> String {
    let taken: BTreeSet<u64> = ids
        .into_iter()
        .filter_map(|id| id.trim().parse::<u64>().ok())
        .collect();
    let max = taken.last().copied().unwrap_or(0);
    if let Some(next) = max.checked_add(1) {
        return next.to_string();
    }

    (1..=u64::MAX)
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(0)
        .to_string()
}

/// Raw form input for an actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorFields {
    pub name: String,
    pub pinyin_initial: Option<String>,
    pub image: Option<String>,
}

/// Raw form input for a set.
///
/// `tone_sections` is whatever the form produced: an object of labels, `null`
/// for none, or anything else (which fails validation).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetFields {
    pub name: String,
    pub tone_sections: serde_json::Value,
    pub image: Option<String>,
}

/// Raw form input for a prop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropFields {
    pub name: String,
    pub category: PropCategory,
    pub components: Vec<String>,
    pub image: Option<String>,
}

/// Raw form input for a character.
///
/// `memory_scene` and `audio_file` left as `None` keep the stored value on
/// update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterFields {
    pub hanzi: String,
    pub pinyin: String,
    pub meaning: String,
    pub actor_id: String,
    pub set_id: String,
    pub tone_section: Option<String>,
    pub prop_ids: Vec<String>,
    pub plot: String,
    pub image: Option<String>,
    pub memory_scene: Option<String>,
    pub audio_file: Option<String>,
}

/// Input for a create or update, tagged by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityFields {
    Actor(ActorFields),
    Set(SetFields),
    Prop(PropFields),
    Character(CharacterFields),
}

impl EntityFields {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityFields::Actor(_) => EntityKind::Actor,
            EntityFields::Set(_) => EntityKind::Set,
            EntityFields::Prop(_) => EntityKind::Prop,
            EntityFields::Character(_) => EntityKind::Character,
        }
    }
}

/// A stored record of any kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Actor(Actor),
    Set(Set),
    Prop(Prop),
    Character(Character),
}

impl Record {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Record::Actor(a) => &a.id,
            Record::Set(s) => &s.id,
            Record::Prop(p) => &p.id,
            Record::Character(c) => &c.id,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Actor(_) => EntityKind::Actor,
            Record::Set(_) => EntityKind::Set,
            Record::Prop(_) => EntityKind::Prop,
            Record::Character(_) => EntityKind::Character,
        }
    }
}
