//! Load-time normalization of stored collections.
//!
//! Data files are hand-editable and have been written by several versions of
//! the app, so every field is read leniently and coerced into the canonical
//! record shape here. Nothing past this module has to care about malformed
//! input: `components` is always a clean list, `tone_sections` always a map,
//! back-reference lists always present.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::model::{Actor, Character, Collections, EntityKind, Prop, PropCategory, Set, next_id};

/// The four stored documents, parsed as JSON but not yet normalized.
///
/// A kind whose document is missing stays `Value::Null` and loads empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCollections {
    pub actors: Value,
    pub sets: Value,
    pub props: Value,
    pub characters: Value,
}

impl RawCollections {
    pub fn set(&mut self, kind: EntityKind, value: Value) {
        match kind {
            EntityKind::Actor => self.actors = value,
            EntityKind::Set => self.sets = value,
            EntityKind::Prop => self.props = value,
            EntityKind::Character => self.characters = value,
        }
    }

    #[must_use]
    pub fn get(&self, kind: EntityKind) -> &Value {
        match kind {
            EntityKind::Actor => &self.actors,
            EntityKind::Set => &self.sets,
            EntityKind::Prop => &self.props,
            EntityKind::Character => &self.characters,
        }
    }
}

/// Result of a normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub collections: Collections,
    /// Entries dropped because they were not JSON objects.
    pub skipped: usize,
    /// Records that had no usable id and were given one.
    pub assigned_ids: usize,
}

/// Normalize all four documents.
#[must_use]
pub fn collections(raw: &RawCollections) -> Normalized {
    let mut skipped = 0;
    let mut assigned_ids = 0;

    let mut actors = records(&raw.actors, EntityKind::Actor, &mut skipped, actor);
    let mut sets = records(&raw.sets, EntityKind::Set, &mut skipped, set);
    let mut props = records(&raw.props, EntityKind::Prop, &mut skipped, prop);
    let mut characters = records(&raw.characters, EntityKind::Character, &mut skipped, character);

    assigned_ids += fill_missing_ids(&mut actors, |a| &mut a.id);
    assigned_ids += fill_missing_ids(&mut sets, |s| &mut s.id);
    assigned_ids += fill_missing_ids(&mut props, |p| &mut p.id);
    assigned_ids += fill_missing_ids(&mut characters, |c| &mut c.id);

    Normalized {
        collections: Collections {
            actors,
            sets,
            props,
            characters,
        },
        skipped,
        assigned_ids,
    }
}

/// Split a comma-joined list, trimming entries and dropping empty ones.
#[must_use]
pub fn split_list(text: &str) -> Vec<String> {
    clean_list(text.split(','))
}

/// Trim every entry and drop the empty ones, keeping order.
#[must_use]
pub fn clean_list<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Coerce a stored `tone_sections` value into a map of labels.
///
/// Anything other than an object becomes an empty map.
#[must_use]
pub fn tone_sections(value: &Value) -> BTreeMap<String, String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, label)| (key.trim().to_string(), scalar_text(label)))
            .filter(|(key, _)| !key.is_empty())
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn records<T>(
    value: &Value,
    kind: EntityKind,
    skipped: &mut usize,
    build: fn(&Map<String, Value>) -> T,
) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            tracing::warn!(
                %kind,
                found = json_type(other),
                "stored collection is not an array, loading it empty"
            );
            return Vec::new();
        }
    };

    items
        .iter()
        .filter_map(|item| {
            if let Value::Object(fields) = item {
                Some(build(fields))
            } else {
                tracing::warn!(
                    %kind,
                    found = json_type(item),
                    "skipping stored record that is not an object"
                );
                *skipped += 1;
                None
            }
        })
        .collect()
}

fn fill_missing_ids<T>(records: &mut [T], id: fn(&mut T) -> &mut String) -> usize {
    let mut taken: Vec<String> = records
        .iter_mut()
        .map(|r| id(r).clone())
        .filter(|i| !i.is_empty())
        .collect();
    let mut assigned = 0;

    for record in records.iter_mut() {
        let slot = id(record);
        if slot.is_empty() {
            let fresh = next_id(taken.iter().map(String::as_str));
            tracing::warn!(id = %fresh, "assigning id to stored record without one");
            taken.push(fresh.clone());
            *slot = fresh;
            assigned += 1;
        }
    }

    assigned
}

fn actor(fields: &Map<String, Value>) -> Actor {
    Actor {
        id: id(fields),
        name: text(fields, &["name"]).trim().to_string(),
        pinyin_initial: optional_text(
            fields,
            &["PinyinInitial", "pinyinInitial", "pinyin_initial"],
        ),
        image: optional_text(fields, &["image"]),
        characters: back_references(fields, &["characters"]),
    }
}

fn set(fields: &Map<String, Value>) -> Set {
    Set {
        id: id(fields),
        name: text(fields, &["name"]).trim().to_string(),
        tone_sections: field(fields, &["tone_sections", "toneSections"])
            .map(tone_sections)
            .unwrap_or_default(),
        image: optional_text(fields, &["image"]),
        characters: back_references(fields, &["characters"]),
    }
}

fn prop(fields: &Map<String, Value>) -> Prop {
    let category = text(fields, &["category"]);
    let category = if category.trim().is_empty() {
        PropCategory::default()
    } else {
        category.parse().unwrap_or_else(|_| {
            tracing::warn!(%category, "unknown prop category, using general");
            PropCategory::default()
        })
    };

    Prop {
        id: id(fields),
        name: text(fields, &["name"]).trim().to_string(),
        category,
        components: components(field(fields, &["components"])),
        image: optional_text(fields, &["image"]),
        used_by: back_references(fields, &["used_by", "usedBy"]),
    }
}

fn character(fields: &Map<String, Value>) -> Character {
    Character {
        id: id(fields),
        hanzi: text(fields, &["hanzi"]),
        pinyin: text(fields, &["pinyin"]),
        meaning: text(fields, &["meaning"]),
        actor_id: text(fields, &["actor", "actorId", "actor_id"]).trim().to_string(),
        set_id: text(fields, &["set_location", "setId", "set_id"]).trim().to_string(),
        tone_section: optional_text(fields, &["tone_section", "toneSection"])
            .map(|s| s.trim().to_string()),
        prop_ids: prop_ids(field(fields, &["props", "propIds", "prop_ids"])),
        plot: text(fields, &["plot"]),
        image: optional_text(fields, &["image"]),
        memory_scene: text(fields, &["memory_scene", "memoryScene"]),
        audio_file: text(fields, &["audio_file", "audioFile"]),
    }
}

fn field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| fields.get(*name))
}

fn id(fields: &Map<String, Value>) -> String {
    text(fields, &["id"]).trim().to_string()
}

fn text(fields: &Map<String, Value>, names: &[&str]) -> String {
    field(fields, names).map(scalar_text).unwrap_or_default()
}

fn optional_text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    Some(text(fields, names)).filter(|s| !s.trim().is_empty())
}

/// Strings as-is, numbers and booleans in their JSON spelling, anything else empty.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn components(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(joined)) => split_list(joined),
        Some(Value::Array(items)) => clean_list(items.iter().map(scalar_text)),
        _ => Vec::new(),
    }
}

fn back_references(fields: &Map<String, Value>, names: &[&str]) -> Vec<String> {
    match field(fields, names) {
        Some(Value::Array(items)) => clean_list(items.iter().map(scalar_text)),
        _ => Vec::new(),
    }
}

/// A lone id (string or number) is promoted to a one-element list.
fn prop_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => clean_list(items.iter().map(scalar_text)),
        Some(single @ (Value::String(_) | Value::Number(_))) => clean_list([scalar_text(single)]),
        _ => Vec::new(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
