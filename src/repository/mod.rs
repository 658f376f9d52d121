//! The in-memory palace: four collections and the rules that guard them.
//!
//! Mutations validate first and either apply completely or not at all.
//! Character references are checked when a character is saved, never
//! afterwards: deleting an actor, set or prop leaves characters pointing at
//! the missing id until they are next edited.

mod validate;

use crate::model::normalize::{self, Normalized, RawCollections};
use crate::model::{
    Actor, ActorFields, Character, CharacterFields, Collections, EntityFields, EntityKind, Prop,
    PropFields, Record, Set, SetFields, next_id,
};
use crate::search::{Matches, Query};

/// Every rule a payload violated, in the order the rules are checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", .0.join(", "))]
pub struct ValidationErrors(pub Vec<String>);

impl ValidationErrors {
    #[must_use]
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

/// What a load had to repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Stored entries dropped because they were not objects.
    pub skipped: usize,
    /// Stored records given an id because they had none.
    pub assigned_ids: usize,
}

/// Owner of the four entity collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Repository {
    data: Collections,
}

impl Repository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap already-normalized collections.
    #[must_use]
    pub fn from_collections(data: Collections) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn collections(&self) -> &Collections {
        &self.data
    }

    #[must_use]
    pub fn actors(&self) -> &[Actor] {
        &self.data.actors
    }

    #[must_use]
    pub fn sets(&self) -> &[Set] {
        &self.data.sets
    }

    #[must_use]
    pub fn props(&self) -> &[Prop] {
        &self.data.props
    }

    #[must_use]
    pub fn characters(&self) -> &[Character] {
        &self.data.characters
    }

    #[must_use]
    pub fn actor(&self, id: &str) -> Option<&Actor> {
        self.data.actors.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn set(&self, id: &str) -> Option<&Set> {
        self.data.sets.iter().find(|s| s.id == id)
    }

    #[must_use]
    pub fn prop(&self, id: &str) -> Option<&Prop> {
        self.data.props.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn character(&self, id: &str) -> Option<&Character> {
        self.data.characters.iter().find(|c| c.id == id)
    }

    /// Look up a record of any kind.
    #[must_use]
    pub fn get(&self, kind: EntityKind, id: &str) -> Option<Record> {
        match kind {
            EntityKind::Actor => self.actor(id).cloned().map(Record::Actor),
            EntityKind::Set => self.set(id).cloned().map(Record::Set),
            EntityKind::Prop => self.prop(id).cloned().map(Record::Prop),
            EntityKind::Character => self.character(id).cloned().map(Record::Character),
        }
    }

    /// Check a payload against the current collections.
    ///
    /// `exclude_id` names the record being edited, so it does not collide
    /// with its own name.
    #[must_use]
    pub fn validate(&self, fields: &EntityFields, exclude_id: Option<&str>) -> Vec<String> {
        match fields {
            EntityFields::Actor(f) => validate::actor(&self.data, f, exclude_id),
            EntityFields::Set(f) => validate::set(&self.data, f, exclude_id),
            EntityFields::Prop(f) => validate::prop(&self.data, f, exclude_id),
            EntityFields::Character(f) => validate::character(&self.data, f),
        }
    }

    /// Create a record, or replace the one with `id`.
    ///
    /// An update keeps the record's id and its back-reference lists. An `id`
    /// that names no record of this kind creates a new record with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns every violated rule if the payload is invalid; nothing is
    /// changed in that case.
    pub fn create_or_update(
        &mut self,
        fields: EntityFields,
        id: Option<&str>,
    ) -> Result<Record, ValidationErrors> {
        let kind = fields.kind();
        let existing = id.filter(|id| self.contains(kind, id));

        let errors = self.validate(&fields, existing);
        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }

        let id = existing.map_or_else(|| next_id(self.data.ids(kind)), str::to_string);
        let record = match fields {
            EntityFields::Actor(f) => Record::Actor(self.upsert_actor(id, f)),
            EntityFields::Set(f) => Record::Set(self.upsert_set(id, f)),
            EntityFields::Prop(f) => Record::Prop(self.upsert_prop(id, f)),
            EntityFields::Character(f) => Record::Character(self.upsert_character(id, f)),
        };

        tracing::debug!(%kind, id = record.id(), "saved record");
        Ok(record)
    }

    /// Remove a record. Returns whether anything was removed.
    ///
    /// Records referring to it are left as they are.
    pub fn delete(&mut self, kind: EntityKind, id: &str) -> bool {
        let before = self.data.len(kind);
        match kind {
            EntityKind::Actor => self.data.actors.retain(|a| a.id != id),
            EntityKind::Set => self.data.sets.retain(|s| s.id != id),
            EntityKind::Prop => self.data.props.retain(|p| p.id != id),
            EntityKind::Character => self.data.characters.retain(|c| c.id != id),
        }
        let removed = self.data.len(kind) != before;

        if removed {
            tracing::debug!(%kind, id, "deleted record");
        }
        removed
    }

    /// Filter one collection; see [`crate::search`].
    #[must_use]
    pub fn query(&self, query: &Query) -> Matches<'_> {
        query.run(&self.data)
    }

    /// Normalize stored documents and replace every collection with them.
    pub fn load(&mut self, raw: &RawCollections) -> LoadStats {
        let Normalized {
            collections,
            skipped,
            assigned_ids,
        } = normalize::collections(raw);
        self.data = collections;
        LoadStats {
            skipped,
            assigned_ids,
        }
    }

    /// Replace every collection wholesale (history restores).
    pub fn replace(&mut self, data: Collections) {
        self.data = data;
    }

    /// Pretty-printed JSON for one collection, as written to its data file.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if a record cannot be serialized.
    pub fn serialize(&self, kind: EntityKind) -> Result<String, serde_json::Error> {
        self.data.to_json(kind)
    }

    /// How many characters use the given actor, set or prop.
    ///
    /// Counted from the characters themselves, not from back-reference lists.
    #[must_use]
    pub fn usage(&self, kind: EntityKind, id: &str) -> usize {
        let characters = self.data.characters.iter();
        match kind {
            EntityKind::Actor => characters.filter(|c| c.actor_id == id).count(),
            EntityKind::Set => characters.filter(|c| c.set_id == id).count(),
            EntityKind::Prop => characters.filter(|c| c.prop_ids.iter().any(|p| p == id)).count(),
            EntityKind::Character => 0,
        }
    }

    fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.data.ids(kind).any(|existing| existing == id)
    }

    fn upsert_actor(&mut self, id: String, fields: ActorFields) -> Actor {
        let slot = self.data.actors.iter().position(|a| a.id == id);
        let actor = Actor {
            characters: slot
                .map(|i| self.data.actors[i].characters.clone())
                .unwrap_or_default(),
            id,
            name: fields.name.trim().to_string(),
            pinyin_initial: non_blank(fields.pinyin_initial),
            image: non_blank(fields.image),
        };
        place(&mut self.data.actors, slot, actor)
    }

    fn upsert_set(&mut self, id: String, fields: SetFields) -> Set {
        let slot = self.data.sets.iter().position(|s| s.id == id);
        let set = Set {
            characters: slot
                .map(|i| self.data.sets[i].characters.clone())
                .unwrap_or_default(),
            id,
            name: fields.name.trim().to_string(),
            tone_sections: normalize::tone_sections(&fields.tone_sections),
            image: non_blank(fields.image),
        };
        place(&mut self.data.sets, slot, set)
    }

    fn upsert_prop(&mut self, id: String, fields: PropFields) -> Prop {
        let slot = self.data.props.iter().position(|p| p.id == id);
        let prop = Prop {
            used_by: slot
                .map(|i| self.data.props[i].used_by.clone())
                .unwrap_or_default(),
            id,
            name: fields.name.trim().to_string(),
            category: fields.category,
            components: normalize::clean_list(&fields.components),
            image: non_blank(fields.image),
        };
        place(&mut self.data.props, slot, prop)
    }

    fn upsert_character(&mut self, id: String, fields: CharacterFields) -> Character {
        let slot = self.data.characters.iter().position(|c| c.id == id);
        let tone_section = validate::tone_section(&fields).map(str::to_string);
        let previous = slot.map(|i| &self.data.characters[i]);

        let mut prop_ids: Vec<String> = Vec::new();
        for prop_id in normalize::clean_list(&fields.prop_ids) {
            if !prop_ids.contains(&prop_id) {
                prop_ids.push(prop_id);
            }
        }

        let character = Character {
            memory_scene: fields
                .memory_scene
                .or_else(|| previous.map(|c| c.memory_scene.clone()))
                .unwrap_or_default(),
            audio_file: fields
                .audio_file
                .or_else(|| previous.map(|c| c.audio_file.clone()))
                .unwrap_or_default(),
            tone_section,
            id,
            hanzi: fields.hanzi.trim().to_string(),
            pinyin: fields.pinyin.trim().to_string(),
            meaning: fields.meaning.trim().to_string(),
            actor_id: fields.actor_id.trim().to_string(),
            set_id: fields.set_id.trim().to_string(),
            prop_ids,
            plot: fields.plot,
            image: non_blank(fields.image),
        };
        place(&mut self.data.characters, slot, character)
    }
}

/// Overwrite `slot` or append, returning a copy of what was stored.
fn place<T: Clone>(records: &mut Vec<T>, slot: Option<usize>, record: T) -> T {
    match slot {
        Some(i) => records[i] = record.clone(),
        None => records.push(record.clone()),
    }
    record
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
