//! Validation rules for entity payloads.
//!
//! Every rule is checked and every failure reported, in a fixed order, so a
//! form can show all of its problems at once.

use serde_json::Value;

use crate::model::{ActorFields, CharacterFields, Collections, PropFields, SetFields};

pub(super) fn actor(
    data: &Collections,
    fields: &ActorFields,
    exclude_id: Option<&str>,
) -> Vec<String> {
    let mut errors = Vec::new();

    if fields.name.trim().is_empty() {
        errors.push("Actor name is required".to_string());
    } else if is_duplicate(
        data.actors.iter().map(|a| (&*a.id, &*a.name)),
        &fields.name,
        exclude_id,
    ) {
        errors.push("An actor with this name already exists".to_string());
    }

    errors
}

pub(super) fn set(data: &Collections, fields: &SetFields, exclude_id: Option<&str>) -> Vec<String> {
    let mut errors = Vec::new();

    if fields.name.trim().is_empty() {
        errors.push("Set name is required".to_string());
    } else if is_duplicate(data.sets.iter().map(|s| (&*s.id, &*s.name)), &fields.name, exclude_id) {
        errors.push("A set with this name already exists".to_string());
    }

    if !matches!(fields.tone_sections, Value::Null | Value::Object(_)) {
        errors.push("Tone sections must be a valid object".to_string());
    }

    errors
}

pub(super) fn prop(
    data: &Collections,
    fields: &PropFields,
    exclude_id: Option<&str>,
) -> Vec<String> {
    let mut errors = Vec::new();

    if fields.name.trim().is_empty() {
        errors.push("Prop name is required".to_string());
    } else if is_duplicate(
        data.props.iter().map(|p| (&*p.id, &*p.name)),
        &fields.name,
        exclude_id,
    ) {
        errors.push("A prop with this name already exists".to_string());
    }

    errors
}

pub(super) fn character(data: &Collections, fields: &CharacterFields) -> Vec<String> {
    let mut errors = Vec::new();
    let actor_id = fields.actor_id.trim();
    let set_id = fields.set_id.trim();

    if fields.hanzi.trim().is_empty() {
        errors.push("Hanzi is required".to_string());
    }
    if fields.pinyin.trim().is_empty() {
        errors.push("Pinyin is required".to_string());
    }
    if fields.meaning.trim().is_empty() {
        errors.push("Meaning is required".to_string());
    }
    if actor_id.is_empty() {
        errors.push("Actor is required".to_string());
    }
    if set_id.is_empty() {
        errors.push("Set location is required".to_string());
    }

    let set = data.sets.iter().find(|s| s.id == set_id);
    if let (Some(set), Some(section)) = (set, tone_section(fields))
        && !set.tone_sections.contains_key(section)
    {
        errors.push("Invalid tone section for selected set".to_string());
    }

    if !actor_id.is_empty() && !data.actors.iter().any(|a| a.id == actor_id) {
        errors.push("Selected actor does not exist".to_string());
    }
    if !set_id.is_empty() && set.is_none() {
        errors.push("Selected set does not exist".to_string());
    }

    for prop_id in fields.prop_ids.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        if !data.props.iter().any(|p| p.id == prop_id) {
            errors.push(format!("Prop with ID {prop_id} does not exist"));
        }
    }

    errors
}

/// The tone section a payload selects, if any.
pub(super) fn tone_section(fields: &CharacterFields) -> Option<&str> {
    fields
        .tone_section
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn is_duplicate<'a>(
    mut existing: impl Iterator<Item = (&'a str, &'a str)>,
    name: &str,
    exclude_id: Option<&str>,
) -> bool {
    let wanted = name.trim().to_lowercase();
    existing.any(|(id, other)| Some(id) != exclude_id && other.trim().to_lowercase() == wanted)
}
