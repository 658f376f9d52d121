//! Filtering over the palace collections.
//!
//! Free-text criteria match case-insensitively as substrings; id criteria
//! (actor, set, prop selections) match exactly. Criteria are ANDed, blank
//! criteria are ignored, and results keep collection order.

use std::collections::HashMap;

use crate::model::{Actor, Character, Collections, EntityKind, Prop, PropCategory, Set};

/// Criteria for the actor list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorQuery {
    /// Matches the name or the pinyin initial.
    pub text: Option<String>,
}

/// Criteria for the set list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetQuery {
    /// Matches the name.
    pub text: Option<String>,
}

/// Criteria for the prop list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropQuery {
    /// Matches the name or the category.
    pub text: Option<String>,
    pub category: Option<PropCategory>,
}

/// Criteria for the character list, including the advanced search fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterQuery {
    /// Matches hanzi, pinyin, meaning, or the name of the linked actor or set.
    pub text: Option<String>,
    pub hanzi: Option<String>,
    pub pinyin: Option<String>,
    pub meaning: Option<String>,
    /// Exact actor id.
    pub actor: Option<String>,
    /// Exact set id.
    pub set: Option<String>,
    /// Exact prop id, which the character must include.
    pub prop: Option<String>,
}

/// A query against one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Actors(ActorQuery),
    Sets(SetQuery),
    Props(PropQuery),
    Characters(CharacterQuery),
}

/// Records matching a [`Query`], borrowed from the collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matches<'a> {
    Actors(Vec<&'a Actor>),
    Sets(Vec<&'a Set>),
    Props(Vec<&'a Prop>),
    Characters(Vec<&'a Character>),
}

impl Query {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Query::Actors(_) => EntityKind::Actor,
            Query::Sets(_) => EntityKind::Set,
            Query::Props(_) => EntityKind::Prop,
            Query::Characters(_) => EntityKind::Character,
        }
    }

    /// Run the query against `data`.
    #[must_use]
    pub fn run<'a>(&self, data: &'a Collections) -> Matches<'a> {
        match self {
            Query::Actors(q) => Matches::Actors(actors(data, q)),
            Query::Sets(q) => Matches::Sets(sets(data, q)),
            Query::Props(q) => Matches::Props(props(data, q)),
            Query::Characters(q) => Matches::Characters(characters(data, q)),
        }
    }
}

impl Matches<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Matches::Actors(v) => v.len(),
            Matches::Sets(v) => v.len(),
            Matches::Props(v) => v.len(),
            Matches::Characters(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the matched records, in order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Matches::Actors(v) => v.iter().map(|a| a.id.as_str()).collect(),
            Matches::Sets(v) => v.iter().map(|s| s.id.as_str()).collect(),
            Matches::Props(v) => v.iter().map(|p| p.id.as_str()).collect(),
            Matches::Characters(v) => v.iter().map(|c| c.id.as_str()).collect(),
        }
    }
}

#[must_use]
pub fn actors<'a>(data: &'a Collections, query: &ActorQuery) -> Vec<&'a Actor> {
    let text = Needle::new(query.text.as_deref());

    data.actors
        .iter()
        .filter(|a| {
            text.matches_any([Some(a.name.as_str()), a.pinyin_initial.as_deref()])
        })
        .collect()
}

#[must_use]
pub fn sets<'a>(data: &'a Collections, query: &SetQuery) -> Vec<&'a Set> {
    let text = Needle::new(query.text.as_deref());

    data.sets
        .iter()
        .filter(|s| text.matches(&s.name))
        .collect()
}

#[must_use]
pub fn props<'a>(data: &'a Collections, query: &PropQuery) -> Vec<&'a Prop> {
    let text = Needle::new(query.text.as_deref());

    data.props
        .iter()
        .filter(|p| query.category.is_none_or(|c| p.category == c))
        .filter(|p| text.matches_any([Some(p.name.as_str()), Some(p.category.as_str())]))
        .collect()
}

#[must_use]
pub fn characters<'a>(data: &'a Collections, query: &CharacterQuery) -> Vec<&'a Character> {
    let text = Needle::new(query.text.as_deref());
    let hanzi = Needle::new(query.hanzi.as_deref());
    let pinyin = Needle::new(query.pinyin.as_deref());
    let meaning = Needle::new(query.meaning.as_deref());
    let actor = exact(query.actor.as_deref());
    let set = exact(query.set.as_deref());
    let prop = exact(query.prop.as_deref());

    let actor_names: HashMap<&str, &str> = data
        .actors
        .iter()
        .map(|a| (a.id.as_str(), a.name.as_str()))
        .collect();
    let set_names: HashMap<&str, &str> = data
        .sets
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();

    data.characters
        .iter()
        .filter(|c| actor.is_none_or(|id| c.actor_id == id))
        .filter(|c| set.is_none_or(|id| c.set_id == id))
        .filter(|c| prop.is_none_or(|id| c.prop_ids.iter().any(|p| p == id)))
        .filter(|c| {
            hanzi.matches(&c.hanzi) && pinyin.matches(&c.pinyin) && meaning.matches(&c.meaning)
        })
        .filter(|c| {
            text.matches_any([
                Some(c.hanzi.as_str()),
                Some(c.pinyin.as_str()),
                Some(c.meaning.as_str()),
                actor_names.get(c.actor_id.as_str()).copied(),
                set_names.get(c.set_id.as_str()).copied(),
            ])
        })
        .collect()
}

/// A lowercased free-text criterion; a blank criterion matches everything.
struct Needle(Option<String>);

impl Needle {
    fn new(raw: Option<&str>) -> Self {
        Self(
            raw.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase),
        )
    }

    fn matches(&self, haystack: &str) -> bool {
        self.0
            .as_deref()
            .is_none_or(|needle| haystack.to_lowercase().contains(needle))
    }

    fn matches_any<'h>(&self, haystacks: impl IntoIterator<Item = Option<&'h str>>) -> bool {
        self.0.is_none() || haystacks.into_iter().flatten().any(|h| self.matches(h))
    }
}

fn exact(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(id: &str, name: &str, initial: &str) -> Actor {
        Actor {
            id: id.to_string(),
            name: name.to_string(),
            pinyin_initial: Some(initial.to_string()),
            image: None,
            characters: vec![],
        }
    }

    fn set(id: &str, name: &str) -> Set {
        Set {
            id: id.to_string(),
            name: name.to_string(),
            tone_sections: Default::default(),
            image: None,
            characters: vec![],
        }
    }

    fn character(
        id: &str,
        hanzi: &str,
        meaning: &str,
        actor: &str,
        set: &str,
        props: &[&str],
    ) -> Character {
        Character {
            id: id.to_string(),
            hanzi: hanzi.to_string(),
            pinyin: String::new(),
            meaning: meaning.to_string(),
            actor_id: actor.to_string(),
            set_id: set.to_string(),
            tone_section: None,
            prop_ids: props.iter().map(ToString::to_string).collect(),
            plot: String::new(),
            image: None,
            memory_scene: String::new(),
            audio_file: String::new(),
        }
    }

    fn palace() -> Collections {
        Collections {
            actors: vec![actor("1", "Mei", "m"), actor("2", "Bo", "b")],
            sets: vec![set("1", "Kitchen"), set("2", "Garden")],
            props: vec![Prop {
                id: "1".to_string(),
                name: "Fan".to_string(),
                category: PropCategory::Artifact,
                components: vec![],
                image: None,
                used_by: vec![],
            }],
            characters: vec![
                character("1", "妈", "mother", "1", "1", &["1"]),
                character("2", "爸", "father", "2", "1", &[]),
                character("3", "马", "horse", "1", "2", &[]),
                character("4", "吗", "question particle", "1", "2", &["1"]),
            ],
        }
    }

    #[test]
    fn actor_filter_keeps_insertion_order() {
        let data = palace();
        let query = CharacterQuery {
            actor: Some("1".to_string()),
            ..CharacterQuery::default()
        };

        let ids: Vec<&str> = characters(&data, &query).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
    }

    #[test]
    fn empty_criteria_match_everything() {
        let data = palace();
        let query = CharacterQuery {
            text: Some("   ".to_string()),
            actor: Some(String::new()),
            ..CharacterQuery::default()
        };

        assert_eq!(characters(&data, &query).len(), 4);
    }

    #[test]
    fn criteria_are_combined() {
        let data = palace();
        let query = CharacterQuery {
            actor: Some("1".to_string()),
            set: Some("2".to_string()),
            prop: Some("1".to_string()),
            ..CharacterQuery::default()
        };

        let ids: Vec<&str> = characters(&data, &query).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["4"]);
    }

    #[test]
    fn text_joins_actor_and_set_names() {
        let data = palace();

        let by_actor = CharacterQuery {
            text: Some("BO".to_string()),
            ..CharacterQuery::default()
        };
        let ids: Vec<&str> = characters(&data, &by_actor).iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);

        let by_set = CharacterQuery {
            text: Some("garden".to_string()),
            ..CharacterQuery::default()
        };
        assert_eq!(characters(&data, &by_set).len(), 2);
    }

    #[test]
    fn field_substrings_are_case_insensitive() {
        let data = palace();
        let query = CharacterQuery {
            meaning: Some("THER".to_string()),
            ..CharacterQuery::default()
        };

        assert_eq!(characters(&data, &query).len(), 2);
    }

    #[test]
    fn id_criteria_are_exact() {
        let data = palace();
        let query = CharacterQuery {
            set: Some("1".to_string()),
            actor: Some("".to_string()),
            ..CharacterQuery::default()
        };
        assert_eq!(characters(&data, &query).len(), 2);

        let partial = CharacterQuery {
            actor: Some("12".to_string()),
            ..CharacterQuery::default()
        };
        assert!(characters(&data, &partial).is_empty());
    }

    #[test]
    fn actors_match_pinyin_initial() {
        let data = palace();
        let query = ActorQuery {
            text: Some("B".to_string()),
        };

        let found = actors(&data, &query);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Bo");
    }

    #[test]
    fn props_match_category_text_and_filter() {
        let data = palace();

        let by_text = PropQuery {
            text: Some("artif".to_string()),
            category: None,
        };
        assert_eq!(props(&data, &by_text).len(), 1);

        let by_category = PropQuery {
            text: None,
            category: Some(PropCategory::Weapon),
        };
        assert!(props(&data, &by_category).is_empty());
    }

    #[test]
    fn query_dispatches_by_kind() {
        let data = palace();
        let query = Query::Sets(SetQuery {
            text: Some("kit".to_string()),
        });

        let matches = query.run(&data);
        assert_eq!(query.kind(), EntityKind::Set);
        assert_eq!(matches.ids(), vec!["1"]);
    }
}
