//! Command implementations shared by one-shot CLI calls and the shell.

use anyhow::{Context, bail};
use clap::Parser;
use clap::error::ErrorKind;
use serde_json::{Map, Value};

use crate::cli::{
    ActorAction, ActorArgs, AutobackupAction, CharAction, CharArgs, DataCommand, PropAction,
    PropArgs, SearchArgs, SetAction, SetArgs, ShellCommand, ShellLine, split_args,
};
use crate::model::normalize::split_list;
use crate::model::{
    Actor, ActorFields, Character, CharacterFields, EntityFields, EntityKind, Prop, PropFields,
    Record, Set, SetFields,
};
use crate::repository::{Repository, ValidationErrors};
use crate::search::{ActorQuery, CharacterQuery, Matches, PropQuery, Query, SetQuery};
use crate::session::{SaveReport, Session};

/// What the shell should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum ShellStep {
    /// Print the text (if any) and read the next line.
    Continue(String),
    Exit,
}

/// Run one data command against the session, returning the text to print.
///
/// # Errors
///
/// Returns `ValidationErrors` when a save is rejected, and a plain error for
/// unknown ids, malformed options or a failed backup.
pub fn run(session: &mut Session, command: DataCommand) -> anyhow::Result<String> {
    match command {
        DataCommand::Actor(action) => actor(session, action),
        DataCommand::Set(action) => set(session, action),
        DataCommand::Prop(action) => prop(session, action),
        DataCommand::Char(action) => character(session, action),
        DataCommand::Backup => {
            let dir = session.backup_now()?;
            Ok(format!(
                "Backup written to {}",
                session.storage().root().join(dir).display()
            ))
        }
    }
}

/// Parse and run one line typed into the shell.
///
/// `interval_minutes` is used by `autobackup start` when no interval is given.
///
/// # Errors
///
/// Returns the parse error for a malformed line, otherwise as [`run`].
pub fn run_shell_line(
    session: &mut Session,
    line: &str,
    interval_minutes: u64,
) -> anyhow::Result<ShellStep> {
    let words = split_args(line)?;
    if words.is_empty() {
        return Ok(ShellStep::Continue(String::new()));
    }

    let parsed = match ShellLine::try_parse_from(words) {
        Ok(parsed) => parsed,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return Ok(ShellStep::Continue(e.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let text = match parsed.command {
        ShellCommand::Data(command) => run(session, command)?,
        ShellCommand::Undo => match session.undo() {
            Some(report) => with_save_warning("Undone.".to_string(), &report),
            None => "Nothing to undo.".to_string(),
        },
        ShellCommand::Redo => match session.redo() {
            Some(report) => with_save_warning("Redone.".to_string(), &report),
            None => "Nothing to redo.".to_string(),
        },
        ShellCommand::Autobackup(AutobackupAction::Start { minutes }) => {
            let minutes = minutes.unwrap_or(interval_minutes);
            session.start_periodic_backups(minutes)?;
            if minutes == 1 {
                "Backing up every minute.".to_string()
            } else {
                format!("Backing up every {minutes} minutes.")
            }
        }
        ShellCommand::Autobackup(AutobackupAction::Stop) => {
            if session.stop_periodic_backups() {
                "Periodic backups stopped.".to_string()
            } else {
                "Periodic backups were not running.".to_string()
            }
        }
        ShellCommand::Exit => return Ok(ShellStep::Exit),
    };
    Ok(ShellStep::Continue(text))
}

/// Text to show for a failed command: validation failures one per line,
/// anything else as a single error.
#[must_use]
pub fn describe_error(err: &anyhow::Error) -> String {
    if let Some(errors) = err.downcast_ref::<ValidationErrors>() {
        return errors.messages().join("\n");
    }
    if let Some(e) = err.downcast_ref::<clap::Error>() {
        return e.to_string().trim_end().to_string();
    }
    format!("Error: {err:#}")
}

fn actor(session: &mut Session, action: ActorAction) -> anyhow::Result<String> {
    match action {
        ActorAction::Add(args) => {
            save(session, EntityFields::Actor(actor_fields(args, None)), None)
        }
        ActorAction::Edit { id, fields } => {
            let existing = session
                .repository()
                .actor(&id)
                .cloned()
                .with_context(|| format!("No actor with id {id}"))?;
            let fields = actor_fields(fields, Some(existing));
            save(session, EntityFields::Actor(fields), Some(&id))
        }
        ActorAction::List { text } => Ok(list(session, &Query::Actors(ActorQuery { text }))),
        ActorAction::Rm { id } => delete(session, EntityKind::Actor, &id),
    }
}

fn set(session: &mut Session, action: SetAction) -> anyhow::Result<String> {
    match action {
        SetAction::Add(args) => {
            let fields = set_fields(args, None)?;
            save(session, EntityFields::Set(fields), None)
        }
        SetAction::Edit { id, fields } => {
            let existing = session
                .repository()
                .set(&id)
                .cloned()
                .with_context(|| format!("No set with id {id}"))?;
            let fields = set_fields(fields, Some(existing))?;
            save(session, EntityFields::Set(fields), Some(&id))
        }
        SetAction::List { text } => Ok(list(session, &Query::Sets(SetQuery { text }))),
        SetAction::Rm { id } => delete(session, EntityKind::Set, &id),
    }
}

fn prop(session: &mut Session, action: PropAction) -> anyhow::Result<String> {
    match action {
        PropAction::Add(args) => save(session, EntityFields::Prop(prop_fields(args, None)), None),
        PropAction::Edit { id, fields } => {
            let existing = session
                .repository()
                .prop(&id)
                .cloned()
                .with_context(|| format!("No prop with id {id}"))?;
            let fields = prop_fields(fields, Some(existing));
            save(session, EntityFields::Prop(fields), Some(&id))
        }
        PropAction::List { text, category } => {
            Ok(list(session, &Query::Props(PropQuery { text, category })))
        }
        PropAction::Rm { id } => delete(session, EntityKind::Prop, &id),
    }
}

fn character(session: &mut Session, action: CharAction) -> anyhow::Result<String> {
    match action {
        CharAction::Add(args) => {
            save(session, EntityFields::Character(character_fields(args, None)), None)
        }
        CharAction::Edit { id, fields } => {
            let existing = session
                .repository()
                .character(&id)
                .cloned()
                .with_context(|| format!("No character with id {id}"))?;
            let fields = character_fields(fields, Some(existing));
            save(session, EntityFields::Character(fields), Some(&id))
        }
        CharAction::List { text } => Ok(list(
            session,
            &Query::Characters(CharacterQuery {
                text,
                ..CharacterQuery::default()
            }),
        )),
        CharAction::Search(args) => Ok(list(session, &Query::Characters(search_query(args)))),
        CharAction::Rm { id } => delete(session, EntityKind::Character, &id),
    }
}

fn save(session: &mut Session, fields: EntityFields, id: Option<&str>) -> anyhow::Result<String> {
    let outcome = session.save(fields, id)?;
    let record = &outcome.value;
    let text = format!("Saved {} {}: {}", record.kind(), record.id(), label(record));
    Ok(with_save_warning(text, &outcome.save))
}

fn delete(session: &mut Session, kind: EntityKind, id: &str) -> anyhow::Result<String> {
    let outcome = session.delete(kind, id);
    if !outcome.value {
        bail!("No {kind} with id {id}");
    }
    Ok(with_save_warning(format!("Deleted {kind} {id}"), &outcome.save))
}

fn with_save_warning(mut text: String, report: &SaveReport) -> String {
    if !report.is_ok() {
        let files: Vec<&str> = report.failures.iter().map(|f| f.kind.file_name()).collect();
        text.push_str(&format!(
            "\nwarning: change kept in memory but not saved to {}",
            files.join(", ")
        ));
    }
    text
}

fn label(record: &Record) -> &str {
    match record {
        Record::Actor(a) => &a.name,
        Record::Set(s) => &s.name,
        Record::Prop(p) => &p.name,
        Record::Character(c) => &c.hanzi,
    }
}

fn actor_fields(args: ActorArgs, existing: Option<Actor>) -> ActorFields {
    match existing {
        Some(actor) => ActorFields {
            name: args.name.unwrap_or(actor.name),
            pinyin_initial: args.pinyin_initial.or(actor.pinyin_initial),
            image: args.image.or(actor.image),
        },
        None => ActorFields {
            name: args.name.unwrap_or_default(),
            pinyin_initial: args.pinyin_initial,
            image: args.image,
        },
    }
}

fn set_fields(args: SetArgs, existing: Option<Set>) -> anyhow::Result<SetFields> {
    let tones = tone_input(&args.tones, args.tones_json)?;
    Ok(match existing {
        Some(set) => SetFields {
            name: args.name.unwrap_or(set.name),
            tone_sections: tones.unwrap_or_else(|| {
                Value::Object(
                    set.tone_sections
                        .into_iter()
                        .map(|(key, label)| (key, Value::String(label)))
                        .collect(),
                )
            }),
            image: args.image.or(set.image),
        },
        None => SetFields {
            name: args.name.unwrap_or_default(),
            tone_sections: tones.unwrap_or(Value::Null),
            image: args.image,
        },
    })
}

/// Tone sections given on the command line, if any.
///
/// JSON that does not parse is passed on as a string so validation rejects it.
fn tone_input(tones: &[String], json: Option<String>) -> anyhow::Result<Option<Value>> {
    if let Some(raw) = json {
        return Ok(Some(match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(_) => Value::String(raw),
        }));
    }
    if tones.is_empty() {
        return Ok(None);
    }

    let mut sections = Map::new();
    for pair in tones {
        let Some((key, label)) = pair.split_once('=') else {
            bail!("Tone section must look like KEY=LABEL, got '{pair}'");
        };
        sections.insert(key.trim().to_string(), Value::String(label.trim().to_string()));
    }
    Ok(Some(Value::Object(sections)))
}

fn prop_fields(args: PropArgs, existing: Option<Prop>) -> PropFields {
    let components = args.components.as_deref().map(split_list);
    match existing {
        Some(prop) => PropFields {
            name: args.name.unwrap_or(prop.name),
            category: args.category.unwrap_or(prop.category),
            components: components.unwrap_or(prop.components),
            image: args.image.or(prop.image),
        },
        None => PropFields {
            name: args.name.unwrap_or_default(),
            category: args.category.unwrap_or_default(),
            components: components.unwrap_or_default(),
            image: args.image,
        },
    }
}

fn character_fields(args: CharArgs, existing: Option<Character>) -> CharacterFields {
    let prop_ids = args.props.as_deref().map(split_list);
    match existing {
        Some(c) => {
            // A tone section belongs to its set; moving sets drops it unless a new one is given.
            let tone_section = match args.tone {
                Some(tone) => Some(tone),
                None if args.set.as_ref().is_some_and(|set| *set != c.set_id) => None,
                None => c.tone_section,
            };
            CharacterFields {
                hanzi: args.hanzi.unwrap_or(c.hanzi),
                pinyin: args.pinyin.unwrap_or(c.pinyin),
                meaning: args.meaning.unwrap_or(c.meaning),
                actor_id: args.actor.unwrap_or(c.actor_id),
                set_id: args.set.unwrap_or(c.set_id),
                tone_section,
                prop_ids: prop_ids.unwrap_or(c.prop_ids),
                plot: args.plot.unwrap_or(c.plot),
                image: args.image.or(c.image),
                memory_scene: args.scene,
                audio_file: args.audio,
            }
        }
        None => CharacterFields {
            hanzi: args.hanzi.unwrap_or_default(),
            pinyin: args.pinyin.unwrap_or_default(),
            meaning: args.meaning.unwrap_or_default(),
            actor_id: args.actor.unwrap_or_default(),
            set_id: args.set.unwrap_or_default(),
            tone_section: args.tone,
            prop_ids: prop_ids.unwrap_or_default(),
            plot: args.plot.unwrap_or_default(),
            image: args.image,
            memory_scene: args.scene,
            audio_file: args.audio,
        },
    }
}

fn search_query(args: SearchArgs) -> CharacterQuery {
    CharacterQuery {
        text: args.text,
        hanzi: args.hanzi,
        pinyin: args.pinyin,
        meaning: args.meaning,
        actor: args.actor,
        set: args.set,
        prop: args.prop,
    }
}

fn list(session: &Session, query: &Query) -> String {
    let repo = session.repository();
    let lines: Vec<String> = match session.query(query) {
        Matches::Actors(found) => found.iter().map(|a| format_actor(repo, a)).collect(),
        Matches::Sets(found) => found.iter().map(|s| format_set(repo, s)).collect(),
        Matches::Props(found) => found.iter().map(|p| format_prop(repo, p)).collect(),
        Matches::Characters(found) => found.iter().map(|c| format_character(repo, c)).collect(),
    };

    if lines.is_empty() {
        format!("No {}s found.", query.kind())
    } else {
        lines.join("\n")
    }
}

fn format_actor(repo: &Repository, actor: &Actor) -> String {
    let initial = actor
        .pinyin_initial
        .as_deref()
        .map(|i| format!(" ({i})"))
        .unwrap_or_default();
    format!(
        "[{}] {}{} - {}",
        actor.id,
        actor.name,
        initial,
        count(repo.usage(EntityKind::Actor, &actor.id), "character")
    )
}

fn format_set(repo: &Repository, set: &Set) -> String {
    let mut line = format!("[{}] {}", set.id, set.name);
    if !set.tone_sections.is_empty() {
        let tones: Vec<String> = set
            .tone_sections
            .iter()
            .map(|(key, label)| format!("{key}={label}"))
            .collect();
        line.push_str(&format!(" - tones: {}", tones.join(", ")));
    }
    line.push_str(&format!(
        " - {}",
        count(repo.usage(EntityKind::Set, &set.id), "character")
    ));
    line
}

fn format_prop(repo: &Repository, prop: &Prop) -> String {
    let mut line = format!("[{}] {} ({})", prop.id, prop.name, prop.category);
    if !prop.components.is_empty() {
        line.push_str(&format!(" - components: {}", prop.components.join(", ")));
    }
    line.push_str(&format!(
        " - used by {}",
        count(repo.usage(EntityKind::Prop, &prop.id), "character")
    ));
    line
}

fn format_character(repo: &Repository, c: &Character) -> String {
    let actor = repo
        .actor(&c.actor_id)
        .map_or_else(|| missing(&c.actor_id), |a| a.name.clone());
    let set = repo.set(&c.set_id);
    let mut set_label = set.map_or_else(|| missing(&c.set_id), |s| s.name.clone());
    if let Some(section) = &c.tone_section {
        match set.and_then(|s| s.tone_sections.get(section)) {
            Some(label) => set_label.push_str(&format!(" ({section}: {label})")),
            None => set_label.push_str(&format!(" ({section})")),
        }
    }

    let mut line = format!(
        "[{}] {} {} - {} | actor: {} | set: {}",
        c.id, c.hanzi, c.pinyin, c.meaning, actor, set_label
    );
    if !c.prop_ids.is_empty() {
        let props: Vec<String> = c
            .prop_ids
            .iter()
            .map(|id| repo.prop(id).map_or_else(|| missing(id), |p| p.name.clone()))
            .collect();
        line.push_str(&format!(" | props: {}", props.join(", ")));
    }
    line
}

fn missing(id: &str) -> String {
    format!("#{id} (missing)")
}

fn count(n: usize, noun: &str) -> String {
    match n {
        1 => format!("1 {noun}"),
        n => format!("{n} {noun}s"),
    }
}
