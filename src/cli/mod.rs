//! CLI interface for the palace.
//!
//! Provides command-line argument parsing using clap. The same data commands
//! are accepted one-shot from the command line and line by line inside
//! `palace shell`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::model::PropCategory;

/// Command-line interface for the palace.
#[derive(Parser)]
#[command(name = "palace")]
#[command(
    author,
    version,
    about = "Memory palace for learning Chinese characters",
    long_about = None
)]
pub struct Cli {
    /// Data directory (overrides `data.dir` in config.toml).
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Data(DataCommand),

    /// Open an interactive shell with undo, redo and periodic backups.
    Shell,
}

/// Commands that read or change the palace.
#[derive(Debug, Subcommand)]
pub enum DataCommand {
    /// Manage actors (one per pinyin initial).
    #[command(subcommand)]
    Actor(ActorAction),

    /// Manage sets (one per pinyin final).
    #[command(subcommand)]
    Set(SetAction),

    /// Manage props (components and radicals).
    #[command(subcommand)]
    Prop(PropAction),

    /// Manage characters.
    #[command(subcommand)]
    Char(CharAction),

    /// Write a backup of the palace now.
    Backup,
}

#[derive(Debug, Subcommand)]
pub enum ActorAction {
    /// Add an actor.
    Add(ActorArgs),
    /// Edit an actor; omitted options keep their current value.
    Edit {
        id: String,
        #[command(flatten)]
        fields: ActorArgs,
    },
    /// List actors.
    List {
        /// Filter by name or pinyin initial.
        text: Option<String>,
    },
    /// Delete an actor. Characters using it are left as they are.
    Rm { id: String },
}

#[derive(Debug, Clone, Default, Args)]
pub struct ActorArgs {
    #[arg(short, long)]
    pub name: Option<String>,

    /// Pinyin initial the actor stands for.
    #[arg(short = 'i', long = "initial")]
    pub pinyin_initial: Option<String>,

    #[arg(long)]
    pub image: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum SetAction {
    /// Add a set.
    Add(SetArgs),
    /// Edit a set; omitted options keep their current value.
    Edit {
        id: String,
        #[command(flatten)]
        fields: SetArgs,
    },
    /// List sets.
    List {
        /// Filter by name.
        text: Option<String>,
    },
    /// Delete a set. Characters using it are left as they are.
    Rm { id: String },
}

#[derive(Debug, Clone, Default, Args)]
pub struct SetArgs {
    #[arg(short, long)]
    pub name: Option<String>,

    /// Tone section, repeatable (e.g. `--tone 1=Entrance`).
    #[arg(short, long = "tone", value_name = "KEY=LABEL")]
    pub tones: Vec<String>,

    /// All tone sections as a JSON object, replacing `--tone`.
    #[arg(long, value_name = "JSON", conflicts_with = "tones")]
    pub tones_json: Option<String>,

    #[arg(long)]
    pub image: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum PropAction {
    /// Add a prop.
    Add(PropArgs),
    /// Edit a prop; omitted options keep their current value.
    Edit {
        id: String,
        #[command(flatten)]
        fields: PropArgs,
    },
    /// List props.
    List {
        /// Filter by name or category.
        text: Option<String>,

        /// Only props in this category.
        #[arg(short = 'C', long)]
        category: Option<PropCategory>,
    },
    /// Delete a prop. Characters using it are left as they are.
    Rm { id: String },
}

#[derive(Debug, Clone, Default, Args)]
pub struct PropArgs {
    #[arg(short, long)]
    pub name: Option<String>,

    /// general, weapon, clothing, artifact or document.
    #[arg(short = 'C', long)]
    pub category: Option<PropCategory>,

    /// Comma-separated components (e.g. "刀, 金").
    #[arg(long)]
    pub components: Option<String>,

    #[arg(long)]
    pub image: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CharAction {
    /// Add a character.
    Add(CharArgs),
    /// Edit a character; omitted options keep their current value.
    Edit {
        id: String,
        #[command(flatten)]
        fields: CharArgs,
    },
    /// List characters.
    List {
        /// Filter by hanzi, pinyin, meaning, actor name or set name.
        text: Option<String>,
    },
    /// Search characters by several criteria at once.
    Search(SearchArgs),
    /// Delete a character.
    Rm { id: String },
}

#[derive(Debug, Clone, Default, Args)]
pub struct CharArgs {
    #[arg(long)]
    pub hanzi: Option<String>,

    #[arg(short, long)]
    pub pinyin: Option<String>,

    #[arg(short, long)]
    pub meaning: Option<String>,

    /// Actor id.
    #[arg(short, long)]
    pub actor: Option<String>,

    /// Set id.
    #[arg(short, long)]
    pub set: Option<String>,

    /// Tone section key within the set.
    #[arg(short, long)]
    pub tone: Option<String>,

    /// Comma-separated prop ids.
    #[arg(long)]
    pub props: Option<String>,

    #[arg(long)]
    pub plot: Option<String>,

    #[arg(long)]
    pub image: Option<String>,

    #[arg(long)]
    pub scene: Option<String>,

    #[arg(long)]
    pub audio: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SearchArgs {
    /// Free text matched against hanzi, pinyin, meaning, actor and set names.
    pub text: Option<String>,

    #[arg(long)]
    pub hanzi: Option<String>,

    #[arg(short, long)]
    pub pinyin: Option<String>,

    #[arg(short, long)]
    pub meaning: Option<String>,

    /// Actor id.
    #[arg(short, long)]
    pub actor: Option<String>,

    /// Set id.
    #[arg(short, long)]
    pub set: Option<String>,

    /// Prop id.
    #[arg(long)]
    pub prop: Option<String>,
}

/// One line typed into `palace shell`.
#[derive(Parser)]
#[command(name = "palace", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: ShellCommand,
}

/// Commands available inside the shell.
#[derive(Debug, Subcommand)]
pub enum ShellCommand {
    #[command(flatten)]
    Data(DataCommand),

    /// Revert the last change.
    Undo,

    /// Reapply the last undone change.
    Redo,

    /// Control periodic backups.
    #[command(subcommand)]
    Autobackup(AutobackupAction),

    /// Leave the shell.
    #[command(alias = "quit")]
    Exit,
}

#[derive(Debug, Subcommand)]
pub enum AutobackupAction {
    /// Back up every MINUTES (default from config), replacing any running schedule.
    Start { minutes: Option<u64> },
    /// Stop periodic backups.
    Stop,
}

/// Split a shell line into words.
///
/// Whitespace separates words; single or double quotes group them. Inside
/// double quotes a backslash escapes the next character.
///
/// # Errors
///
/// Returns an error if a quote is left open.
pub fn split_args(line: &str) -> anyhow::Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => anyhow::bail!("Unclosed single quote"),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c) => word.push(c),
                            None => anyhow::bail!("Unclosed double quote"),
                        },
                        Some(c) => word.push(c),
                        None => anyhow::bail!("Unclosed double quote"),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        ShellLine::command().debug_assert();
    }

    mod split_tests {
        use super::*;

        #[test]
        fn splits_on_whitespace() {
            assert_eq!(split_args("  actor   list ").unwrap(), vec!["actor", "list"]);
            assert!(split_args("   ").unwrap().is_empty());
        }

        #[test]
        fn quotes_group_words() {
            let words = split_args(r#"prop add -n "Paper Fan" --components '刀, 金'"#).unwrap();
            assert_eq!(words, vec!["prop", "add", "-n", "Paper Fan", "--components", "刀, 金"]);
        }

        #[test]
        fn empty_quotes_make_an_empty_word() {
            assert_eq!(
                split_args(r#"actor edit 1 --image """#).unwrap(),
                vec!["actor", "edit", "1", "--image", ""]
            );
        }

        #[test]
        fn backslash_escapes_inside_double_quotes() {
            assert_eq!(split_args(r#""say \"hi\"""#).unwrap(), vec![r#"say "hi""#]);
        }

        #[test]
        fn unclosed_quote_is_an_error() {
            assert!(split_args("actor add -n 'Mei").is_err());
            assert!(split_args("actor add -n \"Mei").is_err());
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn shell_accepts_data_commands() {
            let line = ShellLine::try_parse_from(["char", "search", "--actor", "1", "--prop", "2"])
                .unwrap();
            let ShellCommand::Data(DataCommand::Char(CharAction::Search(args))) = line.command
            else {
                panic!("expected char search");
            };
            assert_eq!(args.actor.as_deref(), Some("1"));
            assert_eq!(args.prop.as_deref(), Some("2"));
        }

        #[test]
        fn shell_only_commands() {
            let line = ShellLine::try_parse_from(["autobackup", "start", "10"]).unwrap();
            assert!(matches!(
                line.command,
                ShellCommand::Autobackup(AutobackupAction::Start { minutes: Some(10) })
            ));
            assert!(matches!(
                ShellLine::try_parse_from(["quit"]).unwrap().command,
                ShellCommand::Exit
            ));
        }

        #[test]
        fn undo_is_not_a_one_shot_command() {
            assert!(Cli::try_parse_from(["palace", "undo"]).is_err());
        }

        #[test]
        fn repeated_tones_are_collected() {
            let cli = Cli::try_parse_from([
                "palace", "set", "add", "-n", "Kitchen", "-t", "1=Door", "-t", "2=Stove",
            ])
            .unwrap();
            let Some(Commands::Data(DataCommand::Set(SetAction::Add(args)))) = cli.command else {
                panic!("expected set add");
            };
            assert_eq!(args.tones, vec!["1=Door", "2=Stove"]);
        }

        #[test]
        fn prop_category_is_parsed() {
            let cli = Cli::try_parse_from(["palace", "prop", "list", "-C", "weapon"]).unwrap();
            let Some(Commands::Data(DataCommand::Prop(PropAction::List { category, .. }))) =
                cli.command
            else {
                panic!("expected prop list");
            };
            assert_eq!(category, Some(PropCategory::Weapon));
            assert!(Cli::try_parse_from(["palace", "prop", "list", "-C", "spoon"]).is_err());
        }

        #[test]
        fn data_dir_is_global() {
            let cli =
                Cli::try_parse_from(["palace", "actor", "list", "--data-dir", "/tmp/p"]).unwrap();
            assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/p")));
        }
    }
}
