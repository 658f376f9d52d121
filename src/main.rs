use std::io::{IsTerminal, Write};
use std::sync::Arc;

use clap::Parser;
use hanzi_palace::cli::{Cli, Commands};
use hanzi_palace::commands::{self, ShellStep};
use hanzi_palace::config::Config;
use hanzi_palace::session::{Session, SessionOptions};
use hanzi_palace::storage::local::LocalStorageBackend;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "hanzi_palace=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::parse_from(["palace", "--help"]);
        return Ok(());
    };

    let config = Config::load()?;
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => config.data_dir()?,
    };
    let storage = Arc::new(LocalStorageBackend::new(data_dir));
    let options = SessionOptions {
        max_history: config.history.max_depth,
    };
    let mut session = Session::open(storage, &options);

    match command {
        Commands::Data(command) => match commands::run(&mut session, command) {
            Ok(text) => {
                println!("{text}");
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", commands::describe_error(&e));
                std::process::exit(1);
            }
        },
        Commands::Shell => tokio::runtime::Runtime::new()?.block_on(shell(session, &config)),
    }
}

async fn shell(mut session: Session, config: &Config) -> anyhow::Result<()> {
    let interval = config.backup.interval_minutes;
    if config.backup.auto
        && let Err(e) = session.start_periodic_backups(interval)
    {
        eprintln!("Error: {e}");
    }

    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!("palace> ");
            std::io::stdout().flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match commands::run_shell_line(&mut session, &line, interval) {
            Ok(ShellStep::Continue(text)) => {
                if !text.is_empty() {
                    println!("{text}");
                }
            }
            Ok(ShellStep::Exit) => break,
            Err(e) => eprintln!("{}", commands::describe_error(&e)),
        }
    }

    session.stop_periodic_backups();
    Ok(())
}
