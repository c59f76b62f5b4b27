use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    Command, CommandClient, Console, ConsoleOptions, LiveConsole, TungsteniteConnector,
};
use shared::domain::ItemId;
use storage::{JsonFileStore, SharedStore};
use tracing::{info, warn};
use url::Url;

mod config;
mod render;

use config::load_settings;
use render::Renderer;

const RENDER_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on waiting for the push channel before sending a command.
const OPEN_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser, Debug)]
#[command(about = "Live console for a notification server")]
struct Args {
    /// Page URL of the server; the push channel listens on the next port.
    #[arg(long)]
    page_url: Option<String>,
    /// File holding the persisted console layout (height and expanded flag).
    /// The terminal output itself scrolls freely; the layout is shared with
    /// other consoles reading the same file.
    #[arg(long)]
    layout_path: Option<PathBuf>,
    /// Neither restore nor persist the console layout.
    #[arg(long)]
    no_restore: bool,
    /// Resize the console to this many lines and persist the new layout.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    height: Option<u32>,
    /// Prefix printed lines with a local timestamp.
    #[arg(long)]
    timestamps: bool,
    /// Send the command and exit without streaming its output.
    #[arg(long)]
    no_watch: bool,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Stream the console until interrupted.
    Watch,
    /// Download a new item by URL or code.
    Download { target: String },
    /// Download the given items again, replacing what is stored.
    DownloadForce { ids: Vec<i64> },
    /// Update the given items, or everything when none are given.
    Update { ids: Vec<i64> },
    /// Send the given items to the device, or everything when none are given.
    Send { ids: Vec<i64> },
    Freeze {
        ids: Vec<i64>,
        #[arg(long, conflicts_with = "off")]
        on: bool,
        #[arg(long)]
        off: bool,
    },
    Remove {
        ids: Vec<i64>,
        /// Delete stored files as well.
        #[arg(long)]
        with_file: bool,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    Convert { ids: Vec<i64> },
    Diff { ids: Vec<i64> },
    Inspect { ids: Vec<i64> },
    Folder { ids: Vec<i64> },
    Backup { ids: Vec<i64> },
    /// Clear the console here and the history on the server.
    Trash,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings();
    if let Some(page_url) = args.page_url.clone() {
        settings.page_url = page_url;
    }
    if let Some(layout_path) = args.layout_path.clone() {
        settings.layout_path = layout_path;
    }

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .with_writer(io::stderr)
        .init();

    let page_url = Url::parse(&settings.page_url)
        .with_context(|| format!("invalid page url '{}'", settings.page_url))?;
    let commands = CommandClient::new(page_url.clone());
    let command = args.command.unwrap_or(CliCommand::Watch);

    if args.no_watch {
        run_command(&commands, None, command).await?;
        return Ok(());
    }

    let store = if args.no_restore {
        None
    } else {
        open_store(&settings.layout_path)
    };
    let live = LiveConsole::start(
        &page_url,
        settings.connection(),
        ConsoleOptions {
            restore: !args.no_restore,
            ..ConsoleOptions::default()
        },
        store,
        Arc::new(TungsteniteConnector),
    )?;
    apply_height(&live.console, args.height);
    let layout = live.console.layout();
    info!(height = layout.height, expanded = layout.expanded, "console layout");

    if !matches!(command, CliCommand::Watch) {
        // Output of the command only arrives over the push channel.
        live.connection
            .wait_until_open(OPEN_TIMEOUT)
            .await
            .context("push connection did not open; command not sent")?;
    }
    run_command(&commands, Some(&live), command).await?;
    watch(&live, args.timestamps).await?;
    info!(state = ?live.connection.state(), "console stopped");
    Ok(())
}

fn apply_height(console: &Console, height: Option<u32>) {
    if let Some(height) = height {
        console.resize(height);
    }
}

fn open_store(path: &Path) -> Option<SharedStore> {
    match JsonFileStore::open(path) {
        Ok(store) => Some(storage::shared(store)),
        Err(err) => {
            warn!("layout will not be persisted: {err}");
            None
        }
    }
}

async fn run_command(
    commands: &CommandClient,
    live: Option<&LiveConsole>,
    command: CliCommand,
) -> Result<()> {
    let (command, ids) = match command {
        CliCommand::Watch => return Ok(()),
        CliCommand::Download { target } => {
            if !commands.download(&target).await? {
                warn!("nothing to download: empty target");
            }
            return Ok(());
        }
        CliCommand::Trash => {
            if let Some(live) = live {
                live.console.clear();
            }
            commands.clear_history().await?;
            return Ok(());
        }
        CliCommand::DownloadForce { ids } => (Command::DownloadForce, ids),
        CliCommand::Update { ids } => (Command::Update, ids),
        CliCommand::Send { ids } => (Command::Send, ids),
        CliCommand::Freeze { ids, on, off } => {
            let command = match (on, off) {
                (true, _) => Command::FreezeOn,
                (_, true) => Command::FreezeOff,
                _ => Command::Freeze,
            };
            (command, ids)
        }
        CliCommand::Remove {
            ids,
            with_file,
            yes,
        } => {
            let command = if with_file {
                Command::RemoveWithFile
            } else {
                Command::Remove
            };
            if !ids.is_empty() && !yes && !confirm(command, ids.len()).await? {
                info!("removal cancelled");
                return Ok(());
            }
            (command, ids)
        }
        CliCommand::Convert { ids } => (Command::Convert, ids),
        CliCommand::Diff { ids } => (Command::Diff, ids),
        CliCommand::Inspect { ids } => (Command::Inspect, ids),
        CliCommand::Folder { ids } => (Command::Folder, ids),
        CliCommand::Backup { ids } => (Command::Backup, ids),
    };

    let ids: Vec<ItemId> = ids.into_iter().map(ItemId).collect();
    if !commands.dispatch(command, &ids).await? {
        warn!(?command, "nothing selected; pass one or more ids");
    }
    Ok(())
}

async fn confirm(command: Command, count: usize) -> Result<bool> {
    let prompt = if command == Command::RemoveWithFile {
        format!("Remove {count} item(s) together with their files? [y/N] ")
    } else {
        format!("Remove {count} item(s)? [y/N] ")
    };
    tokio::task::spawn_blocking(move || -> io::Result<bool> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
    })
    .await
    .context("confirmation prompt panicked")?
    .context("failed to read confirmation")
}

async fn watch(live: &LiveConsole, timestamps: bool) -> Result<()> {
    let mut renderer = Renderer::new(timestamps);
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("failed to listen for ctrl-c")?;
                renderer.render(&live.console, &mut io::stdout())?;
                println!();
                return Ok(());
            }
            _ = ticker.tick() => {
                renderer.render(&live.console, &mut io::stdout())?;
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
