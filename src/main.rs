//! termvisor - command-line client for a running hypervisor

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use termvisor::client::{
    render, render_channel_info, render_ids, render_pairs, tokenize, Session,
};
use termvisor::config::Config;
use termvisor::msg::{MessageTokenizedCommand, TerminalId};

#[derive(Parser)]
#[command(name = "termvisor")]
#[command(about = "Inspect and drive the terminals of a termvisor hypervisor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Session name to talk to
    #[arg(short, long, default_value = "default")]
    session: String,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List terminal ids
    Lt,
    /// List terminal ids with their attached process ids
    Ltp,
    /// List process ids
    Lp,
    /// Start a terminal bound to a new process
    Stp,
    /// Show the output channel of a terminal
    Cft {
        /// Terminal id
        tid: TerminalId,
    },
    /// Type text into a terminal
    Put {
        tid: TerminalId,
        text: String,
    },
    /// Run a command in a terminal's process
    Cmd {
        tid: TerminalId,
        /// Command and arguments; a single quoted argument is split like a shell line
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
    /// Clear a terminal
    Clear {
        tid: TerminalId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let mut session = Session::connect(&config, &cli.session).await?;
    let json = cli.json;

    let output = match cli.command {
        Commands::Lt => render(&session.get_terminal_ids().await?, json, |ids| render_ids(ids))?,
        Commands::Ltp => render(
            &session.get_term_ids_with_process_ids().await?,
            json,
            |pairs| render_pairs(pairs),
        )?,
        Commands::Lp => render(&session.get_process_ids().await?, json, |ids| render_ids(ids))?,
        Commands::Stp => render(&session.start_terminal_with_process().await?, json, |id| {
            format!("Started terminal {}", id)
        })?,
        Commands::Cft { tid } => render(
            &session.get_term_channel_info(tid).await?,
            json,
            render_channel_info,
        )?,
        Commands::Put { tid, text } => {
            session.put_text(tid, &text).await?;
            return Ok(());
        }
        Commands::Cmd { tid, words } => {
            session.run_command(tid, command_from_words(words)?).await?;
            return Ok(());
        }
        Commands::Clear { tid } => {
            session.clear(tid).await?;
            return Ok(());
        }
    };

    println!("{}", output);
    Ok(())
}

fn command_from_words(words: Vec<String>) -> Result<MessageTokenizedCommand> {
    if let [line] = words.as_slice() {
        return tokenize(line)?.ok_or_else(|| anyhow!("Empty command"));
    }

    let mut words = words.into_iter();
    let command = words.next().ok_or_else(|| anyhow!("Empty command"))?;
    Ok(MessageTokenizedCommand {
        command,
        args: words.collect(),
    })
}
