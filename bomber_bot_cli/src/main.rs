use anyhow::{Context, Result};
use bomber_bot_core::{
    agent::{Agent, AgentConfig, HazardAwareAgent, RandomWalker},
    protocol::TurnReader,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    io::{self, Write},
    path::PathBuf,
};
use tracing::{info, warn};

mod replay;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Countdown of a freshly placed bomb
    #[arg(long, default_value_t = AgentConfig::default().placement_fuse)]
    placement_fuse: usize,

    /// How many turns ahead to look for items
    #[arg(long, default_value_t = AgentConfig::default().item_search_depth)]
    item_depth: usize,

    /// Turns explored by the safety searches [default: largest arena dimension]
    #[arg(long)]
    horizon: Option<usize>,

    /// Which agent plays
    #[arg(long, value_enum, default_value_t = AgentKind::Hazard)]
    agent: AgentKind,

    /// Seed for the random agent
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play over stdin/stdout (the default)
    Play,
    /// Browse the agent's decisions over a recorded input transcript
    Replay {
        /// Transcript holding the header line followed by the recorded turns
        #[arg(value_name = "TRANSCRIPT")]
        transcript: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum AgentKind {
    Hazard,
    Random,
}

impl Args {
    fn config(&self) -> AgentConfig {
        AgentConfig {
            placement_fuse: self.placement_fuse,
            item_search_depth: self.item_depth,
            horizon: self.horizon,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();
    init_tracing();

    match &args.command {
        None | Some(Command::Play) => play(&args),
        Some(Command::Replay { transcript }) => {
            if !transcript.exists() {
                return Err(anyhow::anyhow!(
                    "Transcript does not exist: {}",
                    transcript.display()
                ));
            }
            replay::run(transcript, args.config())
        }
    }
}

/// Diagnostics go to stderr; stdout carries the protocol.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .try_init();
}

/// Answers every turn read from stdin with one action line on stdout.
fn play(args: &Args) -> Result<()> {
    let mut reader = TurnReader::open(io::stdin().lock()).context("reading the game header")?;
    let header = reader.header();
    info!(
        width = header.width,
        height = header.height,
        id = header.my_id,
        "game started"
    );

    let mut agent: Box<dyn Agent> = match args.agent {
        AgentKind::Hazard => Box::new(HazardAwareAgent::new(header.my_id, args.config())),
        AgentKind::Random => Box::new(RandomWalker::new(header.my_id, args.seed)),
    };

    info!(agent = agent.id(), kind = ?args.agent, "agent ready");

    let mut stdout = io::stdout().lock();
    let mut turns = 0usize;
    loop {
        let snapshot = match reader.read_turn() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!(turns, "input closed");
                break;
            }
            Err(err) => {
                warn!(%err, turns, "unreadable turn, no further turns");
                break;
            }
        };
        let action = agent.act(&snapshot);
        writeln!(stdout, "{action}")?;
        stdout.flush()?;
        turns += 1;
    }
    Ok(())
}
