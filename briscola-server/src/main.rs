use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use briscola::message::SOCKET_PATH;
use briscola_server::registry::Registry;
use briscola_server::{run, Config};
use clap::Parser;

/// Briscola match broker over a local stream socket.
#[derive(Debug, Parser)]
#[command(name = "briscola-server", version)]
struct Args {
    /// File of registered users, one `name:password` line each; rewritten
    /// on shutdown.
    users_file: PathBuf,

    /// Deal every match from a serial-seeded deck (testing mode).
    #[arg(short = 't')]
    test_decks: bool,

    /// Path of the listening socket.
    #[arg(long, default_value = SOCKET_PATH)]
    socket: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.test_decks {
        log::info!("test mode: decks are seeded by match serial");
    }

    let mut registry = Registry::new();
    let users_file = File::open(&args.users_file)
        .with_context(|| format!("opening users file {}", args.users_file.display()))?;
    let loaded = registry
        .load(BufReader::new(users_file))
        .with_context(|| format!("loading users from {}", args.users_file.display()))?;
    log::info!("loaded {loaded} users from {}", args.users_file.display());

    let config = Config {
        socket_path: args.socket,
        deterministic_decks: args.test_decks,
        ..Config::default()
    };
    let registry = run(registry, config).await.context("server failed")?;

    let users_file = File::create(&args.users_file)
        .with_context(|| format!("rewriting users file {}", args.users_file.display()))?;
    let mut writer = BufWriter::new(users_file);
    let stored = registry.store(&mut writer)?;
    writer.flush()?;
    log::info!("stored {stored} users to {}", args.users_file.display());
    Ok(())
}
