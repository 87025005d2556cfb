use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use rdbg_config::RdbgConfig;
use rdbg_dap::render::{render_hints, render_partition, render_router};
use rdbg_dap::{DapClient, InspectorSession, SessionUpdate};
use rdbg_trace::{annotations, PartitionKey, RecordIndex, ThreadId, TraceBackend, TraceKind};

/// Terminal front-end for rdbg execution traces.
///
/// Attaches to a running rdbg debug adapter and renders its trace and
/// record/replay logs as trees.
#[derive(Debug, Parser)]
#[command(name = "rdbg-inspector", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `RDBG_INSPECTOR_CONFIG` is used as a fallback. When neither
    /// is provided the inspector uses in-memory defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Adapter host, overriding `connection.host`.
    #[arg(long)]
    host: Option<String>,

    /// Adapter port, overriding `connection.port`.
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Enable tracing and print the trace tree after every update.
    Watch,
    /// Fetch the current trace once and print it.
    Dump,
    /// Print inline call/return hints for one source file.
    Annotations {
        /// Path as reported by the debugger.
        path: String,
    },
    /// Collect the record/replay history of a thread and print it.
    Record {
        #[arg(long, default_value_t = 1)]
        thread: ThreadId,
        /// Replay to this record before printing.
        #[arg(long)]
        playback_to: Option<RecordIndex>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref());
    if let Some(host) = cli.host {
        config.connection.host = host;
    }
    if let Some(port) = cli.port {
        config.connection.port = port;
    }
    let _log_buffer = rdbg_config::init_tracing(&config.logging);

    let client = DapClient::connect(&config.connection).await?;
    let mut session = InspectorSession::attach(client, config.trace.router_config()).await?;

    match cli.command {
        Command::Watch => watch(&mut session, &config).await,
        Command::Dump => {
            session.router_mut().refresh_trace().await;
            print!("{}", render_router(session.router())?);
            Ok(())
        }
        Command::Annotations { path } => {
            let records = session
                .router()
                .backend()
                .fetch_full_log(TraceKind::Trace)
                .await
                .context("failed to fetch the trace log")?;
            print!("{}", render_hints(&path, &annotations::collect(&records, &path)));
            Ok(())
        }
        Command::Record {
            thread,
            playback_to,
        } => {
            let router = session.router_mut();
            router.set_last_active_thread(thread);
            router.refresh_record().await;
            if let Some(target) = playback_to {
                router
                    .playback_to(target)
                    .await
                    .with_context(|| format!("failed to replay to record {target}"))?;
            }
            if let Some(partition) = router.partition(PartitionKey::Record) {
                print!("{}", render_partition(partition)?);
            }
            Ok(())
        }
    }
}

async fn watch(session: &mut InspectorSession, config: &RdbgConfig) -> anyhow::Result<()> {
    session
        .router_mut()
        .start_trace(&config.trace.trace_options())
        .await
        .context("failed to start trace")?;
    print!("{}", render_router(session.router())?);

    while let Some(update) = session.next_update().await {
        match update {
            SessionUpdate::LogsChanged | SessionUpdate::Stopped { .. } => {
                println!("----");
                print!("{}", render_router(session.router())?);
            }
            SessionUpdate::Ended => break,
        }
    }
    Ok(())
}

fn load_config(cli_path: Option<&Path>) -> RdbgConfig {
    match RdbgConfig::discover(cli_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("rdbg-inspector: {err}; continuing with defaults");
            RdbgConfig::default()
        }
    }
}
