use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use madara_core::checkpoint::CheckpointSettings;
use madara_core::context::settings::WaitSettings;
use madara_core::Kb;

#[derive(Parser)]
#[command(name = "madara", about = "Command-line front end for a local MADARA knowledge base")]
struct Cli {
    /// Originator id this process writes under. Generated if not given.
    #[arg(long)]
    originator: Option<String>,
    /// Checkpoint file this invocation loads from / saves to.
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the value bound to a key.
    Get { key: String },
    /// Evaluate a KaRL expression, printing the result.
    Eval { expression: String },
    /// Block re-evaluating an expression until it is truthy or times out.
    Wait {
        expression: String,
        #[arg(long, default_value_t = 5.0)]
        timeout_secs: f64,
    },
    /// Dump the knowledge base as KaRL assignments.
    Dump {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Dump the knowledge base as a JSON object.
    DumpJson {
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Write the current knowledge base to `--store`.
    Checkpoint,
}

/// Generates a short, human-typeable originator id when the user doesn't
/// pin one down with `--originator`, so `--store`-backed runs still get a
/// stable identity for the reconciliation protocol's tie-break.
fn default_originator() -> String {
    format!("cli-{}", uuid::Uuid::new_v4().simple())
}

fn load_or_new(originator: &str, store: &Option<PathBuf>) -> Result<Kb> {
    let kb = Kb::new(originator);
    if let Some(path) = store {
        if path.exists() {
            kb.load_context_file(path, &CheckpointSettings::default())?;
        }
    }
    Ok(kb)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let originator = cli.originator.clone().unwrap_or_else(default_originator);
    let kb = load_or_new(&originator, &cli.store)?;

    match cli.cmd {
        Cmd::Get { key } => {
            println!("{}", kb.get(&key).to_string());
        }
        Cmd::Eval { expression } => {
            let result = kb.eval(&expression)?;
            println!("{}", result.to_string());
            if let Some(path) = &cli.store {
                kb.save_context_file(path, &[])?;
            }
        }
        Cmd::Wait { expression, timeout_secs } => {
            let mut settings = WaitSettings::default();
            settings.max_wait_time = Some(Duration::from_secs_f64(timeout_secs));
            let result = kb.wait(&expression, &settings)?;
            println!("{}", result.to_string());
        }
        Cmd::Dump { prefix } => {
            let prefixes = prefix.into_iter().collect::<Vec<_>>();
            print!("{}", kb.save_as_karl(&prefixes));
        }
        Cmd::DumpJson { prefix } => {
            let prefixes = prefix.into_iter().collect::<Vec<_>>();
            println!("{}", kb.save_as_json(&prefixes));
        }
        Cmd::Checkpoint => {
            let path = cli.store.ok_or_else(|| anyhow!("--store is required for checkpoint"))?;
            let bytes = kb.save_checkpoint_bytes(&[]);
            let checksum = Kb::checksum(&bytes);
            std::fs::write(&path, &bytes)?;
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            tracing::info!(checksum, "wrote checkpoint at {now}");
        }
    }
    Ok(())
}
