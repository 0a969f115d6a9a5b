use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use server::{
    admin::{self, RecordKey},
    config::Config,
    state::AppState,
};
use tracing_subscriber::{EnvFilter, fmt};

/// Reconcile rental orders against the configured store.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Most recent orders first.
    List,

    /// Write every order as CSV.
    Export {
        /// Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Order count and per-appliance totals.
    Stats,

    /// Flip the emailed flag of an order (id or reference).
    Toggle { key: String },

    /// Send the confirmation again for an order (id or reference).
    Resend { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the export, logs go to stderr
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::load()?;
    let state = AppState::new(config).await?;
    let store = state.store.as_ref();

    match args.command {
        Command::List => {
            for record in store.list().await? {
                println!(
                    "{:>5}  {}  {}  {:<28}  {:<24}  emailed={}",
                    record.id,
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.reference,
                    record.appliance,
                    record.full_name,
                    record.emailed
                );
            }
        }
        Command::Export { output } => {
            let csv = admin::export_csv(&store.list().await?);

            match output {
                Some(path) => {
                    fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => print!("{csv}"),
            }
        }
        Command::Stats => {
            let stats = admin::stats(store).await?;

            println!("Orders: {}", stats.total);
            for (appliance, count) in &stats.by_appliance {
                println!("  {appliance}: {count}");
            }
            for (emailed, count) in &stats.by_emailed {
                println!("  emailed={emailed}: {count}");
            }
        }
        Command::Toggle { key } => {
            let record = admin::toggle_emailed(store, &RecordKey::parse(&key)).await?;

            println!("{} emailed={}", record.reference, record.emailed);
        }
        Command::Resend { key } => {
            let key = RecordKey::parse(&key);

            if admin::resend(store, &state.dispatcher, &key).await? {
                println!("{key}: confirmation sent");
            } else {
                println!("{key}: confirmation not sent, see logs");
            }
        }
    }

    Ok(())
}
