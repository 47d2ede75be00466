mod cli;
mod command;
mod console;
mod port;
mod responder;
mod selftest;

use clap::Parser;
use tracing::info;

use crate::cli::{Cli, Mode};
use crate::selftest::SelftestPlan;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "ferry=info,ferry_transfer=info",
        1 => "ferry=debug,ferry_transfer=debug",
        _ => "ferry=trace,ferry_transfer=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ferry starting");

    match cli.mode {
        Mode::Connect { link, transfer } => {
            let options = transfer.session_options()?;
            let mut stream = port::open(&link)?;
            console::run(&mut stream, &options)
        }
        Mode::Serve {
            link,
            transfer,
            dir,
        } => {
            let options = transfer.session_options()?;
            let mut stream = port::open(&link)?;
            responder::run(&mut stream, &dir, &options)
        }
        Mode::Selftest {
            transfer,
            file,
            size,
            out,
            keep,
            corrupt_chunk,
            corrupt_times,
        } => {
            let options = transfer.session_options()?;
            let plan = SelftestPlan {
                source: file,
                size,
                out,
                keep,
                corrupt: corrupt_chunk.map(|chunk| (chunk, corrupt_times)),
            };
            selftest::run(&plan, &options)
        }
    }
}
