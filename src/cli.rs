use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CACHE_FILE;

pub mod admin;
pub mod query;

#[derive(Parser, Debug)]
#[command(
    name = "sos-cache",
    version,
    about = "Content cache of sensor observation metadata: rebuild and inspect persisted snapshots",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Rebuild from a JSON fixture datastore and persist the snapshot.
    Rebuild {
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache_file: PathBuf,
        /// Worker threads per phase (default: SOS_CACHE_POOL_SIZE or available parallelism).
        #[arg(long)]
        pool_size: Option<i64>,
        /// Deadline per phase in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long)]
        compress: bool,
        #[arg(long)]
        json: bool,
    },
    /// Header of a persisted snapshot (the file is not consumed).
    Status {
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache_file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print a persisted snapshot as JSON.
    Dump {
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache_file: PathBuf,
    },
    /// Relations of one offering from a persisted snapshot.
    Query {
        #[arg(long, default_value = DEFAULT_CACHE_FILE)]
        cache_file: PathBuf,
        #[arg(long)]
        offering: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Rebuild {
            fixture,
            cache_file,
            pool_size,
            timeout_ms,
            compress,
            json,
        } => admin::cmd_rebuild(fixture, cache_file, pool_size, timeout_ms, compress, json)?,
        Cmd::Status { cache_file, json } => admin::cmd_status(cache_file, json)?,
        Cmd::Dump { cache_file } => admin::cmd_dump(cache_file)?,
        Cmd::Query { cache_file, offering } => query::cmd_query(cache_file, &offering)?,
    }
    Ok(())
}
