use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the hive sync server.
#[derive(Parser, Debug)]
#[clap(name = "hive-server")]
#[clap(about = "Coordination server that syncs task attempts from worker nodes", long_about = None)]
pub struct Args {
    /// Path to the redb database file
    #[clap(short, long, value_name = "FILE")]
    pub database: PathBuf,

    /// Port to listen on
    #[clap(short, long, default_value = "3000")]
    pub port: u16,

    /// Host to bind to
    #[clap(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Seconds before an unanswered backfill request is abandoned
    #[clap(long, default_value = "120")]
    pub backfill_timeout_secs: u64,

    /// Seconds between reconciliation sweeps
    #[clap(long, default_value = "60")]
    pub reconcile_interval_secs: u64,
}
