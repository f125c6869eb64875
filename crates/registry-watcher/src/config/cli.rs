use clap::Parser;
use clap::Subcommand;

use crate::config::watch::WatchArgs;

#[derive(Parser)]
#[command(about, long_about, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch pods and print service registry changes as JSON lines
    Watch(WatchArgs),
}
