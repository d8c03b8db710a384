use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::archive::STORIES_DIR;
use crate::story::BackendKind;

#[derive(Parser, Debug)]
#[command(
    name = "storysaver-rs",
    about = "Archive story posts to disk and mirror them to remote storage"
)]
pub struct Cli {
    /// Log verbosity
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The command to run; a bare invocation runs a sync.
    pub fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Sync(SyncArgs::default()))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch current stories, archive them locally and mirror the archive
    /// to remote storage
    Sync(SyncArgs),
    /// Re-derive timestamps from archived filenames and stamp them back
    /// onto the files
    Repair(RepairArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct SyncArgs {
    /// Login strategy for the story service
    #[arg(long, value_enum, default_value = "session")]
    pub backend: BackendKind,
}

#[derive(clap::Args, Debug)]
pub struct RepairArgs {
    /// Archive directory to repair
    #[arg(default_value = STORIES_DIR)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
