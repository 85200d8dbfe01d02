use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "clipdrop")]
#[command(author, version, about = "Telegram bot that turns media links into uploaded files", long_about = None)]
pub struct Cli {
    /// Bot token; overrides BOT_TOKEN / TELOXIDE_TOKEN
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Folder for downloads in flight; overrides DOWNLOAD_FOLDER
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot in normal mode
    Run {
        /// Use webhook mode instead of long polling
        #[arg(long)]
        webhook: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether webhook mode was requested; polling is the default.
    pub fn webhook(&self) -> bool {
        matches!(self.command, Some(Commands::Run { webhook: true }))
    }

    /// Exports the flag overrides so the config statics pick them up.
    ///
    /// Must run before anything reads `core::config`.
    pub fn apply_env_overrides(&self) {
        if let Some(token) = &self.token {
            std::env::set_var("BOT_TOKEN", token);
        }
        if let Some(dir) = &self.output_dir {
            std::env::set_var("DOWNLOAD_FOLDER", dir);
        }
    }
}
