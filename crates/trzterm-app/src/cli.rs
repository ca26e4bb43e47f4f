use std::path::PathBuf;

use clap::Parser;
use trzterm_config::TrztermConfig;

/// trzterm: a remote terminal client with in-band trzsz file transfer.
#[derive(Parser, Debug)]
#[command(name = "trzterm", version, about)]
pub struct Args {
    /// WebSocket URL of the terminal server.
    #[arg(short, long)]
    pub url: Option<String>,

    /// Config file path override.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Files or directories offered when the remote asks for uploads.
    #[arg(short, long = "send", value_name = "PATH")]
    pub send: Vec<PathBuf>,

    /// Start the remote upload command for the --send paths once connected.
    #[arg(long, requires = "send")]
    pub upload: bool,

    /// Directory that downloads are saved into.
    #[arg(short, long)]
    pub download_dir: Option<PathBuf>,
}

pub fn parse() -> Args {
    Args::parse()
}

impl Args {
    /// Filter directive: the flag, then the config, then `trzterm=info`.
    pub fn log_directive(&self, config: Option<&TrztermConfig>) -> String {
        if let Some(level) = &self.log_level {
            return level.clone();
        }
        match config {
            Some(config) => format!("trzterm={}", config.logging.level.as_directive()),
            None => "trzterm=info".into(),
        }
    }

    pub fn url(&self, config: &TrztermConfig) -> String {
        self.url.clone().unwrap_or_else(|| config.client.url.clone())
    }

    /// Flag first, then `transfer.download_dir`, then the working directory.
    pub fn download_dir(&self, config: &TrztermConfig) -> Option<PathBuf> {
        self.download_dir
            .clone()
            .or_else(|| config.transfer.download_dir.as_ref().map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
    }
}
