use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Simple Storage Service")]
pub struct Args {
    /// Host to bind to (overrides TRIPLE_S_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port number (overrides TRIPLE_S_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Path to the storage directory (overrides TRIPLE_S_DIR)
    #[arg(long)]
    pub dir: Option<String>,
}

impl AppConfig {
    /// Parse CLI args, then fill anything unset from the environment.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |name| env::var(name))
    }

    /// Merge parsed args over values from `lookup`, then over defaults.
    fn merge<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = lookup("TRIPLE_S_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match lookup("TRIPLE_S_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing TRIPLE_S_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 8080,
            Err(err) => return Err(err).context("reading TRIPLE_S_PORT"),
        };
        let env_dir = lookup("TRIPLE_S_DIR").unwrap_or_else(|_| "./data".into());

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            data_dir: args.dir.unwrap_or(env_dir),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
