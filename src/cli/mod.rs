//! Command-line interface for cursord
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading, environment and argument overrides
//! - Subcommands that run without starting the cluster

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{Config, LogLevel};
use crate::error::Result;

/// cursord - authorization-aware query cursors over a coordinator cluster
#[derive(Parser, Debug)]
#[command(
    name = "cursord",
    version,
    about = "Distributed query cursor server",
    long_about = "Runs a set of coordinators sharing one cursor store. Query results are
delivered in batches; continuations may arrive at any coordinator and are
re-authorized against the current grants on every request."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Address to bind the coordinators to
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Port of the first coordinator
    #[arg(long, value_name = "PORT")]
    pub base_port: Option<u16>,

    /// Number of coordinators to start
    #[arg(long, value_name = "N")]
    pub coordinators: Option<usize>,

    /// Idle cursor time-to-live in seconds
    #[arg(long, value_name = "SECONDS")]
    pub ttl: Option<u64>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for cursord
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the coordinators (default)
    Serve,

    /// Show version information
    Version,

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse the process arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file, then apply environment and arguments
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        config.apply_env()?;
        Self::apply_args_to_config(&mut config, args);
        config.validate()?;
        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        if let Some(bind) = &args.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = args.base_port {
            config.server.base_port = port;
        }
        if let Some(n) = args.coordinators {
            config.server.coordinators = n;
        }
        if let Some(ttl) = args.ttl {
            config.cursor.ttl = ttl;
        }

        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to start serving
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Version) => {
                println!("cursord version {}", crate::VERSION);
                Ok(true)
            }
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            Some(Commands::Serve) | None => Ok(false),
        }
    }

    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }
        if show {
            println!("Configuration file: {}", self.config_path().display());
            println!();
            println!("{}", self.config.to_toml_string()?);
        }
        Ok(())
    }

    fn validate_config_file(&self) {
        let path = self.config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return;
        }
        match Config::from_file(&path).and_then(|c| c.validate()) {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => println!("Configuration is invalid: {}", e),
        }
    }

    /// Configuration file path (from args or default)
    pub fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_config() {
        let args = CliArgs::parse_from([
            "cursord",
            "--base-port",
            "9000",
            "--coordinators",
            "3",
            "--ttl",
            "60",
            "-v",
        ]);
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);
        assert_eq!(config.server.base_port, 9000);
        assert_eq!(config.server.coordinators, 3);
        assert_eq!(config.cursor.ttl, 60);
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn test_subcommands_parse() {
        let args = CliArgs::parse_from(["cursord", "config", "--show"]);
        assert!(matches!(
            args.command,
            Some(Commands::Config { show: true, validate: false })
        ));
        let args = CliArgs::parse_from(["cursord"]);
        assert!(args.command.is_none());
    }
}
