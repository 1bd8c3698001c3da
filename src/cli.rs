// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - demo: run the scripted demo target under verification
// - config --show / --path / --reset: configuration management

use clap::{Parser, Subcommand};
use vigil::config::{Config, VERSION};

/// Vigil - runtime verification for message-passing programs
#[derive(Parser)]
#[command(name = "vigil")]
#[command(version = VERSION)]
#[command(about = "Runtime verification of concurrent message-passing programs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scripted demo target under verification
    Demo {
        /// Drive monitors on dedicated analyzer tasks instead of inline
        #[arg(long)]
        external: bool,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,
    },
}

/// Handle the `config` subcommand.
pub fn handle_config(show: bool, path: bool, reset: bool) {
    if path {
        match Config::config_path() {
            Some(p) => println!("{}", p.display()),
            None => eprintln!("no config directory on this platform"),
        }
    } else if reset {
        match Config::reset_config_file() {
            Ok(p) => println!("config reset: {}", p.display()),
            Err(e) => eprintln!("config reset failed: {e}"),
        }
    } else if show {
        print!("{}", Config::from_env().render());
    } else {
        println!("Usage: vigil config [--show|--path|--reset]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_demo_flags() {
        let cli = Cli::try_parse_from(["vigil", "demo", "--external"]).unwrap();
        match cli.command {
            Some(Commands::Demo { external }) => assert!(external),
            _ => panic!("expected demo subcommand"),
        }
    }

    #[test]
    fn test_cli_parses_bare_invocation() {
        let cli = Cli::try_parse_from(["vigil"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["vigil", "replay"]).is_err());
    }
}
