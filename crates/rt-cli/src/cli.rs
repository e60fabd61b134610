use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rt_types::KeySet;

#[derive(Parser)]
#[command(
    name = "rtrack",
    about = "Key-based reference tracker on a transactional object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Client id, recorded in logs
    #[arg(short = 'i', long = "id", global = true, default_value = "admin")]
    pub client_id: String,

    /// Pool holding the tracker objects
    #[arg(short, long, global = true)]
    pub pool: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Store root directory (overrides the config)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Attempts per operation when the tracker is concurrently modified
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Add reference keys to a tracker, creating it if needed
    Add(KeysArgs),
    /// Remove reference keys, deleting the tracker when none are left
    #[command(alias = "remove")]
    Rem(KeysArgs),
    /// Show a tracker's version, refcount and keys
    Inspect(InspectArgs),
    /// List objects in the pool
    List,
}

#[derive(Args)]
pub struct KeysArgs {
    /// Tracker object name
    pub name: String,
    /// Comma-separated list of keys
    #[arg(short, long, value_parser = parse_keys)]
    pub keys: KeySet,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Tracker object name
    pub name: String,
}

fn parse_keys(s: &str) -> Result<KeySet, String> {
    KeySet::parse_list(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_add() {
        let cli = Cli::try_parse_from(["rtrack", "-p", "rbd", "add", "vol", "-k", "a,b"]).unwrap();
        assert_eq!(cli.pool, Some("rbd".into()));
        if let Command::Add(args) = cli.command {
            assert_eq!(args.name, "vol");
            assert_eq!(args.keys.len(), 2);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_rem_and_alias() {
        let cli = Cli::try_parse_from(["rtrack", "rem", "vol", "-k", "a"]).unwrap();
        assert!(matches!(cli.command, Command::Rem(_)));
        let cli = Cli::try_parse_from(["rtrack", "remove", "vol", "-k", "a"]).unwrap();
        assert!(matches!(cli.command, Command::Rem(_)));
    }

    #[test]
    fn duplicate_keys_collapse() {
        let cli = Cli::try_parse_from(["rtrack", "add", "vol", "-k", "a,a,a"]).unwrap();
        if let Command::Add(args) = cli.command {
            assert_eq!(args.keys.len(), 1);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn empty_key_token_is_rejected() {
        assert!(Cli::try_parse_from(["rtrack", "add", "vol", "-k", "a,,b"]).is_err());
    }

    #[test]
    fn keys_are_required() {
        assert!(Cli::try_parse_from(["rtrack", "add", "vol"]).is_err());
    }

    #[test]
    fn client_id_defaults_to_admin() {
        let cli = Cli::try_parse_from(["rtrack", "list"]).unwrap();
        assert_eq!(cli.client_id, "admin");
        let cli = Cli::try_parse_from(["rtrack", "-i", "node-3", "list"]).unwrap();
        assert_eq!(cli.client_id, "node-3");
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rtrack", "inspect", "vol", "-c", "rt.toml", "--retries", "3", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("rt.toml")));
        assert_eq!(cli.retries, Some(3));
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["rtrack", "--verbose", "list"]).unwrap();
        assert!(cli.verbose);
    }
}
