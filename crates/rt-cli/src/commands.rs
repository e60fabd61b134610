use anyhow::{bail, Context};
use colored::Colorize;
use rt_core::{AddOutcome, ReferenceTracker, RemoveOutcome, TrackerState};
use rt_store::{DirObjectStore, ObjectStore};
use rt_types::KeySet;
use serde_json::json;
use tracing::info;

use crate::cli::*;
use crate::config::RtConfig;
use crate::retry::RetryPolicy;

/// An opened store plus everything needed to run one command against a pool.
pub struct Session {
    tracker: ReferenceTracker<DirObjectStore>,
    pool: String,
    policy: RetryPolicy,
    client_id: String,
    create_pools: bool,
}

impl Session {
    /// Merge CLI overrides into `config` and open the store.
    pub fn open(cli: &Cli, mut config: RtConfig) -> anyhow::Result<Self> {
        if let Some(root) = &cli.root {
            config.store.root = root.clone();
        }
        if let Some(n) = cli.retries {
            config.retry.max_attempts = n;
        }
        let pool = match cli.pool.clone().or(config.pool.clone()) {
            Some(p) if !p.is_empty() => p,
            _ => bail!("a pool is required (-p POOL or `pool` in the config)"),
        };

        let root = &config.store.root;
        let store = DirObjectStore::with_lock_config(root, config.store.lock_config())
            .with_context(|| format!("cannot open store at {}", root.display()))?;

        Ok(Self {
            tracker: ReferenceTracker::new(store),
            pool,
            policy: config.retry.policy(),
            client_id: cli.client_id.clone(),
            create_pools: config.store.create_pools,
        })
    }

    /// Fail unless the pool exists, creating it first when `create` is set
    /// and the config allows it.
    fn require_pool(&self, create: bool) -> anyhow::Result<()> {
        let store = self.tracker.store();
        if store.pool_exists(&self.pool)? {
            return Ok(());
        }
        if !(create && self.create_pools) {
            bail!("pool '{}' does not exist", self.pool);
        }
        store.create_pool(&self.pool)?;
        info!(pool = %self.pool, "created pool");
        Ok(())
    }

    pub fn add(&self, name: &str, keys: &KeySet) -> anyhow::Result<AddOutcome> {
        self.require_pool(true)?;
        info!(client = %self.client_id, pool = %self.pool, name, keys = keys.len(), "add");
        let out = self
            .policy
            .run(|_| self.tracker.add(&self.pool, name, keys))
            .with_context(|| format!("add to {}/{name} failed", self.pool))?;
        Ok(out)
    }

    pub fn remove(&self, name: &str, keys: &KeySet) -> anyhow::Result<RemoveOutcome> {
        self.require_pool(false)?;
        info!(client = %self.client_id, pool = %self.pool, name, keys = keys.len(), "remove");
        let out = self
            .policy
            .run(|_| self.tracker.remove(&self.pool, name, keys))
            .with_context(|| format!("remove from {}/{name} failed", self.pool))?;
        Ok(out)
    }

    pub fn inspect(&self, name: &str) -> anyhow::Result<Option<TrackerState>> {
        self.require_pool(false)?;
        Ok(self.tracker.inspect(&self.pool, name)?)
    }

    pub fn list(&self) -> anyhow::Result<Vec<String>> {
        self.require_pool(false)?;
        Ok(self.tracker.store().list_objects(&self.pool)?)
    }
}

pub fn run_command(cli: Cli, config: RtConfig) -> anyhow::Result<()> {
    let session = Session::open(&cli, config)?;
    let json = matches!(cli.format, OutputFormat::Json);
    match &cli.command {
        Command::Add(args) => {
            let out = session.add(&args.name, &args.keys)?;
            print_add(&session.pool, args, out, json)
        }
        Command::Rem(args) => {
            let out = session.remove(&args.name, &args.keys)?;
            print_remove(&session.pool, args, out, json)
        }
        Command::Inspect(args) => {
            let state = session.inspect(&args.name)?;
            print_state(&session.pool, &args.name, state.as_ref(), json)
        }
        Command::List => {
            let names = session.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else if names.is_empty() {
                println!("No trackers in {}.", session.pool.bold());
            } else {
                for n in names {
                    println!("{n}");
                }
            }
            Ok(())
        }
    }
}

fn print_add(pool: &str, args: &KeysArgs, out: AddOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        let v = json!({
            "pool": pool,
            "name": args.name,
            "created": out.created,
            "added": out.added,
        });
        println!("{}", serde_json::to_string_pretty(&v)?);
        return Ok(());
    }
    let target = format!("{pool}/{}", args.name);
    if out.added == 0 {
        println!(
            "{} {} already holds {}",
            "✓".green(),
            target.bold(),
            args.keys.joined().yellow()
        );
    } else {
        let verb = if out.created { "Created" } else { "Updated" };
        println!(
            "{} {verb} {}: added {} of {} keys",
            "✓".green().bold(),
            target.bold(),
            out.added,
            args.keys.len()
        );
    }
    Ok(())
}

fn print_remove(
    pool: &str,
    args: &KeysArgs,
    out: RemoveOutcome,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        let v = json!({
            "pool": pool,
            "name": args.name,
            "deleted": out.deleted,
            "removed": out.removed,
        });
        println!("{}", serde_json::to_string_pretty(&v)?);
        return Ok(());
    }
    let target = format!("{pool}/{}", args.name);
    if out.deleted {
        println!(
            "{} {} has no references left and was deleted",
            "✓".green().bold(),
            target.bold()
        );
    } else if out.removed == 0 {
        println!(
            "{} {} holds none of {}",
            "✓".green(),
            target.bold(),
            args.keys.joined().yellow()
        );
    } else {
        println!(
            "{} {}: removed {} keys",
            "✓".green().bold(),
            target.bold(),
            out.removed
        );
    }
    Ok(())
}

fn print_state(
    pool: &str,
    name: &str,
    state: Option<&TrackerState>,
    json: bool,
) -> anyhow::Result<()> {
    let target = format!("{pool}/{name}");
    let Some(state) = state else {
        if json {
            let v = json!({ "pool": pool, "name": name, "exists": false });
            println!("{}", serde_json::to_string_pretty(&v)?);
        } else {
            println!("{} does not exist", target.bold());
        }
        return Ok(());
    };

    if json {
        let keys: Vec<String> = state.keys.iter().map(|k| k.to_string()).collect();
        let v = json!({
            "pool": pool,
            "name": name,
            "exists": true,
            "schema_version": state.schema_version.get(),
            "refcount": state.refcount,
            "token": state.token.raw(),
            "keys": keys,
            "consistent": state.is_consistent(),
        });
        println!("{}", serde_json::to_string_pretty(&v)?);
        return Ok(());
    }

    println!("Tracker {}", target.bold());
    println!("  Layout:   {}", state.schema_version.to_string().cyan());
    println!("  Token:    {}", state.token.to_string().cyan());
    let health = if state.is_consistent() {
        "✓".green()
    } else {
        "✗ refcount mismatch".red()
    };
    println!("  Refcount: {} {}", state.refcount.to_string().bold(), health);
    for key in state.keys.iter() {
        println!("    {}", key.to_string().yellow());
    }
    Ok(())
}
