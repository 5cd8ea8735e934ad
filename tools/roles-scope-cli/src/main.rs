use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roles_scope::{
    condition_address, diff_targets, flatten_condition, normalize_condition, pack_conditions,
    process_permissions, reconstruct_permissions, split_targets, validate_presets,
    ReconstructOptions,
};
use roles_scope_types::{Condition, Permission, PermissionItem, PermissionSet, Target};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// JSON in, JSON out wrapper over the roles-scope core.
///
/// Input arguments take a file path, or `-` for stdin.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Tracing filter directive (eg `warn`, `roles_scope=debug`).
    #[arg(long, global = true, env = "ROLES_SCOPE_LOG", default_value = "warn")]
    log_level: String,

    /// Write the result here instead of stdout (replaced atomically).
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize a condition tree.
    Normalize {
        #[arg(default_value = "-")]
        input: PathBuf,
    },
    /// Identifier and packed bytes of a condition.
    ConditionId {
        #[arg(default_value = "-")]
        input: PathBuf,
        /// Address the tree exactly as given, without normalizing it first.
        #[arg(long)]
        raw: bool,
    },
    /// Aggregate permissions and permission sets into targets.
    Process {
        #[arg(default_value = "-")]
        input: PathBuf,
    },
    /// Map targets back to permissions.
    Reconstruct {
        #[arg(default_value = "-")]
        input: PathBuf,
        /// One permission per top-level `Or` branch.
        #[arg(long)]
        split_or_branches: bool,
    },
    /// Grants to revoke and to add when moving from one target set to another.
    Diff {
        #[arg(long)]
        prev: PathBuf,
        #[arg(long)]
        next: PathBuf,
    },
    /// Remove from `combined` everything `subtrahend` grants.
    Split {
        #[arg(long)]
        combined: PathBuf,
        #[arg(long)]
        subtrahend: PathBuf,
    },
    /// Keep presets contained in the ground truth and list what they leave uncovered.
    ValidatePresets {
        #[arg(long)]
        presets: PathBuf,
        #[arg(long)]
        ground_truth: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log filter {:?}", cli.log_level))?;
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(io::stderr)
                .with_filter(filter),
        )
        .init();

    let result = run(&cli.command)?;
    match &cli.output {
        Some(path) => write_json_atomic(path, &result)?,
        None => println!(
            "{}",
            serde_json::to_string_pretty(&result).context("failed serialising result")?
        ),
    }
    Ok(())
}

fn run(command: &Command) -> Result<Value> {
    match command {
        Command::Normalize { input } => {
            let condition: Condition = read_json(input)?;
            to_value(&normalize_condition(&condition)?)
        }
        Command::ConditionId { input, raw } => {
            let condition: Condition = read_json(input)?;
            let flat = if *raw {
                flatten_condition(&condition)
            } else {
                flatten_condition(&normalize_condition(&condition)?)
            };
            let packed = pack_conditions(&flat)?;
            let id = condition_address(&flat)?;
            debug!(%id, nodes = flat.len(), "addressed condition");
            Ok(json!({
                "id": id,
                "nodes": flat.len(),
                "packed": format!("0x{}", hex::encode(packed)),
            }))
        }
        Command::Process { input } => {
            let items: Vec<PermissionItem> = read_json(input)?;
            to_value(&process_permissions(&items)?)
        }
        Command::Reconstruct {
            input,
            split_or_branches,
        } => {
            let targets: Vec<Target> = read_json(input)?;
            let options = ReconstructOptions {
                split_or_branches: *split_or_branches,
            };
            to_value(&reconstruct_permissions(&targets, options))
        }
        Command::Diff { prev, next } => {
            let prev: Vec<Target> = read_json(prev)?;
            let next: Vec<Target> = read_json(next)?;
            to_value(&diff_targets(&prev, &next)?)
        }
        Command::Split {
            combined,
            subtrahend,
        } => {
            let combined: Vec<Target> = read_json(combined)?;
            let subtrahend: Vec<Target> = read_json(subtrahend)?;
            to_value(&split_targets(&combined, &subtrahend)?)
        }
        Command::ValidatePresets {
            presets,
            ground_truth,
        } => {
            let presets: Vec<PermissionSet> = read_json(presets)?;
            let ground_truth: Vec<Permission> = read_json(ground_truth)?;
            to_value(&validate_presets(&presets, &ground_truth)?)
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed reading stdin")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("failed serialising result")
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let serialised = serde_json::to_string_pretty(value).context("failed serialising result")?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes())
        .with_context(|| format!("failed writing temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
