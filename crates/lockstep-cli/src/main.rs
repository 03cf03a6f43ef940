//! Command-line tooling for lockstep contracts and plugin binaries.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lockstep_abi::{check, ContractId, Verdict};
use lockstep_host::{discover_in_dir, ContractProbe};

/// Lockstep - version-gated plugin loading tooling.
#[derive(Parser, Debug)]
#[command(name = "lockstep")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Contract identifier management.
    Id {
        #[command(subcommand)]
        id_cmd: IdCommand,
    },
    /// Plugin binary inspection.
    Plugin {
        #[command(subcommand)]
        plugin_cmd: PluginCommand,
    },
}

/// Identifier subcommands.
#[derive(Subcommand, Debug)]
enum IdCommand {
    /// Generate a fresh contract identifier.
    New {
        /// Source file whose contract_id!("...") pin should be rewritten.
        #[arg(long)]
        pin: Option<PathBuf>,
    },
    /// Show the identifier pinned in a source file.
    Show {
        /// Source file holding a contract_id!("...") pin.
        #[arg(required = true)]
        file: PathBuf,
    },
}

/// Plugin subcommands.
#[derive(Subcommand, Debug)]
enum PluginCommand {
    /// Report which contract revision a plugin binary was built against.
    Inspect {
        /// Path to the plugin binary.
        #[arg(required = true)]
        path: PathBuf,
        /// Expected identifier; exit nonzero if the binary reports another.
        #[arg(long)]
        expect: Option<String>,
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Probe every plugin binary in a directory.
    List {
        /// Directory to scan.
        #[arg(short, long, default_value = "./plugins")]
        dir: PathBuf,
        /// Expected identifier to compare every binary against.
        #[arg(long)]
        expect: Option<String>,
    },
}

fn main() -> Result<()> {
    // Set up panic hook to catch panics before they abort
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\n=== PANIC ===");
        if let Some(location) = panic_info.location() {
            eprintln!(
                "Location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        } else {
            eprintln!("Location: <unknown>");
        }
        eprintln!("Message: {}", panic_info);
        eprintln!("==============\n");
    }));

    let args = Args::parse();

    // Check if JSON logging is requested (for CI/container environments)
    let json_logging = std::env::var("LOCKSTEP_LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_filter = if args.verbose {
        "lockstep=debug,lockstep_host=debug"
    } else {
        "lockstep=info,lockstep_host=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json_logging {
        // JSON format for CI/container environments
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        // Human-readable format for development - clean and compact
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init();
    }

    match args.command {
        Command::Id { id_cmd } => run_id_cmd(id_cmd),
        Command::Plugin { plugin_cmd } => run_plugin_cmd(plugin_cmd),
    }
}

fn run_id_cmd(cmd: IdCommand) -> Result<()> {
    match cmd {
        IdCommand::New { pin } => {
            let id = ContractId::generate();
            match pin {
                Some(file) => repin_source_file(&file, id),
                None => {
                    println!("{}", id);
                    Ok(())
                }
            }
        }
        IdCommand::Show { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let id = extract_pinned_id(&source)
                .with_context(|| format!("No usable pin in {}", file.display()))?;
            println!("{}", id);
            Ok(())
        }
    }
}

fn run_plugin_cmd(cmd: PluginCommand) -> Result<()> {
    match cmd {
        PluginCommand::Inspect { path, expect, json } => {
            inspect_plugin(&path, expect.as_deref(), json)
        }
        PluginCommand::List { dir, expect } => list_plugins(&dir, expect.as_deref()),
    }
}

/// Replace the pin in `file` with `id` and report the change.
fn repin_source_file(file: &Path, id: ContractId) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let previous = extract_pinned_id(&source)
        .with_context(|| format!("No usable pin in {}", file.display()))?;
    let rewritten = rewrite_pinned_id(&source, id)?;
    std::fs::write(file, rewritten)
        .with_context(|| format!("Failed to write {}", file.display()))?;

    tracing::debug!("Rewrote pin in {:?}", file);
    println!("Repinned {}", file.display());
    println!("  {} -> {}", previous, id);
    Ok(())
}

/// Locate the quoted literal of the first `contract_id!` pin in `source`.
fn find_pinned_literal(source: &str) -> Option<std::ops::Range<usize>> {
    let macro_at = source.find("contract_id!")?;
    let open = macro_at + source[macro_at..].find('"')? + 1;
    let close = open + source[open..].find('"')?;
    Some(open..close)
}

/// Extract the pinned identifier from `source`.
fn extract_pinned_id(source: &str) -> Result<ContractId> {
    let range = find_pinned_literal(source)
        .ok_or_else(|| anyhow::anyhow!("no contract_id!(\"...\") pin found"))?;
    source[range]
        .parse()
        .map_err(|e| anyhow::anyhow!("pinned identifier is invalid: {}", e))
}

/// Replace the pinned literal with `new_id`, leaving everything else as is.
fn rewrite_pinned_id(source: &str, new_id: ContractId) -> Result<String> {
    let range = find_pinned_literal(source)
        .ok_or_else(|| anyhow::anyhow!("no contract_id!(\"...\") pin found"))?;
    let mut rewritten = String::with_capacity(source.len() + 4);
    rewritten.push_str(&source[..range.start]);
    rewritten.push_str(&new_id.to_string());
    rewritten.push_str(&source[range.end..]);
    Ok(rewritten)
}

/// Parse an identifier argument given in its 8-4-4-4-12 textual form.
fn parse_expected(raw: &str) -> Result<ContractId> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("Invalid contract identifier '{}': {}", raw, e))
}

/// Report which contract revision a binary was built against.
fn inspect_plugin(path: &Path, expect: Option<&str>, json: bool) -> Result<()> {
    let expected = expect.map(parse_expected).transpose()?;
    let probe = ContractProbe::new();

    let reported = match probe.probe(path) {
        Ok(reported) => reported,
        Err(e) => {
            if json {
                let body = serde_json::json!({
                    "path": path.display().to_string(),
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
                std::process::exit(1);
            }
            anyhow::bail!("{}", e);
        }
    };

    let verdict = expected.map(|host| check(host, reported));

    if json {
        let mut body = serde_json::json!({
            "path": path.display().to_string(),
            "reported": reported.to_string(),
        });
        if let Some(expected) = expected {
            body["expected"] = serde_json::Value::String(expected.to_string());
        }
        if let Some(verdict) = verdict {
            body["verdict"] = serde_json::Value::String(verdict.to_string());
        }
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("Plugin Binary");
        println!("=============\n");
        println!("Path:       {}", path.display());
        println!("Reported:   {}", reported);
        if let Some(expected) = expected {
            println!("Expected:   {}", expected);
        }
        if let Some(verdict) = verdict {
            println!("Verdict:    {}", verdict);
        }
    }

    if verdict == Some(Verdict::Incompatible) {
        std::process::exit(1);
    }
    Ok(())
}

/// Probe every native library directly inside `dir`.
fn list_plugins(dir: &Path, expect: Option<&str>) -> Result<()> {
    let expected = expect.map(parse_expected).transpose()?;
    let probe = ContractProbe::new();

    println!("Discovered Plugins");
    println!("==================\n");

    let binaries = discover_in_dir(dir);
    let mut probed = 0;

    for path in &binaries {
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("?");
        match probe.probe(path) {
            Ok(reported) => {
                println!("  {}", name);
                println!("      Path:     {}", path.display());
                println!("      Reported: {}", reported);
                if let Some(host) = expected {
                    println!("      Verdict:  {}", check(host, reported));
                }
                println!();
                probed += 1;
            }
            Err(e) => {
                println!("  {}", name);
                println!("      Path:     {}", path.display());
                println!("      Error:    {}", e);
                println!();
            }
        }
    }

    if binaries.is_empty() {
        println!("  No plugins found.");
        println!();
        println!("  Searched in:");
        println!("    - {}", dir.display());
    } else {
        println!("Total: {} plugin(s)", probed);
    }

    Ok(())
}
