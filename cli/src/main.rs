//! hbase-converge CLI: converge this node to its HBase role.
//!
//! # Usage
//!
//! ```text
//! hbase-converge run -j /etc/hbase-converge/node.yaml
//! hbase-converge run -o hbase::regionserver,hbase::thrift --why-run
//! hbase-converge run --report /var/log/hbase-converge/last-run.json
//! hbase-converge attributes -j node.yaml
//! ```

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use hbase_converge_core::convergence::{Engine, RetryPolicy, RunReport, Status};
use hbase_converge_core::data::{load_attributes, settings, AttributeTree};
use hbase_converge_core::infrastructure::accounts::ShadowAccounts;
use hbase_converge_core::infrastructure::archive::{TarballFetcher, DEFAULT_CACHE_DIR};
use hbase_converge_core::infrastructure::inventory::InventorySearch;
use hbase_converge_core::infrastructure::local::{detect_platform, LocalFilesystem};
use hbase_converge_core::infrastructure::packages::{PackageFamily, SystemPackageManager};
use hbase_converge_core::infrastructure::systemd::{SystemdSupervisor, DEFAULT_UNIT_DIR};
use hbase_converge_core::infrastructure::{Host, NoSearch, NodeSearch, ShellRunner};
use hbase_converge_core::recipes::{compile_run_list, RecipeContext};
use hbase_converge_core::templates::HandlebarsRenderer;
use hbase_converge_core::types::RunSettings;
use hbase_converge_core::{lock, ConvergeError};

const DEFAULT_SETTINGS: &str = "/etc/hbase-converge/client.yaml";

#[derive(Parser)]
#[command(name = "hbase-converge", version, about = "Converge a node to its HBase role")]
struct Cli {
    /// Run settings file (YAML). Missing means defaults.
    #[arg(short = 'c', long, env = "HBASE_CONVERGE_CONFIG", default_value = DEFAULT_SETTINGS)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile the run list and converge the node.
    Run(RunArgs),
    /// Print the merged attribute tree after compiling, without converging.
    Attributes(NodeArgs),
}

#[derive(Args)]
struct NodeArgs {
    /// Node file with attribute overrides and an optional run list.
    #[arg(short = 'j', long = "json-attributes")]
    node_file: Option<PathBuf>,

    /// Replace the run list, comma separated.
    #[arg(short = 'o', long = "override-runlist", value_delimiter = ',')]
    run_list: Vec<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    node: NodeArgs,

    /// Report what would change without touching the host.
    #[arg(long)]
    why_run: bool,

    /// Write the JSON run report here.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let settings = match settings::load(&cli.config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("hbase-converge: {}", e);
            process::exit(1);
        }
    };
    init_tracing(&settings.log_level);
    debug!(config = %cli.config.display(), "loaded run settings");

    let result = match cli.command {
        Command::Run(args) => run(&settings, &args),
        Command::Attributes(args) => print_attributes(&settings, &args),
    };
    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("hbase-converge: {}", e);
            process::exit(1);
        }
    }
}

/// `RUST_LOG` wins over the settings file.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load attributes, add platform facts and compile the run list. The CLI
/// run list wins over the node file's, which wins over the settings file's.
fn compile(settings: &RunSettings, args: &NodeArgs) -> Result<(AttributeTree, Engine), ConvergeError> {
    let node_file = args.node_file.as_deref().or(settings.node_file.as_deref());
    let (mut attrs, node_run_list) = load_attributes(node_file)?;

    let facts = detect_platform();
    info!(family = %facts.family, fqdn = %facts.fqdn, "detected platform");
    attrs.set(&["platform", "family"], json!(facts.family));
    attrs.set(&["platform", "fqdn"], json!(facts.fqdn));

    let run_list = if !args.run_list.is_empty() {
        args.run_list.clone()
    } else {
        node_run_list.unwrap_or_else(|| settings.run_list.clone())
    };

    let search: Box<dyn NodeSearch> = match &settings.inventory {
        Some(path) => Box::new(InventorySearch::new(path)),
        None => Box::new(NoSearch),
    };

    let mut engine = Engine::new();
    {
        let mut ctx = RecipeContext::new(&mut attrs, &mut engine, search.as_ref(), &settings.environment);
        compile_run_list(&mut ctx, &run_list)?;
        info!(recipes = ?ctx.included(), "compiled run list");
    }
    Ok((attrs, engine))
}

fn production_host(settings: &RunSettings, family: &str) -> Result<Host, ConvergeError> {
    let mut templates = HandlebarsRenderer::builtin();
    if let Some(dir) = &settings.templates_dir {
        templates = templates.with_override_dir(dir)?;
    }
    Ok(Host {
        fs: Box::new(LocalFilesystem),
        packages: Box::new(SystemPackageManager::new(
            Box::new(ShellRunner),
            PackageFamily::from_platform(family),
        )),
        fetcher: Box::new(TarballFetcher::new(Box::new(ShellRunner), DEFAULT_CACHE_DIR)),
        supervisor: Box::new(SystemdSupervisor::new(Box::new(ShellRunner), DEFAULT_UNIT_DIR)),
        accounts: Box::new(ShadowAccounts::new(Box::new(ShellRunner))),
        runner: Box::new(ShellRunner),
        templates: Box::new(templates),
    })
}

fn run(settings: &RunSettings, args: &RunArgs) -> Result<bool, ConvergeError> {
    let _lock = lock::acquire(&settings.lock_path, settings.lock_timeout_ms)?;

    let (attrs, engine) = compile(settings, &args.node)?;
    let mut host = production_host(settings, &attrs.str(&["platform", "family"]))?;
    let why_run = args.why_run || settings.why_run;
    let report = engine.run(&mut host, &RetryPolicy::from_settings(settings), why_run)?;

    print_report(&report);
    if let Some(path) = args.report.as_deref().or(settings.report_path.as_deref()) {
        write_report(path, &report)?;
    }
    Ok(report.is_success())
}

fn print_report(report: &RunReport) {
    let verb = if report.why_run { "would" } else { "did" };
    for result in &report.results {
        match &result.status {
            Status::Updated => {
                println!("  * {} action {} ({} change)", result.id, result.action, verb);
                for change in &result.changes {
                    println!("    - {}", change);
                }
            }
            Status::Failed => eprintln!(
                "  ! {} action {}: {}",
                result.id,
                result.action,
                result.message.as_deref().unwrap_or("failed")
            ),
            _ => {}
        }
        for warning in &result.warnings {
            eprintln!("  warning: {}: {}", result.id, warning);
        }
    }
    println!("{} ({}ms)", report.summary, report.duration_ms);
}

fn write_report(path: &Path, report: &RunReport) -> Result<(), ConvergeError> {
    std::fs::write(path, report.to_json()?)
        .map_err(|e| ConvergeError::Settings(format!("cannot write report {}: {}", path.display(), e)))?;
    debug!(path = %path.display(), "wrote run report");
    Ok(())
}

fn print_attributes(settings: &RunSettings, args: &NodeArgs) -> Result<bool, ConvergeError> {
    let (attrs, _) = compile(settings, args)?;
    let json = serde_json::to_string_pretty(attrs.as_value())
        .map_err(|e| ConvergeError::Settings(e.to_string()))?;
    println!("{}", json);
    Ok(true)
}
