//! Inspect a components root
//!
//! Loads a container configuration, discovers and refreshes the modules under
//! its components root using the built-in recipes, and prints what was found.

use std::path::PathBuf;

use clap::Parser;
use component_manager::config::{ContainerConfig, LoggingConfig, ShutdownPolicy};
use component_manager::utils::init_logging_from_config;
use component_manager::ComponentManager;

#[derive(Debug, Parser)]
#[command(name = "inspect-components", about = "Load a components root and report on it")]
struct Args {
    /// Container configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Components root (overrides config and COMPONENTS_ROOT)
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Load modules in reverse order
    #[arg(long)]
    reverse: bool,

    /// Load demo declarations
    #[arg(long)]
    demo: bool,

    /// Print load statistics as JSON
    #[arg(long)]
    json: bool,

    /// Keep the container open until Ctrl-C / SIGTERM
    #[arg(long)]
    wait: bool,

    /// Log filter (RUST_LOG still wins)
    #[arg(short, long)]
    log: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ContainerConfig::from_file(path)?,
        None => ContainerConfig::default(),
    }
    .apply_env_overrides();
    if let Some(root) = args.root {
        config.components_root = root;
    }
    config.reverse_load_order |= args.reverse;
    config.demo |= args.demo;
    if args.log.is_some() {
        let logging = config.logging.get_or_insert_with(LoggingConfig::default);
        logging.filter = args.log.clone();
    }
    init_logging_from_config(config.logging.as_ref());

    let policy = config.shutdown_policy;
    let manager = ComponentManager::new(config)?;
    let load = manager.load_components()?;
    let refresh = manager.refresh()?;

    println!("components root: {}", manager.config().components_root.display());
    for record in manager.modules() {
        println!("  {:<24} {}", record.name(), record.context().state());
    }
    for (module, reason) in &load.skipped {
        println!("  {:<24} skipped: {}", module, reason);
    }
    for (module, reason) in &refresh.failed {
        println!("  {:<24} failed: {}", module, reason);
    }

    println!("exported names:");
    for name in manager.get_all_exported_names() {
        println!("  {}", name);
    }

    let stats = manager.load_stats();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        for module in &stats.modules {
            println!(
                "  {:<24} declared={} singletons={} define={:?} refresh={:?} bare={}",
                module.module,
                module.context.declared,
                module.context.singletons,
                module.context.define_time.unwrap_or_default(),
                module.context.refresh_time.unwrap_or_default(),
                module.context.bare_activated
            );
        }
    }

    if args.wait && policy == ShutdownPolicy::CloseOnExit {
        manager.close_on_signal().await;
    } else {
        manager.close();
    }
    Ok(())
}
