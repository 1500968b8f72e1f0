//! storage-gate - blocks an application until the OS storage grant is held.
//!
//! Usage:
//!   `storage-gate run --tier 33`          Interactive demo against a simulated OS
//!   `storage-gate select-flow --tier 29`  Print the grant flow for a platform tier
//!   `storage-gate config`                 Print the resolved configuration

use std::env;
use std::fs::{self, OpenOptions};
use std::sync::Mutex;
use storage_gate::config::{GateConfig, config_path};
use storage_gate::flow::FlowSelection;
use storage_gate::models::PlatformTier;
use storage_gate::tui::{DemoOptions, run_demo};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "STORAGE_GATE_LOG";
const DEFAULT_TIER: u32 = 33;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("storage-gate {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        print_main_help();
        return;
    }

    let config = match GateConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    match args[1].as_str() {
        "run" => handle_run_subcommand(&args[2..], config),
        "select-flow" => {
            init_stderr_logging(&config);
            handle_select_flow_subcommand(&args[2..]);
        }
        "config" => {
            init_stderr_logging(&config);
            handle_config_subcommand(&config);
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_main_help();
            std::process::exit(1);
        }
    }
}

fn handle_run_subcommand(args: &[String], config: GateConfig) {
    let tier = parse_tier(args).unwrap_or(PlatformTier(DEFAULT_TIER));
    let granted = args.iter().any(|a| a == "--granted");

    // stderr belongs to the terminal UI while it runs
    init_file_logging(&config);

    let options = DemoOptions {
        tier,
        granted,
        config,
    };
    match run_demo(&options) {
        Ok(Some(code)) => std::process::exit(code),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error running demo: {e}");
            std::process::exit(1);
        }
    }
}

fn handle_select_flow_subcommand(args: &[String]) {
    let Some(tier) = parse_tier(args) else {
        eprintln!("Usage: storage-gate select-flow --tier <N>");
        std::process::exit(1);
    };

    let selection = FlowSelection::for_tier(tier);
    match serde_json::to_string_pretty(&selection) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

fn handle_config_subcommand(config: &GateConfig) {
    match config_path() {
        Some(path) if path.exists() => eprintln!("# {}", path.display()),
        Some(path) => eprintln!("# {} (not found, defaults)", path.display()),
        None => eprintln!("# no config directory, defaults"),
    }
    print!("{}", config.to_toml());
}

/// `--tier N` or `--tier=N`
fn parse_tier(args: &[String]) -> Option<PlatformTier> {
    let value = args.iter().enumerate().find_map(|(i, arg)| {
        if let Some(v) = arg.strip_prefix("--tier=") {
            Some(v.to_string())
        } else if arg == "--tier" {
            args.get(i + 1).cloned()
        } else {
            None
        }
    })?;

    match value.parse::<u32>() {
        Ok(tier) => Some(PlatformTier(tier)),
        Err(_) => {
            eprintln!("Invalid tier: {value}");
            std::process::exit(1);
        }
    }
}

fn env_filter(config: &GateConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn init_stderr_logging(config: &GateConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .init();
}

fn init_file_logging(config: &GateConfig) {
    let dir = dirs::cache_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("/tmp"))
        .join("storage-gate");
    if fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("storage-gate.log"))
    else {
        return;
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
}

fn print_main_help() {
    eprintln!("storage-gate - Storage access gate");
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("  storage-gate run [--tier N] [--granted]  Interactive demo on a simulated OS");
    eprintln!("  storage-gate select-flow --tier N       Show which grant flow a tier uses");
    eprintln!("  storage-gate config                     Print the resolved configuration");
    eprintln!("  storage-gate --help                     Show this help");
    eprintln!("  storage-gate --version                  Show version");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("  STORAGE_GATE_CONFIG  Config file (default <config_dir>/storage-gate/config.toml)");
    eprintln!("  STORAGE_GATE_LOG     Log filter, e.g. storage_gate=debug");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("  storage-gate run --tier 28              # Runtime permission prompt");
    eprintln!("  storage-gate run --tier 33              # All-files settings screen");
    eprintln!("  storage-gate select-flow --tier 30");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_tier_forms() {
        assert_eq!(parse_tier(&args(&["--tier", "28"])), Some(PlatformTier(28)));
        assert_eq!(parse_tier(&args(&["--granted", "--tier=31"])), Some(PlatformTier(31)));
        assert_eq!(parse_tier(&args(&["--granted"])), None);
        assert_eq!(parse_tier(&args(&["--tier"])), None);
    }
}
