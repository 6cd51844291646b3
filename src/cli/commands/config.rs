//! `widgetsmith config` command - Configuration management

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::helpers::open_project;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::audit::AuditLevel;
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective configuration values
    Show {
        /// Show only this key's value
        key: Option<String>,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (see `widgetsmith config keys`)
        key: String,

        /// Value to set
        value: String,

        /// Set in global (user) config instead of project config
        #[arg(long, short = 'g')]
        global: bool,
    },

    /// Unset (remove) a configuration value
    Unset {
        /// Configuration key to remove
        key: String,

        /// Remove from global (user) config instead of project config
        #[arg(long, short = 'g')]
        global: bool,
    },

    /// Show paths to configuration files
    Path,

    /// List all available configuration keys
    Keys,
}

/// Valid configuration keys
const VALID_KEYS: &[(&str, &str)] = &[
    ("max_repair_attempts", "Repair rounds after the first generation (default 3)"),
    ("default_audit_level", "Audit level when none is given: fast or full"),
    ("audit_reuse", "Carry findings for unchanged lines into re-audits (true/false)"),
];

pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show { key } => run_show(key, global),
        ConfigCommands::Set { key, value, global: in_global } => run_set(&key, &value, in_global, global),
        ConfigCommands::Unset { key, global: in_global } => run_unset(&key, in_global, global),
        ConfigCommands::Path => run_path(global),
        ConfigCommands::Keys => run_keys(),
    }
}

fn run_show(key: Option<String>, global: &GlobalOpts) -> Result<()> {
    let project = open_project(global).ok();
    let config = Config::load_for(project.as_ref());

    if let Some(key) = key {
        let value = get_config_value(&config, &key)
            .ok_or_else(|| miette::miette!("Unknown config key '{}'", key))?;
        println!("{}", value);
        return Ok(());
    }

    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&effective(&config)).into_diagnostic()?);
            return Ok(());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&effective(&config)).into_diagnostic()?);
            return Ok(());
        }
        OutputFormat::Tsv => {
            for (key, _) in VALID_KEYS {
                let value = get_config_value(&config, key).unwrap_or_default();
                println!("{}\t{}", key, value);
            }
            return Ok(());
        }
        OutputFormat::Auto => {}
    }

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();
    for (key, _) in VALID_KEYS {
        let value = get_config_value(&config, key).unwrap_or_default();
        println!("  {}: {}", style(key).cyan(), style(value).yellow());
    }

    println!();
    println!("{}", style("Config Sources (in priority order):").dim());
    println!("  1. Environment variables (WIDGETSMITH_MAX_REPAIRS, WIDGETSMITH_AUDIT_LEVEL, WIDGETSMITH_AUDIT_REUSE)");
    match &project {
        Some(project) => println!("  2. Project config ({})", project.config_file().display()),
        None => println!("  2. Project config (not in a widgetsmith project)"),
    }
    match Config::global_config_path() {
        Some(path) => println!("  3. Global config ({})", path.display()),
        None => println!("  3. Global config (unavailable)"),
    }

    Ok(())
}

/// Config with every default filled in
fn effective(config: &Config) -> Config {
    Config {
        max_repair_attempts: Some(config.max_repair_attempts()),
        default_audit_level: Some(config.default_audit_level()),
        audit_reuse: Some(config.audit_reuse()),
    }
}

fn run_set(key: &str, value: &str, in_global: bool, global: &GlobalOpts) -> Result<()> {
    let typed = parse_config_value(key, value)?;
    let config_path = config_path(in_global, global)?;

    let mut config_map = read_mapping(&config_path)?;
    if let serde_yml::Value::Mapping(map) = &mut config_map {
        map.insert(serde_yml::Value::String(key.to_string()), typed);
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).into_diagnostic()?;
    }
    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    fs::write(&config_path, yaml).into_diagnostic()?;

    let scope = if in_global { "global" } else { "project" };
    println!(
        "{} Set {} {} {} in {} config",
        style("✓").green(),
        style(key).cyan(),
        style("→").dim(),
        style(value).yellow(),
        scope
    );

    Ok(())
}

fn run_unset(key: &str, in_global: bool, global: &GlobalOpts) -> Result<()> {
    let config_path = config_path(in_global, global)?;
    if !config_path.exists() {
        return Err(miette::miette!(
            "Config file does not exist: {}",
            config_path.display()
        ));
    }

    let mut config_map = read_mapping(&config_path)?;
    let removed = match &mut config_map {
        serde_yml::Value::Mapping(map) => map
            .remove(&serde_yml::Value::String(key.to_string()))
            .is_some(),
        _ => false,
    };
    if !removed {
        return Err(miette::miette!("Key '{}' not found in config", key));
    }

    let yaml = serde_yml::to_string(&config_map).into_diagnostic()?;
    fs::write(&config_path, yaml).into_diagnostic()?;

    let scope = if in_global { "global" } else { "project" };
    println!(
        "{} Removed {} from {} config",
        style("✓").green(),
        style(key).cyan(),
        scope
    );

    Ok(())
}

fn run_path(global: &GlobalOpts) -> Result<()> {
    println!("{}", style("Configuration file paths:").bold());
    println!();

    match Config::global_config_path() {
        Some(path) => {
            println!("  {} {}", style("Global:").cyan(), path.display());
            print_exists(path.exists(), 9);
        }
        None => println!("  {} {}", style("Global:").cyan(), style("(unavailable)").dim()),
    }

    println!();
    match open_project(global) {
        Ok(project) => {
            let path = project.config_file();
            println!("  {} {}", style("Project:").cyan(), path.display());
            print_exists(path.exists(), 10);
        }
        Err(_) => println!(
            "  {} {}",
            style("Project:").cyan(),
            style("(not in a widgetsmith project)").dim()
        ),
    }

    Ok(())
}

fn print_exists(exists: bool, indent: usize) {
    let label = if exists {
        style("(exists)").green()
    } else {
        style("(not created)").dim()
    };
    println!("{}{}", " ".repeat(indent), label);
}

fn run_keys() -> Result<()> {
    println!("{}", style("Available configuration keys:").bold());
    println!();

    for (key, description) in VALID_KEYS {
        println!("  {:<20} {}", style(key).cyan(), style(description).dim());
    }

    println!();
    println!(
        "{}",
        style("Use 'widgetsmith config set <key> <value>' to set a value.").dim()
    );

    Ok(())
}

fn config_path(in_global: bool, global: &GlobalOpts) -> Result<PathBuf> {
    if in_global {
        Config::global_config_path()
            .ok_or_else(|| miette::miette!("Could not determine global config directory"))
    } else {
        Ok(open_project(global)?.config_file())
    }
}

fn read_mapping(path: &Path) -> Result<serde_yml::Value> {
    if !path.exists() {
        return Ok(serde_yml::Value::Mapping(Default::default()));
    }
    let content = fs::read_to_string(path).into_diagnostic()?;
    let parsed: serde_yml::Value =
        serde_yml::from_str(&content).unwrap_or(serde_yml::Value::Mapping(Default::default()));
    // The default project config is all comments and parses as null
    if parsed.is_null() {
        Ok(serde_yml::Value::Mapping(Default::default()))
    } else {
        Ok(parsed)
    }
}

/// Check a value against its key's type and convert it to YAML
fn parse_config_value(key: &str, value: &str) -> Result<serde_yml::Value> {
    match key {
        "max_repair_attempts" => value
            .parse::<u32>()
            .map(|n| serde_yml::Value::Number(n.into()))
            .map_err(|_| miette::miette!("max_repair_attempts must be a non-negative integer")),
        "default_audit_level" => value
            .parse::<AuditLevel>()
            .map(|level| serde_yml::Value::String(level.to_string()))
            .map_err(|e| miette::miette!("{}", e)),
        "audit_reuse" => value
            .parse::<bool>()
            .map(serde_yml::Value::Bool)
            .map_err(|_| miette::miette!("audit_reuse must be true or false")),
        _ => Err(miette::miette!(
            "Unknown config key '{}'. Run 'widgetsmith config keys' to list keys",
            key
        )),
    }
}

fn get_config_value(config: &Config, key: &str) -> Option<String> {
    match key {
        "max_repair_attempts" => Some(config.max_repair_attempts().to_string()),
        "default_audit_level" => Some(config.default_audit_level().to_string()),
        "audit_reuse" => Some(config.audit_reuse().to_string()),
        _ => None,
    }
}
