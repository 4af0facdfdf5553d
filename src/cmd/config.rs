//! Configuration view and validation commands (`freelancie config`).

use anyhow::Result;
use std::path::Path;

use freelancie::config::{AppConfig, CONFIG_FILE};

use super::super::ConfigCommands;

fn print_effective(config: &AppConfig) {
    println!("environment = \"{}\"", config.environment);
    println!();
    println!("[server]");
    println!("  host = \"{}\"", config.server.host);
    println!("  port = {}", config.server.port);
    println!("  dev_mode = {}", config.server.dev_mode);
    match &config.server.static_dir {
        Some(dir) => println!("  static_dir = \"{}\"", dir.display()),
        None => println!("  static_dir = (none)"),
    }
    println!();
    println!("[database]");
    println!("  path = \"{}\"", config.database.path.display());
    println!();
    println!("[auth]");
    println!(
        "  jwt_secret = {}",
        if config.auth.jwt_secret.is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!("  token_ttl_hours = {}", config.auth.token_ttl_hours);
    println!("  reset_ttl_minutes = {}", config.auth.reset_ttl_minutes);
    println!(
        "  argon2 = m={} t={} p={}",
        config.auth.argon2.memory_kib, config.auth.argon2.iterations, config.auth.argon2.parallelism
    );
    println!();
    println!("[logging]");
    println!("  level = \"{}\"", config.logging.level);
    println!("  json = {}", config.logging.json);
    match &config.logging.dir {
        Some(dir) => println!("  dir = \"{}\"", dir.display()),
        None => println!("  dir = (none)"),
    }
    println!();
}

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE));

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Freelancie Configuration");
            println!("========================");
            println!();
            if path.exists() {
                println!("Config file: {}", path.display());
            } else {
                println!("No {} found, using defaults", path.display());
            }
            println!();

            let config = AppConfig::resolve(config_path)?;
            println!("Effective values (with env overrides):");
            print_effective(&config);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = AppConfig::resolve(config_path)?;
            let mut problems = config.validate();
            if let Err(e) = config.auth_config() {
                problems.insert(0, format!("error: {}", e));
            }

            if problems.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in problems {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init { force }) => {
            if path.exists() && !force {
                println!("{} already exists", path.display());
                println!("Use --force to overwrite it.");
                return Ok(());
            }

            AppConfig::default().save(path)?;

            println!("Created {}", path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, static_dir");
            println!("  - [database] path");
            println!("  - [auth] jwt_secret, token lifetimes, argon2 cost");
            println!("  - [logging] level, json, dir");
            println!();
        }
    }

    Ok(())
}
