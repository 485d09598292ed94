//! Configuration view and validation commands: `issueboard config`.

use std::path::Path;

use anyhow::Result;

use issueboard::config::{BoardConfig, BoardToml, CONFIG_DIR, CONFIG_FILE};

use super::super::ConfigCommands;

fn print_toml(toml: &BoardToml) {
    println!("[board]");
    println!("  poll_interval_ms = {}", toml.board.poll_interval_ms);
    println!("  undo_window_ms = {}", toml.board.undo_window_ms);
    println!("  polling = {}", toml.board.polling);
    println!();
    println!("[backend]");
    println!("  failure_rate = {}", toml.backend.failure_rate);
    let latency = &toml.backend.latency;
    println!(
        "  latency = list {} ms, get {} ms, move {} ms, undo {} ms, update {} ms",
        latency.list.as_millis(),
        latency.get.as_millis(),
        latency.move_issue.as_millis(),
        latency.undo.as_millis(),
        latency.update.as_millis()
    );
    println!();
    println!("[user]");
    println!("  id = \"{}\"", toml.user.id);
    println!("  name = \"{}\"", toml.user.name);
    println!("  role = \"{}\"", toml.user.role);
    println!();
    println!("[server]");
    println!("  host = \"{}\"", toml.server.host);
    println!("  port = {}", toml.server.port);
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Issue Board Configuration");
            println!("=========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No board.toml found at {}", config_path.display());
                println!("Run 'issueboard config init' to create one.");
            }
            println!();

            println!("Effective values (with env overrides):");
            println!();
            let config = BoardConfig::new(project_dir.to_path_buf(), false)?;
            print_toml(&config.toml);
            println!("Recently viewed: {}", config.recent_dir()?.display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No board.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = BoardToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("board.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            BoardToml::default().save(&config_path)?;

            println!("Created board.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [board] poll_interval_ms, undo_window_ms");
            println!("  - [backend] failure_rate and per-call latency");
            println!("  - [user] name and role (admin or contributor)");
            println!();
        }
    }

    Ok(())
}
