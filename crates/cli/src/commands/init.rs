//! `notegraph init`: First-time setup.

use notegraph_config::AppConfig;
use std::path::{Path, PathBuf};

/// What `init` did with the config file.
#[derive(Debug, PartialEq, Eq)]
pub enum InitOutcome {
    Created(PathBuf),
    AlreadyExists(PathBuf),
}

/// Create `dir` if needed and write a default `config.toml` into it.
///
/// An existing config file is never overwritten.
pub fn write_default_config(dir: &Path) -> std::io::Result<InitOutcome> {
    std::fs::create_dir_all(dir)?;
    let config_path = dir.join("config.toml");
    if config_path.exists() {
        return Ok(InitOutcome::AlreadyExists(config_path));
    }
    std::fs::write(&config_path, AppConfig::default_toml())?;
    Ok(InitOutcome::Created(config_path))
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("notegraph setup");
    println!("===============\n");

    match write_default_config(&AppConfig::config_dir())? {
        InitOutcome::Created(path) => {
            println!("Created config.toml at: {}", path.display());
            println!("\nNext steps:");
            println!("   1. Edit {} and add your API key", path.display());
            println!("      (or set NOTEGRAPH_API_KEY / OPENROUTER_API_KEY)");
            println!("   2. Run: notegraph chat -m \"hello\"");
            println!("   3. Or start the API: notegraph serve\n");
        }
        InitOutcome::AlreadyExists(path) => {
            println!("Config already exists at: {}", path.display());
            println!("Edit it manually or delete it and re-run init.\n");
        }
    }

    Ok(())
}
