//! `askgate onboard` — First-time setup.

use askgate_config::AppConfig;
use std::path::Path;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_path();

    println!("askgate — First-Time Setup");
    println!("==========================\n");

    if write_default_config(&config_path)? {
        println!("✅ Created config at: {}", config_path.display());
        println!("\nNext steps:");
        println!("   1. Set the collaborator URLs in {}", config_path.display());
        println!("   2. Export ASKGATE_SERVICE_ACCOUNT_ID, ASKGATE_KEY_ID, ASKGATE_SIGNING_KEY");
        println!("      and ASKGATE_FOLDER_ID (or ASKGATE_API_KEY for the openai backend)");
        println!("   3. Run: askgate doctor");
        println!("   4. Run: askgate gateway\n");
    } else {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run onboard.\n");
    }

    Ok(())
}

/// Write the default config to `path` unless a file is already there.
/// Returns whether a file was written.
fn write_default_config(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
