//! `hemobank onboard`: First-time setup.

use hemobank_config::AppConfig;

use super::CliResult;

pub async fn run() -> CliResult {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("HemoBank — First-Time Setup");
    println!("===========================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("  Created config.toml at: {}", config_path.display());
    println!("\n  Next steps:");
    println!("   1. Set GEMINI_API_KEY (or add api_key to {})", config_path.display());
    println!("   2. Register stock:   hemobank donate --city Pune --blood-type O+ --units 4");
    println!("   3. Register people:  hemobank receiver register Meera --city Pune --blood-type O+ --due 2026-01-10");
    println!("   4. Run a cycle:      hemobank assign\n");

    Ok(())
}
