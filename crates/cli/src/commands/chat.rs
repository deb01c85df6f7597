//! `hemobank chat`: Interactive or single-message patient intake.

use hemobank_assistant::{IntakeDesk, IntentClassifier, PatientProfile, Session};
use hemobank_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CliResult, Runtime, today};

pub async fn run(profile: PatientProfile, message: Option<String>) -> CliResult {
    let rt = Runtime::load().await?;
    let config = &rt.config;

    if !config.has_api_key() && config.classifier.provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured for '{}'!", config.classifier.provider);
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GEMINI_API_KEY   = '...'   (default provider)");
        eprintln!("    OPENAI_API_KEY   = 'sk-...'");
        eprintln!("    HEMOBANK_API_KEY = '...'   (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = hemobank_providers::build_from_config(config);
    let provider = router.default().ok_or("No default provider configured")?;
    let classifier = IntentClassifier::from_config(provider, &config.classifier);
    let desk = IntakeDesk::new(classifier, rt.store.clone(), rt.locks.clone(), rt.events.clone())
        .with_refill(config.scheduler.refill)
        .with_default_units(config.defaults.required_units);

    let mut session = Session::with_max_history(profile, config.classifier.max_history);

    if let Some(msg) = message {
        let reply = desk.respond(&mut session, &msg, today()).await?;
        println!("{}", reply.message);
        return Ok(());
    }

    println!();
    println!("  HemoBank Intake — Interactive Mode");
    println!("  ==================================");
    println!("  Provider:  {}", config.classifier.provider);
    println!("  Model:     {}", config.classifier.model);
    if let Some(city) = &session.profile.city {
        println!("  City:      {city}");
    }
    if let Some(blood_type) = session.profile.blood_type {
        println!("  Blood:     {blood_type}");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        match desk.respond(&mut session, line, today()).await {
            Ok(reply) => {
                println!();
                println!("  HemoBank [{}] > {}", reply.intent.label(), reply.message);
                println!();
            }
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Take care.");
    println!();
    Ok(())
}
