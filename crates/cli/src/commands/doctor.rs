//! `askgate doctor` — Diagnose configuration and collaborator health.

use askgate_config::AppConfig;
use std::time::Duration;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("askgate doctor — System Diagnostics");
    println!("===================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file — using defaults (run `askgate onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config and re-run doctor.");
            return Ok(());
        }
    };

    if config.has_credentials() {
        println!("  ✅ Completion credentials configured ({})", config.completion.backend);
    } else {
        println!("  ❌ Completion credentials missing for backend \"{}\"", config.completion.backend);
        issues += 1;
    }
    if config.completion.backend == "foundation" && config.completion.folder_id.is_none() {
        println!("  ⚠️  completion.folder_id is not set (ASKGATE_FOLDER_ID)");
        issues += 1;
    }

    println!("\n  Collaborators:");
    println!("     issuer     {}", config.credentials.issuer_url);
    println!("     completion {}", config.completion.api_url);
    println!("     detector   {} ({})", config.safety.detector_url, config.safety.detector);
    println!("     moderator  {}", config.safety.moderator_url);
    println!("     retrieval  {}", config.retrieval.url);

    let pipeline = match askgate_pipeline::build_pipeline(&config).await {
        Ok(pipeline) => {
            println!("\n  ✅ Conversation store opened ({})", pipeline.store().name());
            pipeline
        }
        Err(e) => {
            println!("\n  ❌ Cannot build the pipeline: {e}");
            return Ok(());
        }
    };

    let health = pipeline.dependency_health(Duration::from_secs(2)).await;
    for (name, up) in [
        ("security", health.security),
        ("moderation", health.moderation),
        ("retrieval", health.retrieval),
    ] {
        if up {
            println!("  ✅ {name} reachable");
        } else {
            println!("  ❌ {name} unreachable");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
