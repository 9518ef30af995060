//! Text-mode dungeon crawler.
//!
//! ```bash
//! cargo run -p dungeon -- --prompt "a goblin-infested dungeon"
//! cargo run -p dungeon -- --resume sess_0123abcd
//! ```
//!
//! Settings come from `DUNGEON_*` environment variables or a `.env` file.

mod headless;

use anyhow::Context;
use dungeon_core::{EngineConfig, GameMaster};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dungeon=info,dungeon_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let config = EngineConfig::from_env().context("Invalid DUNGEON_* configuration")?;
    tracing::info!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let gm = GameMaster::open(config)
        .await
        .context("Failed to open game data")?;

    headless::run_headless(&gm, headless::parse_config_from_args(&args)).await?;
    Ok(())
}

fn print_help() {
    println!("dungeon - text-mode dungeon crawler");
    println!();
    println!("USAGE:");
    println!("  dungeon [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  -p, --prompt <TEXT>      Campaign prompt for a new session (forest, dungeon, crypt)");
    println!("  -c, --character <ID>     Character taking the turns [default: hero]");
    println!("      --campaign <ID>      Campaign id recorded in the logs");
    println!("  -r, --resume <SESSION>   Continue a saved session");
    println!("  -h, --help               Print help");
    println!();
    println!("ENVIRONMENT:");
    println!("  DUNGEON_DATA_DIR                 Data root [default: data]");
    println!("  DUNGEON_PLAYER_LEVEL             Party level for encounter budgets [default: 1]");
    println!("  DUNGEON_WEAPON_MODIFIER          Attack roll bonus [default: 5]");
    println!("  DUNGEON_GENERATION_TIMEOUT_SECS  Asset generation timeout [default: 60]");
    println!("  DUNGEON_CONTENT_TABLES           JSON monster/loot tables replacing the built-ins");
    println!("  RUST_LOG                         Log filter");
}
