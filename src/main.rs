//! places-frecency - Frecency maintenance for a history database
//!
//! Usage: `places-frecency <database> [status|recalculate|decay] [--json]`

use std::env;
use std::path::PathBuf;
use std::process;

use places_frecency::{FrecencyRecalculator, NAME, PlacesStore, RecalculatorConfig, VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Recalculate,
    Decay,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let json = args.iter().any(|a| a == "--json");
    let positional: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();

    let Some(db_path) = positional.first() else {
        print_usage();
        process::exit(2);
    };
    let command = match positional.get(1).map(|s| s.as_str()) {
        None | Some("status") => Command::Status,
        Some("recalculate") => Command::Recalculate,
        Some("decay") => Command::Decay,
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            process::exit(2);
        }
    };

    if let Err(e) = run(PathBuf::from(db_path.as_str()), command, json).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(db_path: PathBuf, command: Command, json: bool) -> places_frecency::Result<()> {
    let store = PlacesStore::open(&db_path)?;
    let recalculator = FrecencyRecalculator::new(store, RecalculatorConfig::from_env());

    let mut recalculated = 0;
    let mut decayed = 0;
    match command {
        Command::Status => {}
        Command::Recalculate => {
            recalculated = recalculator.recalculate_any_outdated_frecencies().await?;
        }
        Command::Decay => {
            decayed = recalculator.decay().await?;
            recalculated = recalculator.recalculate_any_outdated_frecencies().await?;
        }
    }

    let store = recalculator.store();
    let (stale_places, stale_origins) = store.outdated_counts()?;
    let threshold = store.origin_frecency_threshold()?;
    let chunks = recalculator.histogram().snapshot();

    if json {
        let report = serde_json::json!({
            "database": db_path.display().to_string(),
            "stale_places": stale_places,
            "stale_origins": stale_origins,
            "recalculated_places": recalculated,
            "decayed_places": decayed,
            "chunks": chunks.count,
            "chunk_time_ms": chunks.sum,
            "origin_frecency_threshold": threshold,
        });
        println!("{}", report);
    } else {
        println!("{} v{}", NAME, VERSION);
        println!("Database:            {}", db_path.display());
        if command == Command::Decay {
            println!("Decayed pages:       {}", decayed);
        }
        if command != Command::Status {
            println!("Recalculated pages:  {} in {} chunks ({}ms)", recalculated, chunks.count, chunks.sum);
        }
        println!("Stale pages:         {}", stale_places);
        println!("Stale origins:       {}", stale_origins);
        println!("Autofill threshold:  {:.1}", threshold);
    }

    recalculator.shutdown();
    Ok(())
}

fn print_usage() {
    eprintln!("{} v{}", NAME, VERSION);
    eprintln!("Usage: places-frecency <database> [status|recalculate|decay] [--json]");
}
