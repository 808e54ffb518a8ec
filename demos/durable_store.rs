//! Durable Store Example
//!
//! Shows that assignments survive a restart: the experiment definitions
//! live in a JSON file, assignments in a SQLite database, and a second
//! "process" sees exactly the variants the first one handed out.
//!
//! Run with: cargo run --example durable_store

use anyhow::Context;
use splitbench::actor::Actor;
use splitbench::events::TracingEventSink;
use splitbench::experiment::{Experiment, ExperimentStatus, Variant};
use splitbench::registry::ExperimentRegistry;
use splitbench::store::SqliteAssignmentStore;
use splitbench::Splitbench;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn open(dir: &Path) -> anyhow::Result<Splitbench<SqliteAssignmentStore, TracingEventSink>> {
    let registry = ExperimentRegistry::load_file(dir.join("experiments.json"))
        .context("loading experiment definitions")?;
    let store = SqliteAssignmentStore::open(dir.join("assignments.db"))
        .context("opening assignment store")?;
    Ok(Splitbench::builder(Arc::new(store), Arc::new(TracingEventSink))
        .registry(Arc::new(registry))
        .build()?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "splitbench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Splitbench Durable Store ===\n");

    let dir = std::env::temp_dir().join(format!("splitbench-demo-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;

    // Definitions are authored once and saved
    let registry = ExperimentRegistry::new();
    registry.create(
        Experiment::builder("pricing-page", "Annual plan highlight")
            .variant(Variant::new("control", 34.0))
            .variant(Variant::new("badge", 33.0))
            .variant(Variant::new("banner", 33.0))
            .primary_metric("subscribe")
            .build(),
    )?;
    registry.set_status("pricing-page", ExperimentStatus::Running)?;
    registry.save_file(dir.join("experiments.json"))?;
    println!("Definitions written to {}", dir.display());

    let actors: Vec<Actor> = (0..5).map(|i| Actor::new(format!("user-{i}"))).collect();

    println!("\nFirst run:");
    let mut first = Vec::new();
    {
        let service = open(&dir)?;
        for actor in &actors {
            let variant = service.get_variant("pricing-page", actor).await?;
            let id = variant.map(|v| v.id().to_string());
            println!("   {} -> {:?}", actor.key(), id);
            first.push(id);
        }
        service
            .track_conversion("pricing-page", &actors[0], "subscribe", Some(99.0))
            .await?;
    }

    println!("\nAfter restart:");
    let service = open(&dir)?;
    for (actor, expected) in actors.iter().zip(&first) {
        let id = service
            .get_variant("pricing-page", actor)
            .await?
            .map(|v| v.id().to_string());
        println!("   {} -> {:?}", actor.key(), id);
        anyhow::ensure!(&id == expected, "variant changed for {}", actor.key());
    }

    let results = service.get_results("pricing-page").await?;
    println!(
        "\nParticipants: {}, conversions: {}",
        results.total_participants(),
        results.variants.iter().map(|v| v.conversions).sum::<u64>()
    );

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
