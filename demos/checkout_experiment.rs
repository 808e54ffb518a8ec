//! Checkout Experiment Example
//!
//! Runs a simulated two-week A/B test on the checkout button label:
//! visitors arrive, get bucketed, some convert, and the results are read
//! back with a significance verdict.
//!
//! Run with: RUST_LOG=splitbench=info cargo run --example checkout_experiment

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splitbench::actor::{ActorResolver, HeaderActorResolver, RequestContext};
use splitbench::config::AnalysisConfig;
use splitbench::events::MemoryEventSink;
use splitbench::experiment::{
    AudienceConditions, Experiment, ExperimentMetrics, ExperimentStatus, TargetAudience, Variant,
};
use splitbench::store::MemoryAssignmentStore;
use splitbench::Splitbench;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VISITORS: usize = 20_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "splitbench=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Splitbench Checkout Experiment ===\n");

    let sink = Arc::new(MemoryEventSink::new());
    let service = Splitbench::builder(Arc::new(MemoryAssignmentStore::new()), Arc::clone(&sink))
        .analysis(AnalysisConfig::from_env().context("reading analysis config")?)
        .build()?;

    // -------------------------------------------------------------------------
    // 1. Define and launch the experiment
    // -------------------------------------------------------------------------
    println!("1. Creating experiment...");

    service.create_experiment(
        Experiment::builder("checkout-label", "Checkout button label")
            .description("Does urgency in the label lift purchases?")
            .variant(Variant::new("control", 50.0).with_config("label", "Buy"))
            .variant(Variant::new("urgent", 50.0).with_config("label", "Buy now - 2 left"))
            .metrics(ExperimentMetrics::primary("purchase").with_secondary("add_to_cart"))
            .target_audience(
                TargetAudience::percentage(80.0)
                    .with_conditions(AudienceConditions::default().locations(["US", "CA", "GB"])),
            )
            .build(),
    )?;
    service.set_status("checkout-label", ExperimentStatus::Running)?;
    println!("   Active experiments: {}", service.list_active().len());

    // -------------------------------------------------------------------------
    // 2. Simulate traffic
    // -------------------------------------------------------------------------
    println!("\n2. Simulating {VISITORS} visitors...");

    let mut rng = StdRng::seed_from_u64(7);
    let regions = ["US", "CA", "GB", "DE"];
    let user_agents = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile",
        "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)",
    ];

    let mut shown = 0_usize;
    for i in 0..VISITORS {
        let context = RequestContext {
            user_id: (i % 3 == 0).then(|| format!("user-{i}")),
            session_id: Some(format!("session-{i}")),
            user_agent: Some(user_agents[rng.gen_range(0..user_agents.len())].to_string()),
            region: Some(regions[rng.gen_range(0..regions.len())].to_string()),
            first_visit: rng.gen_bool(0.3),
        };
        let Some(actor) = HeaderActorResolver.resolve(&context) else {
            continue;
        };

        let Some(variant) = service.get_variant("checkout-label", &actor).await? else {
            continue;
        };
        shown += 1;

        let purchase_rate = if variant.id() == "urgent" { 0.12 } else { 0.10 };
        if rng.gen_bool(0.25) {
            service
                .track_conversion("checkout-label", &actor, "add_to_cart", None)
                .await?;
        }
        if rng.gen_bool(purchase_rate) {
            let order_value = rng.gen_range(20.0..120.0);
            service
                .track_conversion("checkout-label", &actor, "purchase", Some(order_value))
                .await?;
        }
    }
    println!("   In experiment: {shown}");
    println!("   Exposure events: {}", sink.exposures().len());

    // -------------------------------------------------------------------------
    // 3. Read results
    // -------------------------------------------------------------------------
    println!("\n3. Results...");

    service.set_status("checkout-label", ExperimentStatus::Completed)?;
    let results = service.get_results("checkout-label").await?;
    for arm in &results.variants {
        println!(
            "   {:<8} participants={:<6} purchases={:<5} rate={:.4} revenue={:>9.2} confidence={} lift={}",
            arm.variant_id,
            arm.participants,
            arm.conversions,
            arm.conversion_rate,
            arm.total_value,
            arm.confidence.map_or_else(|| "-".to_string(), |c| format!("{c:.4}")),
            arm.lift.map_or_else(|| "-".to_string(), |l| format!("{:+.1}%", l * 100.0)),
        );
    }
    match &results.winning_variant_id {
        Some(winner) => println!("\n   Winner: {winner}"),
        None => println!("\n   No statistically significant winner"),
    }

    println!("\n{}", serde_json::to_string_pretty(&*results)?);
    Ok(())
}
