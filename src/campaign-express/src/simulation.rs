//! Simulated campaign: concurrent send workers, a lossy dispatcher, and
//! synthetic engagement drawn from each variant's true rate.

use crate::SimulateArgs;
use anyhow::{bail, Context};
use campaign_core::types::{
    CreateTestGroupRequest, InteractionKind, NewVariant, TestGroup, TestGroupOptions, TestType, Variant,
};
use campaign_core::ExperimentConfig;
use campaign_experiments::{DispatchFailure, ExperimentEngine, MessageDispatcher, TestAnalysis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Engagement beyond the primary event, as a share of the previous stage.
const CLICK_GIVEN_OPEN: f64 = 0.25;
const REPLY_GIVEN_OPEN: f64 = 0.05;
const CONVERT_GIVEN_CLICK: f64 = 0.20;

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub test_group: TestGroup,
    pub analysis: TestAnalysis,
    pub messages_sent: u64,
    pub dispatch_failures: u64,
}

struct SimulatedDispatcher {
    failure_rate: f64,
    seq: AtomicU64,
}

impl MessageDispatcher for SimulatedDispatcher {
    fn dispatch(&self, variant: &Variant, recipient: &str) -> Result<String, DispatchFailure> {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        if rand::thread_rng().gen::<f64>() < self.failure_rate {
            return Err(DispatchFailure {
                recipient: recipient.to_string(),
                reason: "simulated transient SMTP failure".to_string(),
                retryable: true,
            });
        }
        Ok(format!("sim-{}-{:06}", variant.name.to_ascii_lowercase(), n))
    }
}

fn parse_variants(specs: &[String]) -> anyhow::Result<Vec<(String, f64)>> {
    let mut parsed = Vec::with_capacity(specs.len());
    for spec in specs {
        let (name, rate) = spec
            .split_once(':')
            .with_context(|| format!("variant '{}' must look like NAME:RATE", spec))?;
        let rate: f64 = rate
            .trim()
            .parse()
            .with_context(|| format!("invalid rate in '{}'", spec))?;
        if !(0.0..=1.0).contains(&rate) {
            bail!("rate for '{}' must be within [0, 1]", name);
        }
        parsed.push((name.trim().to_string(), rate));
    }
    Ok(parsed)
}

/// Primary event for the test type, followed by the engagement it implies.
fn engagement_events<R: Rng>(test_type: TestType, true_rate: f64, rng: &mut R) -> Vec<InteractionKind> {
    let mut events = Vec::new();
    let (open_p, click_p) = match test_type {
        TestType::Content => ((true_rate / CLICK_GIVEN_OPEN).min(1.0), CLICK_GIVEN_OPEN),
        _ => (true_rate, CLICK_GIVEN_OPEN),
    };
    if rng.gen::<f64>() >= open_p {
        return events;
    }
    events.push(InteractionKind::Opened);
    if rng.gen::<f64>() < REPLY_GIVEN_OPEN {
        events.push(InteractionKind::Replied);
    }
    if rng.gen::<f64>() < click_p {
        events.push(InteractionKind::Clicked);
        if rng.gen::<f64>() < CONVERT_GIVEN_CLICK {
            events.push(InteractionKind::Converted);
        }
    }
    events
}

pub async fn run(config: &ExperimentConfig, args: SimulateArgs) -> anyhow::Result<SimulationReport> {
    let variants = parse_variants(&args.variants)?;
    let engine = Arc::new(ExperimentEngine::from_config(config));

    let group = engine.create_test_group(CreateTestGroupRequest {
        name: format!("Simulated {} test", args.test_type),
        description: "Generated by campaign-express simulate".to_string(),
        test_type: args.test_type,
        variants: variants
            .iter()
            .map(|(name, _)| NewVariant::new(name.clone(), name.clone(), format!("<p>{}</p>", name)))
            .collect(),
        options: TestGroupOptions {
            audience_size: args.audience,
            progressive_optimization: Some(!args.no_progressive),
            confidence_threshold: args.threshold,
            ..Default::default()
        },
    })?;
    let test_id = group.id;
    let audience = group.audience_size;
    engine.start_test(&test_id)?;

    let true_rates: Arc<HashMap<_, _>> = Arc::new(
        group
            .variants
            .iter()
            .zip(variants.iter())
            .map(|(v, (_, rate))| (v.id, *rate))
            .collect(),
    );
    let dispatcher = Arc::new(SimulatedDispatcher {
        failure_rate: args.failure_rate,
        seq: AtomicU64::new(0),
    });
    let next_recipient = Arc::new(AtomicU64::new(0));
    let failures = Arc::new(AtomicU64::new(0));

    info!(test_id = %test_id, audience, workers = args.workers, "Simulation started");

    let mut handles = Vec::with_capacity(args.workers);
    for worker in 0..args.workers.max(1) {
        let engine = engine.clone();
        let dispatcher = dispatcher.clone();
        let true_rates = true_rates.clone();
        let next_recipient = next_recipient.clone();
        let failures = failures.clone();
        let test_type = args.test_type;
        let seed = args.seed.wrapping_add(worker as u64);

        handles.push(tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(seed);
            loop {
                let n = next_recipient.fetch_add(1, Ordering::SeqCst);
                if n >= audience {
                    break;
                }
                let recipient = format!("recipient-{:06}@example.com", n);
                let Some(outcome) = engine.send_with(&test_id, &recipient, dispatcher.as_ref(), &mut rng)? else {
                    debug!(worker, "Test no longer accepting traffic");
                    break;
                };
                if outcome.failure.is_some() {
                    failures.fetch_add(1, Ordering::Relaxed);
                } else {
                    let rate = true_rates.get(&outcome.variant_id).copied().unwrap_or(0.0);
                    for kind in engagement_events(test_type, rate, &mut rng) {
                        engine.track_interaction(&test_id, &outcome.variant_id, kind)?;
                    }
                }
                tokio::task::yield_now().await;
            }
            Ok::<_, campaign_core::CampaignError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let completed = engine.complete_test(&test_id)?;
    let analysis = engine.analyze_results(&completed);
    let messages_sent = completed.total_sent();

    info!(
        test_id = %test_id,
        messages_sent,
        significance = completed.statistical_significance,
        winner = ?completed.winner,
        "Simulation finished"
    );

    Ok(SimulationReport {
        test_group: completed,
        analysis,
        messages_sent,
        dispatch_failures: failures.load(Ordering::Relaxed),
    })
}

pub fn print_report(report: &SimulationReport) {
    let group = &report.test_group;
    println!("=== {} ===", group.name);
    println!("Status:        {}", group.status);
    println!("Messages sent: {}", report.messages_sent);
    println!("Dispatch fail: {}", report.dispatch_failures);
    println!(
        "Significance:  {:.3} (threshold {:.2})",
        report.analysis.significance_level, group.confidence_threshold
    );
    println!();
    println!(
        "{:<12} {:>8} {:>10} {:>10} {:>10} {:>10}",
        "variant", "sent", "open", "click", "reply", "convert"
    );
    for v in &group.variants {
        println!(
            "{:<12} {:>8} {:>9.2}% {:>9.2}% {:>9.2}% {:>9.2}%",
            v.name,
            v.sent,
            v.open_rate * 100.0,
            v.click_rate * 100.0,
            v.reply_rate * 100.0,
            v.conversion_rate * 100.0
        );
    }
    println!();
    match (&group.winner, &group.winning_reason) {
        (Some(_), Some(reason)) => println!("Winner: {}", reason),
        _ => println!("Winner: none"),
    }
    println!("\nInsights:");
    for insight in &report.analysis.insights {
        println!("  - {}", insight);
    }
    println!("Recommendations:");
    for rec in &report.analysis.recommendations {
        println!("  - {}", rec);
    }
}
