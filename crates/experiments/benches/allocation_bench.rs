//! Benchmarks for variant allocation and interaction tracking.
//! Run with: cargo bench -p campaign-experiments

use campaign_core::types::{CreateTestGroupRequest, InteractionKind, NewVariant, TestGroupOptions, TestType};
use campaign_experiments::ExperimentEngine;

fn main() {
    let engine = ExperimentEngine::default();
    let group = engine
        .create_test_group(CreateTestGroupRequest {
            name: "bench".to_string(),
            description: String::new(),
            test_type: TestType::Subject,
            variants: (0..4)
                .map(|i| NewVariant::new(format!("V{}", i), format!("Subject {}", i), "<p>Body</p>"))
                .collect(),
            options: TestGroupOptions {
                audience_size: Some(u64::MAX),
                ..Default::default()
            },
        })
        .expect("Failed to create test group");
    engine.start_test(&group.id).expect("Failed to start test");

    // Warm up past the exploration floor
    for (i, variant) in group.variants.iter().enumerate() {
        for n in 0..200u64 {
            engine
                .track_interaction(&group.id, &variant.id, InteractionKind::Sent)
                .unwrap();
            if n % (i as u64 + 2) == 0 {
                engine
                    .track_interaction(&group.id, &variant.id, InteractionKind::Opened)
                    .unwrap();
            }
        }
    }

    let iterations = 100_000;
    let start = std::time::Instant::now();
    for _ in 0..iterations {
        let selection = engine.select_variant(&group.id).unwrap();
        engine
            .track_interaction(&group.id, &selection.variant_id, InteractionKind::Sent)
            .unwrap();
    }
    let elapsed = start.elapsed();
    let per_iter = elapsed / iterations;

    println!("=== Allocation Benchmark ===");
    println!("Iterations:  {}", iterations);
    println!("Total time:  {:?}", elapsed);
    println!("Per select+track: {:?}", per_iter);
    println!("Throughput:  {:.0} sends/sec", iterations as f64 / elapsed.as_secs_f64());
    println!("Variants:    {}", group.variants.len());
}
