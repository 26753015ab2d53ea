//! End-to-end experiment flow through the public engine API.

use campaign_core::types::{
    CreateTestGroupRequest, InteractionKind, NewVariant, TestGroupOptions, TestStatus, TestType,
};
use campaign_core::{CampaignError, ExperimentConfig};
use campaign_experiments::{AllocationPhase, ExperimentEngine};
use rand::rngs::StdRng;
use rand::SeedableRng;
use uuid::Uuid;

fn subject_test(engine: &ExperimentEngine, options: TestGroupOptions) -> campaign_core::types::TestGroup {
    engine
        .create_test_group(CreateTestGroupRequest {
            name: "Weekend promo".to_string(),
            description: "Subject line shoot-out".to_string(),
            test_type: TestType::Subject,
            variants: vec![
                NewVariant::new("A", "50% off today", "<p>Deal</p>"),
                NewVariant::new("B", "Save big now", "<p>Deal</p>"),
            ],
            options,
        })
        .unwrap()
}

fn record(engine: &ExperimentEngine, test_id: &Uuid, variant_id: &Uuid, sent: u64, opened: u64) {
    for i in 0..sent {
        engine
            .track_interaction(test_id, variant_id, InteractionKind::Sent)
            .unwrap();
        if i < opened {
            engine
                .track_interaction(test_id, variant_id, InteractionKind::Opened)
                .unwrap();
        }
    }
}

#[test]
fn test_inconclusive_subject_test() {
    let engine = ExperimentEngine::default();
    let group = subject_test(&engine, TestGroupOptions::default());
    let (a, b) = (group.variants[0].id, group.variants[1].id);
    assert!(engine.start_test(&group.id).unwrap());

    record(&engine, &group.id, &a, 60, 18);
    record(&engine, &group.id, &b, 60, 9);

    let running = engine.get_test_group(&group.id).unwrap();
    assert!((running.variants[0].open_rate - 0.30).abs() < 1e-12);
    assert!((running.variants[1].open_rate - 0.15).abs() < 1e-12);
    assert!((running.statistical_significance - 0.7262).abs() < 0.001);

    let mut rng = StdRng::seed_from_u64(2024);
    let mut a_hits = 0;
    let draws = 10_000;
    for _ in 0..draws {
        let sel = engine.select_variant_with(&group.id, &mut rng).unwrap();
        assert_eq!(sel.phase, AllocationPhase::Exploitation);
        assert_eq!(sel.leader_probability, Some(0.70));
        if sel.variant_id == a {
            a_hits += 1;
        }
    }
    let share = a_hits as f64 / draws as f64;
    assert!((share - 0.70).abs() < 0.02, "leader share {}", share);

    let completed = engine.complete_test(&group.id).unwrap();
    assert_eq!(completed.status, TestStatus::Completed);
    assert!(completed.winner.is_none());

    let analysis = engine.analyze(&group.id).unwrap();
    assert!(!analysis.is_significant);
    assert!(analysis.recommendations.iter().any(|r| r.contains("longer")));
}

#[test]
fn test_auto_completion_declares_winner() {
    let engine = ExperimentEngine::default();
    let group = subject_test(
        &engine,
        TestGroupOptions {
            audience_size: Some(800),
            ..Default::default()
        },
    );
    let (a, b) = (group.variants[0].id, group.variants[1].id);
    engine.start_test(&group.id).unwrap();

    record(&engine, &group.id, &b, 400, 80);
    record(&engine, &group.id, &a, 400, 200);

    let done = engine.get_test_group(&group.id).unwrap();
    assert_eq!(done.status, TestStatus::Completed);
    assert_eq!(done.winner, Some(a));
    assert_eq!(done.winning_reason.as_deref(), Some("Higher open rate (50.00%)"));

    // Completion is idempotent and stops allocation.
    let again = engine.complete_test(&group.id).unwrap();
    assert_eq!(again.completed_at, done.completed_at);
    assert!(engine.select_variant(&group.id).is_none());

    let analysis = engine.analyze(&group.id).unwrap();
    assert_eq!(analysis.winner, Some(a));
    assert!(analysis.insights.iter().any(|i| i.contains("Numbers")));
}

#[test]
fn test_structural_errors_leave_state_untouched() {
    let engine = ExperimentEngine::default();
    let err = engine
        .create_test_group(CreateTestGroupRequest {
            name: "Lonely".to_string(),
            description: String::new(),
            test_type: TestType::Content,
            variants: vec![NewVariant::new("Only", "Hi", "<p>Hi</p>")],
            options: TestGroupOptions::default(),
        })
        .unwrap_err();
    assert!(matches!(err, CampaignError::Validation(_)));
    assert!(engine.list_test_groups().is_empty());

    let group = subject_test(&engine, TestGroupOptions::default());
    let err = engine
        .track_interaction(&group.id, &Uuid::new_v4(), InteractionKind::Sent)
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(engine.get_test_group(&group.id).unwrap().total_sent(), 0);
}

#[test]
fn test_rates_stay_bounded() {
    let engine = ExperimentEngine::from_config(&ExperimentConfig::default());
    let group = subject_test(&engine, TestGroupOptions::default());
    engine.start_test(&group.id).unwrap();
    let a = group.variants[0].id;
    for kind in InteractionKind::ALL {
        let _ = engine.track_interaction(&group.id, &a, kind);
    }
    for _ in 0..3 {
        for kind in InteractionKind::ALL.iter().rev() {
            let _ = engine.track_interaction(&group.id, &a, *kind);
        }
    }
    let v = &engine.get_test_group(&group.id).unwrap().variants[0];
    for rate in [v.open_rate, v.click_rate, v.reply_rate, v.conversion_rate] {
        assert!((0.0..=1.0).contains(&rate));
    }
    for kind in InteractionKind::ALL {
        assert!(v.counter(kind) <= v.sent);
    }
}
