//! Checkpoint cadence and progress bookkeeping.

use proptest::prelude::*;
use quarry::session::{checkpoint_due, SessionProgress};

/// Driving the rule record by record saves exactly every `interval` records
#[test]
fn test_checkpoint_cadence_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(1u64..500, 0u64..50), |(target, interval)| {
            let mut last = 0;
            let mut saves = Vec::new();
            for completed in 1..=target {
                if checkpoint_due(completed, last, interval) {
                    saves.push(completed);
                    last = completed;
                }
            }
            let step = interval.max(1);
            prop_assert_eq!(saves.len() as u64, target / step);
            for (i, at) in saves.iter().enumerate() {
                prop_assert_eq!(*at, (i as u64 + 1) * step);
            }
            // Records at risk on a crash never exceed one interval
            prop_assert!(target - last < step);
            Ok(())
        })
        .unwrap();
}

/// A failed save is retried on the next record rather than waiting another interval
#[test]
fn test_failed_save_is_retried_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(1u64..20, 1u64..100), |(interval, completed)| {
            let last = completed.saturating_sub(interval);
            if completed >= interval {
                prop_assert!(checkpoint_due(completed, last, interval));
                // Save failed, so `last` is unchanged and the next record is due too
                prop_assert!(checkpoint_due(completed + 1, last, interval));
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_progress_bounds_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(0u64..1000, 0u64..1000), |(target, completed)| {
            let completed = completed.min(target);
            let mut progress = SessionProgress::new("batch_prop", target);
            progress.completed_count = completed;
            let pct = progress.percent_complete();
            prop_assert!((0.0..=100.0).contains(&pct));
            prop_assert_eq!(progress.remaining(), target - completed);
            prop_assert_eq!(progress.is_target_reached(), completed == target);
            Ok(())
        })
        .unwrap();
}
