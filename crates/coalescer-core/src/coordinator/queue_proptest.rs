//! Property-based tests for batch partitioning.

use proptest::prelude::*;

use super::options::BatchOptions;
use super::queue::{Batch, BatchKind, PendingQueue};

/// Strategy to generate an arrival sequence of loads and saves
fn arrivals_strategy() -> impl Strategy<Value = Vec<BatchKind>> {
    prop::collection::vec(prop_oneof![Just(BatchKind::Load), Just(BatchKind::Save)], 0..64)
}

fn options_with(max_batch_size: Option<usize>) -> BatchOptions<u32> {
    match max_batch_size {
        Some(max) => BatchOptions::default().with_max_batch_size(max),
        None => BatchOptions::default(),
    }
}

/// Drains the queue the way the flush loop does; items are arrival indices.
fn drain(arrivals: &[BatchKind], max_batch_size: Option<usize>) -> Vec<(BatchKind, Vec<usize>)> {
    let options = options_with(max_batch_size);
    let mut queue = PendingQueue::new();
    for (seq, kind) in arrivals.iter().enumerate() {
        match kind {
            BatchKind::Load => queue.push_load(seq),
            BatchKind::Save => queue.push_save(seq),
        }
    }

    std::iter::from_fn(|| queue.take_batch(options.effective_batch_size(queue.len())))
        .map(|batch| match batch {
            Batch::Load(items) => (BatchKind::Load, items),
            Batch::Save(items) => (BatchKind::Save, items),
        })
        .collect()
}

proptest! {
    #[test]
    fn test_batches_preserve_arrival_order(
        arrivals in arrivals_strategy(),
        max in prop::option::of(1usize..10)
    ) {
        let flattened: Vec<usize> = drain(&arrivals, max)
            .into_iter()
            .flat_map(|(_, items)| items)
            .collect();
        prop_assert_eq!(flattened, (0..arrivals.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_batches_never_mix_kinds_or_exceed_cap(
        arrivals in arrivals_strategy(),
        max in prop::option::of(1usize..10)
    ) {
        for (kind, items) in drain(&arrivals, max) {
            prop_assert!(!items.is_empty());
            prop_assert!(items.iter().all(|seq| arrivals[*seq] == kind));
            if let Some(max) = max {
                prop_assert!(items.len() <= max);
            }
        }
    }

    #[test]
    fn test_batches_are_maximal(
        arrivals in arrivals_strategy(),
        max in prop::option::of(1usize..10)
    ) {
        // A batch ends only at the cap, at a kind change, or at the end of the queue.
        let batches = drain(&arrivals, max);
        for pair in batches.windows(2) {
            let ((kind, items), (next_kind, _)) = (&pair[0], &pair[1]);
            let hit_cap = max.map_or(false, |max| items.len() == max);
            prop_assert!(hit_cap || kind != next_kind);
        }
    }

    #[test]
    fn test_homogeneous_queue_splits_into_ceil_n_over_m(n in 1usize..200, m in 1usize..20) {
        let arrivals = vec![BatchKind::Load; n];

        let batches = drain(&arrivals, Some(m));

        prop_assert_eq!(batches.len(), (n + m - 1) / m);
    }
}
