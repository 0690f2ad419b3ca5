//! Class balancing by dropping whole records.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

use crate::ir::{AnnotationRecord, ClassIndex};

/// Order in which records are offered to the balancer.
///
/// A visited record is kept only if every class it contains is still below
/// the minimum; otherwise the whole record is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BalancePolicy {
    /// Visit records in load order, so earlier records win.
    KeepEarliest,
    /// Visit records in a seeded random permutation.
    Shuffled { seed: u64 },
}

/// Result of balancing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceOutcome {
    /// Indices of kept records, ascending.
    pub retained: Vec<usize>,
    /// The pre-balancing minimum number of records per class.
    pub min_images_per_class: usize,
}

/// Counts, per class index, how many records contain at least one box of it.
pub fn images_per_class(records: &[AnnotationRecord], num_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; num_classes];
    for record in records {
        for class in distinct_classes(record) {
            if let Some(count) = counts.get_mut(class.as_usize()) {
                *count += 1;
            }
        }
    }
    counts
}

/// Selects records so no class appears in more records than the least
/// represented one did before balancing.
///
/// The minimum is taken over non-background classes that occur at least
/// once; classes absent from every record are ignored. Records without
/// boxes are always kept.
pub fn balance_records(
    records: &[AnnotationRecord],
    num_classes: usize,
    policy: BalancePolicy,
) -> BalanceOutcome {
    let per_class = images_per_class(records, num_classes);
    let Some(min) = per_class.iter().skip(1).copied().filter(|&n| n > 0).min() else {
        return BalanceOutcome {
            retained: (0..records.len()).collect(),
            min_images_per_class: 0,
        };
    };

    let mut order: Vec<usize> = (0..records.len()).collect();
    if let BalancePolicy::Shuffled { seed } = policy {
        let mut rng = StdRng::seed_from_u64(seed);
        order.shuffle(&mut rng);
    }

    let mut kept_per_class = vec![0usize; num_classes];
    let mut keep = vec![false; records.len()];
    for index in order {
        let classes: Vec<usize> = distinct_classes(&records[index])
            .map(|class| class.as_usize())
            .filter(|&class| class < num_classes)
            .collect();
        if classes.iter().all(|&class| kept_per_class[class] < min) {
            keep[index] = true;
            for class in classes {
                kept_per_class[class] += 1;
            }
        }
    }

    BalanceOutcome {
        retained: (0..records.len()).filter(|&i| keep[i]).collect(),
        min_images_per_class: min,
    }
}

fn distinct_classes(record: &AnnotationRecord) -> impl Iterator<Item = ClassIndex> {
    record
        .labels()
        .iter()
        .copied()
        .filter(|class| !class.is_background())
        .collect::<BTreeSet<_>>()
        .into_iter()
}
