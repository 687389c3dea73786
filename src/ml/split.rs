//! Stratified train/test splitting.

use std::collections::BTreeMap;

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{AdsieveError, Result};

/// Row indices of a train/test partition, each list in ascending order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Split {
    /// Partition `items` by this split's indices.
    pub fn select<T: Clone>(&self, items: &[T]) -> (Vec<T>, Vec<T>) {
        let pick = |indices: &[usize]| indices.iter().map(|&i| items[i].clone()).collect();
        (pick(&self.train), pick(&self.test))
    }
}

/// Split row indices so each class keeps its share of `labels` in both parts.
///
/// The test part has `ceil(test_fraction * n)` rows. Each class receives
/// `floor(count * n_test / n)` test rows and leftover rows go to the classes
/// with the largest fractional remainder (larger classes first on ties). Every
/// class keeps at least one training row. Members of each class are shuffled
/// with `seed` before being assigned.
///
/// Fails when a class has fewer than two rows, or when either part would be
/// smaller than the number of classes.
pub fn stratified_split(labels: &[usize], test_fraction: f64, seed: u64) -> Result<Split> {
    if labels.is_empty() {
        return Err(AdsieveError::precondition("cannot split an empty dataset"));
    }
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(AdsieveError::invalid_argument(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }

    let mut classes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (row, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(row);
    }

    if let Some((label, members)) = classes.iter().find(|(_, members)| members.len() < 2) {
        return Err(AdsieveError::precondition(format!(
            "class {label} has {} sample(s); a stratified split needs at least 2 per class",
            members.len()
        )));
    }

    let n = labels.len();
    let n_test = ((test_fraction * n as f64) - 1e-9).ceil() as usize;
    let n_train = n - n_test;
    if n_test < classes.len() || n_train < classes.len() {
        return Err(AdsieveError::precondition(format!(
            "{n} samples split into {n_train} train / {n_test} test cannot hold all {} classes",
            classes.len()
        )));
    }

    let mut allocation: Vec<(usize, usize, usize, f64)> = classes
        .iter()
        .map(|(&label, members)| {
            let exact = members.len() as f64 * n_test as f64 / n as f64;
            (label, members.len(), exact.floor() as usize, exact.fract())
        })
        .collect();

    let assigned: usize = allocation.iter().map(|a| a.2).sum();
    let mut by_remainder: Vec<usize> = (0..allocation.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let (la, ca, _, fa) = allocation[a];
        let (lb, cb, _, fb) = allocation[b];
        fb.total_cmp(&fa).then(cb.cmp(&ca)).then(la.cmp(&lb))
    });
    for &slot in by_remainder.iter().take(n_test.saturating_sub(assigned)) {
        allocation[slot].2 += 1;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n_train);
    let mut test = Vec::with_capacity(n_test);

    for (label, count, test_count, _) in allocation {
        let test_count = test_count.min(count - 1);
        let mut members = classes.remove(&label).unwrap_or_default();
        members.shuffle(&mut rng);
        debug!("split: class {label}: {count} samples, {test_count} to test");
        test.extend_from_slice(&members[..test_count]);
        train.extend_from_slice(&members[test_count..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(Split { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(labels: &[usize], indices: &[usize], class: usize) -> usize {
        indices.iter().filter(|&&i| labels[i] == class).count()
    }

    #[test]
    fn test_balanced_split() {
        let labels: Vec<usize> = (0..200).map(|i| i % 2).collect();
        let split = stratified_split(&labels, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 40);
        assert_eq!(split.train.len(), 160);
        assert_eq!(count(&labels, &split.test, 0), 20);
        assert_eq!(count(&labels, &split.test, 1), 20);
    }

    #[test]
    fn test_split_is_partition() {
        let labels: Vec<usize> = (0..57).map(|i| i % 3).collect();
        let split = stratified_split(&labels, 0.2, 7).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..57).collect::<Vec<_>>());
        assert_eq!(split.test.len(), 12);
    }

    #[test]
    fn test_imbalanced_proportions() {
        let mut labels = vec![0; 90];
        labels.extend(vec![1; 10]);
        let split = stratified_split(&labels, 0.2, 1).unwrap();

        assert_eq!(count(&labels, &split.test, 0), 18);
        assert_eq!(count(&labels, &split.test, 1), 2);
    }

    #[test]
    fn test_same_seed_same_split() {
        let labels: Vec<usize> = (0..40).map(|i| i % 4).collect();
        let a = stratified_split(&labels, 0.2, 42).unwrap();
        let b = stratified_split(&labels, 0.2, 42).unwrap();
        let c = stratified_split(&labels, 0.2, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_singleton_class_is_rejected() {
        let labels = vec![0, 0, 0, 0, 1];
        let err = stratified_split(&labels, 0.2, 42).unwrap_err();
        assert!(matches!(err, AdsieveError::Precondition(_)));
    }

    #[test]
    fn test_too_few_test_rows_is_rejected() {
        // 3 classes but ceil(0.2 * 6) = 2 test rows
        let labels = vec![0, 0, 1, 1, 2, 2];
        assert!(matches!(
            stratified_split(&labels, 0.2, 42),
            Err(AdsieveError::Precondition(_))
        ));
    }

    #[test]
    fn test_select() {
        let split = Split {
            train: vec![0, 2],
            test: vec![1],
        };
        let (train, test) = split.select(&["a", "b", "c"]);
        assert_eq!(train, vec!["a", "c"]);
        assert_eq!(test, vec!["b"]);
    }
}
