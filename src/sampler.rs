//! Label-balanced train/test partitioning.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::error::{PipelineError, Result};

/// Disjoint row indices into the feature table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Draws `k` distinct elements of `population` in ascending order.
fn draw(rng: &mut StdRng, population: &[usize], k: usize) -> Result<Vec<usize>> {
    if k > population.len() {
        return Err(PipelineError::InsufficientData(format!(
            "cannot draw {k} records from a class of {}",
            population.len()
        )));
    }
    let mut picked: Vec<usize> = index::sample(rng, population.len(), k)
        .into_iter()
        .map(|i| population[i])
        .collect();
    picked.sort_unstable();
    Ok(picked)
}

fn split_by_label(indices: impl Iterator<Item = usize>, labels: &[bool]) -> (Vec<usize>, Vec<usize>) {
    indices.partition(|&i| labels[i])
}

/// Splits rows into label-balanced training and test sets.
///
/// The training set takes `floor(train_fraction * min_class_size)` rows from
/// each class. The remaining rows are subsampled to the size of their
/// smaller class so the test set is balanced too. Both draws are without
/// replacement and reproducible for a given `seed`.
///
/// # Errors
///
/// Returns [`PipelineError::InsufficientData`] if `train_fraction` is not in
/// `(0, 1]`, or either set would end up empty.
pub fn balanced_split(labels: &[bool], train_fraction: f64, seed: u64) -> Result<Partition> {
    if !(train_fraction > 0.0 && train_fraction <= 1.0) {
        return Err(PipelineError::InsufficientData(format!(
            "train fraction {train_fraction} is outside (0, 1]"
        )));
    }

    let (positives, negatives) = split_by_label(0..labels.len(), labels);
    let min_class_size = positives.len().min(negatives.len());
    let per_class = (train_fraction * min_class_size as f64 + 1e-9).floor() as usize;
    if per_class == 0 {
        return Err(PipelineError::InsufficientData(format!(
            "{} positive and {} negative records leave no training data",
            positives.len(),
            negatives.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let mut train = draw(&mut rng, &negatives, per_class)?;
    train.extend(draw(&mut rng, &positives, per_class)?);

    let in_train: HashSet<usize> = train.iter().copied().collect();
    let (pool_pos, pool_neg) =
        split_by_label((0..labels.len()).filter(|i| !in_train.contains(i)), labels);
    let test_per_class = pool_pos.len().min(pool_neg.len());
    if test_per_class == 0 {
        return Err(PipelineError::InsufficientData(format!(
            "no balanced test set left after training draw ({} positive, {} negative remain)",
            pool_pos.len(),
            pool_neg.len()
        )));
    }

    let mut test = draw(&mut rng, &pool_neg, test_per_class)?;
    test.extend(draw(&mut rng, &pool_pos, test_per_class)?);

    info!(
        positives = positives.len(),
        negatives = negatives.len(),
        train = train.len(),
        test = test.len(),
        seed,
        "Balanced split drawn"
    );
    Ok(Partition { train, test })
}
