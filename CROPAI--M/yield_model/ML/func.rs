use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

/// Seeded shuffle followed by a train/test cut. The test partition holds
/// `ceil(test_ratio * n)` rows.
#[must_use]
pub fn train_test_split(n_samples: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut SmallRng::seed_from_u64(seed));
    let n_test = test_size(n_samples, test_ratio);
    let test = indices.split_off(n_samples - n_test);
    (indices, test)
}

/// Number of rows the test partition receives.
#[must_use]
pub fn test_size(n_samples: usize, test_ratio: f64) -> usize {
    ((test_ratio * n_samples as f64).ceil() as usize).min(n_samples)
}

/// Contiguous K-fold split over `0..n_samples`. The first `n % k` folds get
/// one extra row. Returns `(train, validation)` positions per fold.
#[must_use]
pub fn kfold(n_samples: usize, folds: usize) -> Vec<(Vec<usize>, Vec<usize>)> {
    let folds = folds.max(1);
    let base = n_samples / folds;
    let remainder = n_samples % folds;
    let mut splits = Vec::with_capacity(folds);
    let mut start = 0;
    for fold in 0..folds {
        let size = base + usize::from(fold < remainder);
        let end = start + size;
        let validation: Vec<usize> = (start..end).collect();
        let train: Vec<usize> = (0..start).chain(end..n_samples).collect();
        splits.push((train, validation));
        start = end;
    }
    splits
}

/// Mean squared error between predictions and labels.
#[must_use]
pub fn mean_squared_error(predictions: &[f64], labels: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    predictions
        .iter()
        .zip(labels.iter())
        .map(|(pred, label)| (pred - label).powi(2))
        .sum::<f64>()
        / predictions.len() as f64
}

/// Root-mean-squared error, in label units (kg/ha).
#[must_use]
pub fn root_mean_squared_error(predictions: &[f64], labels: &[f64]) -> f64 {
    mean_squared_error(predictions, labels).sqrt()
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
#[must_use]
pub fn r2_score(predictions: &[f64], labels: &[f64]) -> f64 {
    if labels.is_empty() || predictions.len() != labels.len() {
        return 0.0;
    }
    let mean = labels.iter().sum::<f64>() / labels.len() as f64;
    let ss_tot: f64 = labels.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = predictions
        .iter()
        .zip(labels.iter())
        .map(|(pred, label)| (label - pred).powi(2))
        .sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
