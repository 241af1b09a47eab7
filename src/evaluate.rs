//! ROC sweep and threshold selection for continuous model scores.
//!
//! Candidate thresholds are `-inf`, the midpoints between consecutive
//! distinct scores, and `+inf`, visited in ascending order. The selected
//! operating point is the first one reaching the maximum accuracy.

use serde::Serialize;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::stats::median;

/// Which side of the threshold the positive class lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Positives score above the threshold.
    Higher,
    /// Positives score below the threshold.
    Lower,
}

impl Direction {
    /// Compares class medians; ties favour [`Direction::Higher`].
    pub fn detect(scores: &[f64], labels: &[bool]) -> Self {
        let (pos, neg): (Vec<(f64, bool)>, Vec<(f64, bool)>) =
            scores.iter().copied().zip(labels.iter().copied()).partition(|(_, l)| *l);
        let pos: Vec<f64> = pos.into_iter().map(|(s, _)| s).collect();
        let neg: Vec<f64> = neg.into_iter().map(|(s, _)| s).collect();
        if median(&pos) < median(&neg) {
            Direction::Lower
        } else {
            Direction::Higher
        }
    }

    pub fn classify(self, score: f64, threshold: f64) -> bool {
        match self {
            Direction::Higher => score > threshold,
            Direction::Lower => score < threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn at(scores: &[f64], labels: &[bool], threshold: f64, direction: Direction) -> Self {
        let mut m = ConfusionMatrix::default();
        for (&score, &label) in scores.iter().zip(labels) {
            match (direction.classify(score, threshold), label) {
                (true, true) => m.tp += 1,
                (true, false) => m.fp += 1,
                (false, false) => m.tn += 1,
                (false, true) => m.fn_ += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.fp, self.fp + self.tn)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }
}

fn ratio(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub tpr: f64,
    pub fpr: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RocCurve {
    pub direction: Direction,
    pub points: Vec<RocPoint>,
    pub auc: f64,
}

/// Metric bundle at the selected threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub threshold: f64,
    pub accuracy: f64,
    #[serde(flatten)]
    pub confusion: ConfusionMatrix,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl Metrics {
    pub fn at(scores: &[f64], labels: &[bool], threshold: f64, direction: Direction) -> Self {
        let confusion = ConfusionMatrix::at(scores, labels, threshold, direction);
        Metrics {
            threshold,
            accuracy: confusion.accuracy(),
            confusion,
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
        }
    }
}

/// Ascending candidate thresholds for `scores`.
pub fn candidate_thresholds(scores: &[f64]) -> Vec<f64> {
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();

    let mut out = Vec::with_capacity(sorted.len() + 1);
    out.push(f64::NEG_INFINITY);
    out.extend(sorted.windows(2).map(|w| (w[0] + w[1]) / 2.0));
    out.push(f64::INFINITY);
    out
}

/// Sweeps every candidate threshold.
///
/// # Errors
///
/// Returns [`PipelineError::InsufficientData`] if the inputs differ in length
/// or either class is absent.
pub fn roc_curve(scores: &[f64], labels: &[bool]) -> Result<RocCurve> {
    if scores.len() != labels.len() {
        return Err(PipelineError::InsufficientData(format!(
            "{} scores for {} labels",
            scores.len(),
            labels.len()
        )));
    }
    let positives = labels.iter().filter(|&&l| l).count();
    if positives == 0 || positives == labels.len() {
        return Err(PipelineError::InsufficientData(
            "ROC needs both classes in the scored set".into(),
        ));
    }

    let direction = Direction::detect(scores, labels);
    let points: Vec<RocPoint> = candidate_thresholds(scores)
        .into_iter()
        .map(|threshold| {
            let m = ConfusionMatrix::at(scores, labels, threshold, direction);
            RocPoint {
                threshold,
                tpr: m.recall(),
                fpr: m.false_positive_rate(),
                accuracy: m.accuracy(),
            }
        })
        .collect();

    let auc = area_under(&points);
    Ok(RocCurve {
        direction,
        points,
        auc,
    })
}

/// Trapezoidal area under the (fpr, tpr) staircase.
fn area_under(points: &[RocPoint]) -> f64 {
    let mut coords: Vec<(f64, f64)> = points.iter().map(|p| (p.fpr, p.tpr)).collect();
    coords.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    coords
        .windows(2)
        .map(|w| (w[1].0 - w[0].0) * (w[0].1 + w[1].1) / 2.0)
        .sum()
}

impl RocCurve {
    /// First point in ascending threshold order with the highest accuracy.
    pub fn best(&self) -> Option<&RocPoint> {
        self.points.iter().fold(None, |best: Option<&RocPoint>, p| match best {
            Some(b) if b.accuracy >= p.accuracy => Some(b),
            _ => Some(p),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub roc: RocCurve,
    pub metrics: Metrics,
}

/// Builds the ROC curve, picks the accuracy-optimal threshold and reports
/// the confusion-matrix metrics there.
#[tracing::instrument(skip_all, fields(n = scores.len()))]
pub fn evaluate(scores: &[f64], labels: &[bool]) -> Result<Evaluation> {
    let roc = roc_curve(scores, labels)?;
    let threshold = roc
        .best()
        .map(|p| p.threshold)
        .ok_or_else(|| PipelineError::InsufficientData("empty ROC curve".into()))?;
    let metrics = Metrics::at(scores, labels, threshold, roc.direction);

    info!(
        threshold,
        direction = ?roc.direction,
        auc = roc.auc,
        accuracy = metrics.accuracy,
        precision = metrics.precision,
        recall = metrics.recall,
        f1 = metrics.f1,
        "Evaluation complete"
    );
    Ok(Evaluation { roc, metrics })
}
