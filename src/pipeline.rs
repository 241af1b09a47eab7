//! End-to-end run: load, tidy, engineer features, split, fit, evaluate.
//!
//! Each stage takes the previous stage's output by reference and returns a
//! fresh value, so the whole run is a straight line of pure transforms.

use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::evaluate::{Direction, Evaluation, Metrics, evaluate};
use crate::features::engineer;
use crate::fetch::HttpClient;
use crate::loader::{WideTable, load_table};
use crate::model::{Coefficient, LinearModel};
use crate::output::{write_json, write_records};
use crate::records::{FeatureRecord, Metric, Prediction, WeeklyRecord};
use crate::sampler::{Partition, balanced_split};
use crate::stats::{LabelSummary, summarize_labels};
use crate::tidy::tidy;

/// Summary consumed by the reporting layer.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub cutoff: NaiveDate,
    pub seed: u64,
    pub train_fraction: f64,
    pub weekly_records: usize,
    pub feature_records: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub labels: Vec<LabelSummary>,
    pub direction: Direction,
    pub auc: f64,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelArtifact {
    pub reference_state: String,
    pub n_obs: usize,
    pub r_squared: f64,
    pub threshold: f64,
    pub coefficients: Vec<Coefficient>,
}

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub weekly: Vec<WeeklyRecord>,
    pub features: Vec<FeatureRecord>,
    pub partition: Partition,
    pub model: LinearModel,
    pub predictions: Vec<Prediction>,
    pub evaluation: Evaluation,
    pub report: Report,
}

impl PipelineOutput {
    pub fn artifact(&self) -> ModelArtifact {
        ModelArtifact {
            reference_state: self.model.reference_state.clone(),
            n_obs: self.model.n_obs,
            r_squared: self.model.r_squared,
            threshold: self.evaluation.metrics.threshold,
            coefficients: self.model.coefficients(),
        }
    }
}

/// Loads the confirmed-cases and deaths tables.
pub async fn load_tables<C: HttpClient>(
    client: &C,
    cases: &str,
    deaths: &str,
) -> Result<(WideTable, WideTable)> {
    let cases = load_table(client, cases, Metric::Cases).await?;
    let deaths = load_table(client, deaths, Metric::Deaths).await?;
    Ok((cases, deaths))
}

/// Splits, fits on the training rows and scores the test rows.
pub fn fit_and_evaluate(
    features: &[FeatureRecord],
    config: &PipelineConfig,
) -> Result<(Partition, LinearModel, Vec<Prediction>, Evaluation)> {
    let labels: Vec<bool> = features.iter().map(|r| r.post_vaccine).collect();
    let partition = balanced_split(&labels, config.train_fraction, config.seed)?;

    let train: Vec<&FeatureRecord> = partition.train.iter().map(|&i| &features[i]).collect();
    let model = LinearModel::fit(&train)?;

    let test: Vec<&FeatureRecord> = partition.test.iter().map(|&i| &features[i]).collect();
    let scores: Vec<f64> = test.iter().map(|r| model.predict(r)).collect();
    let test_labels: Vec<bool> = test.iter().map(|r| r.post_vaccine).collect();
    let evaluation = evaluate(&scores, &test_labels)?;

    let direction = evaluation.roc.direction;
    let threshold = evaluation.metrics.threshold;
    let predictions = test
        .iter()
        .zip(&scores)
        .map(|(r, &score)| Prediction {
            state: r.state.clone(),
            week: r.week,
            post_vaccine: r.post_vaccine,
            score,
            predicted: direction.classify(score, threshold),
        })
        .collect();

    Ok((partition, model, predictions, evaluation))
}

/// Runs every stage after loading.
#[tracing::instrument(skip_all, fields(cutoff = %config.cutoff, seed = config.seed))]
pub fn run(cases: &WideTable, deaths: &WideTable, config: &PipelineConfig) -> Result<PipelineOutput> {
    let weekly = tidy(cases, deaths, config.week_start)?;
    let features = engineer(&weekly, config);
    let (partition, model, predictions, evaluation) = fit_and_evaluate(&features, config)?;

    let report = Report {
        cutoff: config.cutoff,
        seed: config.seed,
        train_fraction: config.train_fraction,
        weekly_records: weekly.len(),
        feature_records: features.len(),
        train_size: partition.train.len(),
        test_size: partition.test.len(),
        labels: summarize_labels(&features),
        direction: evaluation.roc.direction,
        auc: evaluation.roc.auc,
        metrics: evaluation.metrics,
    };

    info!(
        accuracy = report.metrics.accuracy,
        f1 = report.metrics.f1,
        auc = report.auc,
        "Pipeline complete"
    );

    Ok(PipelineOutput {
        weekly,
        features,
        partition,
        model,
        predictions,
        evaluation,
        report,
    })
}

/// Writes the tables and artifacts of a run into `dir`, creating it if needed.
pub fn write_outputs(output: &PipelineOutput, dir: impl AsRef<Path>) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    write_records(dir.join("weekly.csv"), &output.weekly)?;
    write_records(dir.join("features.csv"), &output.features)?;
    write_records(dir.join("predictions.csv"), &output.predictions)?;
    write_records(dir.join("roc.csv"), &output.evaluation.roc.points)?;
    write_json(dir.join("model.json"), &output.artifact())?;
    write_json(dir.join("report.json"), &output.report)?;

    info!(dir = %dir.display(), "Outputs written");
    Ok(())
}
