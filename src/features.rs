//! Feature engineering over weekly state records.
//!
//! Per state, in week order: drop weeks before the first reported case,
//! compute week-over-week log-returns of cumulative cases, attach a window
//! of three lagged and three leading log-returns, and keep only records
//! whose seven log-return fields are all present. Dropping incomplete
//! windows removes each state's first and last three weeks so the model
//! cannot key on where a series begins or ends.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::records::{FeatureRecord, WeeklyRecord};

/// Number of lagged (and leading) weeks in the window.
pub const WINDOW: usize = 3;

pub fn is_post_vaccine(week: NaiveDate, cutoff: NaiveDate) -> bool {
    week > cutoff
}

/// Removes cruise ships, territories and any other configured entries.
pub fn filter_geographies(weekly: &[WeeklyRecord], config: &PipelineConfig) -> Vec<WeeklyRecord> {
    weekly
        .iter()
        .filter(|w| !config.is_excluded(&w.state))
        .cloned()
        .collect()
}

/// Drops each state's weeks before its first week with `cases > 0`.
/// Output is sorted by `(state, week)`.
pub fn anchor_first_valid_week(weekly: &[WeeklyRecord]) -> Vec<WeeklyRecord> {
    let mut sorted = weekly.to_vec();
    sorted.sort_by(|a, b| (&a.state, a.week).cmp(&(&b.state, b.week)));

    sorted
        .chunk_by(|a, b| a.state == b.state)
        .flat_map(|series| match series.iter().position(|w| w.cases > 0) {
            Some(first) => series[first..].to_vec(),
            None => {
                debug!(state = %series[0].state, "State never reports a case");
                Vec::new()
            }
        })
        .collect()
}

/// `ln(current / previous)`, or `None` when either count is not positive.
pub fn log_return(previous: i64, current: i64) -> Option<f64> {
    if previous <= 0 || current <= 0 {
        return None;
    }
    Some((current as f64 / previous as f64).ln())
}

/// Log-returns of one state's anchored series. Element `i` relates week `i`
/// to week `i - 1`; the first element is always `None`.
pub fn log_returns(series: &[WeeklyRecord]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(series.len());
    out.push(None);
    for pair in series.windows(2) {
        let lr = log_return(pair[0].cases, pair[1].cases);
        if lr.is_none() {
            warn!(
                state = %pair[1].state,
                week = %pair[1].week,
                previous = pair[0].cases,
                current = pair[1].cases,
                "Degenerate log-return treated as missing"
            );
        }
        out.push(lr);
    }
    out
}

/// The seven log-return fields centred on position `i`, ordered
/// `[log_return, lag_3, lag_2, lag_1, lead_1, lead_2, lead_3]`, or `None`
/// if any of them falls outside the sequence or is missing.
pub fn window_at(values: &[Option<f64>], i: usize) -> Option<[f64; 7]> {
    if i < WINDOW || i + WINDOW >= values.len() {
        return None;
    }
    Some([
        values[i]?,
        values[i - 3]?,
        values[i - 2]?,
        values[i - 1]?,
        values[i + 1]?,
        values[i + 2]?,
        values[i + 3]?,
    ])
}

fn feature_record(week: &WeeklyRecord, fields: [f64; 7], cutoff: NaiveDate) -> FeatureRecord {
    let [log_return, lag_3, lag_2, lag_1, lead_1, lead_2, lead_3] = fields;
    FeatureRecord {
        state: week.state.clone(),
        week: week.week,
        date: week.date,
        cases: week.cases,
        deaths: week.deaths,
        population: week.population,
        new_cases: week.new_cases,
        new_deaths: week.new_deaths,
        post_vaccine: is_post_vaccine(week.week, cutoff),
        log_return,
        lag_3,
        lag_2,
        lag_1,
        lead_1,
        lead_2,
        lead_3,
    }
}

/// Builds complete feature records from weekly state records.
#[tracing::instrument(skip_all, fields(cutoff = %config.cutoff))]
pub fn engineer(weekly: &[WeeklyRecord], config: &PipelineConfig) -> Vec<FeatureRecord> {
    let kept = filter_geographies(weekly, config);
    let anchored = anchor_first_valid_week(&kept);

    let mut out = Vec::new();
    for series in anchored.chunk_by(|a, b| a.state == b.state) {
        // The anchor week has no predecessor, so the sequence starts one later.
        let returns = log_returns(series);
        let (series, returns) = (&series[1..], &returns[1..]);

        let before = out.len();
        for (i, week) in series.iter().enumerate() {
            if let Some(fields) = window_at(returns, i) {
                out.push(feature_record(week, fields, config.cutoff));
            }
        }
        debug!(
            state = %series.first().map(|w| w.state.as_str()).unwrap_or(""),
            weeks = series.len(),
            retained = out.len() - before,
            "State features built"
        );
    }

    let post = out.iter().filter(|r| r.post_vaccine).count();
    info!(
        input = weekly.len(),
        excluded = weekly.len() - kept.len(),
        records = out.len(),
        post_vaccine = post,
        pre_vaccine = out.len() - post,
        "Feature engineering complete"
    );
    out
}
