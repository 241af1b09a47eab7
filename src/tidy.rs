//! Reshapes the wide county tables into weekly state records.
//!
//! Every function here is pure: it borrows the previous stage's output and
//! returns a new collection. Sequential computations (week reduction and
//! deltas) sort by `(state, date)` first instead of trusting input order.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::loader::WideTable;
use crate::records::{DailyObservation, JoinedObservation, Metric, StateDay, WeeklyRecord};

/// Converts a wide table into one observation per (county, date).
pub fn pivot_longer(table: &WideTable) -> Vec<DailyObservation> {
    let mut out = Vec::with_capacity(table.rows.len() * table.dates.len());
    for row in &table.rows {
        for (date, value) in table.dates.iter().zip(&row.values) {
            out.push(DailyObservation {
                state: row.state.clone(),
                county: row.county.clone(),
                date: *date,
                value: *value,
                population: row.population,
            });
        }
    }
    out
}

type JoinKey = (String, String, NaiveDate);

/// Full outer join of cases and deaths on `(state, county, date)`.
///
/// A key present on only one side keeps `None` for the other metric; the
/// population always comes from the deaths side. Rows repeating a key on the
/// same side are summed. Output is sorted by key.
///
/// # Errors
///
/// Returns [`PipelineError::DataUnavailable`] if summing repeated rows overflows.
pub fn outer_join(
    cases: Vec<DailyObservation>,
    deaths: Vec<DailyObservation>,
) -> Result<Vec<JoinedObservation>> {
    let mut joined: BTreeMap<JoinKey, JoinedObservation> = BTreeMap::new();
    let mut repeated = 0usize;

    for (metric, side) in [(Metric::Cases, cases), (Metric::Deaths, deaths)] {
        let mut seen: HashSet<JoinKey> = HashSet::new();
        for obs in side {
            let key = (obs.state.clone(), obs.county.clone(), obs.date);
            if !seen.insert(key.clone()) {
                repeated += 1;
            }
            let entry = joined.entry(key).or_insert_with(|| empty_join(&obs));
            match metric {
                Metric::Cases => {
                    entry.cases = sum_counts(entry.cases, obs.value, &obs.state, obs.date)?;
                }
                Metric::Deaths => {
                    entry.deaths = sum_counts(entry.deaths, obs.value, &obs.state, obs.date)?;
                    entry.population =
                        sum_counts(entry.population, obs.population, &obs.state, obs.date)?;
                }
            }
        }
    }

    if repeated > 0 {
        warn!(repeated, "Repeated (state, county, date) observations summed");
    }

    let unmatched = joined
        .values()
        .filter(|j| j.cases.is_none() || j.deaths.is_none())
        .count();
    if unmatched > 0 {
        debug!(unmatched, "Join keys with a missing metric");
    }

    Ok(joined.into_values().collect())
}

fn empty_join(obs: &DailyObservation) -> JoinedObservation {
    JoinedObservation {
        state: obs.state.clone(),
        county: obs.county.clone(),
        date: obs.date,
        cases: None,
        deaths: None,
        population: None,
    }
}

fn checked_total(a: i64, b: i64, state: &str, date: NaiveDate) -> Result<i64> {
    a.checked_add(b).ok_or_else(|| {
        PipelineError::DataUnavailable(format!("count overflow summing {state} on {date}"))
    })
}

fn sum_counts(a: Option<i64>, b: Option<i64>, state: &str, date: NaiveDate) -> Result<Option<i64>> {
    match (a, b) {
        (Some(x), Some(y)) => checked_total(x, y, state, date).map(Some),
        (x, y) => Ok(x.or(y)),
    }
}

/// Sums counties into one row per (state, date). Missing values count as zero.
///
/// # Errors
///
/// Returns [`PipelineError::DataUnavailable`] if a state total overflows `i64`.
pub fn aggregate_states(joined: &[JoinedObservation]) -> Result<Vec<StateDay>> {
    let mut totals: BTreeMap<(String, NaiveDate), StateDay> = BTreeMap::new();

    for obs in joined {
        let day = totals
            .entry((obs.state.clone(), obs.date))
            .or_insert_with(|| StateDay {
                state: obs.state.clone(),
                date: obs.date,
                cases: 0,
                deaths: 0,
                population: 0,
            });
        day.cases = checked_total(day.cases, obs.cases.unwrap_or(0), &obs.state, obs.date)?;
        day.deaths = checked_total(day.deaths, obs.deaths.unwrap_or(0), &obs.state, obs.date)?;
        day.population =
            checked_total(day.population, obs.population.unwrap_or(0), &obs.state, obs.date)?;
    }

    Ok(totals.into_values().collect())
}

/// First day of the week containing `date`, with weeks starting on `week_start`.
pub fn week_of(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    let offset = (date.weekday().num_days_from_sunday() + 7 - week_start.num_days_from_sunday()) % 7;
    date - Duration::days(i64::from(offset))
}

/// Keeps the last reported day of each (state, week). Deltas are left unset.
pub fn weekly_reduce(days: &[StateDay], week_start: Weekday) -> Vec<WeeklyRecord> {
    let mut weeks: BTreeMap<(String, NaiveDate), &StateDay> = BTreeMap::new();

    for day in days {
        let key = (day.state.clone(), week_of(day.date, week_start));
        weeks
            .entry(key)
            .and_modify(|kept| {
                if day.date > kept.date {
                    *kept = day;
                }
            })
            .or_insert(day);
    }

    weeks
        .into_iter()
        .map(|((state, week), day)| WeeklyRecord {
            state,
            week,
            date: day.date,
            cases: day.cases,
            deaths: day.deaths,
            population: day.population,
            new_cases: None,
            new_deaths: None,
        })
        .collect()
}

/// First differences of cumulative totals per state in week order.
/// A state's first week has no baseline and keeps `None`.
pub fn with_deltas(mut weekly: Vec<WeeklyRecord>) -> Vec<WeeklyRecord> {
    weekly.sort_by(|a, b| (&a.state, a.week).cmp(&(&b.state, b.week)));

    let mut prev: Option<(String, i64, i64)> = None;
    for rec in &mut weekly {
        match &prev {
            Some((state, cases, deaths)) if *state == rec.state => {
                rec.new_cases = Some(rec.cases - cases);
                rec.new_deaths = Some(rec.deaths - deaths);
            }
            _ => {
                rec.new_cases = None;
                rec.new_deaths = None;
            }
        }
        prev = Some((rec.state.clone(), rec.cases, rec.deaths));
    }

    weekly
}

/// Runs the full reshaping: pivot, join, state aggregation, weekly
/// reduction and deltas. The result is sorted by `(state, week)`.
#[tracing::instrument(skip_all, fields(week_start = %week_start))]
pub fn tidy(cases: &WideTable, deaths: &WideTable, week_start: Weekday) -> Result<Vec<WeeklyRecord>> {
    let joined = outer_join(pivot_longer(cases), pivot_longer(deaths))?;
    let days = aggregate_states(&joined)?;
    let weekly = with_deltas(weekly_reduce(&days, week_start));

    info!(
        joined = joined.len(),
        state_days = days.len(),
        weekly = weekly.len(),
        "Tidy transform complete"
    );
    Ok(weekly)
}
