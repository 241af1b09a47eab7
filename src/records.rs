//! Typed records passed between pipeline stages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which metric a long-form observation carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Cases,
    Deaths,
}

/// One cell of a wide table after pivoting: a county's cumulative value on a date.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyObservation {
    pub state: String,
    pub county: String,
    pub date: NaiveDate,
    pub value: Option<i64>,
    /// Only populated from the deaths table.
    pub population: Option<i64>,
}

/// Cases and deaths for one (state, county, date) after the outer join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedObservation {
    pub state: String,
    pub county: String,
    pub date: NaiveDate,
    pub cases: Option<i64>,
    pub deaths: Option<i64>,
    pub population: Option<i64>,
}

/// State totals on one reporting day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDay {
    pub state: String,
    pub date: NaiveDate,
    pub cases: i64,
    pub deaths: i64,
    pub population: i64,
}

/// Cumulative state totals as of the last reported day of a week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRecord {
    pub state: String,
    /// First day of the week.
    pub week: NaiveDate,
    /// Last reported day inside the week.
    pub date: NaiveDate,
    pub cases: i64,
    pub deaths: i64,
    pub population: i64,
    pub new_cases: Option<i64>,
    pub new_deaths: Option<i64>,
}

/// A weekly record with its label, log-return and lag/lead window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub state: String,
    pub week: NaiveDate,
    pub date: NaiveDate,
    pub cases: i64,
    pub deaths: i64,
    pub population: i64,
    pub new_cases: Option<i64>,
    pub new_deaths: Option<i64>,
    pub post_vaccine: bool,
    pub log_return: f64,
    pub lag_3: f64,
    pub lag_2: f64,
    pub lag_1: f64,
    pub lead_1: f64,
    pub lead_2: f64,
    pub lead_3: f64,
}

impl FeatureRecord {
    pub const FEATURE_NAMES: [&'static str; 7] = [
        "log_return",
        "lag_3",
        "lag_2",
        "lag_1",
        "lead_1",
        "lead_2",
        "lead_3",
    ];

    /// Numeric model inputs in the order of [`Self::FEATURE_NAMES`].
    pub fn features(&self) -> [f64; 7] {
        [
            self.log_return,
            self.lag_3,
            self.lag_2,
            self.lag_1,
            self.lead_1,
            self.lead_2,
            self.lead_3,
        ]
    }
}

/// Model output for one held-out record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub state: String,
    pub week: NaiveDate,
    pub post_vaccine: bool,
    pub score: f64,
    pub predicted: bool,
}
