//! Run configuration for the weekly vaccine-cutoff classifier.

use chrono::{NaiveDate, Weekday};
use serde::Deserialize;

use crate::error::Result;

pub const CONFIRMED_US_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_confirmed_US.csv";
pub const DEATHS_US_URL: &str = "https://raw.githubusercontent.com/CSSEGISandData/COVID-19/master/csse_covid_19_data/csse_covid_19_time_series/time_series_covid19_deaths_US.csv";

/// Entries of the `Province_State` column that are not US states (cruise
/// ships and territories).
pub static EXCLUDED_STATES: &[&str] = &[
    "Diamond Princess",
    "Grand Princess",
    "American Samoa",
    "Guam",
    "Northern Mariana Islands",
    "Puerto Rico",
    "Virgin Islands",
];

/// Parameters of one pipeline run.
///
/// Stored on disk as a JSON object; every field is optional:
/// ```json
/// {
///   "cutoff": "2021-04-19",
///   "train_fraction": 0.8,
///   "seed": 42,
///   "week_start": "Sun",
///   "excluded_states": ["Diamond Princess", "Grand Princess"]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Weeks starting strictly after this date are labelled post-vaccine.
    pub cutoff: NaiveDate,
    pub train_fraction: f64,
    pub seed: u64,
    pub week_start: Weekday,
    pub excluded_states: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // All US adults became eligible on this date.
            cutoff: NaiveDate::from_ymd_opt(2021, 4, 19).unwrap_or_default(),
            train_fraction: 0.8,
            seed: 42,
            week_start: Weekday::Sun,
            excluded_states: EXCLUDED_STATES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn is_excluded(&self, state: &str) -> bool {
        self.excluded_states.iter().any(|s| s == state)
    }
}
