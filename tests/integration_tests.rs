use chrono::{Duration, NaiveDate};
use std::collections::HashSet;
use std::env;
use std::fs;
use vax_cutoff::config::PipelineConfig;
use vax_cutoff::features::{is_post_vaccine, window_at};
use vax_cutoff::fetch::BasicClient;
use vax_cutoff::pipeline::{fit_and_evaluate, load_tables, run, write_outputs};
use vax_cutoff::records::{FeatureRecord, WeeklyRecord};

const STATES: &[(&str, f64, f64)] = &[
    // (state, daily growth before cutoff, daily growth after cutoff)
    ("Alabama", 0.030, 0.004),
    ("Ohio", 0.028, 0.006),
    ("Utah", 0.032, 0.003),
    ("Vermont", 0.025, 0.005),
    ("Diamond Princess", 0.010, 0.000),
];

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn temp_path(name: &str) -> String {
    format!("{}/{}", env::temp_dir().display(), name)
}

/// Writes JHU-shaped cases and deaths tables with two counties per state.
fn write_fixture(prefix: &str) -> (String, String) {
    let first = date(2020, 2, 20);
    let last = date(2021, 12, 31);
    let cutoff = PipelineConfig::default().cutoff;
    let days: Vec<NaiveDate> = first
        .iter_days()
        .take_while(|d| *d <= last)
        .collect();
    let header_dates: Vec<String> = days.iter().map(|d| d.format("%-m/%-d/%y").to_string()).collect();

    let mut cases = format!(
        "UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,{}\n",
        header_dates.join(",")
    );
    let mut deaths = format!(
        "UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,Population,{}\n",
        header_dates.join(",")
    );

    let onset = date(2020, 3, 10);
    for (s, &(state, pre, post)) in STATES.iter().enumerate() {
        for county in 0..2 {
            let name = format!("County{county}");
            let scale = 10.0 * (county + 1) as f64;
            let series: Vec<i64> = days
                .iter()
                .map(|d| {
                    if *d < onset {
                        return 0;
                    }
                    let before = (d.min(&cutoff).signed_duration_since(onset)).num_days() as f64;
                    let after = (*d - cutoff).num_days().max(0) as f64;
                    (scale * (pre * before + post * after).exp()).round() as i64
                })
                .collect();

            let id = format!("84{s:03}{county:03},US,USA,840,{s}{county},{name},{state},US,0.0,0.0,\"{name}, {state}, US\"");
            let row_cases: Vec<String> = series.iter().map(|v| v.to_string()).collect();
            let row_deaths: Vec<String> = series.iter().map(|v| (v / 50).to_string()).collect();

            cases.push_str(&format!("{id},{}\n", row_cases.join(",")));
            deaths.push_str(&format!("{id},{},{}\n", 50_000 * (county + 1), row_deaths.join(",")));
        }
    }

    let cases_path = temp_path(&format!("{prefix}_cases.csv"));
    let deaths_path = temp_path(&format!("{prefix}_deaths.csv"));
    fs::write(&cases_path, cases).unwrap();
    fs::write(&deaths_path, deaths).unwrap();
    (cases_path, deaths_path)
}

#[tokio::test]
async fn test_full_pipeline() {
    let (cases_path, deaths_path) = write_fixture("vax_cutoff_it_full");
    let client = BasicClient::new().unwrap();
    let (cases, deaths) = load_tables(&client, &cases_path, &deaths_path).await.unwrap();

    let config = PipelineConfig::default();
    let output = run(&cases, &deaths, &config).unwrap();

    // One weekly record per (state, week).
    let keys: HashSet<(&str, NaiveDate)> = output
        .weekly
        .iter()
        .map(|w| (w.state.as_str(), w.week))
        .collect();
    assert_eq!(keys.len(), output.weekly.len());

    // Territories and cruise ships never reach the feature table.
    assert!(output.features.iter().all(|f| f.state != "Diamond Princess"));
    assert!(output.features.iter().all(|f| f.cases > 0));
    assert!(
        output
            .features
            .iter()
            .all(|f| f.features().iter().all(|v| v.is_finite()))
    );

    // Disjoint, balanced partition.
    let train: HashSet<usize> = output.partition.train.iter().copied().collect();
    assert!(output.partition.test.iter().all(|i| !train.contains(i)));
    for indices in [&output.partition.train, &output.partition.test] {
        let post = indices.iter().filter(|&&i| output.features[i].post_vaccine).count();
        assert_eq!(post * 2, indices.len());
    }

    // Growth slows sharply after the cutoff, so the split is easy.
    assert!(output.report.metrics.accuracy > 0.9);
    assert_eq!(output.predictions.len(), output.partition.test.len());

    let dir = temp_path("vax_cutoff_it_full_report");
    write_outputs(&output, &dir).unwrap();
    for file in [
        "weekly.csv",
        "features.csv",
        "predictions.csv",
        "roc.csv",
        "model.json",
        "report.json",
    ] {
        assert!(std::path::Path::new(&dir).join(file).exists(), "{file} missing");
    }
    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(format!("{dir}/report.json")).unwrap()).unwrap();
    assert!(report["metrics"]["tp"].is_u64());
    assert!(report["metrics"]["fn"].is_u64());

    fs::remove_dir_all(&dir).unwrap();
    fs::remove_file(&cases_path).unwrap();
    fs::remove_file(&deaths_path).unwrap();
}

#[tokio::test]
async fn test_pipeline_is_reproducible_for_seed() {
    let (cases_path, deaths_path) = write_fixture("vax_cutoff_it_seed");
    let client = BasicClient::new().unwrap();
    let (cases, deaths) = load_tables(&client, &cases_path, &deaths_path).await.unwrap();

    let config = PipelineConfig::default();
    let a = run(&cases, &deaths, &config).unwrap();
    let b = run(&cases, &deaths, &config).unwrap();

    assert_eq!(a.weekly, b.weekly);
    assert_eq!(a.partition, b.partition);
    assert_eq!(a.report.metrics, b.report.metrics);

    fs::remove_file(&cases_path).unwrap();
    fs::remove_file(&deaths_path).unwrap();
}

#[tokio::test]
async fn test_unreadable_source_fails_before_any_stage() {
    let client = BasicClient::new().unwrap();
    let result = load_tables(&client, "/nonexistent/cases.csv", "/nonexistent/deaths.csv").await;
    assert!(matches!(
        result,
        Err(vax_cutoff::error::PipelineError::DataUnavailable(_))
    ));
}

fn synthetic_state(state: &str, returns: &[f64], start: NaiveDate, cutoff: NaiveDate) -> Vec<FeatureRecord> {
    let values: Vec<Option<f64>> = returns.iter().copied().map(Some).collect();
    (0..values.len())
        .filter_map(|i| {
            let [log_return, lag_3, lag_2, lag_1, lead_1, lead_2, lead_3] = window_at(&values, i)?;
            let week = start + Duration::weeks(i as i64);
            let weekly = WeeklyRecord {
                state: state.to_string(),
                week,
                date: week + Duration::days(6),
                cases: 1,
                deaths: 0,
                population: 1,
                new_cases: Some(0),
                new_deaths: Some(0),
            };
            Some(FeatureRecord {
                state: weekly.state,
                week,
                date: weekly.date,
                cases: weekly.cases,
                deaths: weekly.deaths,
                population: weekly.population,
                new_cases: weekly.new_cases,
                new_deaths: weekly.new_deaths,
                post_vaccine: is_post_vaccine(week, cutoff),
                log_return,
                lag_3,
                lag_2,
                lag_1,
                lead_1,
                lead_2,
                lead_3,
            })
        })
        .collect()
}

#[test]
fn test_opposite_post_cutoff_trends_are_learnable() {
    let start = date(2020, 3, 1);
    let weeks = 100;
    let cutoff = start + Duration::weeks(50);

    // After the cutoff one state's log-returns fall strictly and the
    // other's rise strictly; both stay below the pre-cutoff level.
    let falling: Vec<f64> = (0..weeks)
        .map(|i| {
            if i <= 50 {
                0.8 + 0.05 * (i as f64).sin()
            } else {
                0.3 - 0.004 * (i - 50) as f64
            }
        })
        .collect();
    let rising: Vec<f64> = (0..weeks)
        .map(|i| {
            if i <= 50 {
                0.9 + 0.05 * (i as f64).cos()
            } else {
                0.1 + 0.004 * (i - 50) as f64
            }
        })
        .collect();

    let mut records = synthetic_state("Falling", &falling, start, cutoff);
    records.extend(synthetic_state("Rising", &rising, start, cutoff));

    let config = PipelineConfig {
        cutoff,
        ..PipelineConfig::default()
    };
    let (partition, _model, predictions, evaluation) = fit_and_evaluate(&records, &config).unwrap();

    assert_eq!(predictions.len(), partition.test.len());
    assert!(evaluation.metrics.accuracy > 0.5);
}
