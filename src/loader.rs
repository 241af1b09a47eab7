//! Loader for the JHU CSSE US time-series tables.
//!
//! Each table is wide: one row per county, identifying columns first, then
//! one column per reporting date (`%m/%d/%y`) holding the cumulative count.
//! The deaths table additionally carries a `Population` column.

use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::fetch::{HttpClient, load_source};
use crate::records::Metric;

pub const DATE_FORMAT: &str = "%m/%d/%y";
const STATE_COLUMN: &str = "Province_State";
const COUNTY_COLUMN: &str = "Admin2";
const POPULATION_COLUMN: &str = "Population";

/// One county row of a wide table.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub state: String,
    pub county: String,
    pub population: Option<i64>,
    /// Aligned with [`WideTable::dates`].
    pub values: Vec<Option<i64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub metric: Metric,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<WideRow>,
}

/// Fetches `source` and parses it as a wide table for `metric`.
pub async fn load_table<C: HttpClient>(
    client: &C,
    source: &str,
    metric: Metric,
) -> Result<WideTable> {
    let bytes = load_source(client, source).await?;
    let table = parse_table(&bytes, metric)?;
    info!(
        source,
        ?metric,
        counties = table.rows.len(),
        dates = table.dates.len(),
        "Table loaded"
    );
    Ok(table)
}

/// Parses CSV bytes into a [`WideTable`], validating the schema once.
///
/// # Errors
///
/// Returns [`PipelineError::DataUnavailable`] if the bytes are not CSV, a
/// required column is missing, there are no date columns, or a cell is not
/// a whole number.
pub fn parse_table(bytes: &[u8], metric: Metric) -> Result<WideTable> {
    let unavailable = |msg: String| PipelineError::DataUnavailable(msg);

    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let headers = rdr
        .headers()
        .map_err(|e| unavailable(format!("{metric:?} table has no readable header: {e}")))?
        .clone();

    let find = |name: &str| headers.iter().position(|h| h.trim() == name);
    let state_idx =
        find(STATE_COLUMN).ok_or_else(|| unavailable(format!("missing column {STATE_COLUMN}")))?;
    let county_idx =
        find(COUNTY_COLUMN).ok_or_else(|| unavailable(format!("missing column {COUNTY_COLUMN}")))?;
    let population_idx = match metric {
        Metric::Deaths => Some(find(POPULATION_COLUMN).ok_or_else(|| {
            unavailable(format!("deaths table is missing column {POPULATION_COLUMN}"))
        })?),
        Metric::Cases => None,
    };

    let date_columns: Vec<(usize, NaiveDate)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            NaiveDate::parse_from_str(h.trim(), DATE_FORMAT)
                .ok()
                .map(|d| (i, d))
        })
        .collect();
    if date_columns.is_empty() {
        return Err(unavailable(format!("{metric:?} table has no date columns")));
    }
    debug!(columns = headers.len(), dates = date_columns.len(), "Header parsed");

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record =
            record.map_err(|e| unavailable(format!("{metric:?} table row {}: {e}", line + 1)))?;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let population = match population_idx {
            Some(idx) => parse_count(field(idx))
                .map_err(|v| unavailable(format!("row {}: bad population '{v}'", line + 1)))?,
            None => None,
        };

        let mut values = Vec::with_capacity(date_columns.len());
        for &(idx, date) in &date_columns {
            let value = parse_count(field(idx)).map_err(|v| {
                unavailable(format!("row {} column {date}: bad count '{v}'", line + 1))
            })?;
            values.push(value);
        }

        rows.push(WideRow {
            state: field(state_idx).to_string(),
            county: field(county_idx).to_string(),
            population,
            values,
        });
    }

    Ok(WideTable {
        metric,
        dates: date_columns.into_iter().map(|(_, d)| d).collect(),
        rows,
    })
}

/// Empty cells are missing; whole-valued floats (`"12.0"`) are accepted if
/// they fit in an `i64`.
fn parse_count(cell: &str) -> std::result::Result<Option<i64>, String> {
    if cell.is_empty() {
        return Ok(None);
    }
    if let Ok(v) = cell.parse::<i64>() {
        return Ok(Some(v));
    }
    // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
    match cell.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 => {
            Ok(Some(v as i64))
        }
        _ => Err(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CASES: &str = "\
UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,1/22/20,1/23/20
84001001,US,USA,840,1001.0,Autauga,Alabama,US,32.5,-86.6,\"Autauga, Alabama, US\",0,1
84001003,US,USA,840,1003.0,Baldwin,Alabama,US,30.7,-87.7,\"Baldwin, Alabama, US\",2,
";

    const DEATHS: &str = "\
UID,iso2,iso3,code3,FIPS,Admin2,Province_State,Country_Region,Lat,Long_,Combined_Key,Population,1/22/20,1/23/20
84001001,US,USA,840,1001.0,Autauga,Alabama,US,32.5,-86.6,\"Autauga, Alabama, US\",55869,0,0
";

    #[test]
    fn test_parse_cases_table() {
        let table = parse_table(CASES.as_bytes(), Metric::Cases).unwrap();

        assert_eq!(
            table.dates,
            vec![
                NaiveDate::from_ymd_opt(2020, 1, 22).unwrap(),
                NaiveDate::from_ymd_opt(2020, 1, 23).unwrap()
            ]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].state, "Alabama");
        assert_eq!(table.rows[0].county, "Autauga");
        assert_eq!(table.rows[0].population, None);
        assert_eq!(table.rows[0].values, vec![Some(0), Some(1)]);
        assert_eq!(table.rows[1].values, vec![Some(2), None]);
    }

    #[test]
    fn test_parse_deaths_table_reads_population() {
        let table = parse_table(DEATHS.as_bytes(), Metric::Deaths).unwrap();
        assert_eq!(table.rows[0].population, Some(55869));
    }

    #[test]
    fn test_deaths_table_requires_population() {
        let result = parse_table(CASES.as_bytes(), Metric::Deaths);
        assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
    }

    #[test]
    fn test_missing_state_column() {
        let csv = "Admin2,1/22/20\nAutauga,1\n";
        let result = parse_table(csv.as_bytes(), Metric::Cases);
        assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
    }

    #[test]
    fn test_no_date_columns() {
        let csv = "Admin2,Province_State\nAutauga,Alabama\n";
        let result = parse_table(csv.as_bytes(), Metric::Cases);
        assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
    }

    #[test]
    fn test_non_numeric_cell() {
        let csv = "Admin2,Province_State,1/22/20\nAutauga,Alabama,lots\n";
        let result = parse_table(csv.as_bytes(), Metric::Cases);
        assert!(matches!(result, Err(PipelineError::DataUnavailable(_))));
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(""), Ok(None));
        assert_eq!(parse_count("17"), Ok(Some(17)));
        assert_eq!(parse_count("17.0"), Ok(Some(17)));
        assert!(parse_count("17.5").is_err());
        assert_eq!(parse_count("1e3"), Ok(Some(1000)));
        assert!(parse_count("1e30").is_err());
        assert!(parse_count("-1e30").is_err());
        assert!(parse_count("9223372036854775808").is_err());
        assert!(parse_count("inf").is_err());
    }
}
