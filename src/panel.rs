use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::models::{Observation, PERIOD_POST, PERIOD_PRE};

#[derive(Deserialize)]
struct CsvRow {
    date: String,
    #[serde(alias = "unit_id")]
    dma: String,
    #[serde(alias = "outcome", deserialize_with = "csv::invalid_option")]
    revenue: Option<f64>,
    #[serde(alias = "group_flag", deserialize_with = "flag")]
    search_stays_on: bool,
    #[serde(alias = "period_flag", deserialize_with = "period")]
    treatment_period: i64,
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(true),
        "0" | "0.0" | "false" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a 0/1 flag, found {other:?}"
        ))),
    }
}

/// Boolean-like flags map onto the two periods; any other integer is kept so
/// aggregation can report it.
fn period<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(PERIOD_POST),
        "0" | "0.0" | "false" => Ok(PERIOD_PRE),
        other => other.parse::<i64>().map_err(|_| {
            serde::de::Error::custom(format!("expected a period flag, found {other:?}"))
        }),
    }
}

/// Accepts `2012-04-01` as well as `2012-04-01 00:00:00` / `2012-04-01T00:00:00`.
pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    let trimmed = raw.trim();
    let day = trimmed
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(trimmed);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").with_context(|| format!("invalid date {raw:?}"))
}

pub fn load_observations(path: &Path) -> anyhow::Result<Vec<Observation>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open panel {}", path.display()))?;
    let observations =
        read_observations(file).with_context(|| format!("failed to read {}", path.display()))?;
    tracing::info!(rows = observations.len(), path = %path.display(), "loaded panel");
    Ok(observations)
}

pub fn read_observations<R: Read>(source: R) -> anyhow::Result<Vec<Observation>> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(source);
    let headers = reader.headers()?.clone();
    let mut observations = Vec::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: CsvRow = record
            .deserialize(Some(&headers))
            .with_context(|| format!("malformed row on line {line}"))?;
        let date = parse_date(&row.date).with_context(|| format!("on line {line}"))?;

        observations.push(Observation {
            line,
            date,
            unit: row.dma,
            outcome: row.revenue,
            keeps_search: row.search_stays_on,
            period: row.treatment_period,
        });
    }

    if observations.is_empty() {
        bail!("panel has no rows");
    }

    Ok(observations)
}
