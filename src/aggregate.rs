use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::error::{PipelineError, Result};
use crate::models::{
    DailyGroupMeans, Group, GroupSummary, Observation, PanelOverview, UnitSummary, PERIOD_POST,
    PERIOD_PRE,
};

#[derive(Debug, Default, Clone, Copy)]
struct Running {
    sum: f64,
    count: usize,
}

impl Running {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Natural log of a strictly positive, finite revenue.
pub fn log_outcome(observation: &Observation) -> Result<f64> {
    match observation.outcome {
        Some(value) if value > 0.0 && value.is_finite() => Ok(value.ln()),
        value => Err(PipelineError::InvalidOutcome {
            line: observation.line,
            unit: observation.unit.clone(),
            value,
        }),
    }
}

/// Collapses one arm of the panel into per-DMA pre/post log revenue means.
pub fn aggregate_group(observations: &[Observation], group: Group) -> Result<GroupSummary> {
    let mut cells: BTreeMap<(&str, i64), Running> = BTreeMap::new();
    let mut periods: BTreeSet<i64> = BTreeSet::new();

    for obs in observations.iter().filter(|o| o.group() == group) {
        let log_value = log_outcome(obs)?;
        cells
            .entry((obs.unit.as_str(), obs.period))
            .or_default()
            .add(log_value);
        periods.insert(obs.period);
    }

    if periods != BTreeSet::from([PERIOD_PRE, PERIOD_POST]) {
        return Err(PipelineError::MalformedPeriod {
            group,
            values: periods.into_iter().collect(),
        });
    }

    let mut pivot: BTreeMap<&str, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for ((unit, period), running) in cells {
        let entry = pivot.entry(unit).or_default();
        if period == PERIOD_PRE {
            entry.0 = running.mean();
        } else {
            entry.1 = running.mean();
        }
    }

    let units: Vec<UnitSummary> = pivot
        .into_iter()
        .map(|(unit, (pre, post))| UnitSummary::new(unit.to_string(), pre, post))
        .collect();

    let summary = GroupSummary { group, units };
    tracing::debug!(
        %group,
        units = summary.units.len(),
        complete = summary.complete_units(),
        "aggregated group"
    );
    Ok(summary)
}

/// Returns `(treated, control)` summaries.
pub fn split_and_aggregate(observations: &[Observation]) -> Result<(GroupSummary, GroupSummary)> {
    let treated = aggregate_group(observations, Group::Treated)?;
    let control = aggregate_group(observations, Group::Control)?;
    Ok((treated, control))
}

pub fn panel_overview(observations: &[Observation]) -> Option<PanelOverview> {
    let start_date = observations.iter().map(|o| o.date).min()?;
    let end_date = observations.iter().map(|o| o.date).max()?;

    let mut treated: HashSet<&str> = HashSet::new();
    let mut control: HashSet<&str> = HashSet::new();
    for obs in observations {
        match obs.group() {
            Group::Treated => treated.insert(obs.unit.as_str()),
            Group::Control => control.insert(obs.unit.as_str()),
        };
    }

    Some(PanelOverview {
        treated_units: treated.len(),
        control_units: control.len(),
        start_date,
        end_date,
    })
}

/// Mean raw and log revenue per date and arm, ordered by date.
pub fn daily_group_means(observations: &[Observation]) -> Result<Vec<DailyGroupMeans>> {
    let mut cells: BTreeMap<(NaiveDate, Group), (Running, Running)> = BTreeMap::new();

    for obs in observations {
        let log_value = log_outcome(obs)?;
        let (raw, log) = cells.entry((obs.date, obs.group())).or_default();
        raw.add(obs.outcome.unwrap_or_default());
        log.add(log_value);
    }

    let mut days: BTreeMap<NaiveDate, DailyGroupMeans> = BTreeMap::new();
    for ((date, group), (raw, log)) in cells {
        let day = days.entry(date).or_insert_with(|| DailyGroupMeans {
            date,
            treated_revenue: None,
            control_revenue: None,
            treated_log_revenue: None,
            control_log_revenue: None,
        });
        match group {
            Group::Treated => {
                day.treated_revenue = raw.mean();
                day.treated_log_revenue = log.mean();
            }
            Group::Control => {
                day.control_revenue = raw.mean();
                day.control_log_revenue = log.mean();
            }
        }
    }

    Ok(days.into_values().collect())
}

/// Control minus treated mean log revenue per date; NaN where only one arm
/// was observed, so plots break the line instead of bridging the gap.
pub fn log_gap_series(days: &[DailyGroupMeans]) -> Vec<(NaiveDate, f64)> {
    days.iter()
        .map(|d| match (d.control_log_revenue, d.treated_log_revenue) {
            (Some(control), Some(treated)) => (d.date, control - treated),
            _ => (d.date, f64::NAN),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(day: u32, unit: &str, revenue: f64, keeps_search: bool, period: i64) -> Observation {
        Observation {
            line: day as u64 + 1,
            date: NaiveDate::from_ymd_opt(2012, 5, day).unwrap(),
            unit: unit.to_string(),
            outcome: Some(revenue),
            keeps_search,
            period,
        }
    }

    fn sample_panel() -> Vec<Observation> {
        vec![
            obs(1, "a", 100.0, false, 0),
            obs(2, "a", 400.0, false, 0),
            obs(25, "a", 200.0, false, 1),
            obs(1, "b", 50.0, false, 0),
            obs(25, "b", 50.0, false, 1),
            obs(1, "c", 10.0, true, 0),
            obs(25, "c", 30.0, true, 1),
            obs(1, "d", 20.0, true, 0),
            obs(25, "d", 20.0, true, 1),
        ]
    }

    #[test]
    fn averages_logs_per_unit_and_period() {
        let (treated, control) = split_and_aggregate(&sample_panel()).unwrap();
        assert_eq!(treated.group, Group::Treated);
        assert_eq!(treated.units.len(), 2);

        let a = &treated.units[0];
        assert_eq!(a.unit, "a");
        let pre = (100.0_f64.ln() + 400.0_f64.ln()) / 2.0;
        assert!((a.log_outcome_pre.unwrap() - pre).abs() < 1e-12);
        assert!((a.log_outcome_diff.unwrap() - (200.0_f64.ln() - pre)).abs() < 1e-12);
        assert!(a.log_outcome_diff.unwrap().abs() < 1e-12);

        assert_eq!(control.units.len(), 2);
        let c = &control.units[0];
        assert!((c.log_outcome_diff.unwrap() - 3.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn unit_missing_post_keeps_empty_diff() {
        let mut panel = sample_panel();
        panel.push(obs(2, "e", 70.0, false, 0));
        let (treated, _) = split_and_aggregate(&panel).unwrap();
        let e = treated.units.iter().find(|u| u.unit == "e").unwrap();
        assert!(e.log_outcome_pre.is_some());
        assert_eq!(e.log_outcome_post, None);
        assert_eq!(e.log_outcome_diff, None);
        assert_eq!(treated.complete_units(), 2);
    }

    #[test]
    fn non_positive_revenue_fails_fast() {
        let mut panel = sample_panel();
        panel.push(obs(3, "b", 0.0, false, 0));
        let err = split_and_aggregate(&panel).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidOutcome { line: 4, ref unit, value: Some(v) } if unit == "b" && v == 0.0
        ));

        let mut missing = sample_panel();
        missing[6].outcome = None;
        assert!(matches!(
            split_and_aggregate(&missing).unwrap_err(),
            PipelineError::InvalidOutcome { value: None, .. }
        ));
    }

    #[test]
    fn period_flags_must_be_binary() {
        let mut panel = sample_panel();
        panel.push(obs(28, "c", 15.0, true, 2));
        let err = split_and_aggregate(&panel).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MalformedPeriod { group: Group::Control, ref values } if values == &[0_i64, 1, 2]
        ));

        let pre_only: Vec<Observation> =
            sample_panel().into_iter().filter(|o| o.period == 0).collect();
        assert!(matches!(
            aggregate_group(&pre_only, Group::Treated).unwrap_err(),
            PipelineError::MalformedPeriod { ref values, .. } if values == &[0_i64]
        ));
    }

    #[test]
    fn non_binary_control_periods_are_malformed() {
        let panel: Vec<Observation> = sample_panel()
            .into_iter()
            .map(|mut o| {
                if o.keeps_search && o.period == 1 {
                    o.period = 2;
                }
                o
            })
            .collect();
        assert!(aggregate_group(&panel, Group::Treated).is_ok());
        assert!(matches!(
            split_and_aggregate(&panel).unwrap_err(),
            PipelineError::MalformedPeriod { group: Group::Control, ref values } if values == &[0_i64, 2]
        ));
    }

    #[test]
    fn empty_group_is_malformed() {
        let treated_only: Vec<Observation> =
            sample_panel().into_iter().filter(|o| !o.keeps_search).collect();
        assert!(matches!(
            aggregate_group(&treated_only, Group::Control).unwrap_err(),
            PipelineError::MalformedPeriod { ref values, .. } if values.is_empty()
        ));
    }

    #[test]
    fn overview_counts_units_and_dates() {
        let overview = panel_overview(&sample_panel()).unwrap();
        assert_eq!(overview.treated_units, 2);
        assert_eq!(overview.control_units, 2);
        assert_eq!(overview.start_date, NaiveDate::from_ymd_opt(2012, 5, 1).unwrap());
        assert_eq!(overview.end_date, NaiveDate::from_ymd_opt(2012, 5, 25).unwrap());
        assert!(panel_overview(&[]).is_none());
    }

    #[test]
    fn daily_means_and_gap() {
        let days = daily_group_means(&sample_panel()).unwrap();
        assert_eq!(days.len(), 3);

        let first = &days[0];
        assert_eq!(first.treated_revenue, Some(75.0));
        assert_eq!(first.control_revenue, Some(15.0));

        let second = &days[1];
        assert_eq!(second.control_revenue, None);

        let gap = log_gap_series(&days);
        assert_eq!(gap.len(), 3);
        let expected = (10.0_f64.ln() + 20.0_f64.ln()) / 2.0 - (100.0_f64.ln() + 50.0_f64.ln()) / 2.0;
        assert!((gap[0].1 - expected).abs() < 1e-12);
        assert_eq!(gap[1].0, NaiveDate::from_ymd_opt(2012, 5, 2).unwrap());
        assert!(gap[1].1.is_nan());
        assert_eq!(gap[2].0, NaiveDate::from_ymd_opt(2012, 5, 25).unwrap());
        assert!(gap[2].1.is_finite());
    }
}
