use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Experimental arm a DMA belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    /// Paid search switched off after the intervention date.
    Treated,
    /// Paid search stays on for the whole window.
    Control,
}

impl Group {
    pub fn from_keeps_search(keeps_search: bool) -> Self {
        if keeps_search {
            Group::Control
        } else {
            Group::Treated
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Group::Treated => "treated",
            Group::Control => "control",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw period flag for observations before the intervention.
pub const PERIOD_PRE: i64 = 0;
/// Raw period flag for observations after the intervention.
pub const PERIOD_POST: i64 = 1;

#[derive(Debug, Clone)]
pub struct Observation {
    /// 1-based line in the source file, header included.
    pub line: u64,
    pub date: NaiveDate,
    pub unit: String,
    pub outcome: Option<f64>,
    pub keeps_search: bool,
    pub period: i64,
}

impl Observation {
    pub fn group(&self) -> Group {
        Group::from_keeps_search(self.keeps_search)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitSummary {
    pub unit: String,
    pub log_outcome_pre: Option<f64>,
    pub log_outcome_post: Option<f64>,
    pub log_outcome_diff: Option<f64>,
}

impl UnitSummary {
    pub fn new(unit: String, pre: Option<f64>, post: Option<f64>) -> Self {
        let diff = match (pre, post) {
            (Some(pre), Some(post)) => Some(post - pre),
            _ => None,
        };
        Self {
            unit,
            log_outcome_pre: pre,
            log_outcome_post: post,
            log_outcome_diff: diff,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub group: Group,
    pub units: Vec<UnitSummary>,
}

impl GroupSummary {
    /// Units with both periods observed.
    pub fn complete_units(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.log_outcome_diff.is_some())
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DidEstimate {
    pub gamma_hat: f64,
    pub std_error: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub n_treated: usize,
    pub n_control: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelOverview {
    pub treated_units: usize,
    pub control_units: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyGroupMeans {
    pub date: NaiveDate,
    pub treated_revenue: Option<f64>,
    pub control_revenue: Option<f64>,
    pub treated_log_revenue: Option<f64>,
    pub control_log_revenue: Option<f64>,
}
