use crate::error::{PipelineError, Result};
use crate::models::{DidEstimate, Group, GroupSummary};

/// Two-sided 95% normal critical value.
pub const Z_95: f64 = 1.96;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance with Bessel's correction; `None` below two values.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let center = mean(values)?;
    let squares: f64 = values.iter().map(|v| (v - center).powi(2)).sum();
    Some(squares / (values.len() - 1) as f64)
}

/// Difference-in-differences estimate from per-unit log revenue changes.
pub fn estimate(treated_diffs: &[f64], control_diffs: &[f64]) -> Result<DidEstimate> {
    let (r1_bar, var_treated) = group_moments(Group::Treated, treated_diffs)?;
    let (r0_bar, var_control) = group_moments(Group::Control, control_diffs)?;

    let n1 = treated_diffs.len();
    let n0 = control_diffs.len();

    let gamma_hat = r1_bar - r0_bar;
    let std_error = (var_treated / n1 as f64 + var_control / n0 as f64).sqrt();
    let ci_lower = gamma_hat - Z_95 * std_error;
    let ci_upper = gamma_hat + Z_95 * std_error;

    if ![gamma_hat, std_error, ci_lower, ci_upper]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(PipelineError::NonFiniteEstimate);
    }

    Ok(DidEstimate {
        gamma_hat,
        std_error,
        ci_lower,
        ci_upper,
        n_treated: n1,
        n_control: n0,
    })
}

fn group_moments(group: Group, values: &[f64]) -> Result<(f64, f64)> {
    let insufficient = || PipelineError::InsufficientSample {
        group,
        units: values.len(),
    };
    let center = mean(values).ok_or_else(insufficient)?;
    let variance = sample_variance(values).ok_or_else(insufficient)?;
    Ok((center, variance))
}

/// Differences for units observed in both periods, in table order.
pub fn valid_diffs(summary: &GroupSummary) -> Vec<f64> {
    summary
        .units
        .iter()
        .filter_map(|u| u.log_outcome_diff)
        .collect()
}

pub fn estimate_from_tables(treated: &GroupSummary, control: &GroupSummary) -> Result<DidEstimate> {
    let treated_diffs = valid_diffs(treated);
    let control_diffs = valid_diffs(control);

    let excluded = treated.units.len() - treated_diffs.len() + control.units.len()
        - control_diffs.len();
    if excluded > 0 {
        tracing::warn!(excluded, "units missing a pre or post period were left out");
    }

    estimate(&treated_diffs, &control_diffs)
}
