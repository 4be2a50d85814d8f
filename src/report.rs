use std::fmt::Write;
use std::path::Path;

use crate::artifacts::StagedOutputs;
use crate::models::{DidEstimate, PanelOverview};

pub const TABLE_CAPTION: &str =
    "Difference-in-Differences Estimate of the Effect of Paid Search on Revenue";
pub const TABLE_LABEL: &str = "tab:did";

pub fn overview_summary(overview: &PanelOverview) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Treated DMAs: {}", overview.treated_units);
    let _ = writeln!(output, "Untreated DMAs: {}", overview.control_units);
    let _ = writeln!(
        output,
        "Date range: {} to {}",
        overview.start_date, overview.end_date
    );
    output
}

pub fn estimate_summary(estimate: &DidEstimate) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "DID Results (Log Scale)");
    let _ = writeln!(output, "=======================");
    let _ = writeln!(output, "Gamma hat: {:.4}", estimate.gamma_hat);
    let _ = writeln!(output, "Std Error: {:.4}", estimate.std_error);
    let _ = writeln!(
        output,
        "95% CI: [{:.4}, {:.4}]",
        estimate.ci_lower, estimate.ci_upper
    );
    output
}

pub fn render_latex_table(estimate: &DidEstimate) -> String {
    let mut output = String::new();
    let _ = writeln!(output, r"\begin{{table}}[h]");
    let _ = writeln!(output, r"\centering");
    let _ = writeln!(output, r"\caption{{{TABLE_CAPTION}}}");
    let _ = writeln!(output, r"\begin{{tabular}}{{lc}}");
    let _ = writeln!(output, r"\hline");
    let _ = writeln!(output, r"& Log Scale \\");
    let _ = writeln!(output, r"\hline");
    let _ = writeln!(
        output,
        r"Point Estimate ($\hat{{\gamma}}$) & ${:.4}$ \\",
        estimate.gamma_hat
    );
    let _ = writeln!(output, r"Standard Error & ${:.4}$ \\", estimate.std_error);
    let _ = writeln!(
        output,
        r"95\% CI & $[{:.4}, \; {:.4}]$ \\",
        estimate.ci_lower, estimate.ci_upper
    );
    let _ = writeln!(output, r"\hline");
    let _ = writeln!(output, r"\end{{tabular}}");
    let _ = writeln!(output, r"\label{{{TABLE_LABEL}}}");
    let _ = write!(output, r"\end{{table}}");
    output
}

pub fn stage_latex_table(
    outputs: &mut StagedOutputs,
    path: &Path,
    estimate: &DidEstimate,
) -> anyhow::Result<()> {
    outputs.stage(path, render_latex_table(estimate).as_bytes())?;
    tracing::debug!(path = %path.display(), "staged results table");
    Ok(())
}
