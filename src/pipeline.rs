use std::path::Path;

use anyhow::Context;

use crate::aggregate;
use crate::artifacts::{self, StagedOutputs};
use crate::config::PipelineConfig;
use crate::estimator;
use crate::models::{DidEstimate, Group, Observation, PanelOverview};
use crate::panel;
use crate::plot;
use crate::report;

/// Stage A from already-loaded observations. Tables and figures are staged
/// together and committed at the end, so a failure leaves no Stage A output.
pub fn preprocess(observations: &[Observation], config: &PipelineConfig) -> anyhow::Result<PanelOverview> {
    let overview = aggregate::panel_overview(observations).context("panel has no rows")?;
    let (treated, control) = aggregate::split_and_aggregate(observations)?;
    let days = aggregate::daily_group_means(observations)?;
    let gap = aggregate::log_gap_series(&days);

    let revenue_chart = plot::revenue_by_group_chart(&days, config.intervention_date);
    let gap_chart = plot::log_gap_chart(&gap, config.intervention_date);

    let mut outputs = StagedOutputs::default();
    artifacts::stage_group_table(&mut outputs, &config.treated_table, &treated)?;
    artifacts::stage_group_table(&mut outputs, &config.control_table, &control)?;
    plot::stage_chart(&mut outputs, &config.revenue_figure, &revenue_chart)?;
    plot::stage_chart(&mut outputs, &config.log_gap_figure, &gap_chart)?;
    outputs.commit()?;

    Ok(overview)
}

pub fn run_preprocess(config: &PipelineConfig) -> anyhow::Result<PanelOverview> {
    let observations = panel::load_observations(&config.input)?;
    preprocess(&observations, config)
}

/// Stage B: reads both tables, then writes the LaTeX table and, if asked,
/// the JSON export. Either both outputs land or neither does.
pub fn run_estimate(config: &PipelineConfig, json: Option<&Path>) -> anyhow::Result<DidEstimate> {
    let treated = artifacts::read_group_table(&config.treated_table, Group::Treated)?;
    let control = artifacts::read_group_table(&config.control_table, Group::Control)?;
    let estimate = estimator::estimate_from_tables(&treated, &control)?;
    tracing::info!(
        gamma_hat = estimate.gamma_hat,
        std_error = estimate.std_error,
        n_treated = estimate.n_treated,
        n_control = estimate.n_control,
        "estimated effect"
    );

    let mut outputs = StagedOutputs::default();
    report::stage_latex_table(&mut outputs, &config.latex_table, &estimate)?;
    if let Some(path) = json {
        stage_estimate_json(&mut outputs, path, &estimate)?;
    }
    outputs.commit()?;
    Ok(estimate)
}

pub fn stage_estimate_json(
    outputs: &mut StagedOutputs,
    path: &Path,
    estimate: &DidEstimate,
) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(estimate)?;
    outputs.stage(path, &json)
}
