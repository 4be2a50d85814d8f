use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;

/// Paths and constants shared by both stages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub treated_table: PathBuf,
    pub control_table: PathBuf,
    pub latex_table: PathBuf,
    pub revenue_figure: PathBuf,
    pub log_gap_figure: PathBuf,
    /// Day paid search was switched off in the treated DMAs.
    pub intervention_date: NaiveDate,
}

/// Day paid search was switched off in the treated DMAs.
const INTERVENTION_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2012, 5, 22) {
    Some(date) => date,
    None => panic!("invalid intervention date"),
};

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("input/PaidSearch.csv"),
            treated_table: PathBuf::from("temp/treated_pivot.csv"),
            control_table: PathBuf::from("temp/untreated_pivot.csv"),
            latex_table: PathBuf::from("output/tables/did_table.tex"),
            revenue_figure: PathBuf::from("output/figures/figure_5_2.svg"),
            log_gap_figure: PathBuf::from("output/figures/figure_5_3.svg"),
            intervention_date: INTERVENTION_DATE,
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid with the TOML file when one is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(?config, "loaded config");
        Ok(config)
    }

    pub fn with_input(mut self, input: Option<PathBuf>) -> Self {
        if let Some(input) = input {
            self.input = input;
        }
        self
    }

    /// Moves both intermediate tables into `dir`, keeping their file names.
    pub fn with_temp_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.treated_table = rebase(&dir, &self.treated_table);
            self.control_table = rebase(&dir, &self.control_table);
        }
        self
    }

    /// Moves the table and figures under `dir` as `tables/` and `figures/`.
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.latex_table = rebase(&dir.join("tables"), &self.latex_table);
            self.revenue_figure = rebase(&dir.join("figures"), &self.revenue_figure);
            self.log_gap_figure = rebase(&dir.join("figures"), &self.log_gap_figure);
        }
        self
    }
}

fn rebase(dir: &Path, path: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => dir.join(name),
        None => dir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_layout() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.input, PathBuf::from("input/PaidSearch.csv"));
        assert_eq!(config.control_table, PathBuf::from("temp/untreated_pivot.csv"));
        assert_eq!(
            config.intervention_date,
            NaiveDate::from_ymd_opt(2012, 5, 22).unwrap()
        );
    }

    #[test]
    fn toml_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("did.toml");
        std::fs::write(
            &path,
            "input = \"data/panel.csv\"\nintervention_date = \"2012-06-01\"\n",
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.input, PathBuf::from("data/panel.csv"));
        assert_eq!(
            config.intervention_date,
            NaiveDate::from_ymd_opt(2012, 6, 1).unwrap()
        );
        assert_eq!(config.latex_table, PipelineConfig::default().latex_table);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("did.toml");
        std::fs::write(&path, "inptu = \"typo.csv\"\n").unwrap();
        assert!(PipelineConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn directory_overrides_keep_file_names() {
        let config = PipelineConfig::default()
            .with_input(Some(PathBuf::from("panel.csv")))
            .with_temp_dir(Some(PathBuf::from("/tmp/did")))
            .with_output_dir(Some(PathBuf::from("out")))
            .with_output_dir(None);
        assert_eq!(config.input, PathBuf::from("panel.csv"));
        assert_eq!(config.treated_table, PathBuf::from("/tmp/did/treated_pivot.csv"));
        assert_eq!(config.latex_table, PathBuf::from("out/tables/did_table.tex"));
        assert_eq!(config.log_gap_figure, PathBuf::from("out/figures/figure_5_3.svg"));
    }
}
