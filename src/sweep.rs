use crate::config::TrialConfig;
use crate::error::{ConfigError, TrialResult};
use crate::faults::FaultModelConfig;
use crate::report::{SweepLogger, SweepRow, save_trial};
use crate::scenario::ScenarioSpec;
use crate::trial::{TrialCoordinator, TrialOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub scenario: String,
    pub mode: String,
    pub source_dist: f64,
    pub rows: Vec<SweepRow>,
    // Largest and smallest follow-up difference from the source
    pub max_diff: f64,
    pub min_diff: f64,
}

pub struct Sweep {
    base: TrialConfig,
    family: FaultModelConfig,
    params: Vec<f64>,
    output: Option<PathBuf>,
    progress: ProgressBar,
}

impl Sweep {
    // params defaults to the family's standard sweep list. Every
    // follow-up configuration is validated here, before any trial runs
    pub fn new(base: TrialConfig, tag: &str, params: Option<Vec<f64>>) -> Result<Self, ConfigError> {
        base.validate()?;
        let tag = tag.trim().to_lowercase();
        let params = match params {
            Some(params) => params,
            None => FaultModelConfig::default_sweep(&tag).ok_or_else(|| ConfigError::UnknownFaultModel(tag.clone()))?,
        };
        let first = params.first().copied().unwrap_or(0.0);
        let family = FaultModelConfig::from_tag(&tag, &[first])?;
        for p in &params {
            family.with_param(*p).validate()?;
        }

        Ok(Self {
            base,
            family,
            params,
            output: None,
            progress: ProgressBar::hidden(),
        })
    }

    // Saves every trial's reports and the sweep CSV under dir
    pub fn with_output(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output = Some(dir.into());
        self
    }

    pub fn with_progress(mut self) -> Self {
        let pb = ProgressBar::new(self.params.len() as u64 + 1);
        if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("█▓░"));
        }
        self.progress = pb;
        self
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    // Parameter value recorded for the fault-free source run: an unlimited
    // radius for the radius family, zero for the others
    pub fn source_param(&self) -> f64 {
        match self.family {
            FaultModelConfig::Radius { .. } => f64::INFINITY,
            _ => 0.0,
        }
    }

    pub async fn run(&self, scenario: &ScenarioSpec) -> TrialResult<SweepSummary> {
        let mode = self.family.tag();
        info!("Sweep of {} over {:?} on scenario {}", mode, self.params, scenario.name);

        let mut logger = match &self.output {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Some(SweepLogger::new(dir.join("sweep.csv"))?)
            }
            None => None,
        };

        self.progress.set_message(format!("{} source", mode));
        let source_config = self
            .base
            .clone()
            .with_name(format!("{}_source", scenario.name))
            .with_fault(FaultModelConfig::Identity);
        let source = self.trial(scenario, &source_config, "source").await?;
        let source_dist = source.min_distances.overall();

        let mut rows = vec![SweepRow {
            scenario: scenario.name.clone(),
            mode: mode.to_string(),
            param: self.source_param(),
            dist: source_dist,
            diff: 0.0,
        }];

        for &param in &self.params {
            let fault = self.family.with_param(param);
            self.progress.set_message(fault.to_string());
            let config = self
                .base
                .clone()
                .with_name(format!("{}_{}_{}", scenario.name, mode, param))
                .with_fault(fault);
            let outcome = self.trial(scenario, &config, &format!("{}_{}", mode, param)).await?;
            let dist = outcome.min_distances.overall();
            let diff = difference(dist, source_dist);
            info!("{}: dist {:.3}, diff {:.2}", fault, dist, diff);

            rows.push(SweepRow {
                scenario: scenario.name.clone(),
                mode: mode.to_string(),
                param,
                dist,
                diff,
            });
        }
        self.progress.finish_with_message("sweep done");

        if let Some(logger) = logger.as_mut() {
            logger.log_batch(&rows)?;
        }

        let diffs = rows[1..].iter().map(|r| r.diff);
        let summary = SweepSummary {
            scenario: scenario.name.clone(),
            mode: mode.to_string(),
            source_dist,
            max_diff: diffs.clone().fold(f64::NEG_INFINITY, f64::max),
            min_diff: diffs.fold(f64::INFINITY, f64::min),
            rows,
        };
        info!(
            "Sweep {} finished: max diff {:.2}, min diff {:.2}",
            mode, summary.max_diff, summary.min_diff
        );
        Ok(summary)
    }

    async fn trial(&self, scenario: &ScenarioSpec, config: &TrialConfig, label: &str) -> TrialResult<TrialOutcome> {
        let outcome = TrialCoordinator::new(config.clone())?.run_scenario(scenario).await?;
        if let Some(dir) = &self.output {
            save_trial(dir.join(label), scenario, config, &outcome)?;
        }
        self.progress.inc(1);
        Ok(outcome)
    }
}

// Follow-up minus source, rounded to centimetres. Two runs that never
// observed any pair count as equal
fn difference(dist: f64, source: f64) -> f64 {
    if dist.is_infinite() && source.is_infinite() {
        return 0.0;
    }
    ((dist - source) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_rounds_to_two_decimals() {
        assert_eq!(difference(3.456, 1.0), 2.46);
        assert_eq!(difference(1.0, 1.004), 0.0);
        assert_eq!(difference(f64::INFINITY, f64::INFINITY), 0.0);
        assert!(difference(f64::INFINITY, 2.0).is_infinite());
    }

    #[test]
    fn uses_default_lists_and_validates_params() {
        let sweep = Sweep::new(TrialConfig::default(), "radius", None).unwrap();
        assert_eq!(sweep.params(), &[100.0, 80.0, 60.0, 40.0, 20.0, 10.0, 5.0]);
        assert!(sweep.source_param().is_infinite());

        let sweep = Sweep::new(TrialConfig::default(), "drop", None).unwrap();
        assert_eq!(sweep.source_param(), 0.0);

        assert!(matches!(
            Sweep::new(TrialConfig::default(), "drop", Some(vec![0.1, 1.2])),
            Err(ConfigError::Probability(_))
        ));
        assert!(matches!(
            Sweep::new(TrialConfig::default(), "teleport", None),
            Err(ConfigError::UnknownFaultModel(_))
        ));
    }
}
