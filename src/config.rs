use crate::clock::DEFAULT_STEP;
use crate::error::{ConfigError, TrialResult};
use crate::faults::FaultModelConfig;
use crate::geometry::VehicleFootprint;
use crate::relay::DEFAULT_TICK_RATE_HZ;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialConfig {
    pub name: String,
    pub horizon_secs: f64,
    pub tick_rate_hz: f64,
    pub clock_step_ms: u64,
    pub footprint: VehicleFootprint,
    pub fault: FaultModelConfig,
    // Fresh entropy when absent
    pub seed: Option<u64>,
    pub force_green: bool,
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            name: "default_trial".to_string(),
            horizon_secs: 30.0,
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            clock_step_ms: DEFAULT_STEP.as_millis() as u64,
            footprint: VehicleFootprint::default(),
            fault: FaultModelConfig::Identity,
            seed: None,
            force_green: false,
        }
    }
}

impl TrialConfig {
    pub fn from_file(path: impl AsRef<Path>) -> TrialResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_fault(mut self, fault: FaultModelConfig) -> Self {
        self.fault = fault;
        self
    }

    pub fn with_horizon(mut self, secs: f64) -> Self {
        self.horizon_secs = secs;
        self
    }

    pub fn with_tick_rate(mut self, hz: f64) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    pub fn with_footprint(mut self, footprint: VehicleFootprint) -> Self {
        self.footprint = footprint;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_force_green(mut self, force: bool) -> Self {
        self.force_green = force;
        self
    }

    pub fn clock_step(&self) -> Duration {
        Duration::from_millis(self.clock_step_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_positive("horizon", self.horizon_secs)?;
        ConfigError::tick_period(self.tick_rate_hz)?;
        if self.clock_step_ms == 0 {
            return Err(ConfigError::Positive {
                name: "clock step",
                value: 0.0,
            });
        }

        let f = &self.footprint;
        ConfigError::check_positive("footprint length", f.length)?;
        ConfigError::check_positive("footprint width", f.width)?;
        ConfigError::check_positive("footprint height", f.height)?;
        ConfigError::check_non_negative("footprint back edge", f.back_edge_to_center)?;
        if f.back_edge_to_center > f.length {
            return Err(ConfigError::NonNegative {
                name: "footprint front overhang",
                value: f.length - f.back_edge_to_center,
            });
        }

        self.fault.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = TrialConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_rate_hz, 25.0);
        assert_eq!(config.clock_step(), Duration::from_millis(100));
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(TrialConfig::default().with_horizon(0.0).validate().is_err());
        assert!(TrialConfig::default().with_tick_rate(-25.0).validate().is_err());
        assert!(TrialConfig::default()
            .with_footprint(VehicleFootprint {
                back_edge_to_center: 9.0,
                ..VehicleFootprint::default()
            })
            .validate()
            .is_err());
        assert!(matches!(
            TrialConfig::default().with_fault(FaultModelConfig::Drop { probability: 1.5 }).validate(),
            Err(ConfigError::Probability(_))
        ));
    }

    #[test]
    fn tick_rate_whose_period_overflows_is_rejected() {
        assert!(matches!(
            TrialConfig::default().with_tick_rate(1e-30).validate(),
            Err(ConfigError::Positive { name: "tick rate", .. })
        ));
        assert!(TrialConfig::default()
            .with_fault(FaultModelConfig::Delay { delay_secs: 1e20 })
            .validate()
            .is_err());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: TrialConfig =
            serde_json::from_str(r#"{"name": "noisy", "fault": {"kind": "noise", "position": 1.0, "heading": 0.0, "velocity": 0.0, "acceleration": 0.0}}"#)
                .unwrap();
        assert_eq!(config.name, "noisy");
        assert_eq!(config.horizon_secs, 30.0);
        assert_eq!(config.fault.tag(), "noise");
    }
}
