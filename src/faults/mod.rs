// One fault model per trial, built from a FaultModelConfig and owned by the relay.

pub mod identity;
pub mod radius;
pub mod delay;
pub mod latency;
pub mod noise;
pub mod intermittent;

use crate::agent::AgentId;
use crate::error::ConfigError;
use crate::geometry::VehicleFootprint;
use crate::perception::{Obstacle, ObstacleMap};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// When the relay hands a computed snapshot to its receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delivery {
    Immediate,
    // Whole tick's cohort held this long, then published together
    Cohort(Duration),
    // FIFO worker waits this long before every publish
    Queued(Duration),
}

pub trait FaultModel: Send + Sync + fmt::Debug {
    // Called once per tick before any receiver is served. Whatever it returns
    // is what every receiver's perceive sees as the agent map for that tick.
    fn prepare(&mut self, agents: ObstacleMap) -> ObstacleMap {
        agents
    }

    fn perceive(&mut self, receiver: AgentId, agents: &ObstacleMap, non_agent: &[Obstacle]) -> Vec<Obstacle>;

    fn delivery(&self) -> Delivery {
        Delivery::Immediate
    }

    fn name(&self) -> &str;
}

// Every agent obstacle except the receiver's own
pub(crate) fn others<'a>(receiver: AgentId, agents: &'a ObstacleMap) -> impl Iterator<Item = &'a Obstacle> + 'a {
    agents.iter().filter(move |(id, _)| **id != receiver).map(|(_, o)| o)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaultModelConfig {
    Identity,
    Radius {
        radius: f64,
    },
    Delay {
        delay_secs: f64,
    },
    Latency {
        latency_secs: f64,
    },
    Noise {
        position: f64,
        heading: f64,
        velocity: f64,
        acceleration: f64,
    },
    Drop {
        probability: f64,
    },
}

impl Default for FaultModelConfig {
    fn default() -> Self {
        Self::Identity
    }
}

impl FaultModelConfig {
    pub const TAGS: [&'static str; 6] = ["identity", "radius", "delay", "latency", "noise", "drop"];

    // Noise takes either all four sigmas or a single position sigma
    pub fn from_tag(tag: &str, params: &[f64]) -> Result<Self, ConfigError> {
        let tag = tag.trim().to_lowercase();
        let expect = |n: usize| {
            if params.len() == n {
                Ok(())
            } else {
                Err(ConfigError::ParameterCount {
                    tag: tag.clone(),
                    expected: n,
                    got: params.len(),
                })
            }
        };

        let config = match tag.as_str() {
            "identity" | "none" => {
                expect(0)?;
                Self::Identity
            }
            "radius" => {
                expect(1)?;
                Self::Radius { radius: params[0] }
            }
            "delay" => {
                expect(1)?;
                Self::Delay { delay_secs: params[0] }
            }
            "latency" => {
                expect(1)?;
                Self::Latency { latency_secs: params[0] }
            }
            "noise" => match params {
                [position] => Self::Noise {
                    position: *position,
                    heading: 0.0,
                    velocity: 0.0,
                    acceleration: 0.0,
                },
                [position, heading, velocity, acceleration] => Self::Noise {
                    position: *position,
                    heading: *heading,
                    velocity: *velocity,
                    acceleration: *acceleration,
                },
                _ => {
                    return Err(ConfigError::ParameterCount {
                        tag,
                        expected: 4,
                        got: params.len(),
                    });
                }
            },
            "drop" | "intermittent" => {
                expect(1)?;
                Self::Drop { probability: params[0] }
            }
            _ => return Err(ConfigError::UnknownFaultModel(tag)),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Radius { .. } => "radius",
            Self::Delay { .. } => "delay",
            Self::Latency { .. } => "latency",
            Self::Noise { .. } => "noise",
            Self::Drop { .. } => "drop",
        }
    }

    pub fn params(&self) -> Vec<f64> {
        match *self {
            Self::Identity => vec![],
            Self::Radius { radius } => vec![radius],
            Self::Delay { delay_secs } => vec![delay_secs],
            Self::Latency { latency_secs } => vec![latency_secs],
            Self::Noise {
                position,
                heading,
                velocity,
                acceleration,
            } => vec![position, heading, velocity, acceleration],
            Self::Drop { probability } => vec![probability],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Identity => Ok(()),
            Self::Radius { radius } => {
                if radius.is_nan() || radius < 0.0 {
                    Err(ConfigError::NonNegative { name: "radius", value: radius })
                } else {
                    Ok(())
                }
            }
            Self::Delay { delay_secs } => ConfigError::duration("delay", delay_secs).map(|_| ()),
            Self::Latency { latency_secs } => ConfigError::duration("latency", latency_secs).map(|_| ()),
            Self::Noise {
                position,
                heading,
                velocity,
                acceleration,
            } => {
                ConfigError::check_non_negative("position sigma", position)?;
                ConfigError::check_non_negative("heading sigma", heading)?;
                ConfigError::check_non_negative("velocity sigma", velocity)?;
                ConfigError::check_non_negative("acceleration sigma", acceleration)
            }
            Self::Drop { probability } => {
                if (0.0..=1.0).contains(&probability) {
                    Ok(())
                } else {
                    Err(ConfigError::Probability(probability))
                }
            }
        }
    }

    pub fn build(&self, vehicle: VehicleFootprint, seed: Option<u64>) -> Result<Box<dyn FaultModel>, ConfigError> {
        self.validate()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let model: Box<dyn FaultModel> = match *self {
            Self::Identity => Box::new(identity::Identity),
            Self::Radius { radius } => Box::new(radius::RadiusCutoff::new(radius)),
            Self::Delay { delay_secs } => Box::new(delay::FixedDelay::new(ConfigError::duration("delay", delay_secs)?)),
            Self::Latency { latency_secs } => {
                Box::new(latency::QueuedLatency::new(ConfigError::duration("latency", latency_secs)?))
            }
            Self::Noise {
                position,
                heading,
                velocity,
                acceleration,
            } => Box::new(noise::GaussianNoise::new(
                noise::NoiseSigmas {
                    position,
                    heading,
                    velocity,
                    acceleration,
                },
                vehicle,
                rng,
            )?),
            Self::Drop { probability } => Box::new(intermittent::BernoulliDrop::new(probability, rng)),
        };
        Ok(model)
    }

    pub fn with_param(&self, value: f64) -> Self {
        match *self {
            Self::Identity => Self::Identity,
            Self::Radius { .. } => Self::Radius { radius: value },
            Self::Delay { .. } => Self::Delay { delay_secs: value },
            Self::Latency { .. } => Self::Latency { latency_secs: value },
            Self::Noise {
                heading,
                velocity,
                acceleration,
                ..
            } => Self::Noise {
                position: value,
                heading,
                velocity,
                acceleration,
            },
            Self::Drop { .. } => Self::Drop { probability: value },
        }
    }

    // Parameter values a robustness sweep walks through
    pub fn default_sweep(tag: &str) -> Option<Vec<f64>> {
        let values = match tag {
            "radius" => vec![100.0, 80.0, 60.0, 40.0, 20.0, 10.0, 5.0],
            "delay" | "latency" => vec![0.2, 0.4, 0.8, 1.0],
            "noise" => vec![0.5, 1.0, 2.0, 4.0, 6.0, 8.0, 10.0],
            "drop" | "intermittent" => vec![0.05, 0.1, 0.15, 0.2, 0.25, 0.5],
            _ => return None,
        };
        Some(values)
    }
}

impl fmt::Display for FaultModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self.params();
        if params.is_empty() {
            write!(f, "{}", self.tag())
        } else {
            let joined: Vec<String> = params.iter().map(|p| p.to_string()).collect();
            write!(f, "{}({})", self.tag(), joined.join(", "))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::geometry::Vec3;

    pub fn vehicle() -> VehicleFootprint {
        VehicleFootprint::centered(5.0, 2.0, 1.5)
    }

    pub fn agent_at(id: u32, x: f64, y: f64) -> (AgentId, Obstacle) {
        let id = AgentId(id);
        let obs = Obstacle::vehicle(id, &vehicle(), Vec3::planar(x, y), 0.0, Vec3::planar(1.0, 0.5), Vec3::planar(0.1, 0.0), 3.0);
        (id, obs)
    }

    pub fn line_of_agents(n: u32, spacing: f64) -> ObstacleMap {
        (0..n).map(|i| agent_at(i + 1, i as f64 * spacing, 0.0)).collect()
    }
}
