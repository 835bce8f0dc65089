use super::{FaultModel, others};
use crate::agent::AgentId;
use crate::error::ConfigError;
use crate::geometry::{Vec3, VehicleFootprint};
use crate::perception::{Obstacle, ObstacleMap};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseSigmas {
    pub position: f64,
    pub heading: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

// Zero-mean Gaussian noise on planar pose and motion. One draw per sender per
// tick, shared by every receiver. Footprint is rebuilt from the noisy pose.
#[derive(Debug, Clone)]
pub struct GaussianNoise {
    position: Normal<f64>,
    heading: Normal<f64>,
    velocity: Normal<f64>,
    acceleration: Normal<f64>,
    sigmas: NoiseSigmas,
    vehicle: VehicleFootprint,
    rng: StdRng,
}

impl GaussianNoise {
    pub fn new(sigmas: NoiseSigmas, vehicle: VehicleFootprint, rng: StdRng) -> Result<Self, ConfigError> {
        let normal = |name: &'static str, sigma: f64| {
            Normal::new(0.0, sigma).map_err(|_| ConfigError::NonNegative { name, value: sigma })
        };
        Ok(Self {
            position: normal("position sigma", sigmas.position)?,
            heading: normal("heading sigma", sigmas.heading)?,
            velocity: normal("velocity sigma", sigmas.velocity)?,
            acceleration: normal("acceleration sigma", sigmas.acceleration)?,
            sigmas,
            vehicle,
            rng,
        })
    }

    fn jitter(rng: &mut StdRng, value: f64, dist: &Normal<f64>, sigma: f64) -> f64 {
        if sigma == 0.0 {
            return value;
        }
        value + dist.sample(rng)
    }

    fn jitter_planar(rng: &mut StdRng, v: Vec3, dist: &Normal<f64>, sigma: f64) -> Vec3 {
        Vec3 {
            x: Self::jitter(rng, v.x, dist, sigma),
            y: Self::jitter(rng, v.y, dist, sigma),
            z: v.z,
        }
    }

    fn perturb(&mut self, obs: &Obstacle) -> Obstacle {
        let rng = &mut self.rng;
        let position = Self::jitter_planar(rng, obs.position, &self.position, self.sigmas.position);
        let heading = Self::jitter(rng, obs.heading, &self.heading, self.sigmas.heading);
        let velocity = Self::jitter_planar(rng, obs.velocity, &self.velocity, self.sigmas.velocity);
        let acceleration = Self::jitter_planar(rng, obs.acceleration, &self.acceleration, self.sigmas.acceleration);

        Obstacle::vehicle(
            AgentId(obs.id),
            &self.vehicle,
            position,
            heading,
            velocity,
            acceleration,
            obs.timestamp,
        )
    }
}

impl FaultModel for GaussianNoise {
    fn prepare(&mut self, agents: ObstacleMap) -> ObstacleMap {
        agents.iter().map(|(id, obs)| (*id, self.perturb(obs))).collect()
    }

    fn perceive(&mut self, receiver: AgentId, agents: &ObstacleMap, non_agent: &[Obstacle]) -> Vec<Obstacle> {
        let mut seen: Vec<Obstacle> = others(receiver, agents).cloned().collect();
        seen.extend(non_agent.iter().cloned());
        seen
    }

    fn name(&self) -> &str {
        "GaussianNoise"
    }
}
