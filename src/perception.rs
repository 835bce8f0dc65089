use crate::agent::{AgentId, AgentState};
use crate::geometry::{Footprint, Vec3, VehicleFootprint, finite_or_zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObstacleKind {
    Vehicle,
    Pedestrian,
    Static,
}

// What one agent is told about another entity. Built fresh every tick and
// never modified afterwards; fault models derive new values instead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub id: u32,
    pub kind: ObstacleKind,
    pub position: Vec3,
    pub heading: f64,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub footprint: Footprint,
    pub timestamp: f64,
}

impl Obstacle {
    pub fn from_state(state: &AgentState, vehicle: &VehicleFootprint) -> Self {
        Self::vehicle(
            state.agent_id,
            vehicle,
            state.position.sanitized(),
            finite_or_zero(state.heading),
            state.linear_velocity.sanitized(),
            state.linear_acceleration.sanitized(),
            state.timestamp,
        )
    }

    pub fn vehicle(
        id: AgentId,
        vehicle: &VehicleFootprint,
        position: Vec3,
        heading: f64,
        velocity: Vec3,
        acceleration: Vec3,
        timestamp: f64,
    ) -> Self {
        Self {
            id: id.0,
            kind: ObstacleKind::Vehicle,
            position,
            heading,
            velocity,
            acceleration,
            length: vehicle.length,
            width: vehicle.width,
            height: vehicle.height,
            footprint: vehicle.polygon(position, heading),
            timestamp,
        }
    }

    // Square-ish body for a pedestrian or fixed object
    pub fn non_agent(id: u32, kind: ObstacleKind, position: Vec3, heading: f64, velocity: Vec3, timestamp: f64) -> Self {
        let body = VehicleFootprint::centered(0.6, 0.6, 1.8);
        Self {
            id,
            kind,
            position,
            heading,
            velocity,
            acceleration: Vec3::ZERO,
            length: body.length,
            width: body.width,
            height: body.height,
            footprint: body.polygon(position, heading),
            timestamp,
        }
    }

    pub fn is_agent(&self) -> bool {
        self.kind == ObstacleKind::Vehicle
    }
}

// Obstacles built from every agent that reported authoritatively this tick
pub type ObstacleMap = BTreeMap<AgentId, Obstacle>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionSnapshot {
    pub receiver: AgentId,
    pub sequence: u64,
    // Relay time (seconds since the relay started) the content was computed at
    pub timestamp: f64,
    pub obstacles: Vec<Obstacle>,
}

impl PerceptionSnapshot {
    pub fn agent_ids(&self) -> Vec<u32> {
        self.obstacles.iter().filter(|o| o.is_agent()).map(|o| o.id).collect()
    }
}

// Supplier of the non-agent obstacles appended to every snapshot
pub trait ObstacleSource: Send + Sync {
    fn obstacles_at(&self, t: f64) -> Vec<Obstacle>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoObstacles;

impl ObstacleSource for NoObstacles {
    fn obstacles_at(&self, _t: f64) -> Vec<Obstacle> {
        Vec::new()
    }
}

#[derive(Debug, Default, Clone)]
pub struct FixedObstacles {
    obstacles: Vec<Obstacle>,
}

impl FixedObstacles {
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }
}

impl ObstacleSource for FixedObstacles {
    fn obstacles_at(&self, t: f64) -> Vec<Obstacle> {
        self.obstacles
            .iter()
            .cloned()
            .map(|mut o| {
                o.timestamp = t;
                o
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PedestrianWalk {
    pub id: u32,
    pub start: Vec3,
    pub heading: f64,
    pub speed: f64,
    pub start_time: f64,
}

impl PedestrianWalk {
    pub fn obstacle_at(&self, t: f64) -> Obstacle {
        let walked = (t - self.start_time).max(0.0);
        let moving = t >= self.start_time;
        let direction = Vec3::planar(self.heading.cos(), self.heading.sin());
        let position = self.start.add(direction.scaled(self.speed * walked));
        let velocity = if moving { direction.scaled(self.speed) } else { Vec3::ZERO };
        Obstacle::non_agent(self.id, ObstacleKind::Pedestrian, position, self.heading, velocity, t)
    }
}

// Pedestrians walking straight lines at constant speed once their start
// time passes
#[derive(Debug, Default, Clone)]
pub struct LinearPedestrians {
    walks: Vec<PedestrianWalk>,
}

impl LinearPedestrians {
    pub fn new(walks: Vec<PedestrianWalk>) -> Self {
        Self { walks }
    }
}

impl ObstacleSource for LinearPedestrians {
    fn obstacles_at(&self, t: f64) -> Vec<Obstacle> {
        self.walks.iter().map(|w| w.obstacle_at(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SourceTag;

    #[test]
    fn obstacle_from_state_sanitizes_and_builds_footprint() {
        let mut state = AgentState::at(AgentId(3), Vec3::new(10.0, 5.0, f64::NAN), 0.0);
        state.linear_velocity = Vec3::new(f64::NAN, 1.0, 0.0);
        state.source_tag = SourceTag::Authoritative;

        let obs = Obstacle::from_state(&state, &VehicleFootprint::centered(4.0, 2.0, 1.5));
        assert_eq!(obs.id, 3);
        assert_eq!(obs.position.z, 0.0);
        assert_eq!(obs.velocity.x, 0.0);
        let xs: Vec<f64> = obs.footprint.corners.iter().map(|p| p.x).collect();
        assert!(xs.iter().any(|x| (x - 12.0).abs() < 1e-9));
        assert!(xs.iter().any(|x| (x - 8.0).abs() < 1e-9));
    }

    #[test]
    fn pedestrians_wait_then_walk() {
        let walk = PedestrianWalk {
            id: 900,
            start: Vec3::planar(0.0, 0.0),
            heading: 0.0,
            speed: 1.5,
            start_time: 2.0,
        };
        let source = LinearPedestrians::new(vec![walk]);

        let before = &source.obstacles_at(1.0)[0];
        assert_eq!(before.position.x, 0.0);
        assert_eq!(before.velocity, Vec3::ZERO);

        let after = &source.obstacles_at(4.0)[0];
        assert!((after.position.x - 3.0).abs() < 1e-9);
        assert_eq!(after.kind, ObstacleKind::Pedestrian);
    }
}
