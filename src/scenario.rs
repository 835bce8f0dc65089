use crate::agent::{AgentId, SharedAgent, random_agent_ids};
use crate::error::TrialResult;
use crate::geometry::Vec3;
use crate::perception::{FixedObstacles, LinearPedestrians, Obstacle, ObstacleKind, ObstacleSource, PedestrianWalk};
use crate::sim_agent::SimulatedAgent;
use crate::traffic::{SignalTiming, TrafficPlan};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    // Random six-digit id when absent
    #[serde(default)]
    pub id: Option<u32>,
    pub position: Vec3,
    pub heading: f64,
    #[serde(default)]
    pub velocity: Vec3,
    // Simulated seconds before this agent is told to start routing
    #[serde(default)]
    pub start_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticSpec {
    pub id: u32,
    pub position: Vec3,
    #[serde(default)]
    pub heading: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub pedestrians: Vec<PedestrianWalk>,
    #[serde(default)]
    pub statics: Vec<StaticSpec>,
    #[serde(default)]
    pub signals: Vec<SignalTiming>,
}

pub struct Scenario {
    pub agents: Vec<Arc<SimulatedAgent>>,
    pub obstacles: Arc<dyn ObstacleSource>,
    pub traffic: TrafficPlan,
}

impl Scenario {
    pub fn handles(&self) -> Vec<SharedAgent> {
        self.agents.iter().map(|a| a.clone() as SharedAgent).collect()
    }
}

// Pedestrians plus fixed obstacles
struct ScenarioObstacles {
    pedestrians: LinearPedestrians,
    statics: FixedObstacles,
}

impl ObstacleSource for ScenarioObstacles {
    fn obstacles_at(&self, t: f64) -> Vec<Obstacle> {
        let mut all = self.pedestrians.obstacles_at(t);
        all.extend(self.statics.obstacles_at(t));
        all
    }
}

impl ScenarioSpec {
    // Two vehicles on one line: a parked one at the origin and one 50 m
    // away driving straight at it at 5 m/s
    pub fn head_on() -> Self {
        let main = SignalTiming::new("signal_1", [10.0, 3.0, 7.0], 0.0);
        Self {
            name: "head_on".to_string(),
            agents: vec![
                AgentSpec {
                    id: Some(1),
                    position: Vec3::ZERO,
                    heading: 0.0,
                    velocity: Vec3::ZERO,
                    start_time: 0.0,
                },
                AgentSpec {
                    id: Some(2),
                    position: Vec3::planar(50.0, 0.0),
                    heading: std::f64::consts::PI,
                    velocity: Vec3::planar(-5.0, 0.0),
                    start_time: 0.0,
                },
            ],
            pedestrians: Vec::new(),
            statics: Vec::new(),
            signals: vec![main.exclusive("signal_2"), main],
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> TrialResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_pedestrian(mut self, walk: PedestrianWalk) -> Self {
        self.pedestrians.push(walk);
        self
    }

    // Fresh agents, obstacle supplier and signal plan. Agents without an id
    // get random ones that do not clash with the explicit ids
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Scenario {
        let taken: HashSet<u32> = self.agents.iter().filter_map(|a| a.id).collect();
        let missing = self.agents.iter().filter(|a| a.id.is_none()).count();
        let mut fresh = random_agent_ids(missing + taken.len(), rng)
            .into_iter()
            .filter(|id| !taken.contains(&id.0))
            .take(missing);

        let agents = self
            .agents
            .iter()
            .map(|spec| {
                let id = spec.id.map(AgentId).or_else(|| fresh.next()).unwrap_or(AgentId(0));
                let agent = if spec.velocity == Vec3::ZERO {
                    SimulatedAgent::stationary(id, spec.position, spec.heading)
                } else {
                    SimulatedAgent::moving(id, spec.position, spec.heading, spec.velocity)
                };
                Arc::new(agent.with_start_threshold(spec.start_time))
            })
            .collect();

        let statics = self
            .statics
            .iter()
            .map(|s| Obstacle::non_agent(s.id, ObstacleKind::Static, s.position, s.heading, Vec3::ZERO, 0.0))
            .collect();

        Scenario {
            agents,
            obstacles: Arc::new(ScenarioObstacles {
                pedestrians: LinearPedestrians::new(self.pedestrians.clone()),
                statics: FixedObstacles::new(statics),
            }),
            traffic: TrafficPlan::new(self.signals.clone()),
        }
    }
}
