// In-process stand-in for an agent, so trials run without external processes

use crate::agent::{AgentHandle, AgentId, AgentState, Channel, SourceTag, StateCell};
use crate::error::PublishError;
use crate::geometry::Vec3;
use crate::perception::PerceptionSnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Motion {
    Stationary,
    // Straight-line travel, starting when routing starts
    ConstantVelocity { velocity: Vec3 },
}

#[derive(Debug, Clone)]
pub struct Received {
    pub channel: Channel,
    pub payload: Vec<u8>,
    pub at: Instant,
}

#[derive(Debug)]
pub struct SimulatedAgent {
    id: AgentId,
    position: Vec3,
    heading: f64,
    motion: Motion,
    start_threshold: f64,
    origin: Instant,
    state: StateCell,
    routing_started: Mutex<Option<Instant>>,
    source: Mutex<SourceTag>,
    manual: AtomicBool,
    reachable: AtomicBool,
    inbox: Mutex<Vec<Received>>,
}

impl SimulatedAgent {
    pub fn new(id: AgentId, position: Vec3, heading: f64, motion: Motion) -> Self {
        Self {
            id,
            position,
            heading,
            motion,
            start_threshold: 0.0,
            origin: Instant::now(),
            state: StateCell::new(),
            routing_started: Mutex::new(None),
            source: Mutex::new(SourceTag::Authoritative),
            manual: AtomicBool::new(false),
            reachable: AtomicBool::new(true),
            inbox: Mutex::new(Vec::new()),
        }
    }

    pub fn stationary(id: AgentId, position: Vec3, heading: f64) -> Self {
        Self::new(id, position, heading, Motion::Stationary)
    }

    pub fn moving(id: AgentId, position: Vec3, heading: f64, velocity: Vec3) -> Self {
        Self::new(id, position, heading, Motion::ConstantVelocity { velocity })
    }

    pub fn with_start_threshold(mut self, secs: f64) -> Self {
        self.start_threshold = secs;
        self
    }

    // Tags subsequent reports; anything but authoritative hides the agent
    // from the relay and the collision monitor
    pub fn set_source(&self, tag: SourceTag) {
        *self.source.lock() = tag;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Release);
    }

    // Pins the reported state, overriding the motion model from now on
    pub fn report(&self, state: AgentState) {
        self.manual.store(true, Ordering::Release);
        self.state.store(state);
    }

    pub fn routing_started(&self) -> bool {
        self.routing_started.lock().is_some()
    }

    pub fn received(&self) -> Vec<Received> {
        self.inbox.lock().clone()
    }

    pub fn received_on(&self, channel: Channel) -> Vec<Received> {
        self.inbox.lock().iter().filter(|r| r.channel == channel).cloned().collect()
    }

    pub fn perception_snapshots(&self) -> Vec<PerceptionSnapshot> {
        self.received_on(Channel::Perception)
            .iter()
            .filter_map(|r| serde_json::from_slice(&r.payload).ok())
            .collect()
    }

    fn integrate(&self) -> AgentState {
        let started = *self.routing_started.lock();
        let (position, velocity) = match (self.motion, started) {
            (Motion::ConstantVelocity { velocity }, Some(t0)) => {
                let dt = t0.elapsed().as_secs_f64();
                (self.position.add(velocity.scaled(dt)), velocity)
            }
            _ => (self.position, Vec3::ZERO),
        };

        AgentState {
            agent_id: self.id,
            position,
            heading: self.heading,
            linear_velocity: velocity,
            linear_acceleration: Vec3::ZERO,
            timestamp: self.origin.elapsed().as_secs_f64(),
            source_tag: *self.source.lock(),
        }
    }
}

impl AgentHandle for SimulatedAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    fn publish(&self, channel: Channel, payload: &[u8]) -> Result<(), PublishError> {
        if !self.reachable.load(Ordering::Acquire) {
            return Err(PublishError::Unreachable(self.id));
        }
        let now = Instant::now();
        if channel == Channel::RoutingStart {
            let mut started = self.routing_started.lock();
            if started.is_none() {
                debug!("Agent {} starts routing", self.id);
                *started = Some(now);
            }
        }
        self.inbox.lock().push(Received {
            channel,
            payload: payload.to_vec(),
            at: now,
        });
        Ok(())
    }

    fn true_state(&self) -> Option<AgentState> {
        if !self.manual.load(Ordering::Acquire) {
            self.state.store(self.integrate());
        }
        self.state.load()
    }

    fn start_threshold(&self) -> f64 {
        self.start_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn moves_only_after_routing_starts() {
        let agent = SimulatedAgent::moving(AgentId(2), Vec3::planar(50.0, 0.0), std::f64::consts::PI, Vec3::planar(-5.0, 0.0));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(agent.true_state().unwrap().position.x, 50.0);

        agent.publish(Channel::RoutingStart, b"{}").unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        let state = agent.true_state().unwrap();
        assert!((state.position.x - 40.0).abs() < 1e-9);
        assert_eq!(state.linear_velocity.x, -5.0);
        assert!(agent.routing_started());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_agent_rejects_publishes() {
        let agent = SimulatedAgent::stationary(AgentId(4), Vec3::ZERO, 0.0);
        agent.set_reachable(false);
        assert!(matches!(
            agent.publish(Channel::Perception, b"[]"),
            Err(PublishError::Unreachable(AgentId(4)))
        ));
        assert!(agent.received().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_reports_pin_the_state() {
        let agent = SimulatedAgent::stationary(AgentId(5), Vec3::ZERO, 0.0);
        let mut pinned = AgentState::at(AgentId(5), Vec3::planar(7.0, 7.0), 1.0);
        pinned.source_tag = SourceTag::External;
        agent.report(pinned.clone());
        assert_eq!(agent.true_state(), Some(pinned));
    }
}
