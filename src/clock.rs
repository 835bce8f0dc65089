use crate::agent::{AgentId, SharedAgent};
use crate::error::{ConfigError, TrialError, TrialResult};
use crate::traffic::{TrafficControlState, TrafficPlan};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

pub const DEFAULT_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Initialized,
    Running,
    Completed,
}

#[derive(Debug, Clone)]
pub struct ClockTick {
    pub index: u64,
    pub time_ms: u64,
    pub traffic: TrafficControlState,
    // Agents whose start threshold was crossed at this tick
    pub starts: Vec<AgentId>,
}

impl ClockTick {
    pub fn secs(&self) -> f64 {
        self.time_ms as f64 / 1000.0
    }
}

pub struct ScenarioClock {
    step_ms: u64,
    horizon_ms: u64,
    state: ClockState,
    now_ms: u64,
    ticks: u64,
    thresholds: Vec<(AgentId, f64)>,
    triggered: HashSet<AgentId>,
    traffic: TrafficPlan,
}

impl ScenarioClock {
    pub fn new(step: Duration, horizon_secs: f64, traffic: TrafficPlan) -> Result<Self, ConfigError> {
        let step_ms = step.as_millis() as u64;
        if step_ms == 0 {
            return Err(ConfigError::Positive {
                name: "clock step",
                value: step.as_secs_f64(),
            });
        }
        ConfigError::check_positive("horizon", horizon_secs)?;

        Ok(Self {
            step_ms,
            horizon_ms: (horizon_secs * 1000.0).round() as u64,
            state: ClockState::Idle,
            now_ms: 0,
            ticks: 0,
            thresholds: Vec::new(),
            triggered: HashSet::new(),
            traffic,
        })
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn now_secs(&self) -> f64 {
        self.now_ms as f64 / 1000.0
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // Records every agent's start threshold. Only valid on an idle clock
    pub fn bind(&mut self, agents: &[SharedAgent]) -> TrialResult<()> {
        if self.state != ClockState::Idle {
            return Err(TrialError::Transition {
                from: self.state,
                to: ClockState::Initialized,
            });
        }
        self.thresholds = agents.iter().map(|a| (a.id(), a.start_threshold())).collect();
        self.state = ClockState::Initialized;
        debug!("Clock bound to {} agents", self.thresholds.len());
        Ok(())
    }

    // Waits for and returns the next tick, or None once the horizon has
    // been reached. The first tick fires immediately at time 0; the tick at
    // the horizon itself is the last one
    pub async fn next_tick(&mut self) -> TrialResult<Option<ClockTick>> {
        match self.state {
            ClockState::Idle => Err(TrialError::Transition {
                from: ClockState::Idle,
                to: ClockState::Running,
            }),
            ClockState::Initialized => {
                self.state = ClockState::Running;
                info!("Scenario clock running, horizon {:.1}s", self.horizon_ms as f64 / 1000.0);
                Ok(Some(self.emit()))
            }
            ClockState::Running => {
                if self.now_ms >= self.horizon_ms {
                    self.state = ClockState::Completed;
                    info!("Scenario completed at {:.1}s after {} ticks", self.now_secs(), self.ticks);
                    return Ok(None);
                }
                sleep(Duration::from_millis(self.step_ms)).await;
                self.now_ms += self.step_ms;
                Ok(Some(self.emit()))
            }
            ClockState::Completed => Ok(None),
        }
    }

    // Back to Idle, forgetting thresholds and which agents already started
    pub fn reset(&mut self) {
        self.state = ClockState::Idle;
        self.now_ms = 0;
        self.ticks = 0;
        self.thresholds.clear();
        self.triggered.clear();
        self.traffic.reset();
    }

    fn emit(&mut self) -> ClockTick {
        let t = self.now_secs();
        let traffic = self.traffic.state_at(t);

        let mut starts = Vec::new();
        for (id, threshold) in &self.thresholds {
            if t >= *threshold && self.triggered.insert(*id) {
                starts.push(*id);
            }
        }

        if self.now_ms % 1000 == 0 {
            info!("Scenario time: {:.1}", t);
        } else {
            debug!("Scenario time: {:.1}", t);
        }

        let tick = ClockTick {
            index: self.ticks,
            time_ms: self.now_ms,
            traffic,
            starts,
        };
        self.ticks += 1;
        tick
    }
}
