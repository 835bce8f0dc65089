// Each tick sleeps a full period after its work, overruns drift instead of skipping

use crate::agent::{AgentId, Channel, SharedAgent};
use crate::error::{ConfigError, PublishError};
use crate::faults::{Delivery, FaultModel};
use crate::geometry::VehicleFootprint;
use crate::metrics::RelayMetrics;
use crate::perception::{Obstacle, ObstacleMap, ObstacleSource, PerceptionSnapshot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_TICK_RATE_HZ: f64 = 25.0;

// Bounded wait of the latency worker on an empty queue
const QUEUE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Ready,
    Running,
    Stopped,
}

pub struct RelayLoop {
    agents: Arc<Vec<SharedAgent>>,
    fault: Option<Box<dyn FaultModel>>,
    obstacles: Arc<dyn ObstacleSource>,
    vehicle: VehicleFootprint,
    period: Duration,
    metrics: RelayMetrics,
    cancel: CancellationToken,
    state: RelayState,
    started_at: Option<Instant>,
    tick_task: Option<JoinHandle<()>>,
    worker: Option<(mpsc::UnboundedSender<QueueItem>, JoinHandle<()>)>,
}

impl RelayLoop {
    pub fn new(
        agents: Vec<SharedAgent>,
        fault: Box<dyn FaultModel>,
        obstacles: Arc<dyn ObstacleSource>,
        vehicle: VehicleFootprint,
        tick_rate_hz: f64,
    ) -> Result<Self, ConfigError> {
        let period = ConfigError::tick_period(tick_rate_hz)?;
        if agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }
        let mut seen = HashSet::new();
        for agent in &agents {
            if !seen.insert(agent.id()) {
                return Err(ConfigError::DuplicateAgent(agent.id()));
            }
        }

        Ok(Self {
            agents: Arc::new(agents),
            fault: Some(fault),
            obstacles,
            vehicle,
            period,
            metrics: RelayMetrics::new(),
            cancel: CancellationToken::new(),
            state: RelayState::Ready,
            started_at: None,
            tick_task: None,
            worker: None,
        })
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RelayState::Running
    }

    pub fn metrics(&self) -> RelayMetrics {
        self.metrics.clone()
    }

    // Snapshot timestamps are seconds since this instant
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    // Spawns the tick task, plus the latency worker when deliveries are
    // queued. A relay runs at most once.
    pub fn start(&mut self) {
        let Some(fault) = self.fault.take() else {
            debug!("Relay already started");
            return;
        };

        info!(
            "Relay starting: {} agents, {:?} period, fault model {}",
            self.agents.len(),
            self.period,
            fault.name()
        );

        let sink = match fault.delivery() {
            Delivery::Immediate => Sink::Immediate,
            Delivery::Cohort(delay) => Sink::Cohort(delay),
            Delivery::Queued(latency) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let depth = Arc::new(AtomicUsize::new(0));
                let worker = LatencyWorker {
                    rx,
                    latency,
                    depth: depth.clone(),
                    metrics: self.metrics.clone(),
                    cancel: self.cancel.clone(),
                };
                let handle = tokio::spawn(worker.run());
                self.worker = Some((tx.clone(), handle));
                Sink::Queued { tx, depth }
            }
        };

        let origin = Instant::now();
        self.started_at = Some(origin);
        let tick = TickLoop {
            origin,
            agents: self.agents.clone(),
            fault,
            obstacles: self.obstacles.clone(),
            vehicle: self.vehicle,
            period: self.period,
            metrics: self.metrics.clone(),
            cancel: self.cancel.clone(),
            sink,
            sequences: HashMap::new(),
            tick: 0,
        };
        self.tick_task = Some(tokio::spawn(tick.run()));
        self.state = RelayState::Running;
    }

    // Nothing is published once this returns. Queued snapshots are discarded.
    pub async fn stop(&mut self) {
        if self.state != RelayState::Running {
            return;
        }
        info!("Relay stopping");
        self.cancel.cancel();

        if let Some(handle) = self.tick_task.take() {
            if let Err(e) = handle.await {
                error!("Relay tick task ended abnormally: {}", e);
            }
        }

        if let Some((tx, handle)) = self.worker.take() {
            // Unblocks a worker waiting on an empty queue.
            let _ = tx.send(QueueItem::Shutdown);
            drop(tx);
            if let Err(e) = handle.await {
                error!("Latency worker ended abnormally: {}", e);
            }
        }

        self.state = RelayState::Stopped;
        let snap = self.metrics.snapshot();
        info!(
            "Relay stopped after {} ticks: {} snapshots published, {} failed, {} discarded",
            snap.ticks, snap.snapshots_published, snap.publish_failures, snap.queued_discarded
        );
    }

    // Bypasses the fault model. Returns how many agents accepted the payload.
    pub fn broadcast(&self, channel: Channel, payload: &[u8]) -> usize {
        let mut delivered = 0;
        for agent in self.agents.iter() {
            match agent.publish(channel, payload) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast on {} to agent {} failed: {}", channel, agent.id(), e),
            }
        }
        delivered
    }
}

impl Drop for RelayLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum Sink {
    Immediate,
    Cohort(Duration),
    Queued {
        tx: mpsc::UnboundedSender<QueueItem>,
        depth: Arc<AtomicUsize>,
    },
}

struct Outgoing {
    agent: SharedAgent,
    snapshot: PerceptionSnapshot,
}

enum QueueItem {
    Deliver { message: Outgoing, enqueued_at: Instant },
    Shutdown,
}

fn publish_snapshot(message: &Outgoing, metrics: &RelayMetrics) {
    let result = serde_json::to_vec(&message.snapshot)
        .map_err(PublishError::from)
        .and_then(|bytes| message.agent.publish(Channel::Perception, &bytes));

    match result {
        Ok(()) => metrics.published(),
        Err(e) => {
            warn!(
                "Perception publish to agent {} (seq {}) failed: {}",
                message.agent.id(),
                message.snapshot.sequence,
                e
            );
            metrics.publish_failed();
        }
    }
}

struct TickLoop {
    origin: Instant,
    agents: Arc<Vec<SharedAgent>>,
    fault: Box<dyn FaultModel>,
    obstacles: Arc<dyn ObstacleSource>,
    vehicle: VehicleFootprint,
    period: Duration,
    metrics: RelayMetrics,
    cancel: CancellationToken,
    sink: Sink,
    sequences: HashMap<AgentId, u64>,
    tick: u64,
}

impl TickLoop {
    async fn run(mut self) {
        while !self.cancel.is_cancelled() {
            // No await between here and the enqueue below, so this is also
            // the enqueue time of every queued snapshot in the cohort.
            let relay_time = self.origin.elapsed().as_secs_f64();
            let cohort = self.compute(relay_time);

            match &self.sink {
                Sink::Immediate => {
                    for message in &cohort {
                        publish_snapshot(message, &self.metrics);
                    }
                }
                Sink::Cohort(delay) => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            debug!("Relay cancelled while holding a delayed cohort of {}", cohort.len());
                            self.metrics.discarded(cohort.len());
                            break;
                        }
                        _ = sleep(*delay) => {}
                    }
                    for message in &cohort {
                        publish_snapshot(message, &self.metrics);
                    }
                }
                Sink::Queued { tx, depth } => {
                    let enqueued_at = Instant::now();
                    for message in cohort {
                        let queued = depth.fetch_add(1, Ordering::AcqRel) + 1;
                        self.metrics.record_queue_depth(queued);
                        if tx.send(QueueItem::Deliver { message, enqueued_at }).is_err() {
                            depth.fetch_sub(1, Ordering::AcqRel);
                            error!("Latency queue closed, relay tick {} lost", self.tick);
                        }
                    }
                }
            }

            self.metrics.tick();
            self.tick += 1;

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(self.period) => {}
            }
        }
        debug!("Relay tick task exiting after {} ticks", self.tick);
    }

    // One snapshot per registered agent, in registration order
    fn compute(&mut self, relay_time: f64) -> Vec<Outgoing> {
        let agents: ObstacleMap = self
            .agents
            .iter()
            .filter_map(|agent| {
                let state = agent.true_state()?;
                state
                    .is_authoritative()
                    .then(|| (agent.id(), Obstacle::from_state(&state, &self.vehicle)))
            })
            .collect();
        let agents = self.fault.prepare(agents);
        let non_agent = self.obstacles.obstacles_at(relay_time);

        let mut cohort = Vec::with_capacity(self.agents.len());
        for receiver in self.agents.iter() {
            let id = receiver.id();
            let obstacles = self.fault.perceive(id, &agents, &non_agent);

            let offered = agents.len() - usize::from(agents.contains_key(&id)) + non_agent.len();
            let dropped = offered.saturating_sub(obstacles.len());
            if dropped > 0 {
                self.metrics.obstacles_dropped(dropped);
            }

            let seq = self.sequences.entry(id).or_insert(0);
            let snapshot = PerceptionSnapshot {
                receiver: id,
                sequence: *seq,
                timestamp: relay_time,
                obstacles,
            };
            *seq += 1;

            cohort.push(Outgoing {
                agent: receiver.clone(),
                snapshot,
            });
        }

        debug!(
            "Relay tick {}: {} reporting agents, {} non-agent obstacles",
            self.tick,
            agents.len(),
            non_agent.len()
        );
        cohort
    }
}

// Single FIFO worker. Waits the full latency before every message.
struct LatencyWorker {
    rx: mpsc::UnboundedReceiver<QueueItem>,
    latency: Duration,
    depth: Arc<AtomicUsize>,
    metrics: RelayMetrics,
    cancel: CancellationToken,
}

impl LatencyWorker {
    async fn run(mut self) {
        loop {
            let (message, enqueued_at) = match timeout(QUEUE_POLL, self.rx.recv()).await {
                Err(_) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    continue;
                }
                Ok(None) | Ok(Some(QueueItem::Shutdown)) => break,
                Ok(Some(QueueItem::Deliver { message, enqueued_at })) => (message, enqueued_at),
            };
            self.depth.fetch_sub(1, Ordering::AcqRel);

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.metrics.discarded(1);
                    break;
                }
                _ = sleep(self.latency) => {}
            }

            let lag = enqueued_at.elapsed();
            if lag > self.latency * 2 {
                debug!(
                    "Latency queue behind: seq {} for agent {} delivered {:?} after enqueue",
                    message.snapshot.sequence,
                    message.agent.id(),
                    lag
                );
            }
            publish_snapshot(&message, &self.metrics);
        }

        let mut discarded = 0;
        while let Ok(item) = self.rx.try_recv() {
            if let QueueItem::Deliver { .. } = item {
                discarded += 1;
            }
        }
        if discarded > 0 {
            info!("Latency worker discarded {} queued snapshots at shutdown", discarded);
            self.metrics.discarded(discarded);
        }
    }
}
