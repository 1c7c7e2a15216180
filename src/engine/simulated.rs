//! In-memory audio backend
//!
//! Records the node graph, evaluates gain automation against the tokio
//! clock and logs note triggers. Nothing is rendered. The CLI runs
//! headless sessions on it and the tests inspect it.
//!
//! Disposed nodes are forgotten and the trigger log keeps only the most
//! recent entries, so an endless session holds a fixed amount of state.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::time::Instant;
use tracing::trace;

use super::backend::{AudioBackend, NodeId, NodeSpec};
use super::lock;
use super::pitch::Pitch;
use crate::error::{AeolusError, Result};

/// Triggers kept by [`SimulatedBackend::new`]; older ones are dropped.
pub const TRIGGER_LOG_CAPACITY: usize = 4096;

/// Gain automation for one node.
///
/// Holds a start point and at most one pending linear ramp, which is all
/// the fade controller ever schedules.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationLane {
    anchor_value: f64,
    anchor_time: f64,
    ramp: Option<(f64, f64)>,
}

impl AutomationLane {
    pub fn new(value: f64) -> Self {
        Self {
            anchor_value: value,
            anchor_time: 0.0,
            ramp: None,
        }
    }

    /// Value at audio time `t`.
    pub fn value_at(&self, t: f64) -> f64 {
        match self.ramp {
            Some((target, end)) => {
                if t >= end {
                    target
                } else if t <= self.anchor_time {
                    self.anchor_value
                } else {
                    let progress = (t - self.anchor_time) / (end - self.anchor_time);
                    self.anchor_value + (target - self.anchor_value) * progress
                }
            }
            None => self.anchor_value,
        }
    }

    /// Freeze the lane at its value at `t`.
    pub fn cancel(&mut self, t: f64) {
        let value = self.value_at(t);
        self.anchor_value = value;
        self.anchor_time = t;
        self.ramp = None;
    }

    pub fn set(&mut self, value: f64, t: f64) {
        self.anchor_value = value;
        self.anchor_time = t;
        self.ramp = None;
    }

    pub fn ramp_to(&mut self, value: f64, end: f64) {
        if end <= self.anchor_time {
            self.set(value, end);
        } else {
            self.ramp = Some((value, end));
        }
    }

    pub fn pending_ramp(&self) -> Option<(f64, f64)> {
        self.ramp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Node(NodeId),
    Destination,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerKind {
    Attack,
    Release,
    AttackRelease { duration: f64 },
}

/// One note trigger sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub node: NodeId,
    pub kind: TriggerKind,
    pub pitches: Vec<Pitch>,
    pub at: f64,
}

#[derive(Debug)]
struct NodeRecord {
    spec: NodeSpec,
    outputs: Vec<Output>,
    gain: Option<AutomationLane>,
    playback_rate: Option<f64>,
    started_at: Option<f64>,
    stopped_at: Option<f64>,
}

#[derive(Debug)]
struct Graph {
    next_id: u64,
    nodes: BTreeMap<NodeId, NodeRecord>,
    triggers: VecDeque<TriggerEvent>,
    trigger_capacity: usize,
    triggers_sent: u64,
}

impl Graph {
    fn new(trigger_capacity: usize) -> Self {
        Self {
            next_id: 0,
            nodes: BTreeMap::new(),
            triggers: VecDeque::with_capacity(trigger_capacity.min(TRIGGER_LOG_CAPACITY)),
            trigger_capacity,
            triggers_sent: 0,
        }
    }

    fn live(&mut self, id: NodeId) -> Result<&mut NodeRecord> {
        // Ids are handed out in sequence, so an issued id without a record
        // belongs to a disposed node.
        let issued = id.0 >= 1 && id.0 <= self.next_id;
        match self.nodes.get_mut(&id) {
            Some(record) => Ok(record),
            None if issued => Err(AeolusError::NodeDisposed { id: id.0 }),
            None => Err(AeolusError::UnknownNode { id: id.0 }),
        }
    }

    fn log(&mut self, event: TriggerEvent) {
        self.triggers_sent += 1;
        if self.trigger_capacity == 0 {
            return;
        }
        if self.triggers.len() == self.trigger_capacity {
            self.triggers.pop_front();
        }
        self.triggers.push_back(event);
    }

    fn lane(&mut self, id: NodeId) -> Result<&mut AutomationLane> {
        self.live(id)?
            .gain
            .as_mut()
            .ok_or(AeolusError::UnsupportedOperation {
                id: id.0,
                operation: "gain automation",
            })
    }
}

/// Audio backend that only keeps books.
#[derive(Debug)]
pub struct SimulatedBackend {
    epoch: Instant,
    running: AtomicBool,
    graph: Mutex<Graph>,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    /// A suspended context; call [`AudioBackend::resume`] before playing.
    pub fn new() -> Self {
        Self::with_trigger_log(TRIGGER_LOG_CAPACITY)
    }

    /// Like [`SimulatedBackend::new`], keeping the last `capacity` triggers.
    pub fn with_trigger_log(capacity: usize) -> Self {
        Self {
            epoch: Instant::now(),
            running: AtomicBool::new(false),
            graph: Mutex::new(Graph::new(capacity)),
        }
    }

    /// Live nodes with their construction parameters.
    pub fn live_nodes(&self) -> Vec<(NodeId, NodeSpec)> {
        lock(&self.graph)
            .nodes
            .iter()
            .map(|(id, record)| (*id, record.spec.clone()))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.graph).nodes.len()
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        lock(&self.graph).nodes.contains_key(&id)
    }

    pub fn spec(&self, id: NodeId) -> Option<NodeSpec> {
        lock(&self.graph).nodes.get(&id).map(|r| r.spec.clone())
    }

    pub fn outputs(&self, id: NodeId) -> Vec<Output> {
        lock(&self.graph)
            .nodes
            .get(&id)
            .map(|r| r.outputs.clone())
            .unwrap_or_default()
    }

    pub fn is_started(&self, id: NodeId) -> bool {
        lock(&self.graph)
            .nodes
            .get(&id)
            .map(|r| r.started_at.is_some() && r.stopped_at.is_none())
            .unwrap_or(false)
    }

    pub fn playback_rate(&self, id: NodeId) -> Option<f64> {
        lock(&self.graph).nodes.get(&id).and_then(|r| r.playback_rate)
    }

    pub fn lane(&self, id: NodeId) -> Option<AutomationLane> {
        lock(&self.graph).nodes.get(&id).and_then(|r| r.gain.clone())
    }

    /// Logged triggers, oldest first.
    pub fn triggers(&self) -> Vec<TriggerEvent> {
        lock(&self.graph).triggers.iter().cloned().collect()
    }

    /// Triggers accepted since creation, including those no longer logged.
    pub fn triggers_sent(&self) -> u64 {
        lock(&self.graph).triggers_sent
    }

    pub fn triggers_for(&self, id: NodeId) -> Vec<TriggerEvent> {
        lock(&self.graph)
            .triggers
            .iter()
            .filter(|t| t.node == id)
            .cloned()
            .collect()
    }

    fn push_trigger(&self, node: NodeId, kind: TriggerKind, pitches: &[Pitch], at: f64) -> Result<()> {
        let mut graph = lock(&self.graph);
        let record = graph.live(node)?;
        if !record.spec.is_triggerable() {
            return Err(AeolusError::UnsupportedOperation {
                id: node.0,
                operation: "trigger",
            });
        }
        graph.log(TriggerEvent {
            node,
            kind,
            pitches: pitches.to_vec(),
            at,
        });
        Ok(())
    }
}

impl AudioBackend for SimulatedBackend {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn resume(&self) -> Result<()> {
        if !self.running.swap(true, Ordering::SeqCst) {
            trace!("Simulated audio context resumed");
        }
        Ok(())
    }

    fn create(&self, spec: NodeSpec) -> Result<NodeId> {
        let mut graph = lock(&self.graph);
        graph.next_id += 1;
        let id = NodeId(graph.next_id);
        let gain = match &spec {
            NodeSpec::Gain { value } => Some(AutomationLane::new(*value)),
            _ => None,
        };
        let playback_rate = match &spec {
            NodeSpec::Player { playback_rate, .. } => Some(*playback_rate),
            _ => None,
        };
        trace!(node = %id, kind = spec.kind(), "Node created");
        graph.nodes.insert(
            id,
            NodeRecord {
                spec,
                outputs: Vec::new(),
                gain,
                playback_rate,
                started_at: None,
                stopped_at: None,
            },
        );
        Ok(id)
    }

    fn connect(&self, from: NodeId, to: NodeId) -> Result<()> {
        let mut graph = lock(&self.graph);
        graph.live(to)?;
        graph.live(from)?.outputs.push(Output::Node(to));
        Ok(())
    }

    fn connect_output(&self, node: NodeId) -> Result<()> {
        lock(&self.graph).live(node)?.outputs.push(Output::Destination);
        Ok(())
    }

    fn start(&self, node: NodeId, at: f64) -> Result<()> {
        let mut graph = lock(&self.graph);
        let record = graph.live(node)?;
        if !record.spec.is_source() {
            return Err(AeolusError::UnsupportedOperation {
                id: node.0,
                operation: "start",
            });
        }
        record.started_at = Some(at);
        record.stopped_at = None;
        Ok(())
    }

    fn stop(&self, node: NodeId, at: f64) -> Result<()> {
        let mut graph = lock(&self.graph);
        let record = graph.live(node)?;
        if !record.spec.is_source() {
            return Err(AeolusError::UnsupportedOperation {
                id: node.0,
                operation: "stop",
            });
        }
        record.stopped_at = Some(at);
        Ok(())
    }

    fn dispose(&self, node: NodeId) -> Result<()> {
        let mut graph = lock(&self.graph);
        graph.live(node)?;
        graph.nodes.remove(&node);
        trace!(node = %node, "Node disposed");
        Ok(())
    }

    fn trigger_attack(&self, node: NodeId, pitches: &[Pitch], at: f64) -> Result<()> {
        self.push_trigger(node, TriggerKind::Attack, pitches, at)
    }

    fn trigger_release(&self, node: NodeId, at: f64) -> Result<()> {
        self.push_trigger(node, TriggerKind::Release, &[], at)
    }

    fn trigger_attack_release(
        &self,
        node: NodeId,
        pitches: &[Pitch],
        duration: f64,
        at: f64,
    ) -> Result<()> {
        self.push_trigger(node, TriggerKind::AttackRelease { duration }, pitches, at)
    }

    fn set_playback_rate(&self, node: NodeId, rate: f64) -> Result<()> {
        let mut graph = lock(&self.graph);
        let record = graph.live(node)?;
        match record.playback_rate.as_mut() {
            Some(current) => {
                *current = rate;
                Ok(())
            }
            None => Err(AeolusError::UnsupportedOperation {
                id: node.0,
                operation: "playback rate",
            }),
        }
    }

    fn gain_value(&self, node: NodeId) -> Result<f64> {
        let now = self.now();
        Ok(lock(&self.graph).lane(node)?.value_at(now))
    }

    fn cancel_scheduled_values(&self, node: NodeId, at: f64) -> Result<()> {
        lock(&self.graph).lane(node)?.cancel(at);
        Ok(())
    }

    fn set_value_at_time(&self, node: NodeId, value: f64, at: f64) -> Result<()> {
        lock(&self.graph).lane(node)?.set(value, at);
        Ok(())
    }

    fn linear_ramp_to_value_at_time(&self, node: NodeId, value: f64, at: f64) -> Result<()> {
        lock(&self.graph).lane(node)?.ramp_to(value, at);
        Ok(())
    }
}
