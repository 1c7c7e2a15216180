//! Scene Layers Module
//!
//! The independent sound components of a scene:
//! - Ambient: looped field recording picked from the weather
//! - Drone: two detuned oscillators shaped by wind, UV and cloud
//! - Chimes: randomized sample bursts driven by gusts
//! - Band: transport-scheduled generative arrangement
//!
//! Each layer owns the nodes it creates and releases all of them on stop.
//! Bus gains are only ever changed through the shared [`FadeController`].

pub mod ambient;
pub mod band;
pub mod chimes;
pub mod drone;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::config::Timings;
use crate::engine::{AssetLoader, AudioBackend, NodeId, Transport};
use crate::error::Result;
use crate::mixer::{BusName, FadeController};

pub use ambient::AmbientLayer;
pub use band::BandLayer;
pub use chimes::{burst_size, chime_rate, ChimeConditions, ChimeLayer};
pub use drone::{waveform_for, DroneLayer, DroneParams};

/// Outcome of a layer's preparation step.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready,
    /// The layer will stay silent this cycle.
    Degraded(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Lifecycle shared by every layer.
#[async_trait]
pub trait SceneLayer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the layer currently owns live nodes.
    async fn is_live(&self) -> bool;

    /// Ramp the layer's bus to zero over `fade`, wait for it, then release
    /// every node. A zero fade tears down immediately. Safe to call when
    /// nothing is playing.
    async fn stop(&self, fade: Duration);
}

/// Collaborators handed to every layer.
#[derive(Clone)]
pub struct LayerContext {
    pub backend: Arc<dyn AudioBackend>,
    pub fades: FadeController,
    pub assets: Arc<dyn AssetLoader>,
    pub transport: Arc<Transport>,
    pub timings: Timings,
    /// Seed for the layers' random choices; entropy when `None`.
    pub seed: Option<u64>,
}

impl LayerContext {
    /// The live node of `bus`.
    pub fn bus(&self, bus: BusName) -> Result<NodeId> {
        self.fades.registry().get_bus(bus)
    }

    /// A generator for one layer, distinct per `stream` under a fixed seed.
    pub(crate) fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}

/// Stop and dispose `nodes`, logging instead of failing on nodes that are
/// already gone.
pub(crate) fn release_nodes(backend: &dyn AudioBackend, nodes: &[NodeId]) {
    let now = backend.now();
    for &node in nodes {
        // Only sources accept stop; anything else just gets disposed.
        let _ = backend.stop(node, now);
        if let Err(e) = backend.dispose(node) {
            debug!(node = %node, error = %e, "Node already released");
        }
    }
}

/// Sleep for `fade` unless it is zero.
pub(crate) async fn wait_for(fade: Duration) {
    if !fade.is_zero() {
        tokio::time::sleep(fade).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for layer tests.

    use super::*;
    use crate::engine::{SimulatedBackend, StaticAssetLoader};
    use crate::mixer::{GainBusRegistry, VolumePreferences};

    pub struct Rig {
        pub backend: Arc<SimulatedBackend>,
        pub ctx: LayerContext,
    }

    pub fn rig(assets: StaticAssetLoader) -> Rig {
        let backend = Arc::new(SimulatedBackend::new());
        backend.resume().unwrap();
        let registry = Arc::new(GainBusRegistry::new(backend.clone()));
        registry.initialize_buses().unwrap();
        let ctx = LayerContext {
            backend: backend.clone(),
            fades: FadeController::new(registry, VolumePreferences::in_memory()),
            assets: Arc::new(assets),
            transport: Arc::new(Transport::default()),
            timings: Timings::default(),
            seed: Some(7),
        };
        Rig { backend, ctx }
    }

    impl Rig {
        /// Live nodes other than the buses and the dynamics chain.
        pub fn layer_nodes(&self) -> usize {
            self.backend.live_count() - BusName::ALL.len() - 2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::rig;
    use super::*;
    use crate::engine::{NodeSpec, StaticAssetLoader};

    #[test]
    fn test_release_nodes_tolerates_disposed() {
        let rig = rig(StaticAssetLoader::new());
        let backend = rig.ctx.backend.as_ref();
        let gain = backend.create(NodeSpec::Gain { value: 1.0 }).unwrap();
        backend.dispose(gain).unwrap();
        let bogus = NodeId(9_999);

        release_nodes(backend, &[gain, bogus]);
        assert_eq!(rig.layer_nodes(), 0);
    }

    #[test]
    fn test_seeded_streams_differ() {
        use rand::Rng;
        let rig = rig(StaticAssetLoader::new());
        let a: u64 = rig.ctx.rng(1).random();
        let b: u64 = rig.ctx.rng(2).random();
        let again: u64 = rig.ctx.rng(1).random();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }
}
