//! Band instrument rack
//!
//! One synth voice per part, each wired to its own bus. The metallic accent
//! shares the chimes bus.

use serde::Serialize;
use tracing::debug;

use crate::engine::{AudioBackend, InstrumentKind, NodeId, NodeSpec};
use crate::env::NoiseType;
use crate::error::Result;
use crate::layers::{release_nodes, LayerContext};
use crate::mixer::BusName;

/// Node handles of every band voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BandInstruments {
    pub bass: NodeId,
    pub keys: NodeId,
    pub kick: NodeId,
    pub snare: NodeId,
    pub hats: NodeId,
    pub metal: NodeId,
    pub strings: NodeId,
    pub wind: NodeId,
    pub noise: NodeId,
}

/// Voice, polyphony and destination bus of each synth.
const RACK: [(InstrumentKind, usize, BusName); 8] = [
    (InstrumentKind::Bass, 1, BusName::Bass),
    (InstrumentKind::Keys, 6, BusName::Piano),
    (InstrumentKind::Kick, 1, BusName::Drums),
    (InstrumentKind::Snare, 1, BusName::Drums),
    (InstrumentKind::Hats, 1, BusName::Drums),
    (InstrumentKind::Metal, 4, BusName::Chimes),
    (InstrumentKind::Strings, 6, BusName::Strings),
    (InstrumentKind::Wind, 1, BusName::Winds),
];

impl BandInstruments {
    /// Build and wire the rack, then start the noise bed.
    ///
    /// Nothing is left behind if any step fails.
    pub fn create(ctx: &LayerContext, noise: NoiseType) -> Result<Self> {
        let backend = ctx.backend.as_ref();
        let mut created = Vec::with_capacity(RACK.len() + 1);
        match Self::wire(ctx, backend, noise, &mut created) {
            Ok(rack) => {
                debug!(voices = created.len(), noise = ?noise, "Band instruments created");
                Ok(rack)
            }
            Err(e) => {
                release_nodes(backend, &created);
                Err(e)
            }
        }
    }

    fn wire(
        ctx: &LayerContext,
        backend: &dyn AudioBackend,
        noise: NoiseType,
        created: &mut Vec<NodeId>,
    ) -> Result<Self> {
        let mut voices = Vec::with_capacity(RACK.len());
        for (kind, polyphony, bus) in RACK {
            let node = backend.create(NodeSpec::Instrument { kind, polyphony })?;
            created.push(node);
            backend.connect(node, ctx.bus(bus)?)?;
            voices.push(node);
        }

        let bed = backend.create(NodeSpec::Noise { color: noise })?;
        created.push(bed);
        backend.connect(bed, ctx.bus(BusName::Noise)?)?;
        backend.start(bed, backend.now())?;

        Ok(Self {
            bass: voices[0],
            keys: voices[1],
            kick: voices[2],
            snare: voices[3],
            hats: voices[4],
            metal: voices[5],
            strings: voices[6],
            wind: voices[7],
            noise: bed,
        })
    }

    pub fn all(&self) -> [NodeId; 9] {
        [
            self.bass,
            self.keys,
            self.kick,
            self.snare,
            self.hats,
            self.metal,
            self.strings,
            self.wind,
            self.noise,
        ]
    }

    pub fn release(&self, backend: &dyn AudioBackend) {
        release_nodes(backend, &self.all());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulated::Output;
    use crate::engine::StaticAssetLoader;
    use crate::layers::testing::rig;

    #[test]
    fn test_rack_routing() {
        let rig = rig(StaticAssetLoader::new());
        let rack = BandInstruments::create(&rig.ctx, NoiseType::Pink).unwrap();
        assert_eq!(rig.layer_nodes(), 9);

        let chimes = rig.ctx.bus(BusName::Chimes).unwrap();
        assert_eq!(rig.backend.outputs(rack.metal), vec![Output::Node(chimes)]);
        let drums = rig.ctx.bus(BusName::Drums).unwrap();
        for voice in [rack.kick, rack.snare, rack.hats] {
            assert_eq!(rig.backend.outputs(voice), vec![Output::Node(drums)]);
        }
        assert!(rig.backend.is_started(rack.noise));
        assert_eq!(
            rig.backend.spec(rack.noise),
            Some(NodeSpec::Noise {
                color: NoiseType::Pink
            })
        );

        rack.release(rig.ctx.backend.as_ref());
        assert_eq!(rig.layer_nodes(), 0);
    }

    #[test]
    fn test_failed_build_leaves_nothing() {
        use crate::engine::SimulatedBackend;
        use crate::mixer::{FadeController, GainBusRegistry, VolumePreferences};
        use std::sync::Arc;

        let rig = rig(StaticAssetLoader::new());
        let backend = Arc::new(SimulatedBackend::new());
        let registry = Arc::new(GainBusRegistry::new(backend.clone()));
        let ctx = LayerContext {
            backend: backend.clone(),
            fades: FadeController::new(registry, VolumePreferences::in_memory()),
            ..rig.ctx.clone()
        };

        assert!(BandInstruments::create(&ctx, NoiseType::White).is_err());
        assert_eq!(backend.live_count(), 0);
    }
}
