//! Gain bus registry
//!
//! One persistent gain node per layer, created once per session. Ambient
//! buses go straight to the output; instrument buses share a compressor and
//! limiter so many summed synths cannot clip.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{lock, AudioBackend, NodeId, NodeSpec};
use crate::error::{AeolusError, Result};

/// Starting gain of the noise bus; every other bus starts silent.
pub const NOISE_BUS_START: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusName {
    Ambient,
    Drone,
    Chimes,
    Noise,
    Drums,
    Piano,
    Bass,
    Strings,
    Winds,
}

impl BusName {
    pub const ALL: [BusName; 9] = [
        BusName::Ambient,
        BusName::Drone,
        BusName::Chimes,
        BusName::Noise,
        BusName::Drums,
        BusName::Piano,
        BusName::Bass,
        BusName::Strings,
        BusName::Winds,
    ];

    /// Key of this bus's volume in the preference store.
    pub fn preference_key(&self) -> &'static str {
        match self {
            BusName::Ambient => "ambientVolume",
            BusName::Drone => "droneVolume",
            BusName::Chimes => "chimeVolume",
            BusName::Noise => "noiseVolume",
            BusName::Drums => "drumVolume",
            BusName::Piano => "pianoVolume",
            BusName::Bass => "bassVolume",
            BusName::Strings => "stringsVolume",
            BusName::Winds => "windsVolume",
        }
    }

    /// Instrument buses route through the shared dynamics chain.
    pub fn is_instrument(&self) -> bool {
        matches!(
            self,
            BusName::Drums | BusName::Piano | BusName::Bass | BusName::Strings | BusName::Winds
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BusName::Ambient => "ambient",
            BusName::Drone => "drone",
            BusName::Chimes => "chimes",
            BusName::Noise => "noise",
            BusName::Drums => "drums",
            BusName::Piano => "piano",
            BusName::Bass => "bass",
            BusName::Strings => "strings",
            BusName::Winds => "winds",
        }
    }
}

impl fmt::Display for BusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusName {
    type Err = AeolusError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        BusName::ALL
            .into_iter()
            .find(|bus| {
                bus.as_str() == name
                    || bus.preference_key().eq_ignore_ascii_case(&name)
                    || bus.as_str().trim_end_matches('s') == name
            })
            .ok_or(AeolusError::InvalidConfig {
                reason: format!("unknown layer: {}", s),
            })
    }
}

#[derive(Debug)]
struct BusSet {
    buses: BTreeMap<BusName, NodeId>,
    dynamics: [NodeId; 2],
}

/// Owner of every bus node
pub struct GainBusRegistry {
    backend: Arc<dyn AudioBackend>,
    buses: Mutex<Option<BusSet>>,
}

impl GainBusRegistry {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            buses: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.backend
    }

    /// Create and wire all buses. A second call is a logged no-op.
    pub fn initialize_buses(&self) -> Result<()> {
        let mut slot = lock(&self.buses);
        if slot.is_some() {
            debug!("Gain buses already initialized");
            return Ok(());
        }

        let backend = &self.backend;
        let compressor = backend.create(NodeSpec::Compressor {
            threshold_db: -20.0,
            ratio: 3.0,
            attack: 0.005,
            release: 0.1,
        })?;
        let limiter = backend.create(NodeSpec::Limiter { threshold_db: -4.0 })?;
        backend.connect(compressor, limiter)?;
        backend.connect_output(limiter)?;

        let mut buses = BTreeMap::new();
        for name in BusName::ALL {
            let start = if name == BusName::Noise {
                NOISE_BUS_START
            } else {
                0.0
            };
            let node = backend.create(NodeSpec::Gain { value: start })?;
            if name.is_instrument() {
                backend.connect(node, compressor)?;
            } else {
                backend.connect_output(node)?;
            }
            buses.insert(name, node);
        }

        *slot = Some(BusSet {
            buses,
            dynamics: [compressor, limiter],
        });
        info!(count = BusName::ALL.len(), "Gain buses initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.buses).is_some()
    }

    /// The live node of a bus, or `BusNotReady` before initialization.
    pub fn get_bus(&self, name: BusName) -> Result<NodeId> {
        lock(&self.buses)
            .as_ref()
            .and_then(|set| set.buses.get(&name).copied())
            .ok_or_else(|| AeolusError::BusNotReady {
                bus: name.to_string(),
            })
    }

    /// All buses in a stable order; empty before initialization.
    pub fn buses(&self) -> Vec<(BusName, NodeId)> {
        lock(&self.buses)
            .as_ref()
            .map(|set| set.buses.iter().map(|(n, id)| (*n, *id)).collect())
            .unwrap_or_default()
    }

    /// Compressor and limiter shared by the instrument buses.
    pub fn dynamics(&self) -> Option<[NodeId; 2]> {
        lock(&self.buses).as_ref().map(|set| set.dynamics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::simulated::Output;
    use crate::engine::SimulatedBackend;
    use test_case::test_case;

    #[test]
    fn test_get_bus_before_init_is_not_ready() {
        let registry = GainBusRegistry::new(Arc::new(SimulatedBackend::new()));
        let err = registry.get_bus(BusName::Drone).unwrap_err();
        assert_eq!(err.error_code(), "BUS_NOT_READY");
        assert!(registry.buses().is_empty());
    }

    #[test]
    fn test_initialize_wires_buses_once() {
        let backend = Arc::new(SimulatedBackend::new());
        let registry = GainBusRegistry::new(backend.clone());
        registry.initialize_buses().unwrap();
        let nodes = backend.live_count();
        registry.initialize_buses().unwrap();
        assert_eq!(backend.live_count(), nodes);
        assert_eq!(nodes, BusName::ALL.len() + 2);

        let [compressor, limiter] = registry.dynamics().unwrap();
        assert_eq!(backend.outputs(limiter), vec![Output::Destination]);

        let drums = registry.get_bus(BusName::Drums).unwrap();
        assert_eq!(backend.outputs(drums), vec![Output::Node(compressor)]);
        let drone = registry.get_bus(BusName::Drone).unwrap();
        assert_eq!(backend.outputs(drone), vec![Output::Destination]);

        let noise = registry.get_bus(BusName::Noise).unwrap();
        assert_eq!(backend.gain_value(noise).unwrap(), NOISE_BUS_START);
        assert_eq!(backend.gain_value(drone).unwrap(), 0.0);
    }

    #[test_case("drone", BusName::Drone)]
    #[test_case("Chimes", BusName::Chimes)]
    #[test_case("chime", BusName::Chimes)]
    #[test_case("drum", BusName::Drums)]
    #[test_case("windsVolume", BusName::Winds)]
    fn test_parse_bus_name(input: &str, want: BusName) {
        assert_eq!(input.parse::<BusName>().unwrap(), want);
    }
}
