//! Fade controller
//!
//! The only code that changes bus gains. Every ramp first freezes the bus
//! at its current value, so overlapping fades never jump.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::bus::{BusName, GainBusRegistry};
use super::preferences::VolumePreferences;
use crate::engine::NodeId;
use crate::error::Result;

#[derive(Clone)]
pub struct FadeController {
    registry: Arc<GainBusRegistry>,
    preferences: VolumePreferences,
}

impl FadeController {
    pub fn new(registry: Arc<GainBusRegistry>, preferences: VolumePreferences) -> Self {
        Self {
            registry,
            preferences,
        }
    }

    pub fn registry(&self) -> &Arc<GainBusRegistry> {
        &self.registry
    }

    pub fn preferences(&self) -> &VolumePreferences {
        &self.preferences
    }

    /// Ramp `bus` linearly from its current value to `target`.
    ///
    /// A bus that does not exist yet is skipped silently.
    pub fn ramp_to(&self, bus: BusName, target: f64, duration: Duration) {
        let node = match self.registry.get_bus(bus) {
            Ok(node) => node,
            Err(e) => {
                debug!(%bus, error = %e, "Ramp skipped");
                return;
            }
        };
        if let Err(e) = self.schedule_ramp(node, target.max(0.0), duration) {
            warn!(%bus, error = %e, "Ramp failed");
        }
    }

    fn schedule_ramp(&self, node: NodeId, target: f64, duration: Duration) -> Result<()> {
        let backend = self.registry.backend();
        let now = backend.now();
        let current = backend.gain_value(node)?;
        backend.cancel_scheduled_values(node, now)?;
        backend.set_value_at_time(node, current, now)?;
        backend.linear_ramp_to_value_at_time(node, target, now + duration.as_secs_f64())?;
        debug!(node = %node, from = current, to = target, secs = duration.as_secs_f64(), "Ramp scheduled");
        Ok(())
    }

    /// Ramp `bus` to its saved volume.
    pub fn ramp_to_preference(&self, bus: BusName, duration: Duration) {
        let target = self.preferences.volume(bus);
        self.ramp_to(bus, target, duration);
    }

    pub fn ramp_to_zero(&self, bus: BusName, duration: Duration) {
        self.ramp_to(bus, 0.0, duration);
    }

    /// Ramp every bus to zero, resolving once the ramp has finished.
    pub async fn fade_out_all(&self, duration: Duration) {
        for bus in BusName::ALL {
            self.ramp_to_zero(bus, duration);
        }
        tokio::time::sleep(duration).await;
    }

    /// Ramp every bus back to its saved volume.
    pub fn restore_all(&self, duration: Duration) {
        for bus in BusName::ALL {
            self.ramp_to_preference(bus, duration);
        }
    }

    /// Current value of a bus, if it exists.
    pub fn bus_value(&self, bus: BusName) -> Option<f64> {
        let node = self.registry.get_bus(bus).ok()?;
        self.registry.backend().gain_value(node).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AudioBackend, SimulatedBackend};
    use approx::assert_relative_eq;

    fn controller() -> (Arc<SimulatedBackend>, FadeController) {
        let backend = Arc::new(SimulatedBackend::new());
        let registry = Arc::new(GainBusRegistry::new(backend.clone()));
        registry.initialize_buses().unwrap();
        (backend, FadeController::new(registry, VolumePreferences::in_memory()))
    }

    #[test]
    fn test_ramp_before_init_is_noop() {
        let backend = Arc::new(SimulatedBackend::new());
        let registry = Arc::new(GainBusRegistry::new(backend.clone()));
        let fades = FadeController::new(registry, VolumePreferences::in_memory());
        fades.ramp_to(BusName::Ambient, 1.0, Duration::from_secs(1));
        assert_eq!(backend.live_count(), 0);
        assert!(fades.bus_value(BusName::Ambient).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_to_preference() {
        let (_backend, fades) = controller();
        fades.preferences().set_volume(BusName::Drone, 0.8).unwrap();
        fades.ramp_to_preference(BusName::Drone, Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_relative_eq!(fades.bus_value(BusName::Drone).unwrap(), 0.4, epsilon = 1e-6);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_relative_eq!(fades.bus_value(BusName::Drone).unwrap(), 0.8, epsilon = 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_ramp_starts_from_current_value() {
        let (backend, fades) = controller();
        let bus = fades.registry().get_bus(BusName::Chimes).unwrap();
        fades.ramp_to(BusName::Chimes, 1.0, Duration::from_secs(4));
        tokio::time::sleep(Duration::from_secs(2)).await;

        fades.ramp_to_zero(BusName::Chimes, Duration::from_secs(4));
        let before = backend.gain_value(bus).unwrap();
        fades.ramp_to_zero(BusName::Chimes, Duration::from_secs(4));
        let after = backend.gain_value(bus).unwrap();
        assert_relative_eq!(before, 0.5, epsilon = 1e-6);
        assert_relative_eq!(before, after, epsilon = 1e-9);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_relative_eq!(backend.gain_value(bus).unwrap(), 0.375, epsilon = 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fade_out_all_waits_for_ramp() {
        let (backend, fades) = controller();
        fades.restore_all(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(2)).await;

        let started = tokio::time::Instant::now();
        fades.fade_out_all(Duration::from_secs(5)).await;
        assert_eq!(started.elapsed(), Duration::from_secs(5));

        for (bus, node) in fades.registry().buses() {
            assert_eq!(backend.gain_value(node).unwrap(), 0.0, "{} not silent", bus);
        }
    }
}
