//! Aeolus - Weather-Reactive Ambient Scene Engine
//!
//! Aeolus turns live weather into a layered ambient soundscape:
//! 1. Ambient - a looped field recording chosen from the condition and time of day
//! 2. Drone - detuned oscillators shaped by wind, UV and cloud cover
//! 3. Chimes - sample bursts driven by gusts
//! 4. Band - a generative song on a shared transport
//!
//! # Architecture
//!
//! Every layer plays into its own persistent gain bus. All gain changes go
//! through one fade controller, and a scene orchestrator rebuilds the layers
//! from fresh weather on a fixed cycle.

pub mod cli;
pub mod config;
pub mod engine;
pub mod env;
pub mod error;
pub mod layers;
pub mod mixer;
pub mod session;
pub mod weather;

pub use error::{AeolusError, Result};
