//! Music profile derivation
//!
//! A [`MusicProfile`] is recomputed from the sound environment on every
//! cycle. It has no lifecycle of its own.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::sound_environment::{Season, SoundEnvironment, TimeOfDay};
use crate::weather::calculate_energy_level;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumDensity {
    Sparse,
    Medium,
    Dense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseType {
    White,
    Pink,
    Brown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Energy {
    Low,
    Medium,
    High,
}

/// Drum/bass style of the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Genre {
    Ambient,
    Hiphop,
    House,
}

impl From<Energy> for Genre {
    fn from(energy: Energy) -> Self {
        match energy {
            Energy::Low => Genre::Ambient,
            Energy::Medium => Genre::Hiphop,
            Energy::High => Genre::House,
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Genre::Ambient => "ambient",
            Genre::Hiphop => "hiphop",
            Genre::House => "house",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Gentle,
    Lowpassed,
    Bright,
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mood::Gentle => "gentle",
            Mood::Lowpassed => "lowpassed",
            Mood::Bright => "bright",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherMood {
    Wet,
    Frozen,
    Stormy,
    Hazy,
    Cloudy,
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoonInfluence {
    Reversed,
    Lush,
    Detuned,
    Bright,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicProfile {
    pub bpm: u32,
    /// Key name such as `A minor`.
    pub key: String,
    /// Chord symbols, one per bar.
    pub chords: Vec<String>,
    pub melody_octave: i32,
    pub drum_density: DrumDensity,
    pub noise_type: NoiseType,
    pub mood: Mood,
    pub weather_mood: WeatherMood,
    pub moon_influence: MoonInfluence,
    pub genre: Genre,
    pub energy: Energy,
}

impl MusicProfile {
    /// Root letter of the key, e.g. `A` for `A minor`.
    pub fn key_root(&self) -> &str {
        key_root(&self.key)
    }
}

/// Root note name of a key string such as `C# major`.
pub fn key_root(key: &str) -> &str {
    key.split_whitespace().next().unwrap_or("C")
}

/// Neutral stand-in for a missing reading.
fn reading(value: Option<f64>, field: &str, neutral: f64) -> f64 {
    match value {
        Some(v) => v,
        None => {
            warn!(field, neutral, "Missing weather reading, using neutral value");
            neutral
        }
    }
}

pub fn generate_music_profile(env: &SoundEnvironment) -> MusicProfile {
    let current = env.current();
    let wind = reading(current.and_then(|c| c.wind_kph), "wind_kph", 0.0);
    let uv = reading(current.and_then(|c| c.uv), "uv", 0.0);
    let cloud = reading(current.and_then(|c| c.cloud), "cloud", 0.0);
    let temp = reading(current.and_then(|c| c.temp_c), "temp_c", 15.0);
    let gust = reading(current.and_then(|c| c.gust_kph), "gust_kph", 0.0);
    let humidity = reading(current.and_then(|c| c.humidity), "humidity", 50.0);

    let bpm = if wind < 10.0 {
        65
    } else if wind < 20.0 {
        80
    } else {
        95
    };

    let key = if uv < 3.0 { "A minor" } else { "C major" };

    let mut chords: Vec<String> = match env.season {
        Season::Winter => ["Am", "F", "Dm", "E"],
        Season::Spring => ["C", "F", "Am", "G"],
        Season::Summer => ["C", "G", "Am", "F"],
        Season::Autumn => ["Dm", "G", "Am", "E"],
    }
    .iter()
    .map(|c| c.to_string())
    .collect();

    let moon = env.lunar_phase.to_lowercase();
    if moon.contains("new") {
        chords.reverse();
    }

    let melody_octave = if temp < 10.0 {
        3
    } else if temp > 25.0 {
        5
    } else {
        4
    };

    let drum_density = if cloud < 25.0 {
        DrumDensity::Sparse
    } else if cloud < 70.0 {
        DrumDensity::Medium
    } else {
        DrumDensity::Dense
    };

    let noise_type = if gust > 25.0 {
        NoiseType::Brown
    } else if cloud < 50.0 {
        NoiseType::Pink
    } else {
        NoiseType::White
    };

    let condition = env.condition.as_deref().unwrap_or("");
    if condition.is_empty() {
        warn!("Missing condition text in sound environment");
    }
    let weather_mood = weather_mood(condition);

    let moon_influence = if moon.contains("new") {
        MoonInfluence::Reversed
    } else if moon.contains("full") {
        MoonInfluence::Lush
    } else if moon.contains("waning") {
        MoonInfluence::Detuned
    } else if moon.contains("waxing") {
        MoonInfluence::Bright
    } else {
        MoonInfluence::None
    };

    let mood = match env.time_of_day {
        TimeOfDay::Dawn => Mood::Gentle,
        TimeOfDay::Dusk => Mood::Lowpassed,
        TimeOfDay::Day | TimeOfDay::Night => Mood::Bright,
    };

    let energy = calculate_energy_level(Some(temp), Some(humidity), Some(cloud));

    let profile = MusicProfile {
        bpm,
        key: key.to_string(),
        chords,
        melody_octave,
        drum_density,
        noise_type,
        mood,
        weather_mood,
        moon_influence,
        genre: Genre::from(energy),
        energy,
    };
    debug!(?profile, "Music profile generated");
    profile
}

fn weather_mood(condition: &str) -> WeatherMood {
    let cond = condition.to_lowercase();
    if cond.contains("rain") {
        WeatherMood::Wet
    } else if cond.contains("snow") || cond.contains("sleet") {
        WeatherMood::Frozen
    } else if cond.contains("thunder") || cond.contains("storm") {
        WeatherMood::Stormy
    } else if cond.contains("fog") || cond.contains("mist") {
        WeatherMood::Hazy
    } else if cond.contains("overcast") || cond.contains("cloud") {
        WeatherMood::Cloudy
    } else {
        WeatherMood::Clear
    }
}
