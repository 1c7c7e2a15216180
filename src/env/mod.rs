//! Environment Module
//!
//! Everything derived from a weather snapshot before any sound is made:
//! - Sound environment (time of day, season, moon, sun sign)
//! - Music profile (tempo, key, chords, density, noise colour)
//! - Condition catalog (provider phrase to ambient bucket)

pub mod catalog;
pub mod profile;
pub mod sound_environment;

pub use catalog::{
    common_path, display_name, resolve_condition_key, time_of_day_path, AmbientCatalog,
    CONDITION_KEYS, DEFAULT_CONDITION,
};
pub use profile::{
    generate_music_profile, key_root, DrumDensity, Energy, Genre, Mood, MoonInfluence,
    MusicProfile, NoiseType, WeatherMood,
};
pub use sound_environment::{
    calculate_time_of_day, time_of_day_at, update_sound_environment, Hemisphere, MusicSettings,
    Season, SoundEnvironment, TimeOfDay,
};
