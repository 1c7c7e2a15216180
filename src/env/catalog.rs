//! Ambient condition catalog
//!
//! Provider condition strings are free text ("Patchy light rain with
//! thunder"). They collapse onto a small set of buckets, each holding a few
//! curated ambient beds.

use std::collections::HashMap;

use super::sound_environment::TimeOfDay;

/// Bucket used when nothing else matches.
pub const DEFAULT_CONDITION: &str = "Clear";

/// Every bucket the catalog knows about.
pub const CONDITION_KEYS: [&str; 14] = [
    "Clear",
    "Partly cloudy",
    "Overcast",
    "Fog",
    "Light rain",
    "Moderate rain",
    "Heavy rain",
    "Thunderstorm",
    "Light snow",
    "Moderate snow",
    "Heavy snow",
    "Snow",
    "Sleet",
    "Storm",
];

/// Provider phrases mapped onto buckets.
pub const CONDITION_ALIASES: [(&str, &str); 36] = [
    ("Light rain shower", "Light rain"),
    ("Moderate rain shower", "Moderate rain"),
    ("Heavy rain shower", "Heavy rain"),
    ("Patchy rain possible", "Light rain"),
    ("Patchy light drizzle", "Light rain"),
    ("Light drizzle", "Light rain"),
    ("Patchy moderate rain", "Moderate rain"),
    ("Moderate or heavy rain shower", "Heavy rain"),
    ("Torrential rain shower", "Heavy rain"),
    ("Partly Sunny", "Partly cloudy"),
    ("Sunny intervals", "Partly cloudy"),
    ("Cloudy", "Overcast"),
    ("Overcast", "Overcast"),
    ("Mist", "Fog"),
    ("Freezing fog", "Fog"),
    ("Thundery outbreaks possible", "Thunderstorm"),
    ("Moderate or heavy rain with thunder", "Thunderstorm"),
    ("Patchy light rain with thunder", "Thunderstorm"),
    ("Moderate or heavy showers of rain with thunder", "Thunderstorm"),
    ("Patchy light snow", "Light snow"),
    ("Light snow", "Light snow"),
    ("Patchy moderate snow", "Moderate snow"),
    ("Moderate snow", "Moderate snow"),
    ("Heavy snow", "Heavy snow"),
    ("Snow shower", "Snow"),
    ("Ice pellets", "Sleet"),
    ("Light sleet showers", "Sleet"),
    ("Moderate or heavy sleet showers", "Sleet"),
    ("Blowing snow", "Snow"),
    ("Blizzard", "Snow"),
    ("Tornado", "Storm"),
    ("Clear", "Clear"),
    ("Sunny", "Clear"),
    ("Patchy snow possible", "Light snow"),
    ("Patchy sleet possible", "Sleet"),
    ("Fog", "Fog"),
];

/// Collapse a provider condition onto a catalog bucket.
///
/// Tries the alias table, then a case-insensitive match against the bucket
/// names, then falls back to [`DEFAULT_CONDITION`].
///
/// # Example
/// ```
/// use aeolus::env::resolve_condition_key;
/// assert_eq!(resolve_condition_key("Patchy rain possible"), "Light rain");
/// assert_eq!(resolve_condition_key("heavy SNOW"), "Heavy snow");
/// assert_eq!(resolve_condition_key("Volcanic ash"), "Clear");
/// ```
pub fn resolve_condition_key(condition: &str) -> &'static str {
    let condition = condition.trim();

    if let Some((_, bucket)) = CONDITION_ALIASES.iter().find(|(alias, _)| *alias == condition) {
        return *bucket;
    }

    if let Some(key) = CONDITION_KEYS
        .iter()
        .find(|key| key.eq_ignore_ascii_case(condition))
    {
        return *key;
    }

    DEFAULT_CONDITION
}

/// Ambient beds shared by every time of day.
const COMMON_BEDS: [(&str, &[&str]); 14] = [
    ("Clear", &["open_meadow.wav", "still_air_canopy.wav"]),
    ("Partly cloudy", &["drifting_cloud_shade.wav", "breeze_through_pines.wav"]),
    ("Overcast", &["grey_sky_hush.wav", "low_ceiling_wind.wav"]),
    ("Fog", &["fog_bank_drip.wav", "muffled_valley.wav"]),
    ("Light rain", &["light_rain_on_leaves.wav", "soft_drizzle_roof.wav"]),
    ("Moderate rain", &["steady_rain_forest.wav", "rain_gutter_flow.wav"]),
    ("Heavy rain", &["downpour_canopy.wav", "heavy_rain_tin_roof.wav"]),
    ("Thunderstorm", &["distant_thunder_rain.wav", "rolling_thunder.wav"]),
    ("Light snow", &["light_snowfall_hush.wav"]),
    ("Moderate snow", &["snow_on_branches.wav"]),
    ("Heavy snow", &["heavy_snow_wind.wav"]),
    ("Snow", &["snowfield_wind.wav", "snow_crunch_forest.wav"]),
    ("Sleet", &["sleet_on_glass.wav"]),
    ("Storm", &["gale_through_trees.wav", "storm_front.wav"]),
];

/// Beds that only make sense at a particular time of day.
const TIME_OF_DAY_BEDS: [(TimeOfDay, &str, &[&str]); 8] = [
    (TimeOfDay::Dawn, "Clear", &["dawn_chorus.wav", "first_light_birds.wav"]),
    (TimeOfDay::Dawn, "Partly cloudy", &["dawn_chorus_breeze.wav"]),
    (TimeOfDay::Day, "Clear", &["midday_insects.wav", "open_meadow.wav"]),
    (TimeOfDay::Day, "Partly cloudy", &["afternoon_birdsong.wav"]),
    (TimeOfDay::Dusk, "Clear", &["evening_blackbird.wav", "dusk_crickets.wav"]),
    (TimeOfDay::Dusk, "Light rain", &["dusk_rain_frogs.wav"]),
    (TimeOfDay::Night, "Clear", &["night_crickets.wav", "tawny_owl_woods.wav"]),
    (TimeOfDay::Night, "Light rain", &["night_rain_frogs.wav"]),
];

/// Ambient bed files per time of day and condition bucket.
#[derive(Debug, Clone)]
pub struct AmbientCatalog {
    beds: HashMap<(TimeOfDay, String), Vec<String>>,
}

impl Default for AmbientCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AmbientCatalog {
    pub fn empty() -> Self {
        Self {
            beds: HashMap::new(),
        }
    }

    /// The curated forest catalog.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for time_of_day in TimeOfDay::ALL {
            for (bucket, files) in COMMON_BEDS {
                catalog.insert(time_of_day, bucket, files.iter().map(|f| f.to_string()));
            }
        }
        for (time_of_day, bucket, files) in TIME_OF_DAY_BEDS {
            catalog.insert(time_of_day, bucket, files.iter().map(|f| f.to_string()));
        }
        catalog
    }

    /// Replace the beds of one bucket.
    pub fn insert(
        &mut self,
        time_of_day: TimeOfDay,
        bucket: &str,
        files: impl IntoIterator<Item = String>,
    ) {
        self.beds
            .insert((time_of_day, bucket.to_string()), files.into_iter().collect());
    }

    /// Files for a bucket, falling back to the default bucket when empty.
    pub fn files(&self, time_of_day: TimeOfDay, bucket: &str) -> &[String] {
        match self.beds.get(&(time_of_day, bucket.to_string())) {
            Some(files) if !files.is_empty() => files.as_slice(),
            _ => self
                .beds
                .get(&(time_of_day, DEFAULT_CONDITION.to_string()))
                .map(Vec::as_slice)
                .unwrap_or(&[]),
        }
    }
}

/// Path under the time-of-day directory.
pub fn time_of_day_path(time_of_day: TimeOfDay, file: &str) -> String {
    format!("shared/timeOfDay/{}/{}", time_of_day, file)
}

/// Path under the shared directory.
pub fn common_path(file: &str) -> String {
    format!("common/{}", file)
}

/// Human-readable track name: file stem, separators as spaces, title case.
pub fn display_name(file: &str) -> String {
    let name = file.rsplit('/').next().unwrap_or(file);
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);

    stem.split(|c| c == '_' || c == '-' || c == ' ')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Patchy rain possible", "Light rain" ; "alias")]
    #[test_case("Moderate or heavy showers of rain with thunder", "Thunderstorm" ; "long alias")]
    #[test_case("  Mist ", "Fog" ; "alias with whitespace")]
    #[test_case("overcast", "Overcast" ; "case insensitive key")]
    #[test_case("SLEET", "Sleet" ; "upper case key")]
    #[test_case("Sandstorm approaching", "Clear" ; "unknown")]
    #[test_case("", "Clear" ; "empty")]
    fn test_resolve_condition_key(condition: &str, want: &str) {
        assert_eq!(resolve_condition_key(condition), want);
    }

    #[test]
    fn test_every_alias_targets_a_key() {
        for (alias, bucket) in CONDITION_ALIASES {
            assert!(CONDITION_KEYS.contains(&bucket), "{} -> {}", alias, bucket);
            assert!(CONDITION_KEYS.contains(&resolve_condition_key(alias)));
        }
    }

    #[test]
    fn test_every_bucket_has_files() {
        let catalog = AmbientCatalog::builtin();
        for time_of_day in TimeOfDay::ALL {
            for key in CONDITION_KEYS {
                assert!(!catalog.files(time_of_day, key).is_empty());
            }
        }
    }

    #[test]
    fn test_empty_bucket_falls_back_to_clear() {
        let mut catalog = AmbientCatalog::builtin();
        catalog.insert(TimeOfDay::Night, "Fog", Vec::new());
        assert_eq!(
            catalog.files(TimeOfDay::Night, "Fog"),
            catalog.files(TimeOfDay::Night, "Clear")
        );
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("common/light_rain-on_leaves.wav"), "Light Rain On Leaves");
        assert_eq!(display_name("dawn_chorus"), "Dawn Chorus");
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            time_of_day_path(TimeOfDay::Dusk, "a.wav"),
            "shared/timeOfDay/dusk/a.wav"
        );
        assert_eq!(common_path("a.wav"), "common/a.wav");
    }
}
