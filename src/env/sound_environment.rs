//! Sound environment derivation
//!
//! Turns a weather/astro snapshot and a wall-clock time into the
//! [`SoundEnvironment`] every layer reads: time of day, season, moon phase,
//! sun sign and the last applied music settings.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::profile::{Energy, Genre, MusicProfile};
use crate::error::Result;
use crate::weather::{Current, WeatherReport};

/// Sunrise used when the provider sent no astro block.
pub const DEFAULT_SUNRISE: &str = "06:00 AM";
/// Sunset used when the provider sent no astro block.
pub const DEFAULT_SUNSET: &str = "06:00 PM";

const MOON_PHASES: [&str; 8] = [
    "New Moon",
    "Waxing Crescent",
    "First Quarter",
    "Waxing Gibbous",
    "Full Moon",
    "Waning Gibbous",
    "Last Quarter",
    "Waning Crescent",
];

/// Sign that starts each month and the last day of that month it covers.
const ZODIAC: [(&str, u32); 12] = [
    ("Capricorn", 19),
    ("Aquarius", 18),
    ("Pisces", 20),
    ("Aries", 19),
    ("Taurus", 20),
    ("Gemini", 20),
    ("Cancer", 22),
    ("Leo", 22),
    ("Virgo", 22),
    ("Libra", 22),
    ("Scorpio", 21),
    ("Sagittarius", 21),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Dawn,
    #[default]
    Day,
    Dusk,
    Night,
}

impl TimeOfDay {
    pub const ALL: [TimeOfDay; 4] = [
        TimeOfDay::Dawn,
        TimeOfDay::Day,
        TimeOfDay::Dusk,
        TimeOfDay::Night,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeOfDay::Dawn => "dawn",
            TimeOfDay::Day => "day",
            TimeOfDay::Dusk => "dusk",
            TimeOfDay::Night => "night",
        }
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    #[default]
    Summer,
    Autumn,
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    #[default]
    Northern,
    Southern,
}

/// The music settings most recently applied by the band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicSettings {
    pub key: String,
    pub bpm: u32,
    pub mood: String,
    pub genre: Genre,
    pub energy: Energy,
}

impl Default for MusicSettings {
    fn default() -> Self {
        Self {
            key: "C".to_string(),
            bpm: 60,
            mood: "ambient".to_string(),
            genre: Genre::Ambient,
            energy: Energy::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEnvironment {
    pub condition: Option<String>,
    pub is_day: bool,
    pub time_of_day: TimeOfDay,
    pub hemisphere: Hemisphere,
    pub season: Season,
    pub biome: String,
    pub lunar_phase: String,
    pub sun_sign: String,
    pub weather: WeatherReport,
    pub music: MusicSettings,
}

impl Default for SoundEnvironment {
    fn default() -> Self {
        Self {
            condition: None,
            is_day: true,
            time_of_day: TimeOfDay::Day,
            hemisphere: Hemisphere::Northern,
            season: Season::Summer,
            biome: "forest".to_string(),
            lunar_phase: "Full Moon".to_string(),
            sun_sign: "Gemini".to_string(),
            weather: WeatherReport::default(),
            music: MusicSettings::default(),
        }
    }
}

impl SoundEnvironment {
    /// Current conditions of the stored snapshot.
    pub fn current(&self) -> Option<&Current> {
        self.weather.current.as_ref()
    }

    /// Record the settings of a freshly generated profile.
    pub fn apply_profile(&mut self, profile: &MusicProfile) {
        self.music = MusicSettings {
            key: profile.key.clone(),
            bpm: profile.bpm,
            mood: profile.mood.to_string(),
            genre: profile.genre,
            energy: profile.energy,
        };
    }
}

/// Derive the environment from `report` in place.
///
/// `now` is used only when the report has no `location.localtime`. Fails
/// without touching `env` when `current` or `location` is missing.
pub fn update_sound_environment(
    env: &mut SoundEnvironment,
    report: &WeatherReport,
    now: NaiveDateTime,
) -> Result<()> {
    let (current, location) = report.require_complete()?;

    let local_now = location
        .localtime
        .as_deref()
        .and_then(parse_local_time)
        .unwrap_or(now);

    let (sunrise, sunset) = match report.astro() {
        Some(astro) => (
            astro.sunrise.as_deref().unwrap_or(DEFAULT_SUNRISE),
            astro.sunset.as_deref().unwrap_or(DEFAULT_SUNSET),
        ),
        None => (DEFAULT_SUNRISE, DEFAULT_SUNSET),
    };

    let time_of_day = time_of_day_at(local_now, sunrise, sunset, local_now.date());
    let hemisphere = if location.lat >= 0.0 {
        Hemisphere::Northern
    } else {
        Hemisphere::Southern
    };

    env.weather = report.clone();
    env.condition = Some(current.condition.text.clone());
    env.time_of_day = time_of_day;
    env.is_day = matches!(time_of_day, TimeOfDay::Dawn | TimeOfDay::Day);
    env.hemisphere = hemisphere;
    env.season = season_for(local_now.month(), hemisphere);
    env.lunar_phase = report
        .astro()
        .and_then(|a| a.moon_phase.clone())
        .filter(|phase| !phase.is_empty())
        .unwrap_or_else(|| approximate_lunar_phase(local_now.day()).to_string());
    env.sun_sign = sun_sign(local_now.month(), local_now.day()).to_string();
    env.biome = "forest".to_string();

    debug!(
        time_of_day = %env.time_of_day,
        season = %env.season,
        lunar_phase = %env.lunar_phase,
        "Sound environment updated"
    );
    Ok(())
}

/// Classify `now` against dawn/day/dusk windows around sunrise and sunset.
///
/// Windows are half-open: dawn `[sunrise-60m, sunrise+30m)`, day
/// `[sunrise+30m, sunset-45m)`, dusk `[sunset-45m, sunset+30m)`, anything
/// else is night.
///
/// # Example
/// ```
/// use aeolus::env::{calculate_time_of_day, TimeOfDay};
/// use chrono::NaiveDate;
///
/// let date = NaiveDate::from_ymd_opt(2025, 6, 13).unwrap();
/// let sunrise = date.and_hms_opt(5, 0, 0).unwrap();
/// let sunset = date.and_hms_opt(21, 0, 0).unwrap();
/// let noon = date.and_hms_opt(12, 0, 0).unwrap();
/// assert_eq!(calculate_time_of_day(noon, sunrise, sunset), TimeOfDay::Day);
/// ```
pub fn calculate_time_of_day(
    now: NaiveDateTime,
    sunrise: NaiveDateTime,
    sunset: NaiveDateTime,
) -> TimeOfDay {
    let dawn_start = sunrise - Duration::minutes(60);
    let dawn_end = sunrise + Duration::minutes(30);
    let dusk_start = sunset - Duration::minutes(45);
    let dusk_end = sunset + Duration::minutes(30);

    if now >= dawn_start && now < dawn_end {
        TimeOfDay::Dawn
    } else if now >= dawn_end && now < dusk_start {
        TimeOfDay::Day
    } else if now >= dusk_start && now < dusk_end {
        TimeOfDay::Dusk
    } else {
        TimeOfDay::Night
    }
}

/// [`calculate_time_of_day`] with provider-format sunrise/sunset strings
/// anchored on `date`. Unparseable times fall back to 06:00 AM / 06:00 PM.
pub fn time_of_day_at(now: NaiveDateTime, sunrise: &str, sunset: &str, date: NaiveDate) -> TimeOfDay {
    let sunrise = parse_clock_time(sunrise)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default());
    let sunset = parse_clock_time(sunset)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default());
    calculate_time_of_day(now, date.and_time(sunrise), date.and_time(sunset))
}

/// Parse a provider clock time such as `05:42 AM`.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%I:%M %p").ok()
}

/// Parse a provider local timestamp such as `2025-06-13 9:40`.
pub fn parse_local_time(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M").ok()
}

/// Meteorological season for a calendar month (1-12).
pub fn season_for(month: u32, hemisphere: Hemisphere) -> Season {
    let northern = match month {
        12 | 1 | 2 => Season::Winter,
        3..=5 => Season::Spring,
        6..=8 => Season::Summer,
        _ => Season::Autumn,
    };
    match hemisphere {
        Hemisphere::Northern => northern,
        Hemisphere::Southern => match northern {
            Season::Winter => Season::Summer,
            Season::Spring => Season::Autumn,
            Season::Summer => Season::Winter,
            Season::Autumn => Season::Spring,
        },
    }
}

/// Rough moon phase from the day of the month.
pub fn approximate_lunar_phase(day: u32) -> &'static str {
    let index = ((day as f64 % 29.5) / 3.7).floor() as usize;
    MOON_PHASES[index.min(MOON_PHASES.len() - 1)]
}

/// Tropical zodiac sign for a month (1-12) and day.
pub fn sun_sign(month: u32, day: u32) -> &'static str {
    let month_index = (month.clamp(1, 12) - 1) as usize;
    let (_, last_day) = ZODIAC[month_index];
    let index = if day > last_day {
        (month_index + 1) % 12
    } else {
        month_index
    };
    ZODIAC[index].0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::{Astro, Condition, Forecast, ForecastDay, Location};
    use test_case::test_case;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 13)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    // sunrise 06:00, sunset 20:00
    #[test_case(4, 59, TimeOfDay::Night ; "before dawn start")]
    #[test_case(5, 0, TimeOfDay::Dawn ; "dawn start inclusive")]
    #[test_case(6, 29, TimeOfDay::Dawn ; "just before dawn end")]
    #[test_case(6, 30, TimeOfDay::Day ; "dawn end is day")]
    #[test_case(19, 15, TimeOfDay::Dusk ; "dusk start inclusive")]
    #[test_case(20, 29, TimeOfDay::Dusk ; "just before dusk end")]
    #[test_case(20, 30, TimeOfDay::Night ; "dusk end is night")]
    fn test_time_of_day_boundaries(h: u32, m: u32, want: TimeOfDay) {
        assert_eq!(calculate_time_of_day(at(h, m), at(6, 0), at(20, 0)), want);
    }

    #[test]
    fn test_time_of_day_from_provider_strings() {
        let date = at(0, 0).date();
        assert_eq!(time_of_day_at(at(21, 40), "04:56 AM", "09:28 PM", date), TimeOfDay::Dusk);
        assert_eq!(time_of_day_at(at(12, 0), "garbage", "", date), TimeOfDay::Day);
    }

    #[test_case(1, Hemisphere::Northern, Season::Winter)]
    #[test_case(4, Hemisphere::Northern, Season::Spring)]
    #[test_case(7, Hemisphere::Southern, Season::Winter)]
    #[test_case(10, Hemisphere::Southern, Season::Spring)]
    #[test_case(12, Hemisphere::Southern, Season::Summer)]
    fn test_season(month: u32, hemisphere: Hemisphere, want: Season) {
        assert_eq!(season_for(month, hemisphere), want);
    }

    #[test_case(1, 19, "Capricorn")]
    #[test_case(1, 20, "Aquarius")]
    #[test_case(6, 13, "Gemini")]
    #[test_case(12, 22, "Capricorn")]
    fn test_sun_sign(month: u32, day: u32, want: &str) {
        assert_eq!(sun_sign(month, day), want);
    }

    #[test]
    fn test_approximate_lunar_phase_stays_in_table() {
        for day in 1..=31 {
            assert!(MOON_PHASES.contains(&approximate_lunar_phase(day)));
        }
        assert_eq!(approximate_lunar_phase(1), "New Moon");
        assert_eq!(approximate_lunar_phase(15), "Full Moon");
    }

    #[test]
    fn test_update_uses_location_clock_and_astro() {
        let report = WeatherReport {
            location: Some(Location {
                name: "Hobart".to_string(),
                lat: -42.9,
                localtime: Some("2025-06-13 23:10".to_string()),
                ..Default::default()
            }),
            current: Some(Current {
                condition: Condition {
                    text: "Clear".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            }),
            forecast: Some(Forecast {
                forecastday: vec![ForecastDay {
                    date: None,
                    astro: Astro {
                        sunrise: Some("07:40 AM".to_string()),
                        sunset: Some("04:44 PM".to_string()),
                        moon_phase: Some("Waning Gibbous".to_string()),
                        ..Default::default()
                    },
                }],
            }),
        };

        let mut env = SoundEnvironment::default();
        update_sound_environment(&mut env, &report, at(12, 0)).unwrap();

        assert_eq!(env.time_of_day, TimeOfDay::Night);
        assert!(!env.is_day);
        assert_eq!(env.hemisphere, Hemisphere::Southern);
        assert_eq!(env.season, Season::Winter);
        assert_eq!(env.lunar_phase, "Waning Gibbous");
        assert_eq!(env.condition.as_deref(), Some("Clear"));
    }

    #[test]
    fn test_update_rejects_incomplete_report() {
        let mut env = SoundEnvironment::default();
        let report = WeatherReport {
            current: Some(Current::default()),
            ..Default::default()
        };
        assert!(update_sound_environment(&mut env, &report, at(12, 0)).is_err());
        assert_eq!(env, SoundEnvironment::default());
    }
}
