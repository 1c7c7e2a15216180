//! Pitch and chord helpers
//!
//! Pitches are MIDI note numbers. Chord symbols are a root name with an
//! optional trailing `m` for minor (`C`, `Am`, `F#m`, `Bb`).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{AeolusError, Result};

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Frequency of A2 in Hz.
pub const A2_HZ: f64 = 110.0;

/// A MIDI note number (`A4` = 69).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Pitch(i32);

impl Pitch {
    pub fn from_midi(midi: i32) -> Self {
        Self(midi)
    }

    pub fn midi(&self) -> i32 {
        self.0
    }

    /// Equal-tempered frequency with A4 at 440 Hz.
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.0 - 69) as f64 / 12.0)
    }

    pub fn transpose(&self, semitones: i32) -> Self {
        Self(self.0 + semitones)
    }

    /// Build from a pitch class (0 = C) and octave.
    pub fn from_class(class: i32, octave: i32) -> Self {
        Self((octave + 1) * 12 + class.rem_euclid(12))
    }

    pub fn class(&self) -> i32 {
        self.0.rem_euclid(12)
    }

    pub fn octave(&self) -> i32 {
        self.0.div_euclid(12) - 1
    }

    /// Parse a note name such as `C#4`, `Eb3` or `G6`.
    ///
    /// # Example
    /// ```
    /// use aeolus::engine::Pitch;
    /// let a4 = Pitch::parse("A4").unwrap();
    /// assert_eq!(a4.midi(), 69);
    /// assert_eq!(Pitch::parse("Eb3").unwrap(), Pitch::parse("D#3").unwrap());
    /// ```
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = || AeolusError::InvalidPitch {
            name: name.to_string(),
        };
        let split = name
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '-')
            .map(|(i, _)| i)
            .ok_or_else(invalid)?;
        let (class_name, octave) = name.split_at(split);
        let class = pitch_class(class_name).ok_or_else(invalid)?;
        let octave: i32 = octave.parse().map_err(|_| invalid())?;
        Ok(Self::from_class(class, octave))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", NOTE_NAMES[self.class() as usize], self.octave())
    }
}

impl FromStr for Pitch {
    type Err = AeolusError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Pitch class of a note name without octave (`C` = 0, `Bb` = 10).
pub fn pitch_class(name: &str) -> Option<i32> {
    let mut chars = name.chars();
    let base = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let mut offset: i32 = 0;
    for accidental in chars {
        match accidental {
            '#' => offset += 1,
            'b' => offset -= 1,
            _ => return None,
        }
    }
    Some((base + offset).rem_euclid(12))
}

/// `base_hz` moved by a (possibly fractional) number of semitones.
pub fn transpose_frequency(base_hz: f64, semitones: f64) -> f64 {
    base_hz * 2f64.powf(semitones / 12.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordQuality {
    Major,
    Minor,
}

/// A parsed chord symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordSymbol {
    pub root: i32,
    pub quality: ChordQuality,
}

impl ChordSymbol {
    pub fn parse(symbol: &str) -> Result<Self> {
        let symbol = symbol.trim();
        let (root, quality) = match symbol.strip_suffix('m') {
            Some(root) => (root, ChordQuality::Minor),
            None => (symbol, ChordQuality::Major),
        };
        let root = pitch_class(root).ok_or_else(|| AeolusError::InvalidPitch {
            name: symbol.to_string(),
        })?;
        Ok(Self { root, quality })
    }

    fn third(&self) -> i32 {
        match self.quality {
            ChordQuality::Major => 4,
            ChordQuality::Minor => 3,
        }
    }

    fn seventh(&self) -> i32 {
        match self.quality {
            ChordQuality::Major => 11,
            ChordQuality::Minor => 10,
        }
    }

    /// Root of the chord in `octave`.
    pub fn root_pitch(&self, octave: i32) -> Pitch {
        Pitch::from_class(self.root, octave)
    }

    /// Root-position triad in `octave`.
    pub fn triad(&self, octave: i32) -> Vec<Pitch> {
        let root = self.root_pitch(octave);
        vec![root, root.transpose(self.third()), root.transpose(7)]
    }

    pub fn fifth(&self, octave: i32) -> Pitch {
        self.root_pitch(octave).transpose(7)
    }

    pub fn seventh_pitch(&self, octave: i32) -> Pitch {
        self.root_pitch(octave).transpose(self.seventh())
    }
}

/// Triad for `symbol` in `octave`, rotated by `inversion` (0 = root position).
///
/// # Example
/// ```
/// use aeolus::engine::pitch::expand_chord;
/// let first = expand_chord("C", 4, 1).unwrap();
/// let names: Vec<String> = first.iter().map(|p| p.to_string()).collect();
/// assert_eq!(names, ["E4", "G4", "C5"]);
/// ```
pub fn expand_chord(symbol: &str, octave: i32, inversion: usize) -> Result<Vec<Pitch>> {
    let mut notes = ChordSymbol::parse(symbol)?.triad(octave);
    for _ in 0..inversion % notes.len() {
        let lowest = notes.remove(0);
        notes.push(lowest.transpose(12));
    }
    Ok(notes)
}
