//! Song form, drum patterns and voicing choices
//!
//! Pure functions only; the band layer turns their output into transport
//! events.

use std::fmt;

use serde::Serialize;

use crate::engine::{ChordSymbol, Pitch};
use crate::env::{DrumDensity, Genre};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Intro,
    Verse,
    Chorus,
    Outro,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::Intro => "intro",
            SectionKind::Verse => "verse",
            SectionKind::Chorus => "chorus",
            SectionKind::Outro => "outro",
        };
        f.write_str(name)
    }
}

/// Sections of one pass through the song, with their length in bars.
pub const SONG_FORM: [(SectionKind, u32); 6] = [
    (SectionKind::Intro, 4),
    (SectionKind::Verse, 8),
    (SectionKind::Chorus, 8),
    (SectionKind::Verse, 8),
    (SectionKind::Chorus, 8),
    (SectionKind::Outro, 4),
];

/// A section placed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub kind: SectionKind,
    /// Position among all placed sections; picks the section's chord.
    pub index: usize,
    pub start_bar: u32,
    pub bars: u32,
}

impl SectionSpan {
    pub fn is_chorus(&self) -> bool {
        self.kind == SectionKind::Chorus
    }
}

/// Lay the song form end to end until `total_bars` are filled, repeating
/// it as needed. The last section is cut short to fit.
///
/// # Example
/// ```
/// use aeolus::layers::band::arrangement::{arrange, SectionKind};
/// let sections = arrange(40);
/// assert_eq!(sections.len(), 6);
/// assert_eq!(sections[2].kind, SectionKind::Chorus);
/// assert_eq!(sections[2].start_bar, 12);
/// ```
pub fn arrange(total_bars: u32) -> Vec<SectionSpan> {
    let mut sections = Vec::new();
    let mut bar = 0;
    for (index, (kind, bars)) in SONG_FORM.iter().cycle().enumerate() {
        if bar >= total_bars {
            break;
        }
        let bars = (*bars).min(total_bars - bar);
        sections.push(SectionSpan {
            kind: *kind,
            index,
            start_bar: bar,
            bars,
        });
        bar += bars;
    }
    sections
}

/// Which drum voices sound on one quarter-note step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrumStep {
    pub kick: bool,
    pub snare: bool,
    pub hats: bool,
}

const fn step(kick: bool, snare: bool, hats: bool) -> DrumStep {
    DrumStep { kick, snare, hats }
}

/// One bar of drums for a genre.
pub fn beat_pattern(genre: Genre) -> [DrumStep; 4] {
    match genre {
        Genre::Ambient => [
            step(true, false, true),
            step(false, false, true),
            step(true, true, false),
            step(false, false, true),
        ],
        Genre::House => [
            step(true, false, true),
            step(false, false, true),
            step(true, false, true),
            step(false, true, true),
        ],
        Genre::Hiphop => [
            step(true, false, false),
            step(false, false, true),
            step(true, true, false),
            step(false, false, true),
        ],
    }
}

/// Thin or thicken a pattern: sparse keeps only kicks, medium plays it as
/// written, dense adds hats on every step.
pub fn apply_density(pattern: [DrumStep; 4], density: DrumDensity) -> [DrumStep; 4] {
    pattern.map(|s| match density {
        DrumDensity::Sparse => step(s.kick, false, false),
        DrumDensity::Medium => s,
        DrumDensity::Dense => step(s.kick, s.snare, true),
    })
}

/// Lead note for a chorus.
///
/// `roll` in `[0, 1)` picks the tone: below 0.3 one of the triad's notes
/// (chosen by `pick`), below 0.6 the fifth, otherwise the seventh.
pub fn wind_note(chord: &ChordSymbol, octave: i32, roll: f64, pick: usize) -> Pitch {
    if roll < 0.3 {
        let triad = chord.triad(octave);
        triad[pick % triad.len()]
    } else if roll < 0.6 {
        chord.fifth(octave)
    } else {
        chord.seventh_pitch(octave)
    }
}

/// Chord of a section: the progression cycles once per section.
pub fn section_chord(chords: &[String], section: &SectionSpan) -> Option<String> {
    if chords.is_empty() {
        return None;
    }
    Some(chords[section.index % chords.len()].clone())
}

/// Bass figure of a section: number of notes and the note value of each.
/// The figure repeats until the section ends.
pub fn bass_figure(kind: SectionKind) -> (usize, &'static str) {
    match kind {
        SectionKind::Intro => (8, "8n"),
        SectionKind::Verse => (16, "8n"),
        SectionKind::Chorus => (16, "4n"),
        SectionKind::Outro => (4, "2n"),
    }
}

/// Bass note over `chord`.
///
/// `roll` in `[0, 1)`: below 0.4 the root, below 0.7 the fifth, otherwise
/// the root an octave up.
///
/// # Example
/// ```
/// use aeolus::engine::ChordSymbol;
/// use aeolus::layers::band::arrangement::bass_note;
/// let am = ChordSymbol::parse("Am").unwrap();
/// assert_eq!(bass_note(&am, 1, 0.5).to_string(), "E2");
/// ```
pub fn bass_note(chord: &ChordSymbol, octave: i32, roll: f64) -> Pitch {
    if roll < 0.4 {
        chord.root_pitch(octave)
    } else if roll < 0.7 {
        chord.fifth(octave)
    } else {
        chord.root_pitch(octave + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_single_pass_form() {
        let sections = arrange(40);
        let layout: Vec<(SectionKind, u32, u32)> = sections
            .iter()
            .map(|s| (s.kind, s.start_bar, s.bars))
            .collect();
        assert_eq!(
            layout,
            vec![
                (SectionKind::Intro, 0, 4),
                (SectionKind::Verse, 4, 8),
                (SectionKind::Chorus, 12, 8),
                (SectionKind::Verse, 20, 8),
                (SectionKind::Chorus, 28, 8),
                (SectionKind::Outro, 36, 4),
            ]
        );
    }

    #[test]
    fn test_form_repeats_and_truncates() {
        let sections = arrange(46);
        assert_eq!(sections.len(), 8);
        assert_eq!(sections[6].kind, SectionKind::Intro);
        assert_eq!(sections[6].index, 6);
        assert_eq!(sections[7].kind, SectionKind::Verse);
        assert_eq!(sections[7].bars, 2);
        assert_eq!(sections.iter().map(|s| s.bars).sum::<u32>(), 46);
        assert!(arrange(0).is_empty());
    }

    #[test_case(DrumDensity::Sparse, [step(true, false, false), step(false, false, false), step(true, false, false), step(false, false, false)])]
    #[test_case(DrumDensity::Medium, beat_pattern(Genre::Ambient))]
    #[test_case(DrumDensity::Dense, [step(true, false, true), step(false, false, true), step(true, true, true), step(false, false, true)])]
    fn test_density_filter(density: DrumDensity, want: [DrumStep; 4]) {
        assert_eq!(apply_density(beat_pattern(Genre::Ambient), density), want);
    }

    #[test]
    fn test_every_pattern_opens_with_kick() {
        for genre in [Genre::Ambient, Genre::Hiphop, Genre::House] {
            assert!(beat_pattern(genre)[0].kick, "{} has no downbeat", genre);
        }
    }

    #[test_case(0.1, 1, "E4")]
    #[test_case(0.45, 0, "G4")]
    #[test_case(0.9, 0, "B4")]
    fn test_wind_note_major(roll: f64, pick: usize, want: &str) {
        let chord = ChordSymbol::parse("C").unwrap();
        assert_eq!(wind_note(&chord, 4, roll, pick).to_string(), want);
    }

    #[test]
    fn test_wind_note_minor_seventh() {
        let chord = ChordSymbol::parse("Am").unwrap();
        assert_eq!(wind_note(&chord, 3, 0.7, 0).to_string(), "G4");
    }

    #[test]
    fn test_chord_cycling() {
        let chords: Vec<String> = ["Am", "F", "Dm", "E"].iter().map(|c| c.to_string()).collect();
        let sections = arrange(40);
        assert_eq!(section_chord(&chords, &sections[5]).as_deref(), Some("F"));
        assert_eq!(section_chord(&[], &sections[5]), None);
    }

    #[test_case(0.1, "C1")]
    #[test_case(0.5, "G1")]
    #[test_case(0.95, "C2")]
    fn test_bass_note_roll(roll: f64, want: &str) {
        let chord = ChordSymbol::parse("C").unwrap();
        assert_eq!(bass_note(&chord, 1, roll).to_string(), want);
    }

    #[test]
    fn test_bass_figures_fill_whole_bars() {
        // Eighths, quarters and halves per 4/4 bar.
        let per_bar = |value: &str| match value {
            "8n" => 8,
            "4n" => 4,
            "2n" => 2,
            other => panic!("unexpected note value {}", other),
        };
        for (kind, _) in SONG_FORM {
            let (notes, value) = bass_figure(kind);
            assert_eq!(notes % per_bar(value), 0, "{} figure ends mid-bar", kind);
        }
        assert_eq!(bass_figure(SectionKind::Chorus), (16, "4n"));
    }
}
