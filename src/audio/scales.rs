use std::fmt;
use std::str::FromStr;

/// Lowest and highest octaves scanned when snapping a frequency to a scale.
const SCAN_OCTAVES: std::ops::RangeInclusive<i32> = -1..=10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    root: Note,
    scale: Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Note {
    #[default]
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    #[default]
    Major,
    Minor,
    HarmonicMinor,
    MelodicMinor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    Pentatonic,
    MinorPentatonic,
    Blues,
    Chromatic,
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

impl Note {
    pub const ALL: [Note; 12] = [
        Note::C,
        Note::Cs,
        Note::D,
        Note::Ds,
        Note::E,
        Note::F,
        Note::Fs,
        Note::G,
        Note::Gs,
        Note::A,
        Note::As,
        Note::B,
    ];

    /// Pitch class of the note, 0 for C through 11 for B.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Wraps any index onto the twelve pitch classes.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(NOTE_NAMES[self.index()])
    }
}

impl FromStr for Note {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" => Ok(Note::C),
            "c#" | "db" => Ok(Note::Cs),
            "d" => Ok(Note::D),
            "d#" | "eb" => Ok(Note::Ds),
            "e" => Ok(Note::E),
            "f" => Ok(Note::F),
            "f#" | "gb" => Ok(Note::Fs),
            "g" => Ok(Note::G),
            "g#" | "ab" => Ok(Note::Gs),
            "a" => Ok(Note::A),
            "a#" | "bb" => Ok(Note::As),
            "b" => Ok(Note::B),
            _ => Err(format!("Invalid note: {}", s)),
        }
    }
}

impl Scale {
    /// Enumerated order used by parameter indices.
    pub const ALL: [Scale; 13] = [
        Scale::Major,
        Scale::Minor,
        Scale::HarmonicMinor,
        Scale::MelodicMinor,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::Locrian,
        Scale::Pentatonic,
        Scale::MinorPentatonic,
        Scale::Blues,
        Scale::Chromatic,
    ];

    /// Semitone offsets from the root. Always starts with 0.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::Pentatonic => &[0, 2, 4, 7, 9],
            Scale::MinorPentatonic => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Out-of-range indices clamp to the last scale.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
            Scale::HarmonicMinor => "harmonic-minor",
            Scale::MelodicMinor => "melodic-minor",
            Scale::Dorian => "dorian",
            Scale::Phrygian => "phrygian",
            Scale::Lydian => "lydian",
            Scale::Mixolydian => "mixolydian",
            Scale::Locrian => "locrian",
            Scale::Pentatonic => "pentatonic",
            Scale::MinorPentatonic => "minor-pentatonic",
            Scale::Blues => "blues",
            Scale::Chromatic => "chromatic",
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "major" | "ionian" => Ok(Scale::Major),
            "minor" | "aeolian" => Ok(Scale::Minor),
            "harmonic-minor" => Ok(Scale::HarmonicMinor),
            "melodic-minor" => Ok(Scale::MelodicMinor),
            "dorian" => Ok(Scale::Dorian),
            "phrygian" => Ok(Scale::Phrygian),
            "lydian" => Ok(Scale::Lydian),
            "mixolydian" => Ok(Scale::Mixolydian),
            "locrian" => Ok(Scale::Locrian),
            "pentatonic" | "major-pentatonic" => Ok(Scale::Pentatonic),
            "minor-pentatonic" => Ok(Scale::MinorPentatonic),
            "blues" => Ok(Scale::Blues),
            "chromatic" => Ok(Scale::Chromatic),
            _ => Err(format!("Invalid scale: {}", s)),
        }
    }
}

impl FromStr for Key {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let root = parts.next().ok_or("Missing root note")?.parse::<Note>()?;
        let scale = parts.next().ok_or("Missing scale")?.parse::<Scale>()?;
        Ok(Key { root, scale })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.root, self.scale)
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::new(Note::C, Scale::Major)
    }
}

impl Key {
    pub fn new(root: Note, scale: Scale) -> Self {
        Self { root, scale }
    }

    pub fn root(&self) -> Note {
        self.root
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Snaps `freq` to the nearest note of this key. See [`nearest_scale_frequency`].
    pub fn nearest_frequency(&self, freq: f32) -> f32 {
        nearest_scale_frequency(freq, self.root.index(), self.scale.intervals())
    }

    /// Semitone offset of a scale-degree interval in this key.
    pub fn interval_semitones(&self, interval_degrees: i32) -> i32 {
        interval_to_semitones(interval_degrees, self.scale.intervals())
    }

    /// MIDI notes of the key between two octaves (octave -1 starts at MIDI 0).
    pub fn midi_scale(&self, octave1: i8, octave2: i8) -> Vec<u8> {
        let root_midi = self.root.index() as i32;
        let mut midi_scale = Vec::new();
        for octave in octave1..=octave2 {
            let base = (octave as i32 + 1) * 12;
            for &interval in self.scale.intervals() {
                let midi_note = base + root_midi + interval;
                if (0..=127).contains(&midi_note) {
                    midi_scale.push(midi_note as u8);
                }
            }
        }
        midi_scale.sort_unstable();
        midi_scale.dedup();
        midi_scale
    }

    pub fn scale_frequencies(&self, octave1: i8, octave2: i8) -> Vec<f32> {
        self.midi_scale(octave1, octave2)
            .iter()
            .map(|&m| midi_note_to_frequency(m as f32))
            .collect()
    }
}

/// Name with octave for a MIDI note, e.g. `A4` for 69.
pub fn note_name(midi_note: i32) -> String {
    let name = NOTE_NAMES[midi_note.rem_euclid(12) as usize];
    format!("{}{}", name, midi_note.div_euclid(12) - 1)
}

pub fn frequency_to_midi_note(freq: f32) -> f32 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

pub fn midi_note_to_frequency(midi_note: f32) -> f32 {
    440.0 * 2f32.powf((midi_note - 69.0) / 12.0)
}

/// Nearest in-scale MIDI note to `freq`, or `None` when `freq` is not a
/// usable pitch (zero, negative or non-finite).
///
/// Candidates are `root_index + interval + 12 * octave` for every template
/// interval over octaves -1..=10. Two equidistant candidates resolve to the
/// lower note, independent of scan order.
pub fn nearest_scale_note(freq: f32, root_index: usize, template: &[i32]) -> Option<i32> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let midi = frequency_to_midi_note(freq);
    let root = (root_index % 12) as i32;

    let mut best: Option<(i32, f32)> = None;
    for octave in SCAN_OCTAVES {
        for &interval in template {
            let candidate = root + interval + 12 * octave;
            let distance = (midi - candidate as f32).abs();
            best = match best {
                Some((note, best_distance))
                    if distance > best_distance
                        || (distance == best_distance && candidate >= note) =>
                {
                    Some((note, best_distance))
                }
                _ => Some((candidate, distance)),
            };
        }
    }
    best.map(|(note, _)| note)
}

/// Frequency of the nearest in-scale note, or 0 when `freq` carries no pitch.
pub fn nearest_scale_frequency(freq: f32, root_index: usize, template: &[i32]) -> f32 {
    match nearest_scale_note(freq, root_index, template) {
        Some(note) => midi_note_to_frequency(note as f32),
        None => 0.0,
    }
}

/// Number of distinct degrees in a template, ignoring octave repeats.
pub fn degree_count(template: &[i32]) -> usize {
    template.iter().filter(|&&s| (0..12).contains(&s)).count()
}

/// Semitone offset of a signed scale-degree interval.
///
/// The interval is reduced modulo the template's degree count; whole
/// octaves carry as multiples of 12. Zero is always unison.
pub fn interval_to_semitones(interval_degrees: i32, template: &[i32]) -> i32 {
    let degrees = degree_count(template) as i32;
    if interval_degrees == 0 || degrees == 0 {
        return 0;
    }
    let reduced = interval_degrees.rem_euclid(degrees);
    let octave_carry = interval_degrees.div_euclid(degrees);
    template[reduced as usize] + 12 * octave_carry
}

pub fn semitones_to_ratio(semitones: f32) -> f32 {
    2f32.powf(semitones / 12.0)
}
