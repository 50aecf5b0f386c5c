// Note sequence - Flat triple encoding of a melody
//
// Each note is three consecutive slots:
//   [denominator, marker, pitch]
// - denominator: 4 = quarter note, 8 = eighth... 0 = plays together with the previous note (chord)
// - marker: null = rest, any number = sounding note
// - pitch: semitone offset from middle C
//
// A step is a head triple plus the zero-denominator triples that follow it.

use crate::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};

/// Number of slots in one note triple
pub const SLOTS_PER_NOTE: usize = 3;

/// Denominator value marking a chord continuation
pub const CHORD_CONTINUATION: f64 = 0.0;

/// Validated flat note sequence
///
/// Serializes as the raw `[number|null]` array, so a loaded sequence reads
/// back exactly as it was written.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<f64>>", into = "Vec<Option<f64>>")]
pub struct NoteSequence {
    slots: Vec<Option<f64>>,
}

/// What a step produces
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Silence for the step's duration
    Rest,
    /// Pitches (semitone offsets) sounding together, in sequence order
    Notes(Vec<f64>),
}

/// One scheduling step: a single note, a chord or a rest
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Slot index of the head triple
    pub start: usize,
    /// Denominator of the head triple
    pub denominator: f64,
    pub kind: StepKind,
}

impl Step {
    /// Number of triples covered by this step
    pub fn note_count(&self) -> usize {
        match &self.kind {
            StepKind::Rest => 1,
            StepKind::Notes(pitches) => pitches.len(),
        }
    }

    /// Slot index right after this step
    pub fn end(&self) -> usize {
        self.start + self.note_count() * SLOTS_PER_NOTE
    }

    pub fn is_rest(&self) -> bool {
        matches!(self.kind, StepKind::Rest)
    }
}

impl NoteSequence {
    /// Validate and wrap a flat slot list
    pub fn new(slots: Vec<Option<f64>>) -> Result<Self> {
        validate(&slots)?;
        Ok(Self { slots })
    }

    /// Build from triples, `None` pitch marking a rest
    pub fn from_triples(triples: &[(f64, Option<f64>)]) -> Result<Self> {
        let mut slots = Vec::with_capacity(triples.len() * SLOTS_PER_NOTE);
        for &(denominator, pitch) in triples {
            match pitch {
                Some(pitch) => slots.extend([Some(denominator), Some(1.0), Some(pitch)]),
                None => slots.extend([Some(denominator), None, Some(0.0)]),
            }
        }
        Self::new(slots)
    }

    /// Number of slots (three per note)
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of note triples
    pub fn note_count(&self) -> usize {
        self.slots.len() / SLOTS_PER_NOTE
    }

    pub fn as_slice(&self) -> &[Option<f64>] {
        &self.slots
    }

    fn denominator(&self, index: usize) -> f64 {
        self.slots[index].unwrap_or(CHORD_CONTINUATION)
    }

    fn pitch(&self, index: usize) -> f64 {
        self.slots[index + 2].unwrap_or(0.0)
    }

    /// Slot index of the chord head owning the triple at `index`
    fn head_of(&self, mut index: usize) -> usize {
        while index >= SLOTS_PER_NOTE && self.denominator(index) == CHORD_CONTINUATION {
            index -= SLOTS_PER_NOTE;
        }
        index
    }

    /// The step starting at `index`, or `None` past the end
    ///
    /// An index landing inside a chord resolves to that chord's head.
    pub fn step_at(&self, index: usize) -> Option<Step> {
        if index >= self.slots.len() {
            return None;
        }
        let start = self.head_of(index - index % SLOTS_PER_NOTE);
        let denominator = self.denominator(start);

        if self.slots[start + 1].is_none() {
            return Some(Step {
                start,
                denominator,
                kind: StepKind::Rest,
            });
        }

        let mut pitches = vec![self.pitch(start)];
        let mut next = start + SLOTS_PER_NOTE;
        while next < self.slots.len() && self.denominator(next) == CHORD_CONTINUATION {
            pitches.push(self.pitch(next));
            next += SLOTS_PER_NOTE;
        }

        Some(Step {
            start,
            denominator,
            kind: StepKind::Notes(pitches),
        })
    }

    /// All steps from the beginning
    pub fn steps(&self) -> Steps<'_> {
        Steps {
            sequence: self,
            index: 0,
        }
    }
}

/// Iterator over the steps of a sequence
pub struct Steps<'a> {
    sequence: &'a NoteSequence,
    index: usize,
}

impl Iterator for Steps<'_> {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        let step = self.sequence.step_at(self.index)?;
        self.index = step.end();
        Some(step)
    }
}

impl TryFrom<Vec<Option<f64>>> for NoteSequence {
    type Error = PlayerError;

    fn try_from(slots: Vec<Option<f64>>) -> Result<Self> {
        Self::new(slots)
    }
}

impl From<NoteSequence> for Vec<Option<f64>> {
    fn from(sequence: NoteSequence) -> Self {
        sequence.slots
    }
}

fn invalid(message: String) -> PlayerError {
    PlayerError::InvalidArgument(message)
}

fn validate(slots: &[Option<f64>]) -> Result<()> {
    if slots.len() % SLOTS_PER_NOTE != 0 {
        return Err(invalid(format!(
            "note sequence length {} is not a multiple of {}",
            slots.len(),
            SLOTS_PER_NOTE
        )));
    }

    let mut previous_was_rest = false;
    for (n, triple) in slots.chunks(SLOTS_PER_NOTE).enumerate() {
        let index = n * SLOTS_PER_NOTE;

        let denominator = match triple[0] {
            Some(d) if d.is_finite() && d >= 0.0 => d,
            other => {
                return Err(invalid(format!(
                    "slot {}: denominator must be a non-negative number, got {:?}",
                    index, other
                )));
            }
        };

        let is_rest = match triple[1] {
            None => true,
            Some(marker) if marker.is_finite() => false,
            Some(marker) => {
                return Err(invalid(format!("slot {}: invalid marker {}", index + 1, marker)));
            }
        };

        match triple[2] {
            Some(pitch) if pitch.is_finite() => {}
            other => {
                return Err(invalid(format!(
                    "slot {}: pitch must be a number, got {:?}",
                    index + 2,
                    other
                )));
            }
        }

        if denominator == CHORD_CONTINUATION {
            if index == 0 {
                return Err(invalid("sequence cannot start with a chord continuation".into()));
            }
            if previous_was_rest || is_rest {
                return Err(invalid(format!("slot {}: rests cannot be part of a chord", index)));
            }
        }

        previous_was_rest = is_rest;
    }

    Ok(())
}
