// Configuration - Player settings and song files (RON or JSON)

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::oscillator::{PeriodicWave, Waveform};
use crate::error::{PlayerError, Result};
use crate::sequencer::notes::NoteSequence;
use crate::sequencer::tempo::DEFAULT_BPM;

/// Synthesis settings fixed at player construction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerSettings {
    /// Oscillator shape for notes
    pub instrument: Waveform,
    /// Stored for callers; the loudness curve is applied to every note regardless
    pub volume_correction: bool,
    /// Custom wave, used instead of `instrument` when present
    pub waveform: Option<PeriodicWave>,
}

fn default_bpm() -> f64 {
    DEFAULT_BPM
}

/// A playable song: tempo, settings and the flat note list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    #[serde(default)]
    pub settings: PlayerSettings,
    pub notes: NoteSequence,
}

impl Song {
    pub fn from_ron_str(content: &str) -> Result<Self> {
        Ok(ron::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a song, picking the format from the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        match extension(path).as_str() {
            "ron" => Self::from_ron_str(&content),
            "json" => Self::from_json_str(&content),
            other => Err(PlayerError::Config(format!(
                "Unsupported song format: '{}' (expected .ron or .json)",
                other
            ))),
        }
    }

    /// Save a song, picking the format from the file extension
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match extension(path).as_str() {
            "ron" => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?,
            "json" => serde_json::to_string_pretty(self)?,
            other => {
                return Err(PlayerError::Config(format!(
                    "Unsupported song format: '{}' (expected .ron or .json)",
                    other
                )));
            }
        };
        fs::write(path, content)?;
        Ok(())
    }
}

/// Lowercased extension, empty when missing
pub fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// True for the extensions `Song::load` understands
pub fn is_song_file(path: &Path) -> bool {
    matches!(extension(path).as_str(), "ron" | "json")
}
