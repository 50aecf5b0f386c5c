// Sequencer module
// Note sequences, tempo, scheduling and the player transport

pub mod notes;
pub mod player;
pub mod scheduler;
pub mod tempo;
pub mod voicing;

pub use notes::{NoteSequence, Step, StepKind};
pub use player::{Contents, FileSource, Player, TransportState};
pub use scheduler::{EventLoop, Scheduler, TaskId};
pub use tempo::Tempo;
pub use voicing::{Envelope, Tone};
