/// polyseq - a four-voice MIDI step sequencer
///
/// This library provides the sequencing core and its I/O edges:
/// - Per-role step tracks with clock dividers, scale quantization and Euclidean probability
/// - A tick scheduler with gates, ties, ratchets and probability
/// - MIDI output and clock input for production use
/// - Audio preview for testing
/// - TOML configuration

pub mod audio;
pub mod config;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::AudioOutput;
pub use config::{Config, ConfigError};
pub use midi::{midi_note_name, ClockMessage, MidiClockInput, MidiError, MidiMessage, MidiOutputDevice, MidiSink};
pub use sequencer::bank::{ClockSource, SequencerBank, Voice};
pub use sequencer::editor::{Edit, EditError, Editor};
pub use sequencer::playback::{PlaybackEngine, PlaybackEvent, Scheduler};
pub use sequencer::scale::Scale;
pub use sequencer::shared::{ExclusiveAccess, SharedBank};
pub use sequencer::{Track, TrackRole, TraversalMode};
