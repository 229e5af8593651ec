/// Field edits coming from the UI, applied atomically against the bank
use super::bank::ClockSource;
use super::scale::Scale;
use super::shared::ExclusiveAccess;
use super::{TrackRole, TraversalMode, DIVIDER_TABLE, STEPS, VOICE_COUNT};

pub const MIN_ROOT: i16 = 1;
pub const MAX_ROOT: i16 = 115;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EditError {
    #[error("no voice {0}")]
    NoSuchVoice(usize),

    #[error("no step {0}")]
    NoSuchStep(usize),

    #[error("{0} traversal is not supported")]
    UnsupportedTraversal(&'static str),
}

/// What has to happen after an edit is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChange {
    Nothing,
    RecomputeEuclid,
}

/// One user-editable field and its new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    StepValue { role: TrackRole, step: usize, value: i16 },
    Divider { role: TrackRole, index: usize },
    Traversal { role: TrackRole, mode: TraversalMode },
    Window { role: TrackRole, first: usize, last: usize },
    EuclidLength(i16),
    EuclidBeats(i16),
    EuclidOffset(i16),
    /// Root note of the pitch track
    Root(i16),
    Scale(Scale),
    /// MIDI channel, 0-15
    Channel(u8),
    Enabled(bool),
    ModController(i16),
    ModChannel(u8),
    ModEnabled(bool),
    Bpm(u16),
    ClockSource(ClockSource),
}

impl Edit {
    pub fn on_change(&self) -> OnChange {
        match self {
            Edit::EuclidLength(_) | Edit::EuclidBeats(_) | Edit::EuclidOffset(_) => {
                OnChange::RecomputeEuclid
            }
            _ => OnChange::Nothing,
        }
    }

    /// Bank-wide settings that ignore the voice index
    pub fn is_global(&self) -> bool {
        matches!(self, Edit::Bpm(_) | Edit::ClockSource(_))
    }
}

/// Applies edits through whatever exclusive access the host provides
pub struct Editor<A: ExclusiveAccess> {
    access: A,
}

impl<A: ExclusiveAccess> Editor<A> {
    pub fn new(access: A) -> Self {
        Self { access }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn access_mut(&mut self) -> &mut A {
        &mut self.access
    }

    /// Clamp, write and run the on-change action in one critical section
    pub fn apply(&mut self, voice_index: usize, edit: Edit) -> Result<(), EditError> {
        if !edit.is_global() && voice_index >= VOICE_COUNT {
            return Err(EditError::NoSuchVoice(voice_index));
        }
        match edit {
            Edit::StepValue { step, .. } if step >= STEPS => return Err(EditError::NoSuchStep(step)),
            Edit::Traversal { mode, .. } if !mode.is_implemented() => {
                return Err(EditError::UnsupportedTraversal(mode.name()))
            }
            _ => {}
        }

        self.access.with_exclusive_access(|bank| {
            if let Edit::Bpm(bpm) = edit {
                bank.set_bpm(bpm);
                return Ok(());
            }
            if let Edit::ClockSource(source) = edit {
                bank.clock_source = source;
                return Ok(());
            }

            let voice = bank
                .voice_mut(voice_index)
                .ok_or(EditError::NoSuchVoice(voice_index))?;
            match edit {
                Edit::StepValue { role, step, value } => voice.track_mut(role).set_value(step, value),
                Edit::Divider { role, index } => {
                    let track = voice.track_mut(role);
                    track.divider = index.min(DIVIDER_TABLE.len() - 1);
                    // don't sit out a long countdown from a slower rate
                    track.ticks_remaining = track.ticks_remaining.min(track.ticks_per_step());
                }
                Edit::Traversal { role, mode } => voice.track_mut(role).mode = mode,
                Edit::Window { role, first, last } => voice.track_mut(role).set_window(first, last),
                Edit::EuclidLength(length) => {
                    voice.track_mut(TrackRole::Probability).euclid_length = length.clamp(1, STEPS as i16)
                }
                Edit::EuclidBeats(beats) => {
                    voice.track_mut(TrackRole::Probability).euclid_beats = beats.clamp(0, STEPS as i16)
                }
                Edit::EuclidOffset(offset) => {
                    let track = voice.track_mut(TrackRole::Probability);
                    let length = track.euclid_length.clamp(1, STEPS as i16);
                    track.root = offset.clamp(0, length - 1)
                }
                Edit::Root(root) => voice.track_mut(TrackRole::Pitch).root = root.clamp(MIN_ROOT, MAX_ROOT),
                Edit::Scale(scale) => voice.settings.scale = scale,
                Edit::Channel(channel) => voice.settings.channel = channel.min(15),
                Edit::Enabled(enabled) => voice.settings.enabled = enabled,
                Edit::ModController(controller) => {
                    voice.track_mut(TrackRole::Modulation).root = controller.clamp(0, 127)
                }
                Edit::ModChannel(channel) => voice.settings.mod_channel = channel.min(15),
                Edit::ModEnabled(enabled) => voice.settings.mod_enabled = enabled,
                Edit::Bpm(_) | Edit::ClockSource(_) => {}
            }

            match edit.on_change() {
                OnChange::RecomputeEuclid => {
                    voice.apply_euclidean();
                }
                OnChange::Nothing => {}
            }
            Ok(())
        })
    }

    /// Realign every track of every voice
    pub fn resync(&mut self) {
        self.access.with_exclusive_access(|bank| bank.resync());
    }
}
