/// The full set of voices and their tracks, plus transport settings.
/// One `SequencerBank` is shared between the scheduler and the editor.
use super::euclid::{euclid, is_pulse};
use super::playback::VoicePlayback;
use super::scale::Scale;
use super::{Track, TrackRole, PPQN, PROBABILITY_RANGE, STEPS, VOICE_COUNT};

pub const DEFAULT_BPM: u16 = 120;
pub const MIN_BPM: u16 = 20;
pub const MAX_BPM: u16 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockSource {
    #[default]
    Internal,
    /// 24ppqn timing clock received over MIDI
    MidiClock,
}

/// Per-voice settings that are not step data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    pub enabled: bool,
    /// MIDI channel, 0-15
    pub channel: u8,
    pub scale: Scale,
    pub mod_channel: u8,
    pub mod_enabled: bool,
}

/// One musical voice: a track per role sharing a MIDI channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    tracks: [Track; TrackRole::COUNT],
    pub settings: VoiceSettings,
    pub playback: VoicePlayback,
}

impl Voice {
    pub fn new(channel: u8) -> Self {
        Self {
            tracks: TrackRole::ALL.map(Track::new),
            settings: VoiceSettings {
                enabled: true,
                channel: channel.min(15),
                scale: Scale::default(),
                mod_channel: channel.min(15),
                mod_enabled: false,
            },
            playback: VoicePlayback::default(),
        }
    }

    pub fn track(&self, role: TrackRole) -> &Track {
        &self.tracks[role.index()]
    }

    pub fn track_mut(&mut self, role: TrackRole) -> &mut Track {
        &mut self.tracks[role.index()]
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Track> {
        self.tracks.iter_mut()
    }

    /// Rewrite the probability track from its Euclidean settings.
    ///
    /// Pulses become 100% probability and rests 0% over the first
    /// `euclid_length` steps. The window ends at the last of those steps
    /// and its start is pulled back inside them.
    pub fn apply_euclidean(&mut self) -> u16 {
        let track = self.track_mut(TrackRole::Probability);
        let length = track.euclid_length.clamp(1, STEPS as i16);
        let beats = track.euclid_beats.clamp(0, length);
        let offset = track.euclid_offset().clamp(0, length - 1);
        let pattern = euclid(length, beats, offset);

        for step in 0..length as usize {
            track.values[step] = if is_pulse(pattern, length, step) {
                PROBABILITY_RANGE
            } else {
                0
            };
        }
        // the stored rotation is what actually plays
        track.root = offset;
        let last = length as usize - 1;
        let first = track.first_step.min(last);
        track.set_window(first, last);
        log::debug!(
            "euclidean probability E({},{}) offset {} -> {:0width$b}",
            beats,
            length,
            offset,
            pattern,
            width = length as usize
        );
        pattern
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerBank {
    voices: [Voice; VOICE_COUNT],
    pub bpm: u16,
    pub clock_source: ClockSource,
}

impl SequencerBank {
    pub fn new() -> Self {
        Self {
            voices: std::array::from_fn(|i| Voice::new(i as u8)),
            bpm: DEFAULT_BPM,
            clock_source: ClockSource::Internal,
        }
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    pub fn voice_mut(&mut self, index: usize) -> Option<&mut Voice> {
        self.voices.get_mut(index)
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    pub fn set_bpm(&mut self, bpm: u16) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Period of one 24ppqn master tick in whole milliseconds
    pub fn clock_period_ms(&self) -> u64 {
        let bpm = self.bpm.max(1) as u64;
        60_000 / (bpm * PPQN)
    }

    /// Reset every track's playhead and divider so all tracks line up again
    pub fn resync(&mut self) {
        for voice in self.voices.iter_mut() {
            for track in voice.tracks_mut() {
                track.resync();
            }
        }
        log::debug!("resynced all tracks");
    }
}

impl Default for SequencerBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::DIVIDER_TABLE;

    #[test]
    fn test_bank_defaults() {
        let bank = SequencerBank::new();
        assert_eq!(bank.voices().len(), VOICE_COUNT);
        for (i, voice) in bank.voices().iter().enumerate() {
            assert_eq!(voice.settings.channel, i as u8);
            assert_eq!(voice.settings.scale, Scale::Major);
            assert_eq!(voice.tracks().count(), TrackRole::COUNT);
            for role in TrackRole::ALL {
                assert_eq!(voice.track(role).role(), role);
            }
        }
        assert_eq!(bank.bpm, 120);
    }

    #[test]
    fn test_clock_period() {
        let mut bank = SequencerBank::new();
        assert_eq!(bank.clock_period_ms(), 20); // 20.83ms truncated
        bank.set_bpm(125);
        assert_eq!(bank.clock_period_ms(), 20);
        bank.set_bpm(60);
        assert_eq!(bank.clock_period_ms(), 41);
        bank.set_bpm(5);
        assert_eq!(bank.bpm, MIN_BPM);
        bank.set_bpm(500);
        assert_eq!(bank.bpm, MAX_BPM);
    }

    #[test]
    fn test_resync_realigns_every_track() {
        let mut bank = SequencerBank::new();
        bank.voice_mut(1).unwrap().track_mut(TrackRole::Gate).divider = 3;
        bank.voice_mut(2).unwrap().track_mut(TrackRole::Pitch).set_window(3, 7);
        bank.voice_mut(2).unwrap().track_mut(TrackRole::Pitch).values[5] = -4;
        for voice in bank.voices_mut() {
            for track in voice.tracks_mut() {
                for _ in 0..37 {
                    track.clock();
                }
            }
        }
        let before = bank.clone();

        bank.resync();

        for (voice, old) in bank.voices().iter().zip(before.voices()) {
            for (track, old) in voice.tracks().zip(old.tracks()) {
                assert_eq!(track.step_index, 0);
                assert_eq!(track.ticks_remaining, DIVIDER_TABLE[track.divider]);
                assert_eq!(track.values, old.values);
                assert_eq!((track.first_step, track.last_step), (old.first_step, old.last_step));
                assert_eq!(track.divider, old.divider);
            }
        }
    }

    #[test]
    fn test_euclidean_writes_probabilities() {
        let mut voice = Voice::new(0);
        {
            let probability = voice.track_mut(TrackRole::Probability);
            probability.euclid_length = 8;
            probability.euclid_beats = 3;
        }
        let pattern = voice.apply_euclidean();
        assert_eq!(pattern, 0b1001_0010);

        let probability = voice.track(TrackRole::Probability);
        assert_eq!(&probability.values[..8], &[9, 0, 0, 9, 0, 0, 9, 0]);
        // steps past the length are left alone
        assert_eq!(&probability.values[8..], &[9; 8]);
        assert_eq!(probability.last_step, 7);
    }

    #[test]
    fn test_euclidean_offset_lives_in_root_field() {
        let mut voice = Voice::new(0);
        {
            let probability = voice.track_mut(TrackRole::Probability);
            probability.euclid_length = 4;
            probability.euclid_beats = 1;
            // the probability track keeps its rotation in `root`
            probability.root = 2;
        }
        voice.apply_euclidean();
        let probability = voice.track(TrackRole::Probability);
        assert_eq!(probability.euclid_offset(), probability.root);
        assert_eq!(&probability.values[..4], &[0, 0, 9, 0]);
        // pitch root is a separate track and is untouched
        assert_eq!(voice.track(TrackRole::Pitch).root_note(), 60);
    }

    #[test]
    fn test_euclidean_window_covers_pattern() {
        let mut voice = Voice::new(0);
        {
            let probability = voice.track_mut(TrackRole::Probability);
            probability.set_window(10, 15);
            probability.step_index = 12;
            probability.euclid_length = 4;
            probability.euclid_beats = 1;
        }
        voice.apply_euclidean();

        let probability = voice.track(TrackRole::Probability);
        assert_eq!((probability.first_step, probability.last_step), (3, 3));
        assert_eq!(probability.step_index, 3);
        assert_eq!(&probability.values[..4], &[9, 0, 0, 0]);
    }

    #[test]
    fn test_euclidean_offset_stored_as_played() {
        let mut voice = Voice::new(0);
        {
            let probability = voice.track_mut(TrackRole::Probability);
            probability.euclid_length = 8;
            probability.euclid_beats = 3;
            probability.root = 10;
        }
        let pattern = voice.apply_euclidean();
        assert_eq!(voice.track(TrackRole::Probability).euclid_offset(), 7);
        assert_eq!(pattern, euclid(8, 3, 7));
    }

    #[test]
    fn test_euclidean_clamps_parameters() {
        let mut voice = Voice::new(0);
        {
            let probability = voice.track_mut(TrackRole::Probability);
            probability.euclid_length = 40;
            probability.euclid_beats = 99;
            probability.root = -3;
            probability.step_index = 15;
        }
        assert_eq!(voice.apply_euclidean(), 0xffff);
        let probability = voice.track(TrackRole::Probability);
        assert_eq!(probability.last_step, 15);

        let mut voice = Voice::new(0);
        voice.track_mut(TrackRole::Probability).euclid_length = 4;
        voice.track_mut(TrackRole::Probability).step_index = 12;
        voice.apply_euclidean();
        let probability = voice.track(TrackRole::Probability);
        assert_eq!(probability.last_step, 3);
        assert!(probability.step_index <= 3);
    }
}
