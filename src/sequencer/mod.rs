/// Core sequencer logic - per-role step tracks and their clock dividers
/// Every track in every voice shares the same shape; the role decides what the values mean.
pub mod bank;
pub mod editor;
pub mod euclid;
pub mod playback;
pub mod scale;
pub mod shared;

pub const STEPS: usize = 16;
pub const VOICE_COUNT: usize = 4;
/// Master clock resolution, pulses per quarter note
pub const PPQN: u64 = 24;

pub const NOTE_RANGE: i16 = 12;
pub const GATE_RANGE: i16 = 7;
pub const VELOCITY_RANGE: i16 = 31;
pub const VELOCITY_SCALE: i16 = 4;
pub const PROBABILITY_RANGE: i16 = 9;
pub const RATCHET_RANGE: i16 = 4;
pub const MODULATION_RANGE: i16 = 127;

/// Ticks per step, indexed by a track's divider. Index 6 is one step per quarter note.
pub const DIVIDER_TABLE: [u16; 13] = [3, 4, 6, 8, 12, 16, 24, 36, 48, 72, 96, 192, 384];
pub const RATE_LABELS: [&str; 13] = [
    "8x", "6x", "4x", "3x", "2x", "1.5x", "1x", "/1.5", "/2", "/3", "/4", "/8", "/16",
];
pub const DEFAULT_DIVIDER: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackRole {
    Pitch,
    Offset,
    Gate,
    Velocity,
    Probability,
    Ratchet,
    Modulation,
}

impl TrackRole {
    pub const COUNT: usize = 7;
    pub const ALL: [TrackRole; Self::COUNT] = [
        TrackRole::Pitch,
        TrackRole::Offset,
        TrackRole::Gate,
        TrackRole::Velocity,
        TrackRole::Probability,
        TrackRole::Ratchet,
        TrackRole::Modulation,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            TrackRole::Pitch => "Note",
            TrackRole::Offset => "Offset",
            TrackRole::Gate => "Gate",
            TrackRole::Velocity => "Velocity",
            TrackRole::Probability => "Probability",
            TrackRole::Ratchet => "Ratchets",
            TrackRole::Modulation => "Mods",
        }
    }

    /// Inclusive bounds for step values of this role
    pub fn range(self) -> (i16, i16) {
        match self {
            TrackRole::Pitch | TrackRole::Offset => (-NOTE_RANGE, NOTE_RANGE),
            TrackRole::Gate => (0, GATE_RANGE),
            TrackRole::Velocity => (0, VELOCITY_RANGE),
            TrackRole::Probability => (0, PROBABILITY_RANGE),
            TrackRole::Ratchet => (0, RATCHET_RANGE),
            TrackRole::Modulation => (0, MODULATION_RANGE),
        }
    }

    pub fn max_value(self) -> i16 {
        self.range().1
    }

    fn initial_value(self) -> i16 {
        match self {
            TrackRole::Gate => 3,
            TrackRole::Velocity => 22, // ~70% of full scale
            TrackRole::Probability => PROBABILITY_RANGE,
            _ => 0,
        }
    }

    fn initial_root(self) -> i16 {
        match self {
            TrackRole::Probability => 0,
            TrackRole::Modulation => 1, // mod wheel
            _ => 60,
        }
    }
}

/// How a track's playhead moves on each step event.
/// Only Forward and Backward have defined motion; the rest advance like Forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    #[default]
    Forward,
    Backward,
    PingPong,
    Drunk,
    Random,
    Euclidean,
}

impl TraversalMode {
    pub const ALL: [TraversalMode; 6] = [
        TraversalMode::Forward,
        TraversalMode::Backward,
        TraversalMode::PingPong,
        TraversalMode::Drunk,
        TraversalMode::Random,
        TraversalMode::Euclidean,
    ];

    pub fn is_implemented(self) -> bool {
        matches!(self, TraversalMode::Forward | TraversalMode::Backward)
    }

    pub fn name(self) -> &'static str {
        match self {
            TraversalMode::Forward => "Forward",
            TraversalMode::Backward => "Backward",
            TraversalMode::PingPong => "Ping-pong",
            TraversalMode::Drunk => "Drunk",
            TraversalMode::Random => "Random",
            TraversalMode::Euclidean => "Euclidean",
        }
    }
}

/// One step pattern with its own clock divider and playhead.
///
/// `root` is role-conditional: the MIDI root note on pitch tracks, the
/// Euclidean rotation on probability tracks and the CC controller number on
/// modulation tracks. Use the role-named accessors rather than the raw field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    role: TrackRole,
    pub values: [i16; STEPS],
    pub step_index: usize,
    pub mode: TraversalMode,
    pub first_step: usize,
    pub last_step: usize,
    pub euclid_length: i16,
    pub euclid_beats: i16,
    pub divider: usize,
    pub ticks_remaining: u16,
    pub root: i16,
}

impl Track {
    pub fn new(role: TrackRole) -> Self {
        Self {
            role,
            values: [role.initial_value(); STEPS],
            step_index: 0,
            mode: TraversalMode::Forward,
            first_step: 0,
            last_step: STEPS - 1,
            euclid_length: STEPS as i16,
            euclid_beats: 1,
            divider: DEFAULT_DIVIDER,
            ticks_remaining: DIVIDER_TABLE[DEFAULT_DIVIDER],
            root: role.initial_root(),
        }
    }

    pub fn role(&self) -> TrackRole {
        self.role
    }

    pub fn max_value(&self) -> i16 {
        self.role.max_value()
    }

    /// Value under the playhead
    pub fn current(&self) -> i16 {
        self.values[self.step_index]
    }

    /// Reload value of the countdown. Panics if `divider` is outside the table.
    pub fn ticks_per_step(&self) -> u16 {
        DIVIDER_TABLE[self.divider]
    }

    pub fn root_note(&self) -> i16 {
        self.root
    }

    pub fn euclid_offset(&self) -> i16 {
        self.root
    }

    pub fn controller(&self) -> i16 {
        self.root
    }

    /// Store a step value, clamped into the role's range
    pub fn set_value(&mut self, step: usize, value: i16) {
        let (min, max) = self.role.range();
        if let Some(slot) = self.values.get_mut(step) {
            *slot = value.clamp(min, max);
        }
    }

    /// Set the active step window and pull the playhead inside it
    pub fn set_window(&mut self, first: usize, last: usize) {
        let first = first.min(STEPS - 1);
        let last = last.clamp(first, STEPS - 1);
        self.first_step = first;
        self.last_step = last;
        self.step_index = self.step_index.clamp(first, last);
    }

    /// Advance the divider by one master tick.
    /// Returns true when the divider rolled over and the playhead moved.
    pub fn clock(&mut self) -> bool {
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
        if self.ticks_remaining >= 1 {
            return false;
        }

        self.ticks_remaining = self.ticks_per_step();
        self.advance();
        true
    }

    fn advance(&mut self) {
        let (first, last) = (self.first_step, self.last_step);
        match self.mode {
            TraversalMode::Backward => {
                self.step_index = if self.step_index <= first || self.step_index > last {
                    last
                } else {
                    self.step_index - 1
                };
            }
            _ => {
                let next = self.step_index + 1;
                self.step_index = if next > last || next < first { first } else { next };
            }
        }
    }

    /// Put the playhead and divider back at the start of the pattern
    pub fn resync(&mut self) {
        self.step_index = 0;
        self.ticks_remaining = self.ticks_per_step();
    }
}
