/// Playback engine - master clock, note scheduling and the timing thread
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::bank::{ClockSource, SequencerBank, Voice};
use super::scale::quantize;
use super::shared::{ExclusiveAccess, SharedBank};
use super::{TrackRole, GATE_RANGE, PROBABILITY_RANGE, VELOCITY_SCALE};
use crate::midi::{ClockMessage, MidiMessage, MidiSink};

/// Milliseconds since some fixed point, never decreasing
pub trait TimeSource {
    fn now_ms(&self) -> u64;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

pub trait RandomSource {
    /// Roughly uniform value in `0..exclusive_max`, or 0 when the range is empty
    fn below(&mut self, exclusive_max: u32) -> u32;
}

pub struct FastRandom {
    rng: fastrand::Rng,
}

impl FastRandom {
    pub fn new() -> Self {
        Self {
            rng: fastrand::Rng::new(),
        }
    }
}

impl Default for FastRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for FastRandom {
    fn below(&mut self, exclusive_max: u32) -> u32 {
        if exclusive_max == 0 {
            return 0;
        }
        self.rng.u32(..exclusive_max)
    }
}

/// Runtime note state of one voice. Only the scheduler writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoicePlayback {
    pub active_note: Option<u8>,
    /// Channel the active note went out on; releases go there too
    pub active_channel: u8,
    pub active_velocity: u8,
    pub note_length_ms: i64,
    /// A full-length gate is holding the note into the next step
    pub tie: bool,
    pub ratchets_remaining: u8,
    pub note_off_at: u64,
}

fn deadline(now: u64, length_ms: i64) -> u64 {
    now.saturating_add_signed(length_ms)
}

/// Turns track steps into note events, one master tick at a time.
///
/// `poll` is meant to be called from a tight loop; it fires a tick once more
/// than one clock period has elapsed since the previous one. Late polls are
/// not compensated.
#[derive(Debug, Default)]
pub struct Scheduler {
    last_tick_ms: u64,
    last_pulse_ms: Option<u64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a tick if one is due on the internal clock. Returns whether it fired.
    pub fn poll<R, S>(&mut self, bank: &mut SequencerBank, now: u64, rng: &mut R, out: &mut S) -> bool
    where
        R: RandomSource + ?Sized,
        S: MidiSink + ?Sized,
    {
        if bank.clock_source != ClockSource::Internal {
            return false;
        }
        let period = bank.clock_period_ms();
        if now.saturating_sub(self.last_tick_ms) <= period {
            return false;
        }
        self.tick(bank, now, period, rng, out);
        true
    }

    /// One tick per received MIDI clock pulse. The gap since the previous
    /// pulse stands in for the clock period.
    pub fn external_pulse<R, S>(&mut self, bank: &mut SequencerBank, now: u64, rng: &mut R, out: &mut S)
    where
        R: RandomSource + ?Sized,
        S: MidiSink + ?Sized,
    {
        let period = match self.last_pulse_ms {
            Some(previous) if now > previous => now - previous,
            _ => bank.clock_period_ms(),
        };
        self.last_pulse_ms = Some(now);
        self.tick(bank, now, period, rng, out);
    }

    /// Forget the pulse spacing, e.g. after the external clock stopped
    pub fn reset_external(&mut self) {
        self.last_pulse_ms = None;
    }

    /// Clock every track of every voice once, then release notes whose time is up
    pub fn tick<R, S>(&mut self, bank: &mut SequencerBank, now: u64, period_ms: u64, rng: &mut R, out: &mut S)
    where
        R: RandomSource + ?Sized,
        S: MidiSink + ?Sized,
    {
        self.last_tick_ms = now;
        for voice in bank.voices_mut() {
            step_voice(voice, now, period_ms, rng, out);
        }
        for voice in bank.voices_mut() {
            release_due(voice, now, out);
        }
    }

    /// Silence every sounding note and drop pending ties and ratchets
    pub fn all_notes_off<S: MidiSink + ?Sized>(&mut self, bank: &mut SequencerBank, out: &mut S) {
        for voice in bank.voices_mut() {
            let playback = &mut voice.playback;
            if let Some(note) = playback.active_note.take() {
                out.note_off(playback.active_channel, note, 0);
            }
            playback.tie = false;
            playback.ratchets_remaining = 0;
        }
    }
}

fn step_voice<R, S>(voice: &mut Voice, now: u64, period_ms: u64, rng: &mut R, out: &mut S)
where
    R: RandomSource + ?Sized,
    S: MidiSink + ?Sized,
{
    for role in [
        TrackRole::Pitch,
        TrackRole::Offset,
        TrackRole::Velocity,
        TrackRole::Probability,
        TrackRole::Ratchet,
    ] {
        voice.track_mut(role).clock();
    }
    let mod_stepped = voice.track_mut(TrackRole::Modulation).clock();
    // gate goes last: its step event is the note-on boundary
    let gate_stepped = voice.track_mut(TrackRole::Gate).clock();

    if mod_stepped && voice.settings.mod_enabled {
        let modulation = voice.track(TrackRole::Modulation);
        out.control_change(
            voice.settings.mod_channel,
            modulation.controller().clamp(0, 127) as u8,
            modulation.current().clamp(0, 127) as u8,
        );
    }

    if !gate_stepped || !voice.settings.enabled {
        return;
    }
    let probability = voice.track(TrackRole::Probability).current();
    let draw = rng.below((PROBABILITY_RANGE - 1) as u32);
    if i64::from(draw) >= i64::from(probability) {
        return;
    }

    let gate = voice.track(TrackRole::Gate);
    let gate_value = gate.current() as i64;
    let ticks_per_step = gate.ticks_per_step() as i64;
    let ratchets = voice.track(TrackRole::Ratchet).current();
    let period = period_ms as i64;

    let mut length = period * gate_value * ticks_per_step / GATE_RANGE as i64;
    if length > 0 && ratchets > 0 {
        // r ratchets play r + 1 notes, each half of a 1/r slice
        length = period * ticks_per_step / (ratchets as i64 * 2);
    }

    let pitch = voice.track(TrackRole::Pitch);
    let root = pitch.root_note();
    let sounding = pitch.current() as i32 + voice.track(TrackRole::Offset).current() as i32 + root as i32;
    let velocity = voice.track(TrackRole::Velocity).current() as i32 * VELOCITY_SCALE as i32;
    let channel = voice.settings.channel;
    let scale = voice.settings.scale.mask();

    let playback = &mut voice.playback;
    playback.note_length_ms = length;
    playback.ratchets_remaining = u8::try_from(ratchets).unwrap_or(0);
    playback.note_off_at = deadline(now, length);

    if length > 0 && !playback.tie {
        if let Some(previous) = playback.active_note.take() {
            out.note_off(playback.active_channel, previous, 0);
        }
        let note = quantize(sounding.clamp(0, 127) as u8, scale, root.clamp(0, 127) as u8);
        let velocity = velocity.clamp(0, 127) as u8;
        playback.active_note = Some(note);
        playback.active_channel = channel;
        playback.active_velocity = velocity;
        out.note_on(channel, note, velocity);
    }

    playback.tie = gate_value == GATE_RANGE as i64 && ratchets == 0;
}

fn release_due<S: MidiSink + ?Sized>(voice: &mut Voice, now: u64, out: &mut S) {
    let playback = &mut voice.playback;
    let channel = playback.active_channel;
    if now <= playback.note_off_at {
        return;
    }

    if let Some(note) = playback.active_note {
        if !playback.tie {
            out.note_off(channel, note, 0);
            if playback.ratchets_remaining == 0 {
                playback.active_note = None;
            } else {
                playback.note_off_at = deadline(now, playback.note_length_ms);
            }
        }
    }

    if playback.ratchets_remaining > 0 {
        if let Some(note) = playback.active_note {
            out.note_on(channel, note, playback.active_velocity);
            playback.ratchets_remaining -= 1;
            playback.note_off_at = deadline(now, playback.note_length_ms);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Midi(MidiMessage),
    Stopped,
}

pub type SharedSink = Arc<Mutex<dyn MidiSink + Send>>;

/// Events queued for a consumer that has not polled yet. Newer events are
/// dropped once the queue is full.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Runs the scheduler on its own thread against a shared bank
pub struct PlaybackEngine {
    sender: SyncSender<PlaybackEvent>,
    receiver: Receiver<PlaybackEvent>,
    mirror_events: bool,
    is_running: Arc<AtomicBool>,
    clock_sender: Sender<ClockMessage>,
    clock_receiver: Option<Receiver<ClockMessage>>,
    handle: Option<JoinHandle<Receiver<ClockMessage>>>,
}

impl PlaybackEngine {
    /// An engine that mirrors what it plays as `PlaybackEvent`s for `poll_events`
    pub fn new() -> Self {
        Self::with_event_capacity(EVENT_QUEUE_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        let (sender, receiver) = sync_channel(capacity);
        let (clock_sender, clock_receiver) = channel();

        Self {
            sender,
            receiver,
            mirror_events: capacity > 0,
            is_running: Arc::new(AtomicBool::new(false)),
            clock_sender,
            clock_receiver: Some(clock_receiver),
            handle: None,
        }
    }

    /// An engine for callers that never poll: nothing is queued
    pub fn without_events() -> Self {
        Self::with_event_capacity(0)
    }

    /// Where a MIDI clock input should deliver its messages
    pub fn clock_sender(&self) -> Sender<ClockMessage> {
        self.clock_sender.clone()
    }

    pub fn start(&mut self, bank: SharedBank, output: SharedSink) {
        if self.is_running() {
            return;
        }
        let Some(clock_receiver) = self.clock_receiver.take() else {
            return;
        };

        self.is_running.store(true, Ordering::Release);
        let is_running = Arc::clone(&self.is_running);
        let events = self.mirror_events.then(|| self.sender.clone());

        self.handle = Some(thread::spawn(move || {
            run_clock(bank, output, clock_receiver, is_running, events)
        }));
        log::info!("playback started");
    }

    pub fn stop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(clock_receiver) => self.clock_receiver = Some(clock_receiver),
                Err(_) => {
                    log::error!("playback thread panicked");
                    let (clock_sender, clock_receiver) = channel();
                    self.clock_sender = clock_sender;
                    self.clock_receiver = Some(clock_receiver);
                }
            }
            log::info!("playback stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn poll_events(&self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

type EventSender = Option<SyncSender<PlaybackEvent>>;

/// Never blocks the clock thread: a full or abandoned queue loses the event
fn mirror(events: &EventSender, event: PlaybackEvent) {
    if let Some(sender) = events {
        let _ = sender.try_send(event);
    }
}

fn flush(batch: &mut Vec<MidiMessage>, output: &SharedSink, events: &EventSender) {
    if batch.is_empty() {
        return;
    }
    let mut sink = output.lock().unwrap_or_else(PoisonError::into_inner);
    for message in batch.drain(..) {
        message.send_to(&mut *sink);
        mirror(events, PlaybackEvent::Midi(message));
    }
}

fn run_clock(
    mut bank: SharedBank,
    output: SharedSink,
    clock_receiver: Receiver<ClockMessage>,
    is_running: Arc<AtomicBool>,
    events: EventSender,
) -> Receiver<ClockMessage> {
    let clock = MonotonicClock::new();
    let mut rng = FastRandom::new();
    let mut scheduler = Scheduler::new();
    let mut batch: Vec<MidiMessage> = Vec::with_capacity(32);

    // pulses that arrived while stopped are stale
    while clock_receiver.try_recv().is_ok() {}

    while is_running.load(Ordering::Acquire) {
        let now = clock.now_ms();
        bank.with_bank(|bank| {
            scheduler.poll(bank, now, &mut rng, &mut batch);
            while let Ok(message) = clock_receiver.try_recv() {
                if bank.clock_source != ClockSource::MidiClock {
                    continue;
                }
                match message {
                    ClockMessage::Pulse => scheduler.external_pulse(bank, now, &mut rng, &mut batch),
                    ClockMessage::Start => {
                        bank.resync();
                        scheduler.reset_external();
                    }
                    ClockMessage::Continue => {}
                    ClockMessage::Stop => {
                        scheduler.all_notes_off(bank, &mut batch);
                        scheduler.reset_external();
                    }
                }
            }
        });

        // MIDI goes out after the lock is released
        flush(&mut batch, &output, &events);
        thread::yield_now();
    }

    bank.with_exclusive_access(|bank| scheduler.all_notes_off(bank, &mut batch));
    flush(&mut batch, &output, &events);
    mirror(&events, PlaybackEvent::Stopped);
    clock_receiver
}
