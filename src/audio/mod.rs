/// Audio preview using cpal: plays sequencer notes as a sine tone
/// so patterns can be auditioned without a synth attached.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

use crate::midi::MidiSink;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tone {
    note: u8,
    frequency: f32,
    amplitude: f32,
}

pub struct AudioOutput {
    _stream: Option<cpal::Stream>,
    tone: Arc<Mutex<Option<Tone>>>,
    /// Only notes on this channel are previewed; `None` previews all
    pub channel: Option<u8>,
}

impl AudioOutput {
    pub fn new() -> Option<Self> {
        let tone = Arc::new(Mutex::new(None));
        let stream = Self::setup_audio_stream(Arc::clone(&tone))?;

        Some(Self {
            _stream: Some(stream),
            tone,
            channel: None,
        })
    }

    /// A monitor with no audio device behind it
    pub fn silent() -> Self {
        Self {
            _stream: None,
            tone: Arc::new(Mutex::new(None)),
            channel: None,
        }
    }

    fn setup_audio_stream(tone: Arc<Mutex<Option<Tone>>>) -> Option<cpal::Stream> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        let config = device.default_output_config().ok()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;
        let mut phase = 0.0f32;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // skip a buffer rather than block the audio thread
                    let current = tone.try_lock().ok().and_then(|t| *t);
                    for frame in data.chunks_mut(channels.max(1)) {
                        let value = match current {
                            Some(tone) => {
                                let value = (phase * std::f32::consts::TAU).sin() * tone.amplitude;
                                phase = (phase + tone.frequency / sample_rate).fract();
                                value
                            }
                            None => {
                                phase = 0.0;
                                0.0
                            }
                        };
                        frame.fill(value);
                    }
                },
                |err| log::warn!("audio stream error: {}", err),
                None,
            ),
            format => {
                log::warn!("unsupported audio sample format {:?}", format);
                return None;
            }
        };

        match stream {
            Ok(stream) => {
                if let Err(e) = stream.play() {
                    log::warn!("could not start audio stream: {}", e);
                }
                Some(stream)
            }
            Err(e) => {
                log::warn!("could not open audio output: {}", e);
                None
            }
        }
    }

    fn previews(&self, channel: u8) -> bool {
        self.channel.map_or(true, |c| c == channel)
    }

    /// Note currently being previewed
    pub fn sounding(&self) -> Option<u8> {
        self.tone.lock().ok().and_then(|tone| (*tone).map(|t| t.note))
    }

    pub fn stop(&mut self) {
        if let Ok(mut tone) = self.tone.lock() {
            *tone = None;
        }
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new().unwrap_or_else(Self::silent)
    }
}

impl MidiSink for AudioOutput {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if !self.previews(channel) {
            return;
        }
        if let Ok(mut tone) = self.tone.lock() {
            *tone = Some(Tone {
                note,
                frequency: midi_note_to_frequency(note),
                amplitude: 0.25 * velocity.min(127) as f32 / 127.0,
            });
        }
    }

    fn note_off(&mut self, channel: u8, note: u8, _velocity: u8) {
        if !self.previews(channel) {
            return;
        }
        if let Ok(mut tone) = self.tone.lock() {
            // a later note may already have taken over
            if tone.map_or(false, |t| t.note == note) {
                *tone = None;
            }
        }
    }

    fn control_change(&mut self, _channel: u8, _controller: u8, _value: u8) {}
}

pub fn midi_note_to_frequency(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}
