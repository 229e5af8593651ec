/// MIDI output using midir, plus the sink trait the scheduler talks to
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::sync::mpsc::Sender;

const CLIENT_NAME: &str = "polyseq";

const TIMING_CLOCK: u8 = 0xF8;
const START: u8 = 0xFA;
const CONTINUE: u8 = 0xFB;
const STOP: u8 = 0xFC;

#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("failed to create MIDI client: {0}")]
    Init(String),

    #[error("no MIDI port matching {0:?}")]
    PortNotFound(String),

    #[error("invalid port index {0}")]
    InvalidPort(usize),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send: {0}")]
    Send(#[from] midir::SendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
}

impl MidiMessage {
    pub fn to_bytes(self) -> [u8; 3] {
        match self {
            MidiMessage::NoteOn { channel, note, velocity } => {
                [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOff { channel, note, velocity } => {
                [0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, controller, value } => {
                [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
            }
        }
    }

    /// Replay this message into another sink
    pub fn send_to<S: MidiSink + ?Sized>(self, sink: &mut S) {
        match self {
            MidiMessage::NoteOn { channel, note, velocity } => sink.note_on(channel, note, velocity),
            MidiMessage::NoteOff { channel, note, velocity } => sink.note_off(channel, note, velocity),
            MidiMessage::ControlChange { channel, controller, value } => {
                sink.control_change(channel, controller, value)
            }
        }
    }
}

/// Fire-and-forget destination for note events
pub trait MidiSink {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8);
    fn note_off(&mut self, channel: u8, note: u8, velocity: u8);
    fn control_change(&mut self, channel: u8, controller: u8, value: u8);
}

/// Buffers messages so they can be sent once the bank lock is released
impl MidiSink for Vec<MidiMessage> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.push(MidiMessage::NoteOn { channel, note, velocity });
    }

    fn note_off(&mut self, channel: u8, note: u8, velocity: u8) {
        self.push(MidiMessage::NoteOff { channel, note, velocity });
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.push(MidiMessage::ControlChange { channel, controller, value });
    }
}

impl<S: MidiSink + ?Sized> MidiSink for Box<S> {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).note_on(channel, note, velocity)
    }

    fn note_off(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).note_off(channel, note, velocity)
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        (**self).control_change(channel, controller, value)
    }
}

fn find_port(names: &[String], wanted: &str) -> Option<usize> {
    let wanted = wanted.to_lowercase();
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&wanted))
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    port_name: Option<String>,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            port_name: None,
        }
    }

    pub fn available_ports() -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(e) => {
                log::warn!("MIDI output unavailable: {}", e);
                vec![]
            }
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports.get(port_index).ok_or(MidiError::InvalidPort(port_index))?;
        let name = midi_out.port_name(port).unwrap_or_else(|_| format!("port {}", port_index));

        let connection = midi_out
            .connect(port, "polyseq-out")
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        // the old port is closed only once the new one is open
        self.disconnect();
        log::info!("connected MIDI output to {}", name);
        self.connection = Some(connection);
        self.port_name = Some(name);
        Ok(())
    }

    /// Connect to the first port whose name contains `wanted` (case-insensitive)
    pub fn connect_by_name(&mut self, wanted: &str) -> Result<(), MidiError> {
        let names = Self::available_ports();
        let index = find_port(&names, wanted)
            .ok_or_else(|| MidiError::PortNotFound(wanted.to_string()))?;
        self.connect(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn send(&mut self, message: MidiMessage) -> Result<(), MidiError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(&message.to_bytes())?;
        }
        Ok(())
    }

    fn send_or_log(&mut self, message: MidiMessage) {
        if let Err(e) = self.send(message) {
            log::warn!("dropped {:?}: {}", message, e);
        }
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
            log::info!("disconnected MIDI output");
        }
        self.port_name = None;
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiSink for MidiOutputDevice {
    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send_or_log(MidiMessage::NoteOn { channel, note, velocity });
    }

    fn note_off(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send_or_log(MidiMessage::NoteOff { channel, note, velocity });
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        self.send_or_log(MidiMessage::ControlChange { channel, controller, value });
    }
}

/// Realtime messages relevant to following an external clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMessage {
    Pulse,
    Start,
    Continue,
    Stop,
}

impl ClockMessage {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match *bytes.first()? {
            TIMING_CLOCK => Some(ClockMessage::Pulse),
            START => Some(ClockMessage::Start),
            CONTINUE => Some(ClockMessage::Continue),
            STOP => Some(ClockMessage::Stop),
            _ => None,
        }
    }
}

/// Listens on a MIDI input port and forwards clock messages to the playback engine
pub struct MidiClockInput {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiClockInput {
    pub fn available_ports() -> Vec<String> {
        match MidiInput::new(CLIENT_NAME) {
            Ok(midi_in) => midi_in
                .ports()
                .iter()
                .filter_map(|p| midi_in.port_name(p).ok())
                .collect(),
            Err(e) => {
                log::warn!("MIDI input unavailable: {}", e);
                vec![]
            }
        }
    }

    pub fn connect(wanted: &str, pulses: Sender<ClockMessage>) -> Result<Self, MidiError> {
        let mut midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        // keep timing clock and start/stop, drop only sysex
        midi_in.ignore(midir::Ignore::Sysex);

        let ports = midi_in.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_in.port_name(p).unwrap_or_default())
            .collect();
        let index =
            find_port(&names, wanted).ok_or_else(|| MidiError::PortNotFound(wanted.to_string()))?;
        let port_name = names[index].clone();

        let connection = midi_in
            .connect(
                &ports[index],
                "polyseq-clock",
                move |_stamp, bytes, _| {
                    if let Some(message) = ClockMessage::parse(bytes) {
                        // receiver gone means playback stopped
                        let _ = pulses.send(message);
                    }
                },
                (),
            )
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        log::info!("following MIDI clock from {}", port_name);
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

pub fn midi_note_name(note: u8) -> String {
    let note_names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
    let octave = (note / 12) as i32 - 1;
    let note_index = (note % 12) as usize;
    format!("{}{}", note_names[note_index], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_bytes() {
        let on = MidiMessage::NoteOn { channel: 2, note: 60, velocity: 100 };
        assert_eq!(on.to_bytes(), [0x92, 60, 100]);
        let off = MidiMessage::NoteOff { channel: 15, note: 61, velocity: 0 };
        assert_eq!(off.to_bytes(), [0x8F, 61, 0]);
        let cc = MidiMessage::ControlChange { channel: 0, controller: 1, value: 200 };
        assert_eq!(cc.to_bytes(), [0xB0, 1, 200 & 0x7F]);
    }

    #[test]
    fn test_buffer_sink_replays_in_order() {
        let mut buffer: Vec<MidiMessage> = Vec::new();
        buffer.note_on(0, 60, 90);
        buffer.control_change(1, 74, 12);
        buffer.note_off(0, 60, 0);

        let mut replay: Vec<MidiMessage> = Vec::new();
        for message in buffer.iter().copied() {
            message.send_to(&mut replay);
        }
        assert_eq!(replay, buffer);
    }

    #[test]
    fn test_clock_message_parse() {
        assert_eq!(ClockMessage::parse(&[0xF8]), Some(ClockMessage::Pulse));
        assert_eq!(ClockMessage::parse(&[0xFA]), Some(ClockMessage::Start));
        assert_eq!(ClockMessage::parse(&[0xFC]), Some(ClockMessage::Stop));
        assert_eq!(ClockMessage::parse(&[0x90, 60, 1]), None);
        assert_eq!(ClockMessage::parse(&[]), None);
    }

    #[test]
    fn test_find_port_is_case_insensitive() {
        let names = vec!["IAC Driver Bus 1".to_string(), "USB MIDI Interface".to_string()];
        assert_eq!(find_port(&names, "usb"), Some(1));
        assert_eq!(find_port(&names, "iac"), Some(0));
        assert_eq!(find_port(&names, "missing"), None);
    }

    #[test]
    fn test_unconnected_output_is_inert() {
        let mut output = MidiOutputDevice::new();
        assert!(output.send(MidiMessage::NoteOn { channel: 0, note: 60, velocity: 90 }).is_ok());
        output.disconnect();
        assert!(!output.is_connected());
        assert_eq!(output.port_name(), None);
    }

    #[test]
    fn test_midi_note_name() {
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(69), "A4");
        assert_eq!(midi_note_name(0), "C-1");
    }
}
