use anyhow::{anyhow, Result};
use midir::{MidiInput, MidiInputConnection};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::input::TapSender;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MidiDevice {
    pub name: String,
}

/// Turns note-on messages from a MIDI input into taps.
pub struct MidiTapInput {
    port_name: String,
    _connection: MidiInputConnection<TapSender>,
}

impl MidiTapInput {
    pub fn list_inputs() -> Result<Vec<MidiDevice>> {
        let input = MidiInput::new("metra")?;
        Ok(input
            .ports()
            .iter()
            .map(|port| MidiDevice {
                name: input.port_name(port).unwrap_or_else(|_| "Unknown".into()),
            })
            .collect())
    }

    /// Connects to the named port, or the first one available.
    pub fn connect(port_name: Option<&str>, sender: TapSender) -> Result<Self> {
        let input = MidiInput::new("metra")?;
        let ports = input.ports();
        let port = ports
            .iter()
            .find(|port| match port_name {
                Some(wanted) => input.port_name(port).is_ok_and(|name| name == wanted),
                None => true,
            })
            .ok_or_else(|| anyhow!("no MIDI input matching {:?}", port_name))?;
        let name = input.port_name(port)?;
        let connection = input
            .connect(
                port,
                "metra-taps",
                |_stamp, message, sender: &mut TapSender| {
                    if is_note_on(message) {
                        sender.tap_now();
                    }
                },
                sender,
            )
            .map_err(|err| anyhow!("failed to connect MIDI input: {err}"))?;
        info!(port = %name, "MIDI tap input connected");
        Ok(Self {
            port_name: name,
            _connection: connection,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn is_note_on(message: &[u8]) -> bool {
    matches!(message, [status, _, velocity, ..] if status & 0xF0 == 0x90 && *velocity > 0)
}
