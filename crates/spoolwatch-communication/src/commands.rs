//! Operator command translation
//!
//! Maps abstract commands onto the printer's nested envelopes:
//!
//! ```text
//! { "print":  { "sequence_id": "7", "command": "pause" } }
//! { "system": { "sequence_id": "8", "command": "home", "axis": "z" } }
//! ```
//!
//! Names outside the known vocabulary are forwarded as `{ "<name>": params }`.
//! Commands are never retried here; they are not idempotent.

use crate::communication::{Publisher, TopicSet};
use serde_json::{json, Map, Value};
use spoolwatch_core::CommandError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Speed profiles accepted by the `speed` command, silent through ludicrous
const SPEED_LEVELS: std::ops::RangeInclusive<i64> = 1..=4;

/// Known operator commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterCommand {
    /// Pause the running job
    Pause,
    /// Resume a paused job
    Resume,
    /// Abort the running job
    Stop,
    /// Home axes, optionally restricted with an `axis` parameter
    Home,
    /// Start bed leveling
    Level,
    /// Send raw G-code in the `gcode` parameter
    Gcode,
    /// Set the speed profile from the `level` parameter (1-4)
    Speed,
    /// Anything else, forwarded verbatim
    Custom(String),
}

impl PrinterCommand {
    /// Parse a command name, case-insensitively
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "pause" => PrinterCommand::Pause,
            "resume" => PrinterCommand::Resume,
            "stop" => PrinterCommand::Stop,
            "home" => PrinterCommand::Home,
            "level" | "start_leveling" | "start-leveling" | "calibration" => PrinterCommand::Level,
            "gcode" | "gcode_line" => PrinterCommand::Gcode,
            "speed" | "print_speed" => PrinterCommand::Speed,
            _ => PrinterCommand::Custom(name.to_string()),
        }
    }

    /// Wire name of the command
    pub fn name(&self) -> &str {
        match self {
            PrinterCommand::Pause => "pause",
            PrinterCommand::Resume => "resume",
            PrinterCommand::Stop => "stop",
            PrinterCommand::Home => "home",
            PrinterCommand::Level => "calibration",
            PrinterCommand::Gcode => "gcode_line",
            PrinterCommand::Speed => "print_speed",
            PrinterCommand::Custom(name) => name,
        }
    }
}

impl fmt::Display for PrinterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds envelopes and publishes them to the request topic
#[derive(Debug)]
pub struct CommandTranslator {
    request_topic: String,
    sequence: AtomicU64,
}

impl CommandTranslator {
    /// Create a translator for a device serial
    pub fn new(serial: &str) -> Self {
        Self {
            request_topic: TopicSet::for_serial(serial).request,
            sequence: AtomicU64::new(0),
        }
    }

    /// Topic commands are published to
    pub fn request_topic(&self) -> &str {
        &self.request_topic
    }

    fn next_sequence_id(&self) -> String {
        (self.sequence.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }

    /// Build the envelope for a command
    ///
    /// Returns the envelope and the sequence id it carries (empty for
    /// forwarded custom commands).
    pub fn build_envelope(
        &self,
        command: &PrinterCommand,
        params: &Map<String, Value>,
    ) -> Result<(Value, String), CommandError> {
        let invalid = |reason: &str| CommandError::InvalidParameters {
            command: command.to_string(),
            reason: reason.to_string(),
        };

        let envelope = match command {
            PrinterCommand::Pause | PrinterCommand::Resume | PrinterCommand::Stop => {
                let seq = self.next_sequence_id();
                let mut body = params.clone();
                body.insert("sequence_id".into(), Value::String(seq.clone()));
                body.insert("command".into(), Value::String(command.name().into()));
                (json!({ "print": body }), seq)
            }
            PrinterCommand::Home => {
                let axis = match params.get("axis") {
                    None => None,
                    Some(Value::String(axis)) if !axis.trim().is_empty() => {
                        Some(axis.trim().to_ascii_lowercase())
                    }
                    Some(_) => return Err(invalid("axis must be a non-empty string")),
                };
                let seq = self.next_sequence_id();
                let mut body = Map::new();
                body.insert("sequence_id".into(), Value::String(seq.clone()));
                body.insert("command".into(), Value::String("home".into()));
                if let Some(axis) = axis {
                    body.insert("axis".into(), Value::String(axis));
                }
                (json!({ "system": body }), seq)
            }
            PrinterCommand::Level => {
                let seq = self.next_sequence_id();
                let mut body = params.clone();
                body.insert("sequence_id".into(), Value::String(seq.clone()));
                body.insert("command".into(), Value::String("calibration".into()));
                (json!({ "system": body }), seq)
            }
            PrinterCommand::Gcode => {
                let line = params
                    .get("gcode")
                    .and_then(Value::as_str)
                    .map(str::trim_end)
                    .filter(|line| !line.is_empty())
                    .ok_or_else(|| invalid("gcode must be a non-empty string"))?;
                let seq = self.next_sequence_id();
                let envelope = json!({
                    "print": {
                        "sequence_id": seq.clone(),
                        "command": "gcode_line",
                        "param": format!("{}\n", line),
                    }
                });
                (envelope, seq)
            }
            PrinterCommand::Speed => {
                let level = params
                    .get("level")
                    .and_then(Value::as_i64)
                    .filter(|level| SPEED_LEVELS.contains(level))
                    .ok_or_else(|| invalid("level must be an integer from 1 to 4"))?;
                let seq = self.next_sequence_id();
                let envelope = json!({
                    "print": {
                        "sequence_id": seq.clone(),
                        "command": "print_speed",
                        "param": level.to_string(),
                    }
                });
                (envelope, seq)
            }
            PrinterCommand::Custom(name) => {
                let mut envelope = Map::new();
                envelope.insert(name.clone(), Value::Object(params.clone()));
                (Value::Object(envelope), String::new())
            }
        };

        Ok(envelope)
    }

    /// Translate and publish a command
    ///
    /// Returns the sequence id of the published envelope. Publish failures
    /// are logged and returned as [`CommandError::Transport`].
    pub async fn send_command(
        &self,
        publisher: &dyn Publisher,
        name: &str,
        params: Map<String, Value>,
    ) -> Result<String, CommandError> {
        let command = PrinterCommand::parse(name);
        if !publisher.is_connected() {
            return Err(CommandError::NotConnected {
                command: command.to_string(),
            });
        }

        let (envelope, sequence_id) = self.build_envelope(&command, &params)?;
        let payload = serde_json::to_vec(&envelope).map_err(|e| CommandError::Encode {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!(topic = %self.request_topic, %command, sequence_id = %sequence_id, "Publishing command");

        publisher
            .publish(&self.request_topic, payload)
            .await
            .map_err(|source| {
                tracing::error!(topic = %self.request_topic, %command, error = %source, "Command publish failed");
                CommandError::Transport {
                    command: command.to_string(),
                    source,
                }
            })?;

        Ok(sequence_id)
    }
}
