use std::path::Path;

use gt06_message::{encode_command, EncodeError};

use crate::error::ScriptError;

/// The configuration script replayed to devices, one command per line.
///
/// Blank lines and lines starting with `#` are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandScript {
    commands: Vec<String>,
}

impl CommandScript {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ScriptError> {
        let mut commands = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let command = line.trim();
            if command.is_empty() || command.starts_with('#') {
                continue;
            }
            check_command(command)
                .map_err(|source| ScriptError::InvalidCommand {
                    line: idx + 1,
                    source,
                })?;
            commands.push(command.to_string());
        }
        Ok(Self { commands })
    }

    pub fn from_commands(commands: Vec<String>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Validate command text without spending a serial.
pub(crate) fn check_command(text: &str) -> Result<(), EncodeError> {
    encode_command(text, 1).map(|_| ())
}
