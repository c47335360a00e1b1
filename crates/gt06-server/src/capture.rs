//! Raw traffic log: one `timestamp,direction,imei,hex` line per frame.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};

use crate::error::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Inbound => "in",
            Direction::Outbound => "out",
        })
    }
}

/// Append-only capture of every frame in either direction.
#[derive(Debug)]
pub struct FrameCapture {
    out: Mutex<BufWriter<File>>,
}

impl FrameCapture {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Record one frame. `imei` is empty before Login.
    pub fn record(
        &self,
        direction: Direction,
        imei: Option<&str>,
        frame: &[u8],
    ) -> Result<(), SinkError> {
        let line = format!(
            "{},{},{},{}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            direction,
            imei.unwrap_or_default(),
            hex::encode_upper(frame)
        );
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}
