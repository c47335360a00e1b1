//! Typed views of the status bytes devices report.

use std::fmt;

use serde::Serialize;

/// Battery/power level byte (0x00-0x06).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLevel {
    NoBattery,
    ExtremelyLow,
    VeryLow,
    Low,
    Medium,
    High,
    ExtremelyHigh,
    Unknown(u8),
}

impl PowerLevel {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => PowerLevel::NoBattery,
            0x01 => PowerLevel::ExtremelyLow,
            0x02 => PowerLevel::VeryLow,
            0x03 => PowerLevel::Low,
            0x04 => PowerLevel::Medium,
            0x05 => PowerLevel::High,
            0x06 => PowerLevel::ExtremelyHigh,
            other => PowerLevel::Unknown(other),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PowerLevel::NoBattery => "no battery",
            PowerLevel::ExtremelyLow => "extremely low",
            PowerLevel::VeryLow => "very low",
            PowerLevel::Low => "low",
            PowerLevel::Medium => "medium",
            PowerLevel::High => "high",
            PowerLevel::ExtremelyHigh => "extremely high",
            PowerLevel::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for PowerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Alarm bits 4-2 of the terminal status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalAlarm {
    Normal,
    Shock,
    PowerCut,
    LowBattery,
    Sos,
    Reserved(u8),
}

impl TerminalAlarm {
    fn from_bits(bits: u8) -> Self {
        match bits {
            0b000 => TerminalAlarm::Normal,
            0b001 => TerminalAlarm::Shock,
            0b010 => TerminalAlarm::PowerCut,
            0b011 => TerminalAlarm::LowBattery,
            0b100 => TerminalAlarm::Sos,
            other => TerminalAlarm::Reserved(other),
        }
    }
}

/// Terminal information byte.
///
/// ```text
/// bit 7    normal working
/// bit 6    ACC on
/// bit 5    charging
/// bits 4-2 alarm
/// bit 1    GPS tracking active
/// bit 0    oil/electricity relay engaged
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TerminalStatus {
    pub raw: u8,
    pub normal_working: bool,
    pub acc_on: bool,
    pub charging: bool,
    pub alarm: TerminalAlarm,
    pub gps_tracking: bool,
    pub relay_engaged: bool,
}

impl TerminalStatus {
    pub fn from_byte(raw: u8) -> Self {
        Self {
            raw,
            normal_working: raw & 0x80 != 0,
            acc_on: raw & 0x40 != 0,
            charging: raw & 0x20 != 0,
            alarm: TerminalAlarm::from_bits((raw >> 2) & 0b111),
            gps_tracking: raw & 0x02 != 0,
            relay_engaged: raw & 0x01 != 0,
        }
    }
}

/// Device-level alarm carried in 0x16 frames.
///
/// Keyed on the high byte; the low byte is a language marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCode {
    Panic,
    BatteryDisconnect,
    Speeding,
    SpeedRestored,
    SuspectedCollision,
    Lock,
    Unlock,
    IgnitionOn,
    IgnitionOff,
    Raw(u16),
}

impl AlarmCode {
    pub fn from_raw(raw: u16) -> Self {
        match (raw >> 8) as u8 {
            0x01 => AlarmCode::Panic,
            0x02 => AlarmCode::BatteryDisconnect,
            0x06 => AlarmCode::Speeding,
            0x16 => AlarmCode::SpeedRestored,
            0xF2 => AlarmCode::SuspectedCollision,
            0xF3 => AlarmCode::Lock,
            0xF4 => AlarmCode::Unlock,
            0xFE => AlarmCode::IgnitionOn,
            0xFF => AlarmCode::IgnitionOff,
            _ => AlarmCode::Raw(raw),
        }
    }

    pub fn label(&self) -> String {
        match self {
            AlarmCode::Panic => "panic".to_string(),
            AlarmCode::BatteryDisconnect => "battery disconnect".to_string(),
            AlarmCode::Speeding => "speeding".to_string(),
            AlarmCode::SpeedRestored => "speed restored".to_string(),
            AlarmCode::SuspectedCollision => "suspected collision".to_string(),
            AlarmCode::Lock => "lock".to_string(),
            AlarmCode::Unlock => "unlock".to_string(),
            AlarmCode::IgnitionOn => "ignition on".to_string(),
            AlarmCode::IgnitionOff => "ignition off".to_string(),
            AlarmCode::Raw(raw) => format!("0x{raw:04X}"),
        }
    }
}

/// ACC flag of a timed position report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    EcoMode,
    MovementInterval,
    Other(u8),
}

impl ReportMode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => ReportMode::EcoMode,
            1 => ReportMode::MovementInterval,
            other => ReportMode::Other(other),
        }
    }
}

/// Cumulative ACC-on time in seconds; displays as `dd-HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AccDuration(pub u32);

impl fmt::Display for AccDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0;
        write!(
            f,
            "{:02}-{:02}:{:02}:{:02}",
            secs / 86_400,
            secs % 86_400 / 3_600,
            secs % 3_600 / 60,
            secs % 60
        )
    }
}
