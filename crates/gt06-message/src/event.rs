use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::course::CourseField;
use crate::status::{AccDuration, AlarmCode, PowerLevel, ReportMode, TerminalStatus};

/// One decoded device message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// The IMEI bound to the session, if any; set by Login itself.
    pub imei: Option<String>,
    pub serial: u16,
    pub protocol: u8,
    /// Device clock, or `received_at` for messages without one.
    pub device_time: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// Short lowercase name of the variant.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            EventKind::Login(_) => "login",
            EventKind::Heartbeat(_) => "heartbeat",
            EventKind::Position(_) => "position",
            EventKind::Alarm(_) => "alarm",
            EventKind::CommandAck(_) => "command_ack",
        }
    }

    pub fn gps(&self) -> Option<&GpsFix> {
        match &self.kind {
            EventKind::Position(report) => Some(&report.gps),
            EventKind::Alarm(report) => Some(&report.gps),
            _ => None,
        }
    }

    /// Single-line human summary of the variant-specific fields.
    pub fn summary(&self) -> String {
        match &self.kind {
            EventKind::Login(login) => format!(
                "imei {} (sent {})",
                self.imei.as_deref().unwrap_or("-"),
                login.raw_imei
            ),
            EventKind::Heartbeat(hb) => format!(
                "power {}, gsm {}, acc {}, alarm {:?}",
                hb.power,
                hb.gsm_signal,
                if hb.terminal.acc_on { "on" } else { "off" },
                hb.terminal.alarm
            ),
            EventKind::Position(report) => format!(
                "{}, mode {:?}, {:.3} km, {:.2} V, acc-on {}",
                report.gps.describe(),
                report.mode,
                report.odometer_km,
                report.voltage,
                report.acc_on_time
            ),
            EventKind::Alarm(report) => format!(
                "{} (0x{:04X}), {}, power {}",
                report.alarm.label(),
                report.alarm_raw,
                report.gps.describe(),
                report.power
            ),
            EventKind::CommandAck(ack) => format!("reply {:?}", ack.text),
        }
    }
}

/// Variant-specific payload, tagged as `"type"` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Login(Login),
    Heartbeat(Heartbeat),
    Position(PositionReport),
    Alarm(AlarmReport),
    CommandAck(CommandAck),
}

/// The normalized IMEI lives on [`Event::imei`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Login {
    /// All 16 hex characters as sent.
    pub raw_imei: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub terminal: TerminalStatus,
    pub power: PowerLevel,
    pub gsm_signal: u8,
    pub alarm_status: u16,
}

/// Position core shared by 0x32 and 0x16.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub satellites: u8,
    /// Signed degrees.
    pub latitude: f64,
    /// Signed degrees.
    pub longitude: f64,
    pub speed_kmh: u8,
    pub course: CourseField,
}

impl GpsFix {
    pub fn describe(&self) -> String {
        format!(
            "{:.6},{:.6} {} km/h {}° sats {}{}",
            self.latitude,
            self.longitude,
            self.speed_kmh,
            self.course.bearing,
            self.satellites,
            if self.course.gps_fixed { "" } else { " (no fix)" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CellTower {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
}

/// Timed position report (0x32).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionReport {
    pub gps: GpsFix,
    pub cell: CellTower,
    pub mode: ReportMode,
    pub upload_reason: u8,
    pub gps_realtime: bool,
    pub odometer_km: f64,
    /// External supply in volts.
    pub voltage: f64,
    pub acc_on_time: AccDuration,
    pub network_type: u8,
    pub firmware: u8,
}

/// Alarm with GPS and LBS data (0x16).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmReport {
    pub gps: GpsFix,
    pub lbs_length: u8,
    pub cell: CellTower,
    pub terminal: TerminalStatus,
    pub power: PowerLevel,
    pub gsm_signal: u8,
    pub alarm: AlarmCode,
    pub alarm_raw: u16,
    /// Absent on firmware that omits the trailing odometer.
    pub odometer_km: Option<f64>,
}

/// Device reply to a server command (0x15).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    pub server_flag: u32,
    pub text: String,
}
