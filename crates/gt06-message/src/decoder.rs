use bytes::Buf;
use chrono::{DateTime, Utc};
use gt06_frame::{protocol, Frame};
use tracing::warn;

use crate::course::CourseField;
use crate::error::{DecodeError, Result};
use crate::event::{
    AlarmReport, CellTower, CommandAck, Event, EventKind, GpsFix, Heartbeat, Login, PositionReport,
};
use crate::status::{AccDuration, AlarmCode, PowerLevel, ReportMode, TerminalStatus};
use crate::timestamp::{decode_timestamp, TimestampEncoding};

/// Raw coordinate units per degree.
const COORDINATE_SCALE: f64 = 1_800_000.0;

const LOGIN_LEN: usize = 8;
const HEARTBEAT_LEN: usize = 5;
const TIMED_POSITION_LEN: usize = 42;
const ALARM_LEN: usize = 36;
const ALARM_LEN_NO_ODOMETER: usize = 32;
const COMMAND_REPLY_MIN_LEN: usize = 5;

/// Per-session inputs to [`decode`].
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    /// IMEI bound by an earlier Login on the same connection.
    pub imei: Option<&'a str>,
    pub received_at: DateTime<Utc>,
    pub timestamps: TimestampEncoding,
}

impl<'a> DecodeContext<'a> {
    pub fn new(received_at: DateTime<Utc>) -> Self {
        Self {
            imei: None,
            received_at,
            timestamps: TimestampEncoding::default(),
        }
    }

    pub fn with_imei(mut self, imei: Option<&'a str>) -> Self {
        self.imei = imei;
        self
    }

    pub fn with_timestamps(mut self, timestamps: TimestampEncoding) -> Self {
        self.timestamps = timestamps;
        self
    }
}

/// What a per-protocol decoder produces; `decode` adds the common fields.
struct Decoded {
    device_time: Option<DateTime<Utc>>,
    imei: Option<String>,
    kind: EventKind,
}

type DecodeFn = fn(&[u8], &DecodeContext<'_>) -> Result<Decoded>;

const DECODERS: &[(u8, DecodeFn)] = &[
    (protocol::LOGIN, decode_login),
    (protocol::HEARTBEAT, decode_heartbeat),
    (protocol::TIMED_POSITION, decode_timed_position),
    (protocol::ALARM, decode_alarm),
    (protocol::COMMAND_REPLY, decode_command_reply),
];

/// Decode a validated frame into an [`Event`].
///
/// Fails with [`DecodeError::UnknownProtocol`] for ids without a decoder and
/// [`DecodeError::Truncated`] when the payload is shorter than its layout.
pub fn decode(frame: &Frame, ctx: &DecodeContext<'_>) -> Result<Event> {
    let decoder = DECODERS
        .iter()
        .find(|(id, _)| *id == frame.protocol)
        .map(|(_, f)| *f)
        .ok_or(DecodeError::UnknownProtocol(frame.protocol))?;

    let decoded = decoder(&frame.payload, ctx)?;
    Ok(Event {
        imei: decoded.imei.or_else(|| ctx.imei.map(str::to_owned)),
        serial: frame.serial,
        protocol: frame.protocol,
        device_time: decoded.device_time.unwrap_or(ctx.received_at),
        received_at: ctx.received_at,
        kind: decoded.kind,
    })
}

fn require(protocol: u8, payload: &[u8], needed: usize) -> Result<()> {
    if payload.len() < needed {
        return Err(DecodeError::Truncated {
            protocol,
            needed,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn decode_login(payload: &[u8], _ctx: &DecodeContext<'_>) -> Result<Decoded> {
    require(protocol::LOGIN, payload, LOGIN_LEN)?;
    let raw_imei = hex::encode(&payload[..LOGIN_LEN]);
    let imei = normalize_imei(&raw_imei).to_owned();
    Ok(Decoded {
        device_time: None,
        imei: Some(imei),
        kind: EventKind::Login(Login { raw_imei }),
    })
}

/// Drop the padding nibble of a 16-digit IMEI.
fn normalize_imei(raw: &str) -> &str {
    raw.strip_prefix('0').unwrap_or(raw)
}

fn decode_heartbeat(payload: &[u8], _ctx: &DecodeContext<'_>) -> Result<Decoded> {
    require(protocol::HEARTBEAT, payload, HEARTBEAT_LEN)?;
    let mut buf = payload;
    let heartbeat = Heartbeat {
        terminal: TerminalStatus::from_byte(buf.get_u8()),
        power: PowerLevel::from_byte(buf.get_u8()),
        gsm_signal: buf.get_u8(),
        alarm_status: buf.get_u16(),
    };
    Ok(Decoded {
        device_time: None,
        imei: None,
        kind: EventKind::Heartbeat(heartbeat),
    })
}

/// Time, satellites, coordinates, speed and course: the first 18 bytes of
/// both position layouts.
fn read_gps(buf: &mut &[u8], ctx: &DecodeContext<'_>) -> (DateTime<Utc>, GpsFix) {
    let device_time = decode_timestamp(&buf[..6], ctx.timestamps);
    buf.advance(6);
    let satellites = buf.get_u8() >> 4;
    let lat_raw = buf.get_u32();
    let lon_raw = buf.get_u32();
    let speed_kmh = buf.get_u8();
    let course = CourseField::from_raw(buf.get_u16());

    if !course.bearing_in_range() {
        warn!(
            imei = ctx.imei.unwrap_or("-"),
            bearing = course.bearing,
            course = format_args!("0x{:04X}", course.raw),
            "bearing out of range"
        );
    }

    let (latitude, longitude) = course.signed(
        f64::from(lat_raw) / COORDINATE_SCALE,
        f64::from(lon_raw) / COORDINATE_SCALE,
    );
    let gps = GpsFix {
        satellites,
        latitude,
        longitude,
        speed_kmh,
        course,
    };
    (device_time, gps)
}

fn decode_timed_position(payload: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded> {
    require(protocol::TIMED_POSITION, payload, TIMED_POSITION_LEN)?;
    let mut buf = payload;
    let (device_time, gps) = read_gps(&mut buf, ctx);
    let cell = CellTower {
        mcc: buf.get_u16(),
        mnc: buf.get_u8(),
        lac: buf.get_u16(),
        cell_id: buf.get_u32(),
    };
    let report = PositionReport {
        gps,
        cell,
        mode: ReportMode::from_byte(buf.get_u8()),
        upload_reason: buf.get_u8(),
        gps_realtime: buf.get_u8() != 0,
        odometer_km: f64::from(buf.get_u32()) / 1000.0,
        voltage: f64::from(buf.get_u16()) * 0.01,
        acc_on_time: AccDuration(buf.get_u32()),
        network_type: buf.get_u8(),
        firmware: buf.get_u8(),
    };
    Ok(Decoded {
        device_time: Some(device_time),
        imei: None,
        kind: EventKind::Position(report),
    })
}

fn decode_alarm(payload: &[u8], ctx: &DecodeContext<'_>) -> Result<Decoded> {
    require(protocol::ALARM, payload, ALARM_LEN_NO_ODOMETER)?;
    let mut buf = payload;
    let (device_time, gps) = read_gps(&mut buf, ctx);
    let lbs_length = buf.get_u8();
    let cell = CellTower {
        mcc: buf.get_u16(),
        mnc: buf.get_u8(),
        lac: buf.get_u16(),
        cell_id: buf.get_uint(3) as u32,
    };
    let terminal = TerminalStatus::from_byte(buf.get_u8());
    let power = PowerLevel::from_byte(buf.get_u8());
    let gsm_signal = buf.get_u8();
    let alarm_raw = buf.get_u16();
    let odometer_km = (payload.len() >= ALARM_LEN).then(|| f64::from(buf.get_u32()) / 1000.0);

    let report = AlarmReport {
        gps,
        lbs_length,
        cell,
        terminal,
        power,
        gsm_signal,
        alarm: AlarmCode::from_raw(alarm_raw),
        alarm_raw,
        odometer_km,
    };
    Ok(Decoded {
        device_time: Some(device_time),
        imei: None,
        kind: EventKind::Alarm(report),
    })
}

fn decode_command_reply(payload: &[u8], _ctx: &DecodeContext<'_>) -> Result<Decoded> {
    require(protocol::COMMAND_REPLY, payload, COMMAND_REPLY_MIN_LEN)?;
    let mut buf = payload;
    let command_len = usize::from(buf.get_u8());
    let server_flag = buf.get_u32();
    let text_len = command_len.saturating_sub(4).min(buf.len());
    let text = String::from_utf8_lossy(&buf[..text_len]).into_owned();
    Ok(Decoded {
        device_time: None,
        imei: None,
        kind: EventKind::CommandAck(CommandAck { server_flag, text }),
    })
}
