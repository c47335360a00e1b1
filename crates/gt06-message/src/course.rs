use serde::Serialize;

const DIFFERENTIAL: u16 = 1 << 13;
const FIXED: u16 = 1 << 12;
const WEST: u16 = 1 << 11;
const NORTH: u16 = 1 << 10;
const BEARING_MASK: u16 = 0x03FF;

/// The 16-bit course/status word that accompanies every GPS fix.
///
/// Carries the bearing and the hemisphere flags; coordinate signs must come
/// from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CourseField {
    pub raw: u16,
    /// Low 10 bits. Values of 360 or more are kept as sent.
    pub bearing: u16,
    pub gps_differential: bool,
    pub gps_fixed: bool,
    pub longitude_is_west: bool,
    pub latitude_is_north: bool,
}

impl CourseField {
    pub fn from_raw(raw: u16) -> Self {
        Self {
            raw,
            bearing: raw & BEARING_MASK,
            gps_differential: raw & DIFFERENTIAL != 0,
            gps_fixed: raw & FIXED != 0,
            longitude_is_west: raw & WEST != 0,
            latitude_is_north: raw & NORTH != 0,
        }
    }

    /// False when the bearing is outside 0..=359.
    pub fn bearing_in_range(&self) -> bool {
        self.bearing < 360
    }

    /// Apply hemisphere signs to unsigned degrees.
    pub fn signed(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        let lat = if self.latitude_is_north {
            latitude
        } else {
            -latitude
        };
        let lon = if self.longitude_is_west {
            -longitude
        } else {
            longitude
        };
        (lat, lon)
    }
}
