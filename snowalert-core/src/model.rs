use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimal places kept when deriving a location key.
const KEY_PRECISION: f64 = 10_000.0;

/// Geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Canonical key for these coordinates.
    pub fn key(&self) -> LocationKey {
        LocationKey::from_coords(self.lat, self.lon)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.lat, self.lon)
    }
}

/// Chat identifier as handed out by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Canonical `lat_lon` key of a resolved location.
///
/// Both components are quantised to four decimals and rendered with the
/// shortest float representation, so `51.50001` and `51.5` share `51.5`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn from_coords(lat: f64, lon: f64) -> Self {
        Self(format!("{}_{}", quantize(lat), quantize(lon)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn quantize(value: f64) -> f64 {
    let rounded = (value * KEY_PRECISION).round() / KEY_PRECISION;
    // -0.0 would otherwise render as "-0"
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Daily time of day at which an alert fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CheckTime {
    pub hour: u32,
    pub minute: u32,
    #[serde(default)]
    pub second: u32,
}

impl CheckTime {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute, second: 0 }
    }

    /// `None` when any component is out of range.
    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, self.second)
    }
}

impl From<NaiveTime> for CheckTime {
    fn from(time: NaiveTime) -> Self {
        Self { hour: time.hour(), minute: time.minute(), second: time.second() }
    }
}

impl fmt::Display for CheckTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Name of a scheduled alert job: `{location}_hour{hour}_{chat}`.
///
/// Identical inputs always give the identical name, which is what keeps a
/// chat from scheduling the same check twice and lets recovery match jobs
/// across restarts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertName(String);

impl AlertName {
    pub fn derive(location: &LocationKey, time: CheckTime, chat: ChatId) -> Self {
        Self(format!("{}_hour{}_{}", location, time.hour, chat))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who gets notified about which location; stored as `[chat, location]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertContext(pub ChatId, pub LocationKey);

impl AlertContext {
    pub fn chat(&self) -> ChatId {
        self.0
    }

    pub fn location(&self) -> &LocationKey {
        &self.1
    }
}

/// Persisted definition of one recurring alert job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub time: CheckTime,
    pub context: AlertContext,
    pub name: AlertName,
}
