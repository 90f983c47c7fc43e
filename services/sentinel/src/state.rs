//! Device and environment state for one monitored site.
//!
//! [`SystemState`] is the long-lived value the session holds; it is replaced,
//! never mutated in place, every time a [`PartialSnapshot`] arrives.

use crate::history::HistoryBuffer;
use crate::ledger::LogLedger;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Reading of a binary physical sensor.
///
/// `Unknown` covers both "device offline" and "field never reported".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorState {
    Active,
    Inactive,
    #[default]
    Unknown,
}

impl SensorState {
    pub fn is_active(self) -> bool {
        self == SensorState::Active
    }

    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            SensorState::Active => Some("ACTIVE"),
            SensorState::Inactive => Some("INACTIVE"),
            SensorState::Unknown => None,
        }
    }
}

impl Serialize for SensorState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.as_str() {
            Some(s) => serializer.serialize_str(s),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for SensorState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("ACTIVE") => Ok(SensorState::Active),
            Some(s) if s.eq_ignore_ascii_case("INACTIVE") => Ok(SensorState::Inactive),
            Some(other) => Err(serde::de::Error::unknown_variant(
                other,
                &["ACTIVE", "INACTIVE"],
            )),
            None => Ok(SensorState::Unknown),
        }
    }
}

/// Current status of the site plus the bounded derived collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    pub online: bool,
    pub uptime: Option<String>,

    /// Relay state. `None` means the device has never reported it.
    pub fence_active: Option<bool>,
    /// Current draw measured by the CT sensor, in amps
    pub fence_current: Option<f64>,
    pub camera_feed_url: Option<String>,

    pub pir: SensorState,
    pub vibration: SensorState,
    pub pole_tamper: SensorState,
    pub box_tamper: SensorState,

    pub smoke: Option<f64>,
    pub rain: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub light_level: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,

    pub history: HistoryBuffer,
    pub log: LogLedger,
}

impl SystemState {
    /// All-unknown baseline a session starts from.
    pub fn baseline(history_capacity: usize, log_capacity: usize) -> Self {
        Self {
            online: false,
            uptime: None,
            fence_active: None,
            fence_current: None,
            camera_feed_url: None,
            pir: SensorState::Unknown,
            vibration: SensorState::Unknown,
            pole_tamper: SensorState::Unknown,
            box_tamper: SensorState::Unknown,
            smoke: None,
            rain: None,
            soil_moisture: None,
            light_level: None,
            temperature: None,
            humidity: None,
            pressure: None,
            history: HistoryBuffer::new(history_capacity),
            log: LogLedger::new(log_capacity),
        }
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::baseline(crate::history::DEFAULT_CAPACITY, crate::ledger::DEFAULT_CAPACITY)
    }
}

/// One sparse arrival of readings from the device.
///
/// The outer `Option` says whether the key was present at all; for nullable
/// fields the inner `Option` carries an explicit `null`. An explicit `null`
/// overwrites the previous value, an absent key retains it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSnapshot {
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub uptime: Option<Option<String>>,

    #[serde(default, deserialize_with = "present")]
    pub fence_active: Option<Option<bool>>,
    #[serde(default, deserialize_with = "present")]
    pub fence_current: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub camera_feed_url: Option<Option<String>>,

    #[serde(default, deserialize_with = "present")]
    pub pir: Option<SensorState>,
    #[serde(default, deserialize_with = "present")]
    pub vibration: Option<SensorState>,
    #[serde(default, deserialize_with = "present")]
    pub pole_tamper: Option<SensorState>,
    #[serde(default, deserialize_with = "present")]
    pub box_tamper: Option<SensorState>,

    #[serde(default, deserialize_with = "present")]
    pub smoke: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub rain: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub soil_moisture: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub light_level: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub temperature: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub humidity: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    pub pressure: Option<Option<f64>>,
}

/// Marks a key as present even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl PartialSnapshot {
    /// Build a snapshot from a decoded JSON object, field by field.
    ///
    /// A field whose value does not fit its type is left absent instead of
    /// failing the whole snapshot. Returns the snapshot and the rejected keys.
    pub fn from_fields(fields: Map<String, Value>) -> (Self, Vec<String>) {
        let mut accepted = Map::with_capacity(fields.len());
        let mut rejected = Vec::new();

        for (key, value) in fields {
            let single = Map::from_iter([(key.clone(), value.clone())]);
            match serde_json::from_value::<PartialSnapshot>(Value::Object(single)) {
                Ok(_) => {
                    accepted.insert(key, value);
                }
                Err(_) => rejected.push(key),
            }
        }

        // Every remaining field decodes on its own, so the whole set does too.
        let snapshot = serde_json::from_value(Value::Object(accepted)).unwrap_or_default();
        (snapshot, rejected)
    }

    /// True when the snapshot carries no recognised field.
    pub fn is_empty(&self) -> bool {
        *self == PartialSnapshot::default()
    }

    pub fn with_pir(mut self, state: SensorState) -> Self {
        self.pir = Some(state);
        self
    }

    pub fn with_vibration(mut self, state: SensorState) -> Self {
        self.vibration = Some(state);
        self
    }

    pub fn with_pole_tamper(mut self, state: SensorState) -> Self {
        self.pole_tamper = Some(state);
        self
    }

    pub fn with_box_tamper(mut self, state: SensorState) -> Self {
        self.box_tamper = Some(state);
        self
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    pub fn with_fence_active(mut self, active: Option<bool>) -> Self {
        self.fence_active = Some(active);
        self
    }

    pub fn with_fence_current(mut self, amps: f64) -> Self {
        self.fence_current = Some(Some(amps));
        self
    }

    pub fn with_smoke(mut self, value: f64) -> Self {
        self.smoke = Some(Some(value));
        self
    }

    pub fn with_temperature(mut self, value: f64) -> Self {
        self.temperature = Some(Some(value));
        self
    }

    pub fn with_humidity(mut self, value: f64) -> Self {
        self.humidity = Some(Some(value));
        self
    }
}
