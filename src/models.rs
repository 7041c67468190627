use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// OAuth2 token pair with its locally computed expiry
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    /// Provider TTL minus the safety margin, counted from issue time
    pub expires_at: OffsetDateTime,
    /// TTL the provider reported, kept for the persisted record
    pub expires_in: Option<u64>,
}

impl Credential {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// On-disk shape of the credential record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    pub refresh_token: String,
    /// TTL reported by the provider when the token was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<OffsetDateTime>,
}

/// Successful payload of the refresh-token grant
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
}

/// Device list returned by the readings endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationReading {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Main station unit
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default)]
    pub dashboard_data: Option<DeviceDashboard>,
    #[serde(default)]
    pub modules: Vec<Module>,
}

/// Indoor metrics of the main unit; any field may be absent
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceDashboard {
    #[serde(rename = "Temperature")]
    pub temperature: Option<f64>,
    #[serde(rename = "CO2")]
    pub co2: Option<f64>,
    #[serde(rename = "Humidity")]
    pub humidity: Option<f64>,
    #[serde(rename = "Noise")]
    pub noise: Option<f64>,
    #[serde(rename = "Pressure")]
    pub pressure: Option<f64>,
    #[serde(rename = "AbsolutePressure")]
    pub absolute_pressure: Option<f64>,
}

/// Satellite module (outdoor, indoor, rain gauge, anemometer)
#[derive(Debug, Clone, Deserialize)]
pub struct Module {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub module_type: String,
    #[serde(default)]
    pub battery_percent: Option<f64>,
    #[serde(default)]
    pub dashboard_data: Option<ModuleDashboard>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleDashboard {
    #[serde(rename = "Temperature")]
    pub temperature: Option<f64>,
    #[serde(rename = "Humidity")]
    pub humidity: Option<f64>,
    #[serde(rename = "CO2")]
    pub co2: Option<f64>,
    #[serde(rename = "Rain")]
    pub rain: Option<f64>,
    pub sum_rain_1: Option<f64>,
    pub sum_rain_24: Option<f64>,
    #[serde(rename = "WindStrength")]
    pub wind_strength: Option<f64>,
    #[serde(rename = "WindAngle")]
    pub wind_angle: Option<f64>,
    #[serde(rename = "GustStrength")]
    pub gust_strength: Option<f64>,
    #[serde(rename = "GustAngle")]
    pub gust_angle: Option<f64>,
}

impl DeviceDashboard {
    /// Present metrics in publish order
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("Temperature", self.temperature),
            ("CO2", self.co2),
            ("Humidity", self.humidity),
            ("Noise", self.noise),
            ("Pressure", self.pressure),
            ("AbsolutePressure", self.absolute_pressure),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}

impl ModuleDashboard {
    /// Present metrics in publish order
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("Temperature", self.temperature),
            ("Humidity", self.humidity),
            ("CO2", self.co2),
            ("Rain", self.rain),
            ("sum_rain_1", self.sum_rain_1),
            ("sum_rain_24", self.sum_rain_24),
            ("WindStrength", self.wind_strength),
            ("WindAngle", self.wind_angle),
            ("GustStrength", self.gust_strength),
            ("GustAngle", self.gust_angle),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}
