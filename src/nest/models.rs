use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::{short_device_id, SensorValues};

pub const TEMPERATURE_TRAIT: &str = "sdm.devices.traits.Temperature";
pub const HUMIDITY_TRAIT: &str = "sdm.devices.traits.Humidity";
pub const INFO_TRAIT: &str = "sdm.devices.traits.Info";

const DEVICE_TYPE_PREFIX: &str = "sdm.devices.types.";

// ---

/// Response of the device listing endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// One device as returned by the device API.
///
/// Traits are kept as raw JSON: only a handful of nested fields are read and
/// the vendor adds new traits freely.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    // ---
    /// Full resource name, `enterprises/<project>/devices/<id>`.
    pub name: String,

    #[serde(rename = "type", default)]
    pub device_type: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub traits: Map<String, Value>,

    #[serde(default)]
    pub parent_relations: Vec<ParentRelation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRelation {
    #[serde(default)]
    pub parent: String,

    #[serde(default)]
    pub display_name: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Device {
    /// Last segment of the resource name.
    pub fn short_id(&self) -> &str {
        short_device_id(&self.name)
    }

    /// Numeric field `field` of trait `trait_name`, if present.
    pub fn trait_number(&self, trait_name: &str, field: &str) -> Option<f64> {
        self.traits.get(trait_name)?.get(field)?.as_f64()
    }

    /// String field `field` of trait `trait_name`, if present.
    pub fn trait_text(&self, trait_name: &str, field: &str) -> Option<&str> {
        self.traits.get(trait_name)?.get(field)?.as_str()
    }

    /// Temperature and humidity carried by the device's traits.
    pub fn sensor_values(&self) -> SensorValues {
        SensorValues {
            temperature_celsius: self.trait_number(TEMPERATURE_TRAIT, "ambientTemperatureCelsius"),
            humidity_percent: self.trait_number(HUMIDITY_TRAIT, "ambientHumidityPercent"),
            ..Default::default()
        }
    }

    /// Best human-readable name; the first non-empty candidate wins:
    /// explicit display name, custom name trait, room of a parent relation,
    /// then device type plus the tail of the id.
    pub fn display_name(&self) -> String {
        // ---
        if let Some(name) = non_empty(self.display_name.as_deref()) {
            return name.to_string();
        }

        if let Some(name) = non_empty(self.trait_text(INFO_TRAIT, "customName")) {
            return name.to_string();
        }

        let room = self
            .parent_relations
            .iter()
            .find_map(|rel| non_empty(rel.display_name.as_deref()));
        if let Some(room) = room {
            return format!("Thermostat ({room})");
        }

        let device_type = self
            .device_type
            .strip_prefix(DEVICE_TYPE_PREFIX)
            .unwrap_or(&self.device_type);
        let short_id = self.short_id();
        let tail_start = short_id
            .char_indices()
            .rev()
            .nth(7)
            .map_or(0, |(idx, _)| idx);
        format!("{device_type} {}", &short_id[tail_start..])
            .trim()
            .to_string()
    }
}
