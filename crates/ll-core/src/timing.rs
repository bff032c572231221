use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-car entry of a `TimingAppData` snapshot.
///
/// Every field is optional: the feed sends partial deltas, so a car entry
/// frequently carries only the keys that changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingCarData {
    #[serde(rename = "Line", default)]
    pub line: Option<u32>,
    #[serde(rename = "Position", default)]
    pub position: Option<u32>,
    #[serde(rename = "GapToLeader", default)]
    pub gap_to_leader: Option<String>,
    #[serde(rename = "LapTime", default)]
    pub lap_time: Option<String>,
    #[serde(rename = "Sectors", default)]
    pub sectors: serde_json::Value,
}

/// The ranking map carried by a `TimingAppData` payload, keyed by car number.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingAppContent {
    #[serde(rename = "Lines")]
    pub lines: HashMap<String, TimingCarData>,
}

impl TimingAppContent {
    /// Interpret a raw payload as a ranking map.
    ///
    /// Returns `None` when the payload is not an object with a `Lines` map
    /// or the map does not have the expected shape.
    pub fn from_payload(payload: &serde_json::Value) -> Option<Self> {
        let lines = payload.as_object()?.get("Lines")?;
        if !lines.is_object() {
            return None;
        }
        serde_json::from_value(serde_json::json!({ "Lines": lines })).ok()
    }

    /// Car number of the entry currently on line 1, if any.
    pub fn leader_car_number(&self) -> Option<&str> {
        self.lines
            .iter()
            .find(|(_, car)| car.line == Some(1))
            .map(|(number, _)| number.as_str())
    }
}
