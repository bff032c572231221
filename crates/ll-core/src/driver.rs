use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::color::{XyColor, D65_WHITE};

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// A driver entry from the roster file (openf1 `drivers` schema; unknown
/// fields are ignored).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub broadcast_name: String,
    pub full_name: String,
    pub driver_number: u32,
    #[serde(default)]
    pub team_colour: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub team_name: String,
}

impl Driver {
    /// Team colour as xy chromaticity; drivers without a colour light white.
    pub fn xy_colour(&self) -> XyColor {
        self.team_colour
            .as_deref()
            .map(XyColor::from_hex)
            .unwrap_or(D65_WHITE)
    }

    fn normalized(mut self) -> Self {
        self.full_name = title_case(&self.full_name);
        self
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Upper-case the first letter of every word, lower-case the rest.
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_alpha = false;
    for c in name.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

// ---------------------------------------------------------------------------
// LeaderChange
// ---------------------------------------------------------------------------

/// The driver currently running first, as extracted from one event.
///
/// Equality is by driver number only; display data never takes part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderChange {
    pub driver: Driver,
}

impl LeaderChange {
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }

    pub fn identity(&self) -> u32 {
        self.driver.driver_number
    }
}

impl PartialEq for LeaderChange {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for LeaderChange {}

// ---------------------------------------------------------------------------
// DriverRoster
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    #[error("io: failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Lookup table from car number (as the feed spells it) to driver.
#[derive(Debug, Clone, Default)]
pub struct DriverRoster {
    by_number: HashMap<String, Driver>,
}

impl DriverRoster {
    pub fn new(drivers: impl IntoIterator<Item = Driver>) -> Self {
        let by_number = drivers
            .into_iter()
            .map(Driver::normalized)
            .map(|d| (d.driver_number.to_string(), d))
            .collect();
        Self { by_number }
    }

    /// Parse a JSON array of drivers.
    pub fn from_json(text: &str) -> Result<Self, RosterError> {
        let drivers: Vec<Driver> = serde_json::from_str(text)?;
        Ok(Self::new(drivers))
    }

    /// Load the roster from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let roster = Self::from_json(&text)?;
        tracing::info!(path = %path.display(), drivers = roster.len(), "driver roster loaded");
        Ok(roster)
    }

    pub fn resolve(&self, car_number: &str) -> Option<&Driver> {
        self.by_number.get(car_number)
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}
