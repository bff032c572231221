use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// Category of a live-timing event.
///
/// Unknown topic names are preserved in [`Topic::Other`] so parsing a topic
/// never fails; the tracker simply ignores categories it does not follow.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    TimingAppData,
    CarData,
    Position,
    WeatherData,
    Heartbeat,
    TopThree,
    LapCount,
    DriverList,
    TimingData,
    RaceControlMessages,
    SessionData,
    TimingStats,
    ExtrapolatedClock,
    RcmSeries,
    TrackStatus,
    SessionInfo,
    Other(String),
}

impl Topic {
    /// Wire name of the topic.
    pub fn as_str(&self) -> &str {
        match self {
            Topic::TimingAppData => "TimingAppData",
            Topic::CarData => "CarData.z",
            Topic::Position => "Position.z",
            Topic::WeatherData => "WeatherData",
            Topic::Heartbeat => "Heartbeat",
            Topic::TopThree => "TopThree",
            Topic::LapCount => "LapCount",
            Topic::DriverList => "DriverList",
            Topic::TimingData => "TimingData",
            Topic::RaceControlMessages => "RaceControlMessages",
            Topic::SessionData => "SessionData",
            Topic::TimingStats => "TimingStats",
            Topic::ExtrapolatedClock => "ExtrapolatedClock",
            Topic::RcmSeries => "RcmSeries",
            Topic::TrackStatus => "TrackStatus",
            Topic::SessionInfo => "SessionInfo",
            Topic::Other(name) => name,
        }
    }

    pub fn parse(name: &str) -> Self {
        match name {
            "TimingAppData" => Topic::TimingAppData,
            "CarData.z" => Topic::CarData,
            "Position.z" => Topic::Position,
            "WeatherData" => Topic::WeatherData,
            "Heartbeat" => Topic::Heartbeat,
            "TopThree" => Topic::TopThree,
            "LapCount" => Topic::LapCount,
            "DriverList" => Topic::DriverList,
            "TimingData" => Topic::TimingData,
            "RaceControlMessages" => Topic::RaceControlMessages,
            "SessionData" => Topic::SessionData,
            "TimingStats" => Topic::TimingStats,
            "ExtrapolatedClock" => Topic::ExtrapolatedClock,
            "RcmSeries" => Topic::RcmSeries,
            "TrackStatus" => Topic::TrackStatus,
            "SessionInfo" => Topic::SessionInfo,
            other => Topic::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let name = String::deserialize(d)?;
        Ok(Topic::parse(&name))
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// One parsed unit from the upstream feed.
///
/// The payload is kept as raw JSON; only the consumer that follows a given
/// topic interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    #[serde(rename = "content")]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(topic: Topic, payload: serde_json::Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            topic,
            payload,
            timestamp,
        }
    }

    /// Event stamped with the current wall-clock time.
    pub fn now(topic: Topic, payload: serde_json::Value) -> Self {
        Self::new(topic, payload, Utc::now())
    }
}
