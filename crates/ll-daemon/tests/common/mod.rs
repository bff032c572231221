#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ll_core::driver::{Driver, DriverRoster};
use ll_core::event::{Event, Topic};
use ll_integrations::hue::{ActuatorError, LampActuator, LightId, LightState};
use serde_json::json;
use tokio::sync::Mutex;

/// Records every applied state; can be switched to fail.
#[derive(Default)]
pub struct RecordingActuator {
    pub applied: Mutex<Vec<(LightState, Vec<LightId>)>>,
    pub fail: AtomicBool,
}

impl RecordingActuator {
    pub fn failing() -> Self {
        let actuator = Self::default();
        actuator.fail.store(true, Ordering::SeqCst);
        actuator
    }

    pub async fn count(&self) -> usize {
        self.applied.lock().await.len()
    }

    pub async fn colours(&self) -> Vec<(f64, f64)> {
        self.applied
            .lock()
            .await
            .iter()
            .map(|(state, _)| (state.color.xy.x, state.color.xy.y))
            .collect()
    }
}

#[async_trait]
impl LampActuator for RecordingActuator {
    async fn apply_state(&self, state: &LightState, lights: &[LightId]) -> Result<(), ActuatorError> {
        self.applied.lock().await.push((*state, lights.to_vec()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ActuatorError::Api {
                status: 503,
                body: "bridge busy".into(),
            });
        }
        Ok(())
    }
}

pub fn driver(number: u32, name: &str, colour: &str) -> Driver {
    Driver {
        broadcast_name: name.to_uppercase(),
        full_name: name.to_string(),
        driver_number: number,
        team_colour: Some(colour.to_string()),
        team_name: String::new(),
    }
}

pub fn roster() -> Arc<DriverRoster> {
    Arc::new(DriverRoster::new([
        driver(1, "Max Verstappen", "3671C6"),
        driver(44, "Lewis Hamilton", "27F4D2"),
        driver(16, "Charles Leclerc", "E8002D"),
    ]))
}

pub fn lights() -> Vec<LightId> {
    vec![LightId("light-1".into()), LightId("light-2".into())]
}

/// A `TimingAppData` snapshot with `leader` on line 1 and `second` on line 2.
pub fn leader_event(leader: u32, second: u32) -> Event {
    let mut lines = serde_json::Map::new();
    lines.insert(leader.to_string(), json!({"Line": 1, "Position": 1}));
    lines.insert(second.to_string(), json!({"Line": 2, "Position": 2}));
    Event::now(Topic::TimingAppData, json!({ "Lines": lines }))
}

pub fn arc_actuator(actuator: &Arc<RecordingActuator>) -> Arc<dyn LampActuator> {
    actuator.clone()
}
