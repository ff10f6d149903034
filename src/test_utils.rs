//! Scripted sensor and recording actuator shared by the test modules.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    actuator::FanActuator,
    error::{FanError, Result},
    sensors::TemperatureSensor,
};

/// Replays a fixed list of readings, then repeats the last one.
pub struct ScriptedSensor {
    script: Mutex<VecDeque<Result<i32>>>,
    last: Mutex<i32>,
    reads: AtomicUsize,
}

impl ScriptedSensor {
    pub fn new(readings: &[i32]) -> Self {
        Self {
            script: Mutex::new(readings.iter().copied().map(Ok).collect()),
            last: Mutex::new(readings.last().copied().unwrap_or(25_000)),
            reads: AtomicUsize::new(0),
        }
    }

    /// Makes the next read fail with `reason`.
    pub fn fail_next(&self, reason: &str) {
        self.script
            .lock()
            .unwrap()
            .push_front(Err(FanError::sensor("scripted", reason)));
    }

    pub fn push(&self, temp: i32) {
        self.script.lock().unwrap().push_back(Ok(temp));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemperatureSensor for ScriptedSensor {
    async fn read_temperature(&self) -> Result<i32> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(temp)) => {
                *self.last.lock().unwrap() = temp;
                Ok(temp)
            }
            Some(Err(e)) => Err(e),
            None => Ok(*self.last.lock().unwrap()),
        }
    }

    fn sensor_name(&self) -> String {
        "scripted".to_string()
    }
}

/// Remembers every speed it was asked to apply.
#[derive(Default)]
pub struct RecordingActuator {
    speeds: Mutex<Vec<i32>>,
    failing: AtomicBool,
}

impl RecordingActuator {
    pub fn speeds(&self) -> Vec<i32> {
        self.speeds.lock().unwrap().clone()
    }

    /// While failing, requests are rejected and not recorded.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl FanActuator for RecordingActuator {
    async fn set_speed(&self, percent: i32) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FanError::actuator("recording", "rejected"));
        }
        self.speeds.lock().unwrap().push(percent);
        Ok(())
    }
}
