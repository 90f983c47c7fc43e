//! Rolling window of environmental samples used for trend display.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;

/// Default number of points kept in the window
pub const DEFAULT_CAPACITY: usize = 30;

/// Five metrics coalesced at one logical tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    /// Wall-clock time of the tick, `HH:MM:SS`
    pub time: String,
    pub temp: f64,
    pub hum: f64,
    pub soil: f64,
    pub rain: f64,
    pub smoke: f64,
}

/// Fixed-capacity FIFO of [`HistoryPoint`]s, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns a new buffer with `point` appended, evicting from the front
    /// once capacity is exceeded. `self` is left untouched.
    pub fn append(&self, point: HistoryPoint) -> Self {
        let mut next = self.clone();
        next.push(point);
        next
    }

    fn push(&mut self, point: HistoryPoint) {
        self.points.push_back(point);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Serialize for HistoryBuffer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.points.len()))?;
        for point in &self.points {
            seq.serialize_element(point)?;
        }
        seq.end()
    }
}
