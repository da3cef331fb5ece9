//! Shelf descriptors.

use std::fmt;
use std::hash::{Hash, Hasher};

use super::Temperature;

/// Immutable description of one holding shelf: identity, capacity, the
/// temperature category it serves and how fast orders decay on it.
///
/// Equality is over (id, capacity, temperature); the decay-rate factor is a
/// tuning knob, not identity.
#[derive(Clone, Debug)]
pub struct Shelf {
    id: String,
    capacity: usize,
    temperature: Temperature,
    decay_rate_factor: f64,
}

impl Shelf {
    pub fn new(
        id: impl Into<String>,
        capacity: usize,
        temperature: Temperature,
        decay_rate_factor: f64,
    ) -> Self {
        Self {
            id: id.into(),
            capacity,
            temperature,
            decay_rate_factor,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn temperature(&self) -> Temperature {
        self.temperature
    }

    pub fn decay_rate_factor(&self) -> f64 {
        self.decay_rate_factor
    }
}

impl PartialEq for Shelf {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.capacity == other.capacity
            && self.temperature == other.temperature
    }
}

impl Eq for Shelf {}

impl Hash for Shelf {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.capacity.hash(state);
        self.temperature.hash(state);
    }
}

impl fmt::Display for Shelf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} shelf {} (capacity {}, decay factor {})",
            self.temperature, self.id, self.capacity, self.decay_rate_factor
        )
    }
}
