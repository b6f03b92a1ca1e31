// Value simulator - drifts sensor values between ticks
use crate::domain::point::Point;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Range used to seed a point that has neither a value nor full bounds.
const DEFAULT_SEED_RANGE: (f64, f64) = (0.0, 100.0);
/// Jitter applied around the bound midpoint when seeding a value.
const SEED_JITTER: f64 = 0.20;

/// Source of uniform draws. Injected so sweeps can be replayed in tests.
pub trait RandomSource: Send {
    /// A draw from `[low, high]`; `low == high` returns `low`.
    fn uniform(&mut self, low: f64, high: f64) -> f64;
}

/// ChaCha-backed source, seeded explicitly or from OS entropy.
pub struct SeededRandom {
    rng: ChaCha8Rng,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: ChaCha8Rng::from_entropy() }
    }
}

impl RandomSource for SeededRandom {
    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        if low == high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Unit families with their own drift magnitude and display precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitCategory {
    Temperature,
    Pressure,
    Flow,
    RotationalSpeed,
    Percent,
    Voltage,
    Current,
    Other,
}

impl UnitCategory {
    pub fn of(unit: Option<&str>) -> Self {
        let Some(unit) = unit else {
            return UnitCategory::Other;
        };
        match unit.trim() {
            "°C" | "°F" | "C" | "F" | "K" | "degC" | "degF" => UnitCategory::Temperature,
            "kPa" | "Pa" | "MPa" | "bar" | "mbar" | "psi" => UnitCategory::Pressure,
            "L/min" | "l/min" | "L/s" | "m3/h" | "m³/h" | "gpm" => UnitCategory::Flow,
            "rpm" | "RPM" | "rev/min" => UnitCategory::RotationalSpeed,
            "%" => UnitCategory::Percent,
            "V" | "mV" | "kV" => UnitCategory::Voltage,
            "A" | "mA" => UnitCategory::Current,
            _ => UnitCategory::Other,
        }
    }

    /// Largest step a single tick may apply, in either direction.
    pub fn max_step(&self) -> f64 {
        match self {
            UnitCategory::Temperature => 0.5,
            UnitCategory::Pressure => 10.0,
            UnitCategory::Flow | UnitCategory::Percent => 2.0,
            UnitCategory::RotationalSpeed => 50.0,
            UnitCategory::Voltage | UnitCategory::Current | UnitCategory::Other => 5.0,
        }
    }

    pub fn decimals(&self) -> i32 {
        match self {
            UnitCategory::Temperature
            | UnitCategory::Pressure
            | UnitCategory::Flow
            | UnitCategory::Percent
            | UnitCategory::Voltage => 1,
            UnitCategory::Current => 2,
            UnitCategory::RotationalSpeed | UnitCategory::Other => 0,
        }
    }
}

pub struct ValueSimulator {
    random: Box<dyn RandomSource>,
}

impl ValueSimulator {
    pub fn new(random: Box<dyn RandomSource>) -> Self {
        Self { random }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(Box::new(SeededRandom::from_seed(seed)))
    }

    /// Next value for a sensor: seed it if it has none, otherwise drift it by
    /// a unit-sized step. The result is rounded and kept inside the bounds.
    pub fn next_value(&mut self, point: &Point) -> f64 {
        let category = UnitCategory::of(point.unit.as_deref());

        let raw = match point.value {
            None => self.seed_value(point),
            Some(current) => {
                let step = category.max_step();
                current + self.random.uniform(-step, step)
            }
        };

        clamp_to_bounds(round_to(raw, category.decimals()), point)
    }

    fn seed_value(&mut self, point: &Point) -> f64 {
        match (point.min_value, point.max_value) {
            (Some(min), Some(max)) => {
                let mid = (min + max) / 2.0;
                let jitter = (max - min).abs() / 2.0 * SEED_JITTER;
                self.random.uniform(mid - jitter, mid + jitter)
            }
            _ => self.random.uniform(DEFAULT_SEED_RANGE.0, DEFAULT_SEED_RANGE.1),
        }
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn clamp_to_bounds(value: f64, point: &Point) -> f64 {
    let mut value = value;
    if let Some(min) = point.min_value {
        value = value.max(min);
    }
    if let Some(max) = point.max_value {
        value = value.min(max);
    }
    value
}
