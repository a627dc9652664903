use serde::Deserialize;
use serde::Serialize;

/// Component of a [Range].
///
/// Can be an interval, a stepped interval or an individual value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RangeItem {
    /// Interval (inclusive).
    Interval(f64, f64),
    /// Exact value.
    Value(f64),
    /// Values from `min` to `max` (inclusive) in increments of `step`.
    Step(f64, f64, f64),
}

impl RangeItem {
    fn contains(&self, value: f64) -> bool {
        match *self {
            RangeItem::Interval(a, b) => a <= value && value <= b,
            RangeItem::Value(v) => (v - value).abs() <= f64::EPSILON,
            RangeItem::Step(min, max, step) => {
                if value < min || value > max {
                    return false;
                }
                let n = ((value - min) / step).round();
                (min + n * step - value).abs() <= f64::EPSILON
            }
        }
    }

    fn closest(&self, value: f64) -> f64 {
        match *self {
            RangeItem::Interval(a, b) => value.clamp(a, b),
            RangeItem::Value(v) => v,
            RangeItem::Step(min, max, step) => {
                if value <= min {
                    min
                } else if value >= max {
                    max
                } else {
                    let n = ((value - min) / step).round();
                    (min + n * step).min(max)
                }
            }
        }
    }
}

/// Set of values a device setting accepts, e.g. the gain reduction of a tuner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Range {
    items: Vec<RangeItem>,
}

impl Range {
    /// Create a [`Range`] from [`RangeItems`](RangeItem).
    pub fn new(items: Vec<RangeItem>) -> Self {
        Self { items }
    }
    /// Check if the [`Range`] contains the `value`.
    pub fn contains(&self, value: f64) -> bool {
        self.items.iter().any(|i| i.contains(value))
    }
    /// Returns the value in [`Range`] that is closest to the given `value` or `None`, if the
    /// [`Range`] is empty.
    ///
    /// This is what hardware does with an out-of-range setting: it silently substitutes the
    /// nearest supported one.
    pub fn closest(&self, value: f64) -> Option<f64> {
        if self.contains(value) {
            return Some(value);
        }
        self.items
            .iter()
            .map(|i| i.closest(value))
            .min_by(|a, b| (a - value).abs().total_cmp(&(b - value).abs()))
    }
    /// Merges two [`Ranges`](Range).
    pub fn merge(&mut self, mut r: Range) {
        self.items.append(&mut r.items)
    }
}
