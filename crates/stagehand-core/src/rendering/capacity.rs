//! Capacity classes shared by both sync paths.
//!
//! Storage is sized to a power of two with a floor, and only resized when the
//! requirement leaves the `[current / 2, current]` band.

/// Smallest capacity ever allocated.
pub const MIN_CAPACITY: usize = 16;

/// Next power of two at or above `required`, never below [`MIN_CAPACITY`].
pub fn capacity_class(required: usize) -> usize {
    required.max(MIN_CAPACITY).next_power_of_two()
}

/// True when storage of `current` units must be resized to hold `target`.
pub fn outside_hysteresis(current: usize, target: usize) -> bool {
    current < target || current > target.saturating_mul(2)
}
