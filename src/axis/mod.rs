//! Axis shaping for the two analog sticks
//!
//! Samples arrive in host byte order (the report codec decodes the little-endian
//! wire values). Negative values follow the wire convention of the pad: the
//! magnitude of a negative sample is its bit-complement, and a shaped negative
//! value is restored by complementing again. Arithmetic negation is never used,
//! so `i16::MIN` maps onto `i16::MAX` without overflow.
//!
//! ```text
//! raw pair ──► invert ──► dead-zone (linked | independent) ──► rescale ──► shaped pair
//! ```

use serde::{Deserialize, Serialize};

/// Largest magnitude a stick axis can report.
pub const AXIS_MAX: u16 = 32767;

/// One stick sample, x and y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalogPair {
    pub x: i16,
    pub y: i16,
}

impl AnalogPair {
    pub const CENTERED: AnalogPair = AnalogPair { x: 0, y: 0 };

    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

/// Shaping options for one stick, derived from the driver settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StickPolicy {
    pub invert_x: bool,
    pub invert_y: bool,
    /// Dead-zone radius in raw axis units. Zero turns dead-zone handling off.
    pub deadzone: u16,
    /// Evaluate the dead-zone over both axes together.
    pub linked: bool,
    /// Rescale values outside the dead-zone to the full range.
    pub normalize: bool,
}

/// Complement-based magnitude of a sample.
pub fn magnitude(sample: i16) -> u16 {
    if sample < 0 {
        !sample as u16
    } else {
        sample as u16
    }
}

/// Rescales a sample so the edge of the dead-zone maps to zero and the end of
/// travel still maps to [`AXIS_MAX`].
///
/// A dead-zone of zero returns the sample unchanged.
pub fn normalize(sample: i16, deadzone: u16) -> i16 {
    if deadzone == 0 {
        return sample;
    }

    let current = magnitude(sample);
    if current <= deadzone {
        return 0;
    }

    // current > deadzone implies deadzone < AXIS_MAX, the divisor is never zero
    let span = f64::from(AXIS_MAX - deadzone);
    let scaled = (f64::from(AXIS_MAX) * f64::from(current - deadzone) / span) as i16;

    if sample < 0 {
        !scaled
    } else {
        scaled
    }
}

/// Applies inversion and the dead-zone policy to one stick.
pub fn shape_pair(pair: AnalogPair, policy: &StickPolicy) -> AnalogPair {
    let mut shaped = pair;

    if policy.invert_x {
        shaped.x = !shaped.x;
    }
    if policy.invert_y {
        shaped.y = !shaped.y;
    }

    let deadzone = policy.deadzone;
    if deadzone == 0 {
        return shaped;
    }

    if policy.linked {
        if magnitude(shaped.x) < deadzone && magnitude(shaped.y) < deadzone {
            shaped = AnalogPair::CENTERED;
        } else if policy.normalize {
            shaped.x = normalize(shaped.x, deadzone);
            shaped.y = normalize(shaped.y, deadzone);
        }
    } else {
        shaped.x = shape_axis(shaped.x, deadzone, policy.normalize);
        shaped.y = shape_axis(shaped.y, deadzone, policy.normalize);
    }

    shaped
}

fn shape_axis(sample: i16, deadzone: u16, normalize_outside: bool) -> i16 {
    if magnitude(sample) < deadzone {
        0
    } else if normalize_outside {
        normalize(sample, deadzone)
    } else {
        sample
    }
}

/// Shapes both sticks, each with its own policy.
pub fn shape_sticks(
    left: AnalogPair,
    right: AnalogPair,
    left_policy: &StickPolicy,
    right_policy: &StickPolicy,
) -> (AnalogPair, AnalogPair) {
    (
        shape_pair(left, left_policy),
        shape_pair(right, right_policy),
    )
}
