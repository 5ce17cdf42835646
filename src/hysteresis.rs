//! ==============================================================================
//! hysteresis.rs - latching threshold controller for the indicator output
//! ==============================================================================
//!
//! the indicator trips when the temperature reaches the threshold and only
//! releases once it drops a full RELEASE_BAND below it, so a reading that
//! hovers around the threshold cannot make the output chatter.
//!
//! threshold control is opt-in: until a threshold is set the value holds the
//! DISABLED_THRESHOLD sentinel and the output stays off.
//!
//! ==============================================================================

use serde::Serialize;

/// threshold value meaning "no threshold configured"
pub const DISABLED_THRESHOLD: f64 = -50.0;

/// distance below the threshold the temperature must fall to release the latch
pub const RELEASE_BAND: f64 = 1.0;

/// state of the binary output sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    On,
    Off,
}

impl Indicator {
    pub fn is_on(self) -> bool {
        self == Indicator::On
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdState {
    pub value: f64,
    pub overcome: bool,
}

impl Default for ThresholdState {
    fn default() -> Self {
        Self { value: DISABLED_THRESHOLD, overcome: false }
    }
}

impl ThresholdState {
    pub fn is_enabled(&self) -> bool {
        self.value != DISABLED_THRESHOLD
    }

    /// replace the threshold. clears the latch, the caller must force the
    /// output off with the returned value.
    pub fn set(&mut self, value: f64) -> Indicator {
        self.value = value;
        self.overcome = false;
        Indicator::Off
    }

    /// one controller step for the current temperature
    pub fn evaluate(&mut self, temperature: f64) -> Indicator {
        if !self.is_enabled() {
            self.overcome = false;
            return Indicator::Off;
        }

        if temperature >= self.value
            || (self.overcome && temperature >= self.value - RELEASE_BAND)
        {
            self.overcome = true;
            Indicator::On
        } else {
            self.overcome = false;
            Indicator::Off
        }
    }
}
