//! Watering duration: stored as whole seconds, shown as hours/minutes/seconds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

const SECS_PER_HOUR: u32 = 3600;
const SECS_PER_MINUTE: u32 = 60;

/// Elapsed watering time. Serialized as a plain integer number of seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct WateringDuration {
    secs: u32,
}

impl WateringDuration {
    pub const fn from_secs(secs: u32) -> Self {
        Self { secs }
    }

    /// Build from a form-style triple. Minutes and seconds must be below 60.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Result<Self> {
        if minutes >= 60 || seconds >= 60 {
            return Err(StoreError::Format(format!(
                "duration {hours}h {minutes}m {seconds}s: minutes and seconds must be below 60"
            )));
        }
        hours
            .checked_mul(SECS_PER_HOUR)
            .and_then(|h| h.checked_add(minutes * SECS_PER_MINUTE + seconds))
            .map(Self::from_secs)
            .ok_or_else(|| {
                StoreError::Format(format!("duration of {hours} hours does not fit in seconds"))
            })
    }

    pub const fn as_secs(self) -> u32 {
        self.secs
    }

    /// `(hours, minutes, seconds)` with minutes and seconds in `0..60`.
    pub const fn hms(self) -> (u32, u32, u32) {
        (
            self.secs / SECS_PER_HOUR,
            (self.secs % SECS_PER_HOUR) / SECS_PER_MINUTE,
            self.secs % SECS_PER_MINUTE,
        )
    }
}

impl From<u32> for WateringDuration {
    fn from(secs: u32) -> Self {
        Self::from_secs(secs)
    }
}

impl From<WateringDuration> for u32 {
    fn from(d: WateringDuration) -> Self {
        d.secs
    }
}

impl fmt::Display for WateringDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = self.hms();
        write!(f, "{h:02}:{m:02}:{s:02}")
    }
}
