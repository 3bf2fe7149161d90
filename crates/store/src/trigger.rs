use serde::{Deserialize, Serialize};

use crate::duration::WateringDuration;
use crate::error::{Result, StoreError};
use crate::weekday::WeekdaySet;

/// One configured irrigation event, one-time or recurring weekly.
///
/// Dates and times are kept exactly as the caller formatted them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IrrigationTrigger {
    pub one_time: bool,
    pub start_time: String,
    pub start_date: String,
    pub duration: WateringDuration,
    #[serde(rename = "daysOfTheWeek")]
    pub week_days: WeekdaySet,
}

impl IrrigationTrigger {
    pub fn one_time(start_date: &str, start_time: &str, duration: WateringDuration) -> Self {
        Self {
            one_time: true,
            start_time: start_time.to_string(),
            start_date: start_date.to_string(),
            duration,
            week_days: WeekdaySet::empty(),
        }
    }

    pub fn weekly(
        start_date: &str,
        start_time: &str,
        duration: WateringDuration,
        week_days: WeekdaySet,
    ) -> Self {
        Self {
            one_time: false,
            start_time: start_time.to_string(),
            start_date: start_date.to_string(),
            duration,
            week_days,
        }
    }
}

// ---------------------------------------------------------------------------
// On-disk document
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TriggerFile {
    pub(crate) auto: bool,
    pub(crate) number_of_triggers: usize,
    pub(crate) triggers: Vec<IrrigationTrigger>,
}

impl TriggerFile {
    pub(crate) fn new(auto: bool, triggers: Vec<IrrigationTrigger>) -> Self {
        Self {
            auto,
            number_of_triggers: triggers.len(),
            triggers,
        }
    }

    pub(crate) fn parse(file: &str, contents: &str) -> Result<Self> {
        let doc: TriggerFile =
            serde_json::from_str(contents).map_err(|e| StoreError::from_json(file, e))?;
        if doc.number_of_triggers != doc.triggers.len() {
            return Err(StoreError::Format(format!(
                "{file}: numberOfTriggers is {} but {} triggers are listed",
                doc.number_of_triggers,
                doc.triggers.len()
            )));
        }
        Ok(doc)
    }
}
