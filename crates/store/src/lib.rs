//! Schedule and field-data store for the Dripper irrigation controller.
//!
//! Everything here is owned by the caller: build a [`Stores`] around a
//! [`Storage`] backend once and pass references to it around.

pub mod duration;
pub mod error;
pub mod field;
pub mod prefs;
pub mod schedule;
pub mod storage;
pub mod telemetry;
pub mod trigger;
pub mod weekday;
mod writer;

use std::sync::Arc;

use tracing::info;

pub use duration::WateringDuration;
pub use error::{Result, StoreError};
pub use field::{FieldDataStore, FieldSnapshot, Ingest};
pub use prefs::{PreferenceStore, Preferences};
pub use schedule::ScheduleStore;
pub use storage::{FsStorage, MemoryStorage, Storage};
pub use trigger::IrrigationTrigger;
pub use weekday::{Weekday, WeekdaySet};

/// All stores sharing one storage backend.
pub struct Stores {
    pub schedule: ScheduleStore,
    pub field_data: FieldDataStore,
    pub prefs: PreferenceStore,
}

impl Stores {
    /// Must be called inside a tokio runtime.
    pub fn open(storage: Arc<dyn Storage>) -> Self {
        Self {
            schedule: ScheduleStore::new(Arc::clone(&storage)),
            field_data: FieldDataStore::new(Arc::clone(&storage)),
            prefs: PreferenceStore::new(storage),
        }
    }

    /// Load every store from its file, creating defaults where missing.
    pub async fn load_all(&self) -> Result<()> {
        let (auto, triggers) = self.schedule.load().await?;
        let snapshot = self.field_data.load().await?;
        self.prefs.load().await?;
        info!(
            auto,
            triggers = triggers.len(),
            readings = snapshot.has_readings(),
            "stores loaded"
        );
        Ok(())
    }

    /// Delete the schedule and field-data files and reset both stores.
    /// Preferences are kept.
    pub async fn clear_data_files(&self) {
        self.schedule.discard().await;
        self.field_data.discard().await;
        self.flush().await;
        info!("data files cleared");
    }

    pub async fn flush(&self) {
        self.schedule.flush().await;
        self.field_data.flush().await;
        self.prefs.flush().await;
    }
}
