//! Irrigation schedule: the ordered trigger list plus the auto-mode flag.
//!
//! Trigger ids are list positions. Removing a trigger shifts every later id
//! down by one, so callers must re-fetch ids after any mutation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::{Result, StoreError};
use crate::storage::{read_blocking, Storage};
use crate::trigger::{IrrigationTrigger, TriggerFile};
use crate::writer::FileWriter;

pub const TRIGGERS_FILE: &str = "default_irrigation_data.json";

#[derive(Debug, Default)]
struct Schedule {
    auto_mode: bool,
    triggers: Vec<IrrigationTrigger>,
}

pub struct ScheduleStore {
    storage: Arc<dyn Storage>,
    writer: FileWriter,
    inner: Mutex<Schedule>,
}

impl ScheduleStore {
    /// Must be called inside a tokio runtime; the store's writer task is
    /// spawned here.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            writer: FileWriter::spawn(Arc::clone(&storage)),
            storage,
            inner: Mutex::new(Schedule::default()),
        }
    }

    /// Read the triggers file into memory, creating an empty one when it does
    /// not exist yet. The default file is on disk by the time this returns.
    pub async fn load(&self) -> Result<(bool, Vec<IrrigationTrigger>)> {
        let mut inner = self.inner.lock().await;

        let contents = read_blocking(&self.storage, TRIGGERS_FILE)
            .await
            .map_err(|e| StoreError::storage(TRIGGERS_FILE, e))?;

        let Some(contents) = contents else {
            info!(file = TRIGGERS_FILE, "no schedule on disk, writing default");
            *inner = Schedule::default();
            self.persist(&inner);
            drop(inner);
            self.writer.flush().await;
            if read_blocking(&self.storage, TRIGGERS_FILE).await.ok().flatten().is_none() {
                return Err(StoreError::storage(
                    TRIGGERS_FILE,
                    "default schedule could not be created",
                ));
            }
            return Ok((false, Vec::new()));
        };

        let doc = TriggerFile::parse(TRIGGERS_FILE, &contents)?;
        *inner = Schedule {
            auto_mode: doc.auto,
            triggers: doc.triggers,
        };
        info!(
            auto = inner.auto_mode,
            triggers = inner.triggers.len(),
            "schedule loaded"
        );
        Ok((inner.auto_mode, inner.triggers.clone()))
    }

    pub async fn auto_mode(&self) -> bool {
        self.inner.lock().await.auto_mode
    }

    pub async fn set_auto_mode(&self, on: bool) {
        let mut inner = self.inner.lock().await;
        inner.auto_mode = on;
        self.persist(&inner);
    }

    pub async fn list(&self) -> Vec<IrrigationTrigger> {
        self.inner.lock().await.triggers.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.triggers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.triggers.is_empty()
    }

    /// Append a trigger and return its id.
    pub async fn add(&self, trigger: IrrigationTrigger) -> usize {
        let mut inner = self.inner.lock().await;
        inner.triggers.push(trigger);
        self.persist(&inner);
        inner.triggers.len() - 1
    }

    pub async fn replace(&self, id: usize, trigger: IrrigationTrigger) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let len = inner.triggers.len();
        let slot = inner
            .triggers
            .get_mut(id)
            .ok_or(StoreError::NotFound { id, len })?;
        *slot = trigger;
        self.persist(&inner);
        Ok(())
    }

    /// Remove the trigger at `id`. An out-of-range id is ignored.
    pub async fn remove(&self, id: usize) {
        let mut inner = self.inner.lock().await;
        if id < inner.triggers.len() {
            inner.triggers.remove(id);
            self.persist(&inner);
        }
    }

    pub async fn get(&self, id: usize) -> Result<IrrigationTrigger> {
        let inner = self.inner.lock().await;
        inner
            .triggers
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound {
                id,
                len: inner.triggers.len(),
            })
    }

    /// Id of the first trigger equal to `trigger`.
    pub async fn position_of(&self, trigger: &IrrigationTrigger) -> Option<usize> {
        self.inner
            .lock()
            .await
            .triggers
            .iter()
            .position(|t| t == trigger)
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.triggers.clear();
        self.persist(&inner);
    }

    /// Forget everything in memory and delete the triggers file.
    pub(crate) async fn discard(&self) {
        let mut inner = self.inner.lock().await;
        *inner = Schedule::default();
        self.writer.remove(TRIGGERS_FILE);
    }

    /// Wait until every write queued so far has reached storage.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Where the triggers file lives, for exporting it.
    pub fn file_location(&self) -> Option<PathBuf> {
        self.storage.locate(TRIGGERS_FILE)
    }

    // Called with the lock held so queued writes follow mutation order.
    fn persist(&self, schedule: &Schedule) {
        let doc = TriggerFile::new(schedule.auto_mode, schedule.triggers.clone());
        match serde_json::to_string_pretty(&doc) {
            Ok(json) => self.writer.write(TRIGGERS_FILE, json),
            Err(e) => error!(file = TRIGGERS_FILE, "failed to encode schedule: {e}"),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
