//! Field telemetry: the last known sensor readings and the streaming
//! ingestion path that replaces them.
//!
//! ```text
//! Empty ──chunk──▶ Accumulating ──final chunk──▶ parse ──ok──▶ Empty (snapshot replaced)
//!                    ▲      │                          └─err─▶ Empty (snapshot kept)
//!                    └chunk─┘
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{Result, StoreError};
use crate::storage::{read_blocking, Storage};
use crate::telemetry::{self, Readings, Telemetry};
use crate::writer::FileWriter;

pub const FIELD_DATA_FILE: &str = "default_field_data.json";

/// Placeholder for "no irrigation recorded yet".
pub const NO_IRRIGATION: &str = "-";

/// Written in place of an absent reading.
pub const NOT_AVAILABLE: &str = "N/A";

/// Log frequency recorded when the payload does not carry one.
const DEFAULT_LOG_FREQUENCY: u32 = 60;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Most recent consistent set of readings. The four readings always come
/// from the same log entry; `None` means the reading was absent, not zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSnapshot {
    pub last_irrigation_time: String,
    pub temperature: Option<i64>,
    pub moisture: Option<i64>,
    pub luminosity: Option<String>,
    pub soil_moisture: Option<String>,
}

impl Default for FieldSnapshot {
    fn default() -> Self {
        Self {
            last_irrigation_time: NO_IRRIGATION.to_string(),
            temperature: None,
            moisture: None,
            luminosity: None,
            soil_moisture: None,
        }
    }
}

impl FieldSnapshot {
    fn from_readings(last_irrigation_time: String, r: Readings) -> Self {
        Self {
            last_irrigation_time,
            temperature: r.temperature,
            moisture: r.moisture,
            luminosity: r.luminosity,
            soil_moisture: r.soil_moisture,
        }
    }

    pub fn has_readings(&self) -> bool {
        self.temperature.is_some()
            || self.moisture.is_some()
            || self.luminosity.is_some()
            || self.soil_moisture.is_some()
    }
}

// ---------------------------------------------------------------------------
// On-disk document
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldDataFile {
    last_irrigation_time: String,
    log_frequency: u32,
    number_of_logs: u32,
    logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry {
    #[serde(with = "not_available")]
    temperature: Option<i64>,
    #[serde(with = "not_available")]
    moisture: Option<i64>,
    #[serde(with = "not_available")]
    luminosity: Option<String>,
    #[serde(with = "not_available")]
    soil_moisture: Option<String>,
}

impl FieldDataFile {
    fn empty() -> Self {
        Self {
            last_irrigation_time: NO_IRRIGATION.to_string(),
            log_frequency: 0,
            number_of_logs: 0,
            logs: Vec::new(),
        }
    }

    fn from_telemetry(t: &Telemetry, snapshot: &FieldSnapshot) -> Self {
        Self {
            last_irrigation_time: snapshot.last_irrigation_time.clone(),
            log_frequency: t.log_frequency.unwrap_or(DEFAULT_LOG_FREQUENCY),
            number_of_logs: t.number_of_logs,
            logs: vec![LogEntry {
                temperature: snapshot.temperature,
                moisture: snapshot.moisture,
                luminosity: snapshot.luminosity.clone(),
                soil_moisture: snapshot.soil_moisture.clone(),
            }],
        }
    }

    fn parse(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).map_err(|e| StoreError::from_json(FIELD_DATA_FILE, e))
    }

    fn snapshot(self) -> Result<FieldSnapshot> {
        if self.number_of_logs == 0 {
            return Ok(FieldSnapshot {
                last_irrigation_time: self.last_irrigation_time,
                ..FieldSnapshot::default()
            });
        }
        let last = self.logs.into_iter().next().ok_or_else(|| {
            StoreError::Format(format!(
                "{FIELD_DATA_FILE}: numberOfLogs is {} but no logs are listed",
                self.number_of_logs
            ))
        })?;
        Ok(FieldSnapshot {
            last_irrigation_time: self.last_irrigation_time,
            temperature: last.temperature,
            moisture: last.moisture,
            luminosity: last.luminosity,
            soil_moisture: last.soil_moisture,
        })
    }
}

/// `Option<T>` stored as the value itself, or `"N/A"` when absent.
mod not_available {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::NOT_AVAILABLE;

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => v.serialize(serializer),
            None => serializer.serialize_str(NOT_AVAILABLE),
        }
    }

    pub fn deserialize<'de, T: DeserializeOwned, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<T>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.as_str() == Some(NOT_AVAILABLE) {
            return Ok(None);
        }
        T::deserialize(value).map(Some).map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Outcome of one `ingest_telemetry` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// Chunk buffered, waiting for the final one.
    Buffering,
    /// Payload parsed; snapshot replaced and queued for writing.
    Applied,
    /// Payload rejected and logged; snapshot unchanged.
    Discarded,
}

pub struct FieldDataStore {
    storage: Arc<dyn Storage>,
    writer: FileWriter,
    snapshot: RwLock<FieldSnapshot>,
    buffer: Mutex<String>,
}

impl FieldDataStore {
    /// Must be called inside a tokio runtime; the store's writer task is
    /// spawned here.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            writer: FileWriter::spawn(Arc::clone(&storage)),
            storage,
            snapshot: RwLock::new(FieldSnapshot::default()),
            buffer: Mutex::new(String::new()),
        }
    }

    /// Read the telemetry file, creating the empty default when missing.
    /// The snapshot stays locked until the file's contents are installed, so
    /// an ingestion racing with `load` always lands after it.
    pub async fn load(&self) -> Result<FieldSnapshot> {
        let mut current = self.snapshot.write().await;

        let contents = read_blocking(&self.storage, FIELD_DATA_FILE)
            .await
            .map_err(|e| StoreError::storage(FIELD_DATA_FILE, e))?;

        let snapshot = match contents {
            Some(contents) => FieldDataFile::parse(&contents)?.snapshot()?,
            None => {
                info!(file = FIELD_DATA_FILE, "no field data on disk, writing default");
                self.write_file(&FieldDataFile::empty());
                self.writer.flush().await;
                if read_blocking(&self.storage, FIELD_DATA_FILE)
                    .await
                    .ok()
                    .flatten()
                    .is_none()
                {
                    return Err(StoreError::storage(
                        FIELD_DATA_FILE,
                        "default field data could not be created",
                    ));
                }
                FieldSnapshot::default()
            }
        };

        *current = snapshot.clone();
        Ok(snapshot)
    }

    /// Most recent successfully parsed snapshot, from memory.
    pub async fn current_snapshot(&self) -> FieldSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Feed one chunk of raw telemetry. When `is_final` is set the whole
    /// buffer is parsed and the buffer is emptied whatever the outcome.
    /// Parse failures are logged here and never returned.
    pub async fn ingest_telemetry(&self, chunk: &str, is_final: bool) -> Ingest {
        let mut buffer = self.buffer.lock().await;
        buffer.push_str(chunk);

        if !is_final {
            debug!(buffered = buffer.len(), "telemetry chunk buffered");
            return Ingest::Buffering;
        }

        let raw = std::mem::take(&mut *buffer);
        match telemetry::parse(&raw) {
            Ok(t) => {
                let snapshot = FieldSnapshot::from_readings(
                    t.last_irrigation_time
                        .clone()
                        .unwrap_or_else(|| NO_IRRIGATION.to_string()),
                    t.latest.clone(),
                );
                let mut current = self.snapshot.write().await;
                self.write_file(&FieldDataFile::from_telemetry(&t, &snapshot));
                info!(
                    logs = t.number_of_logs,
                    temperature = ?snapshot.temperature,
                    moisture = ?snapshot.moisture,
                    luminosity = ?snapshot.luminosity,
                    soil_moisture = ?snapshot.soil_moisture,
                    "telemetry applied"
                );
                *current = snapshot;
                Ingest::Applied
            }
            Err(StoreError::NoData) => {
                warn!(bytes = raw.len(), "telemetry discarded: payload has no logs");
                Ingest::Discarded
            }
            Err(e) => {
                error!(bytes = raw.len(), "telemetry discarded: {e}");
                Ingest::Discarded
            }
        }
    }

    /// Back to the empty default, in memory and on disk. Drops any partially
    /// buffered telemetry.
    pub async fn reset(&self) {
        self.buffer.lock().await.clear();
        let mut current = self.snapshot.write().await;
        *current = FieldSnapshot::default();
        self.write_file(&FieldDataFile::empty());
    }

    /// Forget everything in memory and delete the telemetry file.
    pub(crate) async fn discard(&self) {
        self.buffer.lock().await.clear();
        *self.snapshot.write().await = FieldSnapshot::default();
        self.writer.remove(FIELD_DATA_FILE);
    }

    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    fn write_file(&self, doc: &FieldDataFile) {
        match serde_json::to_string_pretty(doc) {
            Ok(json) => self.writer.write(FIELD_DATA_FILE, json),
            Err(e) => error!(file = FIELD_DATA_FILE, "failed to encode field data: {e}"),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::telemetry::SELF_TEST_PAYLOAD;

    async fn loaded_store() -> (Arc<MemoryStorage>, FieldDataStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = FieldDataStore::new(storage.clone());
        store.load().await.unwrap();
        (storage, store)
    }

    fn on_disk(storage: &MemoryStorage) -> serde_json::Value {
        serde_json::from_str(&storage.read(FIELD_DATA_FILE).unwrap().unwrap()).unwrap()
    }

    fn payload(logs: u32, temperature: i64) -> String {
        format!(
            r#"{{"numberOfLogs":{logs},"logs":[{{"numberOfSensors":1,"sensors":[{{"name":"Temperature","data":{temperature}}}]}}]}}"#
        )
    }

    // -- load --------------------------------------------------------------

    #[tokio::test]
    async fn load_missing_file_writes_default() {
        let storage = Arc::new(MemoryStorage::new());
        let store = FieldDataStore::new(storage.clone());
        let snap = store.load().await.unwrap();
        assert_eq!(snap, FieldSnapshot::default());
        assert_eq!(snap.last_irrigation_time, "-");

        let doc = on_disk(&storage);
        assert_eq!(doc["lastIrrigationTime"], "-");
        assert_eq!(doc["logFrequency"], 0);
        assert_eq!(doc["numberOfLogs"], 0);
        assert_eq!(doc["logs"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn load_reads_latest_log_and_na_sentinels() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            FIELD_DATA_FILE,
            r#"{"lastIrrigationTime": "11/11/2017 06:00", "logFrequency": 60,
                "numberOfLogs": 1, "logs": [
                  {"temperature": 18, "moisture": "N/A",
                   "luminosity": "Night", "soilMoisture": "N/A"}]}"#,
        );
        let store = FieldDataStore::new(storage.clone());
        let snap = store.load().await.unwrap();
        assert_eq!(snap.last_irrigation_time, "11/11/2017 06:00");
        assert_eq!(snap.temperature, Some(18));
        assert_eq!(snap.moisture, None);
        assert_eq!(snap.luminosity.as_deref(), Some("Night"));
        assert_eq!(snap.soil_moisture, None);
        assert_eq!(store.current_snapshot().await, snap);
    }

    #[tokio::test]
    async fn load_zero_reading_is_not_absent() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            FIELD_DATA_FILE,
            r#"{"lastIrrigationTime": "-", "logFrequency": 60, "numberOfLogs": 1,
                "logs": [{"temperature": 0, "moisture": 0,
                          "luminosity": "0", "soilMoisture": "Low"}]}"#,
        );
        let store = FieldDataStore::new(storage.clone());
        let snap = store.load().await.unwrap();
        assert_eq!(snap.temperature, Some(0));
        assert_eq!(snap.moisture, Some(0));
    }

    #[tokio::test]
    async fn load_wrong_type_is_format_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            FIELD_DATA_FILE,
            r#"{"lastIrrigationTime": "-", "logFrequency": 60, "numberOfLogs": 1,
                "logs": [{"temperature": "hot", "moisture": 1,
                          "luminosity": "Day", "soilMoisture": "Low"}]}"#,
        );
        let store = FieldDataStore::new(storage.clone());
        assert!(matches!(store.load().await, Err(StoreError::Format(_))));
    }

    #[tokio::test]
    async fn load_count_without_logs_is_format_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(
            FIELD_DATA_FILE,
            r#"{"lastIrrigationTime": "-", "logFrequency": 60, "numberOfLogs": 2, "logs": []}"#,
        );
        let store = FieldDataStore::new(storage.clone());
        assert!(matches!(store.load().await, Err(StoreError::Format(_))));
    }

    #[tokio::test]
    async fn load_truncated_file_is_storage_error() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert(FIELD_DATA_FILE, r#"{"lastIrrigationTime": "-", "logFreq"#);
        let store = FieldDataStore::new(storage.clone());
        assert!(matches!(
            store.load().await,
            Err(StoreError::Storage { .. })
        ));
    }

    // -- ingestion ---------------------------------------------------------

    #[tokio::test]
    async fn self_test_payload_end_to_end() {
        let (storage, store) = loaded_store().await;
        assert_eq!(
            store.ingest_telemetry(SELF_TEST_PAYLOAD, true).await,
            Ingest::Applied
        );
        store.flush().await;

        let snap = store.current_snapshot().await;
        assert_eq!(snap.temperature, Some(22));
        assert_eq!(snap.moisture, Some(35));
        assert_eq!(snap.luminosity.as_deref(), Some("Day"));
        assert_eq!(snap.soil_moisture.as_deref(), Some("Low"));

        let doc = on_disk(&storage);
        assert_eq!(doc["numberOfLogs"], 1);
        assert_eq!(doc["logFrequency"], 60);
        assert_eq!(doc["logs"][0]["temperature"], 22);
        assert_eq!(doc["logs"][0]["soilMoisture"], "Low");
    }

    #[tokio::test]
    async fn chunks_accumulate_until_final() {
        let (_, store) = loaded_store().await;
        let text = payload(3, 27);
        let (a, b) = text.split_at(text.len() / 2);
        assert_eq!(store.ingest_telemetry(a, false).await, Ingest::Buffering);
        assert_eq!(store.current_snapshot().await, FieldSnapshot::default());
        assert_eq!(store.ingest_telemetry(b, true).await, Ingest::Applied);
        assert_eq!(store.current_snapshot().await.temperature, Some(27));
    }

    #[tokio::test]
    async fn zero_logs_keeps_snapshot_and_clears_buffer() {
        let (storage, store) = loaded_store().await;
        store.ingest_telemetry(&payload(1, 20), true).await;
        store.flush().await;
        let before = store.current_snapshot().await;

        assert_eq!(
            store
                .ingest_telemetry(r#"{"numberOfLogs":0,"logs":[]}"#, true)
                .await,
            Ingest::Discarded
        );
        assert_eq!(store.current_snapshot().await, before);

        // A fresh payload parses on its own, so nothing from the failed one
        // was left behind in the buffer.
        assert_eq!(
            store.ingest_telemetry(&payload(5, 31), true).await,
            Ingest::Applied
        );
        store.flush().await;
        assert_eq!(store.current_snapshot().await.temperature, Some(31));
        assert_eq!(on_disk(&storage)["numberOfLogs"], 5);
    }

    #[tokio::test]
    async fn garbage_keeps_snapshot() {
        let (_, store) = loaded_store().await;
        store.ingest_telemetry(&payload(1, 20), true).await;
        store.ingest_telemetry("{ \"numberOf", false).await;
        assert_eq!(store.ingest_telemetry("}}}", true).await, Ingest::Discarded);
        assert_eq!(store.current_snapshot().await.temperature, Some(20));
    }

    #[tokio::test]
    async fn missing_readings_persist_as_na() {
        let (storage, store) = loaded_store().await;
        store.ingest_telemetry(&payload(1, 15), true).await;
        store.flush().await;
        let doc = on_disk(&storage);
        assert_eq!(doc["logs"][0]["temperature"], 15);
        assert_eq!(doc["logs"][0]["moisture"], "N/A");
        assert_eq!(doc["logs"][0]["luminosity"], "N/A");
        assert_eq!(doc["lastIrrigationTime"], "-");
    }

    #[tokio::test]
    async fn persisted_snapshot_reloads() {
        let (storage, store) = loaded_store().await;
        store.ingest_telemetry(SELF_TEST_PAYLOAD, true).await;
        store.flush().await;

        let reopened = FieldDataStore::new(storage.clone());
        assert_eq!(
            reopened.load().await.unwrap(),
            store.current_snapshot().await
        );
    }

    #[tokio::test]
    async fn reset_restores_default() {
        let (storage, store) = loaded_store().await;
        store.ingest_telemetry(SELF_TEST_PAYLOAD, true).await;
        store.ingest_telemetry("{ partial", false).await;
        store.reset().await;
        store.flush().await;
        assert_eq!(store.current_snapshot().await, FieldSnapshot::default());
        assert_eq!(on_disk(&storage)["numberOfLogs"], 0);
        // buffer was dropped too
        assert_eq!(
            store.ingest_telemetry(&payload(1, 9), true).await,
            Ingest::Applied
        );
    }

    /// Backend whose reads take a while, to widen race windows.
    struct SlowReads(MemoryStorage);

    impl Storage for SlowReads {
        fn read(&self, name: &str) -> std::io::Result<Option<String>> {
            std::thread::sleep(std::time::Duration::from_millis(300));
            self.0.read(name)
        }
        fn write(&self, name: &str, contents: &str) -> std::io::Result<()> {
            self.0.write(name, contents)
        }
        fn remove(&self, name: &str) -> std::io::Result<()> {
            self.0.remove(name)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ingestion_during_load_is_not_overwritten() {
        let inner = MemoryStorage::new();
        let empty = serde_json::to_string(&FieldDataFile::empty()).unwrap();
        inner.write(FIELD_DATA_FILE, &empty).unwrap();
        let store = Arc::new(FieldDataStore::new(Arc::new(SlowReads(inner))));

        let loading = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.load().await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(
            store.ingest_telemetry(SELF_TEST_PAYLOAD, true).await,
            Ingest::Applied
        );
        loading.await.unwrap().unwrap();

        assert_eq!(store.current_snapshot().await.temperature, Some(22));
    }

    #[test]
    fn has_readings_tracks_presence() {
        assert!(!FieldSnapshot::default().has_readings());
        let snap = FieldSnapshot {
            moisture: Some(0),
            ..FieldSnapshot::default()
        };
        assert!(snap.has_readings());
    }
}
