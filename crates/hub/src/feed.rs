//! Line-oriented telemetry feed: whatever delivers the controller's bytes
//! (a serial bridge, a pipe) writes them to the hub's stdin, one chunk per
//! line, and ends a payload with the configured terminator.

use anyhow::{Context, Result};
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use dripper_store::{Ingest, Stores};

use crate::state::SharedState;

/// Feed every line of `reader` into the field-data store until EOF, then
/// flush the stores.
pub(crate) async fn run<R>(
    reader: R,
    stores: &Stores,
    shared: &SharedState,
    terminator: &str,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await.context("telemetry feed read failed")? {
        let (chunk, is_final) = split_chunk(&line, terminator);
        let outcome = stores.field_data.ingest_telemetry(chunk, is_final).await;
        record_outcome(stores, shared, outcome, "feed").await;
    }
    stores.flush().await;
    Ok(())
}

/// Stamp the last sync on an applied payload and log either outcome as a
/// hub event.
pub(crate) async fn record_outcome(
    stores: &Stores,
    shared: &SharedState,
    outcome: Ingest,
    source: &str,
) {
    match outcome {
        Ingest::Buffering => {}
        Ingest::Applied => {
            let stamp = sync_stamp(OffsetDateTime::now_utc());
            stores.prefs.set_last_sync(&stamp).await;
            shared
                .write()
                .await
                .record_telemetry(format!("{source}: snapshot updated at {stamp}"));
        }
        Ingest::Discarded => {
            shared
                .write()
                .await
                .record_error(format!("{source}: telemetry payload discarded"));
        }
    }
}

/// Split a feed line into the chunk to buffer and whether it ends the payload.
pub(crate) fn split_chunk<'a>(line: &'a str, terminator: &str) -> (&'a str, bool) {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    match trimmed.strip_suffix(terminator) {
        Some(chunk) => (chunk, true),
        None => (trimmed, false),
    }
}

/// Sync stamp in the form shown to users, `dd/mm/yyyy hh:mm:ss`.
pub(crate) fn sync_stamp(at: OffsetDateTime) -> String {
    let fmt = format_description!("[day]/[month]/[year] [hour]:[minute]:[second]");
    at.format(&fmt).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

// ===========================================================================
// Tests
// ===========================================================================
