//! Single serialized writer per store.
//!
//! Mutations hand a fully rendered file to the writer and return at once.
//! One task drains the queue in order, so two writes to the same file can
//! never interleave and the last mutation always lands last.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::storage::Storage;

enum Job {
    Write { name: &'static str, contents: String },
    Remove { name: &'static str },
    Flush(oneshot::Sender<()>),
}

pub(crate) struct FileWriter {
    tx: mpsc::UnboundedSender<Job>,
}

impl FileWriter {
    /// Spawn the writer task on the current tokio runtime.
    pub(crate) fn spawn(storage: Arc<dyn Storage>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(storage, rx));
        Self { tx }
    }

    pub(crate) fn write(&self, name: &'static str, contents: String) {
        self.submit(Job::Write { name, contents });
    }

    pub(crate) fn remove(&self, name: &'static str) {
        self.submit(Job::Remove { name });
    }

    /// Resolve once every job queued before this call has been applied.
    pub(crate) async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Job::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn submit(&self, job: Job) {
        if self.tx.send(job).is_err() {
            warn!("file writer has stopped; dropping job");
        }
    }
}

async fn run(storage: Arc<dyn Storage>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Write { name, contents } => {
                let storage = Arc::clone(&storage);
                let bytes = contents.len();
                let res =
                    tokio::task::spawn_blocking(move || storage.write(name, &contents)).await;
                match res {
                    Ok(Ok(())) => debug!(file = name, bytes, "file written"),
                    Ok(Err(e)) => error!(file = name, "write failed: {e}"),
                    Err(e) => error!(file = name, "write task panicked: {e}"),
                }
            }
            Job::Remove { name } => {
                let storage = Arc::clone(&storage);
                match tokio::task::spawn_blocking(move || storage.remove(name)).await {
                    Ok(Ok(())) => debug!(file = name, "file removed"),
                    Ok(Err(e)) => error!(file = name, "remove failed: {e}"),
                    Err(e) => error!(file = name, "remove task panicked: {e}"),
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
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
    use std::io;

    #[tokio::test]
    async fn writes_apply_in_submission_order() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = FileWriter::spawn(storage.clone());
        for i in 0..50 {
            writer.write("f.json", i.to_string());
        }
        writer.flush().await;
        assert_eq!(storage.read("f.json").unwrap().as_deref(), Some("49"));
    }

    #[tokio::test]
    async fn remove_after_write_deletes() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = FileWriter::spawn(storage.clone());
        writer.write("f.json", "x".into());
        writer.remove("f.json");
        writer.flush().await;
        assert!(!storage.contains("f.json"));
    }

    struct FailingStorage;

    impl Storage for FailingStorage {
        fn read(&self, _name: &str) -> io::Result<Option<String>> {
            Ok(None)
        }
        fn write(&self, _name: &str, _contents: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
        fn remove(&self, _name: &str) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_write_does_not_stop_the_writer() {
        let writer = FileWriter::spawn(Arc::new(FailingStorage));
        writer.write("f.json", "1".into());
        writer.write("f.json", "2".into());
        // flush still resolves: the task logged both failures and kept going
        writer.flush().await;
    }
}
