//! Single-writer service.
//!
//! Extraction workers run in parallel but exactly one thread owns the write
//! lock on `repo_index.db`. Workers enqueue `(file, manifest, batches)` over
//! a bounded channel; the writer drains the queue and answers each job with
//! its receipt on a per-job reply channel.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::error;

use crate::error::{Result, StorageError};
use crate::fidelity::{Manifest, Receipt};
use crate::record::RecordBatches;
use crate::writer::IndexWriter;

/// Queue depth: enough to keep extraction workers busy without buffering
/// unbounded batches in memory.
const QUEUE_DEPTH: usize = 64;

enum WriterMsg {
    Write {
        file_path: String,
        manifest: Manifest,
        batches: RecordBatches,
        reply: Sender<Result<Receipt>>,
    },
    RecordError {
        file_path: String,
        error_type: String,
        message: String,
    },
}

/// Cloneable producer half handed to extraction workers.
#[derive(Clone)]
pub struct WriterHandle {
    tx: Sender<WriterMsg>,
}

impl WriterHandle {
    /// Enqueue one file's batches; blocks until the writer answers with the
    /// receipt (or a fatal storage error).
    pub fn write_file(
        &self,
        file_path: &str,
        manifest: Manifest,
        batches: RecordBatches,
    ) -> Result<Receipt> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(WriterMsg::Write {
                file_path: file_path.to_string(),
                manifest,
                batches,
                reply: reply_tx,
            })
            .map_err(|_| StorageError::transaction("writer thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| StorageError::transaction("writer thread dropped the reply"))?
    }

    /// Record a structured per-file error (parse failure, cancellation
    /// sentinel) without a batch write.
    pub fn record_error(&self, file_path: &str, error_type: &str, message: &str) -> Result<()> {
        self.tx
            .send(WriterMsg::RecordError {
                file_path: file_path.to_string(),
                error_type: error_type.to_string(),
                message: message.to_string(),
            })
            .map_err(|_| StorageError::transaction("writer thread is gone"))
    }
}

/// The writer thread plus its queue.
pub struct WriterService {
    handle: WriterHandle,
    join: JoinHandle<Result<IndexWriter>>,
}

impl WriterService {
    /// Spawn the writer thread on an already-opened writer.
    pub fn spawn(writer: IndexWriter) -> Self {
        let (tx, rx) = bounded::<WriterMsg>(QUEUE_DEPTH);
        let join = thread::spawn(move || writer_loop(writer, rx));
        Self {
            handle: WriterHandle { tx },
            join,
        }
    }

    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Drop the producer side, drain the queue, and hand the writer back
    /// for the post-run integrity audit.
    pub fn finish(self) -> Result<IndexWriter> {
        let WriterService { handle, join } = self;
        drop(handle);
        join.join()
            .map_err(|_| StorageError::transaction("writer thread panicked"))?
    }
}

fn writer_loop(mut writer: IndexWriter, rx: Receiver<WriterMsg>) -> Result<IndexWriter> {
    for msg in rx.iter() {
        match msg {
            WriterMsg::Write {
                file_path,
                manifest,
                batches,
                reply,
            } => {
                let result = writer.write_file(&file_path, &manifest, &batches);
                if let Err(err) = &result {
                    error!(file = %file_path, error = %err, "fatal storage error");
                }
                let fatal = result.is_err();
                let _ = reply.send(result);
                if fatal {
                    // Schema-level corruption: stop accepting work so the
                    // pipeline aborts instead of limping on.
                    break;
                }
            }
            WriterMsg::RecordError {
                file_path,
                error_type,
                message,
            } => {
                if let Err(err) = writer.record_error(&file_path, &error_type, &message) {
                    error!(file = %file_path, error = %err, "failed to record error");
                }
            }
        }
    }
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch_for(path: &str) -> RecordBatches {
        let mut batches = RecordBatches::new();
        batches.insert(
            "files".to_string(),
            vec![json!({
                "path": path,
                "language": "python",
                "size_bytes": 1,
                "sha256": "00",
                "mtime": 0,
            })
            .as_object()
            .expect("object")
            .clone()],
        );
        batches
    }

    #[test]
    fn test_parallel_producers_single_writer() {
        let service = WriterService::spawn(IndexWriter::in_memory().expect("open"));
        let handle = service.handle();

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let handle = handle.clone();
                thread::spawn(move || {
                    let path = format!("src/file_{}.py", i);
                    let batches = batch_for(&path);
                    let manifest = Manifest::for_batches(&batches);
                    handle.write_file(&path, manifest, batches).expect("receipt")
                })
            })
            .collect();
        for worker in workers {
            let receipt = worker.join().expect("no panic");
            assert_eq!(receipt.counts["files"], 1);
        }
        drop(handle);

        let writer = service.finish().expect("writer back");
        assert_eq!(writer.count_rows("files").expect("count"), 8);
    }
}
