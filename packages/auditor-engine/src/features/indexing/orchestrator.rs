//! Indexing orchestrator.
//!
//! Files are extracted in a rayon pool; one writer thread owns the
//! database. Every file goes through the fidelity handshake: the
//! extraction manifest must reconcile against the storage receipt, and a
//! 100% loss aborts the run in strict mode.

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use auditor_storage::{
    reconcile_fidelity, FidelityStatus, IndexWriter, Manifest, WriterHandle, WriterService,
};

use crate::config::AuditConfig;
use crate::errors::{AuditError, Result};
use crate::features::extraction::bundle::BundleExtractor;
use crate::features::extraction::{self, push};
use crate::features::file_context::FileContext;
use crate::shared::cancel::CancellationToken;
use crate::shared::models::{FileInfo, Language};

use super::walker::{walk_repository, WalkedFile};

/// Indexing stage result.
#[derive(Debug, Default)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_failed: usize,
    pub rows_written: i64,
    pub fidelity_warnings: usize,
    pub cancelled: bool,
}

enum FileOutcome {
    Indexed { rows: i64, warnings: usize },
    Failed,
    Skipped,
}

/// Run extractors over the repository and build `repo_index.db` from
/// scratch. Returns the writer for the post-run integrity audit.
pub fn index_repository(
    config: &AuditConfig,
    cancel: &CancellationToken,
) -> Result<(IndexStats, IndexWriter)> {
    let pf = config.pf();
    pf.ensure()?;
    // Databases are regenerated per analysis; history snapshots keep old runs.
    let db_path = pf.repo_index_db();
    if db_path.exists() {
        std::fs::remove_file(&db_path)?;
    }

    let writer = IndexWriter::open(&db_path)?;
    let service = WriterService::spawn(writer);
    let handle = service.handle();

    let files = walk_repository(config)?;
    info!(files = files.len(), "indexing");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.effective_workers())
        .build()
        .map_err(|e| AuditError::config(format!("failed to build worker pool: {}", e)))?;

    let bundle = config.js_bundle.as_ref().map(BundleExtractor::new);

    let outcomes: Vec<Result<FileOutcome>> = pool.install(|| {
        files
            .par_iter()
            .map(|file| process_file(config, file, &handle, bundle.as_ref(), cancel))
            .collect()
    });
    drop(handle);

    let mut stats = IndexStats::default();
    let mut fatal: Option<AuditError> = None;
    for outcome in outcomes {
        match outcome {
            Ok(FileOutcome::Indexed { rows, warnings }) => {
                stats.files_indexed += 1;
                stats.rows_written += rows;
                stats.fidelity_warnings += warnings;
            }
            Ok(FileOutcome::Failed) => stats.files_failed += 1,
            Ok(FileOutcome::Skipped) => {}
            Err(err) if fatal.is_none() => fatal = Some(err),
            Err(_) => {}
        }
    }

    let writer = service.finish()?;

    if cancel.is_cancelled() {
        stats.cancelled = true;
        writer.record_error("<run>", "cancelled", "run cancelled; partial database")?;
        return Err(AuditError::Cancelled);
    }
    if let Some(err) = fatal {
        return Err(err);
    }

    writer.integrity_audit()?;
    info!(
        indexed = stats.files_indexed,
        failed = stats.files_failed,
        rows = stats.rows_written,
        "indexing complete"
    );
    Ok((stats, writer))
}

fn process_file(
    config: &AuditConfig,
    file: &WalkedFile,
    handle: &WriterHandle,
    bundle: Option<&BundleExtractor>,
    cancel: &CancellationToken,
) -> Result<FileOutcome> {
    if cancel.is_cancelled() {
        return Ok(FileOutcome::Skipped);
    }

    let content = match std::fs::read_to_string(&file.abs) {
        Ok(content) => content,
        Err(err) => {
            warn!(file = %file.rel, error = %err, "unreadable file");
            handle.record_error(&file.rel, "io", &err.to_string())?;
            return Ok(FileOutcome::Failed);
        }
    };

    let metadata = match std::fs::metadata(&file.abs) {
        Ok(metadata) => metadata,
        Err(err) => {
            handle.record_error(&file.rel, "io", &err.to_string())?;
            return Ok(FileOutcome::Failed);
        }
    };
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let info = FileInfo {
        path: file.rel.clone(),
        language: file.language,
        size_bytes: metadata.len(),
        sha256: hex::encode(Sha256::digest(content.as_bytes())),
        mtime,
    };

    let js_extractor = match file.language {
        Language::JavaScript | Language::TypeScript => bundle,
        Language::Python => None,
    };

    let batches = if let Some(extractor) = js_extractor {
        match extractor.extract(&file.abs, &file.rel) {
            Ok(mut batches) => {
                // The bundle emits content tables only; the files row is ours.
                push(
                    &mut batches,
                    "files",
                    serde_json::Value::Object(info.to_record()),
                );
                batches
            }
            Err(err) => {
                handle.record_error(&file.rel, "bundle", &err.to_string())?;
                return Ok(FileOutcome::Failed);
            }
        }
    } else {
        let ctx = match FileContext::parse(&file.rel, file.language, &content) {
            Ok(ctx) => ctx,
            Err(err) => {
                warn!(file = %file.rel, error = %err, "parse failure");
                handle.record_error(&file.rel, "parse", &err.to_string())?;
                return Ok(FileOutcome::Failed);
            }
        };
        extraction::extract_file(&info, &ctx)
    };

    let manifest = Manifest::for_batches(&batches);
    let receipt = handle.write_file(&file.rel, manifest.clone(), batches)?;
    let report = reconcile_fidelity(&manifest, &receipt, &file.rel, config.strict_fidelity)?;

    match report.status {
        FidelityStatus::Failed => Ok(FileOutcome::Failed),
        FidelityStatus::Warning => Ok(FileOutcome::Indexed {
            rows: receipt.total(),
            warnings: report.warnings.len(),
        }),
        FidelityStatus::Ok => Ok(FileOutcome::Indexed {
            rows: receipt.total(),
            warnings: 0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_fixture(files: &[(&str, &str)]) -> (IndexStats, IndexWriter, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        for (rel, content) in files {
            let path = dir.path().join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(path, content).expect("write");
        }
        let config = AuditConfig::for_root(dir.path());
        let cancel = CancellationToken::new();
        let (stats, writer) = index_repository(&config, &cancel).expect("index");
        (stats, writer, dir)
    }

    #[test]
    fn test_empty_repository_completes() {
        let (stats, writer, _dir) = index_fixture(&[]);
        assert_eq!(stats.files_indexed, 0);
        assert_eq!(stats.files_failed, 0);
        assert_eq!(writer.count_rows("files").expect("count"), 0);
        assert_eq!(writer.count_rows("symbols").expect("count"), 0);
    }

    #[test]
    fn test_syntax_error_file_recorded_and_run_continues() {
        let (stats, writer, _dir) = index_fixture(&[
            ("good.py", "def ok():\n    return 1\n"),
            ("bad.py", "def broken(:\n    pass\n"),
        ]);
        assert_eq!(stats.files_indexed, 1);
        assert_eq!(stats.files_failed, 1);
        assert_eq!(writer.count_rows("extraction_errors").expect("count"), 1);
        // No content rows for the broken file.
        let bad_rows: i64 = writer
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM symbols WHERE path = 'bad.py'",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(bad_rows, 0);
    }

    #[test]
    fn test_indexed_model_has_anchors() {
        let (_stats, writer, _dir) = index_fixture(&[(
            "app/service.py",
            "from app.db import run\n\ndef search(q):\n    sql = f\"SELECT * FROM users WHERE name = '{q}'\"\n    return run(sql)\n",
        )]);
        // Every content row's file anchor resolves to a files row.
        let dangling: i64 = writer
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM symbols s
                 WHERE NOT EXISTS (SELECT 1 FROM files f WHERE f.path = s.path)",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(dangling, 0);
        assert!(writer.count_rows("sql_queries").expect("count") >= 1);
        assert!(writer.count_rows("function_call_args").expect("count") >= 1);
        writer.integrity_audit().expect("no backslashes");
    }

    #[test]
    fn test_cancellation_leaves_sentinel() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.py"), "x = 1\n").expect("write");
        let config = AuditConfig::for_root(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = index_repository(&config, &cancel).unwrap_err();
        assert!(matches!(err, AuditError::Cancelled));
    }
}
