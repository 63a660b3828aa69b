//! Bounded worker pool for per-document processing.
//!
//! Exactly `min(concurrency, jobs)` long-lived workers pull from one
//! bounded jobs channel; the channel is sized to the job count so the
//! producer never blocks. Workers drain on channel close. Errors flow back
//! over a buffered results channel of the same capacity; every document is
//! attempted regardless of earlier failures, and the caller observes
//! completion only after every worker has exited.

use std::sync::{Arc, RwLock};

use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::debug;

use core_model::Document;

/// Aggregate failure from one concurrent pass: how many documents failed
/// and the first cause observed.
#[derive(Debug, Error)]
#[error("{failed} document(s) failed; first error: {first}")]
pub struct ProcessError {
    pub failed: usize,
    #[source]
    pub first: anyhow::Error,
}

pub(crate) fn process_slice<F>(
    handles: &[Arc<RwLock<Document>>],
    concurrency: usize,
    f: F,
) -> Result<(), ProcessError>
where
    F: Fn(&mut Document) -> anyhow::Result<()> + Sync,
{
    if handles.is_empty() {
        return Ok(());
    }
    let workers = concurrency.max(1).min(handles.len());
    let (jobs_tx, jobs_rx) = bounded::<Arc<RwLock<Document>>>(handles.len());
    let (errs_tx, errs_rx) = bounded::<anyhow::Error>(handles.len());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let jobs_rx = jobs_rx.clone();
            let errs_tx = errs_tx.clone();
            let f = &f;
            scope.spawn(move || {
                // Drains until the channel closes; suspends only on the
                // channel reads, the user workload, and the error send.
                for handle in jobs_rx.iter() {
                    let mut doc = handle.write().expect("document lock poisoned");
                    if let Err(e) = f(&mut doc) {
                        drop(doc);
                        let _ = errs_tx.send(e);
                    }
                }
            });
        }
        drop(errs_tx);
        for handle in handles {
            // Capacity equals the job count, so this never blocks.
            jobs_tx
                .send(Arc::clone(handle))
                .expect("jobs channel closed early");
        }
        drop(jobs_tx);
        // Scope exit joins every worker before we read the error channel.
    });

    let mut errors: Vec<anyhow::Error> = errs_rx.try_iter().collect();
    debug!(
        target: "pipeline.pool",
        jobs = handles.len(),
        workers,
        failed = errors.len(),
        "concurrent_pass_complete"
    );
    if errors.is_empty() {
        Ok(())
    } else {
        let failed = errors.len();
        Err(ProcessError {
            failed,
            first: errors.remove(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handles(n: usize) -> Vec<Arc<RwLock<Document>>> {
        (0..n)
            .map(|i| {
                Arc::new(RwLock::new(Document {
                    path: format!("p{i}.md"),
                    ..Default::default()
                }))
            })
            .collect()
    }

    #[test]
    fn every_document_is_visited_once() {
        let docs = handles(50);
        process_slice(&docs, 4, |doc| {
            doc.set_extra("visited", serde_json::json!(true));
            Ok(())
        })
        .unwrap();
        for doc in &docs {
            assert!(doc.read().unwrap().extra.contains_key("visited"));
        }
    }

    #[test]
    fn worker_count_is_bounded_by_concurrency() {
        let docs = handles(64);
        let live = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        process_slice(&docs, 3, |_doc| {
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            live.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(
            peak.load(Ordering::SeqCst) <= 3,
            "peak concurrency {} exceeded pool size",
            peak.load(Ordering::SeqCst)
        );
    }

    #[test]
    fn errors_aggregate_and_all_documents_still_run() {
        let docs = handles(10);
        let seen = std::sync::Mutex::new(HashSet::new());
        let err = process_slice(&docs, 2, |doc| {
            seen.lock().unwrap().insert(doc.path.clone());
            if doc.path.ends_with("3.md") || doc.path.ends_with("7.md") {
                anyhow::bail!("boom in {}", doc.path);
            }
            Ok(())
        })
        .unwrap_err();
        assert_eq!(err.failed, 2);
        assert!(err.first.to_string().starts_with("boom in"));
        assert_eq!(seen.lock().unwrap().len(), 10, "every document attempted");
    }

    #[test]
    fn empty_slice_is_a_noop() {
        assert!(process_slice(&[], 8, |_| Ok(())).is_ok());
    }

    #[test]
    fn single_worker_preserves_serial_semantics() {
        let docs = handles(5);
        let order = std::sync::Mutex::new(Vec::new());
        process_slice(&docs, 1, |doc| {
            order.lock().unwrap().push(doc.path.clone());
            Ok(())
        })
        .unwrap();
        let order = order.into_inner().unwrap();
        assert_eq!(order.len(), 5);
        // One worker drains the channel in submission order.
        assert_eq!(order[0], "p0.md");
        assert_eq!(order[4], "p4.md");
    }
}
