//! Bounded concurrent fan-out.
//!
//! Runs one task per item with at most `limit` in flight. Every task is
//! awaited and every failure collected, so a phase reports all of its errors
//! at once. An abort cancels outstanding tasks.

use super::abort::AbortSignal;
use crate::error::{MinitrinoError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Run `task` for each item, labelling failures with `phase`.
///
/// Output order follows completion, not input.
pub async fn fan_out<T, R, F, Fut>(
    phase: &str,
    items: Vec<T>,
    limit: usize,
    abort: &AbortSignal,
    task: F,
) -> Result<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();
    debug!(%phase, tasks = items.len(), limit, "Fanning out");

    for item in items {
        let semaphore = semaphore.clone();
        let fut = task(item);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(MinitrinoError::internal)?;
            fut.await
        });
    }

    let mut results = Vec::new();
    let mut errors = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = abort.aborted() => {
                warn!(%phase, "Abort requested, cancelling in-flight tasks");
                set.abort_all();
                while set.join_next().await.is_some() {}
                return Err(MinitrinoError::Aborted { phase: phase.to_string() });
            }
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok(Ok(value))) => results.push(value),
                Some(Ok(Err(e))) => errors.push(e),
                Some(Err(e)) => errors.push(MinitrinoError::internal(e)),
            },
        }
    }

    if errors.is_empty() {
        Ok(results)
    } else {
        Err(MinitrinoError::PhaseFailed { phase: phase.to_string(), errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::Phase;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_all_succeed() {
        let never = AbortSignal::never();
        let mut out =
            fan_out(Phase::WorkersProvisioning.as_str(), vec![1, 2, 3], 2, &never, |n| async move { Ok(n * 10) })
                .await
                .unwrap();
        out.sort();
        assert_eq!(out, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_collects_every_failure() {
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        let never = AbortSignal::never();
        let result = fan_out(Phase::WorkersRestarting.as_str(), vec![1, 2, 3, 4], 4, &never, move |n| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 0 {
                    let target = format!("w{}", n);
                    Err(MinitrinoError::StartFailed { target, reason: "boom".into() })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(completed.load(Ordering::SeqCst), 4);
        match result {
            Err(MinitrinoError::PhaseFailed { phase, errors }) => {
                assert_eq!(phase, "workers-restarting");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("expected phase failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_respects_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (f, p) = (in_flight.clone(), peak.clone());
        let never = AbortSignal::never();
        fan_out(Phase::WorkersProvisioning.as_str(), (0..8).collect(), 3, &never, move |_| {
            let (f, p) = (f.clone(), p.clone());
            async move {
                let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                f.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_abort_cancels() {
        let (handle, signal) = AbortSignal::pair();
        handle.abort();
        let result = fan_out(Phase::WorkersProvisioning.as_str(), vec![1], 1, &signal, |_| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(MinitrinoError::Aborted { .. })));
    }
}
