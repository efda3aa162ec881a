//! Progress reporting: the ordered outward sink for run events.
//!
//! Both the agent loop (stream events) and the workflow engine (step
//! progress) push their events through a [`ProgressReporter`]. Events are
//! delivered one at a time, in the order `report` is awaited.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// The consumer of a reporter went away (e.g. the HTTP client disconnected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("progress consumer closed")]
pub struct ReporterClosed;

#[async_trait]
pub trait ProgressReporter<E: Send + 'static>: Send + Sync {
    async fn report(&self, event: E) -> Result<(), ReporterClosed>;
}

#[async_trait]
impl<E: Send + 'static> ProgressReporter<E> for mpsc::Sender<E> {
    async fn report(&self, event: E) -> Result<(), ReporterClosed> {
        self.send(event).await.map_err(|_| ReporterClosed)
    }
}

/// Invokes a closure synchronously for every event.
pub struct CallbackReporter<F>(F);

impl<F> CallbackReporter<F> {
    pub fn new(callback: F) -> Self {
        Self(callback)
    }
}

#[async_trait]
impl<E, F> ProgressReporter<E> for CallbackReporter<F>
where
    E: Send + 'static,
    F: Fn(E) + Send + Sync,
{
    async fn report(&self, event: E) -> Result<(), ReporterClosed> {
        (self.0)(event);
        Ok(())
    }
}

/// Buffers every event in memory. Used by non-streaming callers.
pub struct CollectingReporter<E> {
    events: Mutex<Vec<E>>,
}

impl<E> CollectingReporter<E> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Take all events collected so far.
    pub fn take(&self) -> Vec<E> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl<E> Default for CollectingReporter<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Send + 'static> ProgressReporter<E> for CollectingReporter<E> {
    async fn report(&self, event: E) -> Result<(), ReporterClosed> {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn channel_reporter_preserves_order() {
        let (tx, mut rx) = mpsc::channel::<u32>(8);
        for i in 0..3 {
            tx.report(i).await.unwrap();
        }
        drop(tx);
        let mut seen = vec![];
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn channel_reporter_detects_closed_consumer() {
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(rx);
        assert_eq!(tx.report(1).await, Err(ReporterClosed));
    }

    #[tokio::test]
    async fn callback_reporter_invokes_closure() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter = CallbackReporter::new(move |e: &'static str| sink.lock().unwrap().push(e));
        reporter.report("running").await.unwrap();
        reporter.report("done").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["running", "done"]);
    }

    #[tokio::test]
    async fn collecting_reporter_take_drains() {
        let reporter = CollectingReporter::new();
        reporter.report(1u8).await.unwrap();
        assert_eq!(reporter.take(), vec![1]);
        assert!(reporter.take().is_empty());
    }
}
