//! Bounded worker admission with pause/abort control.
//!
//! The base design calls for three single-slot rendezvous channels
//! (`abort`, `pause`, `play`). This implementation uses the alternative the
//! design notes call out explicitly: one `watch<ControlState>` channel that
//! `pause()`/`play()`/`abort()` write to, with waiters parked on
//! `changed()` inside the admission `select!`. Same rendezvous semantics,
//! one primitive instead of three.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Running,
    Paused,
    Aborted,
}

/// Result of trying to admit one tile into the pool.
pub enum Admission {
    /// Permit acquired; caller may spawn the fetch. Dropping this releases
    /// the permit, including on early return / panic in the fetch task.
    Admitted(tokio::sync::OwnedSemaphorePermit),
    Aborted,
}

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    control_tx: watch::Sender<ControlState>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let (control_tx, _) = watch::channel(ControlState::Running);
        Self {
            semaphore: Arc::new(Semaphore::new(worker_count)),
            control_tx,
        }
    }

    pub fn abort(&self) {
        info!("task abort requested");
        let _ = self.control_tx.send(ControlState::Aborted);
    }

    pub fn pause(&self) {
        info!("task pause requested");
        let _ = self.control_tx.send_if_modified(|s| {
            if *s == ControlState::Running {
                *s = ControlState::Paused;
                true
            } else {
                false
            }
        });
    }

    pub fn play(&self) {
        info!("task resume requested");
        let _ = self.control_tx.send_if_modified(|s| {
            if *s == ControlState::Paused {
                *s = ControlState::Running;
                true
            } else {
                false
            }
        });
    }

    pub fn is_aborted(&self) -> bool {
        *self.control_tx.subscribe().borrow() == ControlState::Aborted
    }

    /// Waits for a permit, honoring pause (blocks admission until `play` or
    /// `abort`) and abort (returns `Aborted` immediately, even mid-pause).
    pub async fn admit(&self) -> Admission {
        let mut rx = self.control_tx.subscribe();

        loop {
            if *rx.borrow() == ControlState::Aborted {
                return Admission::Aborted;
            }
            if *rx.borrow() == ControlState::Paused {
                // Nested select: wait only for play or abort while paused.
                loop {
                    if rx.changed().await.is_err() {
                        return Admission::Aborted;
                    }
                    let state = *rx.borrow();
                    if state == ControlState::Aborted {
                        return Admission::Aborted;
                    }
                    if state == ControlState::Running {
                        break;
                    }
                }
            }

            let semaphore = self.semaphore.clone();
            tokio::select! {
                biased;
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Admission::Aborted;
                    }
                    // Re-check state at the top of the loop; a pause/abort
                    // may have landed concurrently with a free permit.
                    continue;
                }
                permit = semaphore.acquire_owned() => {
                    match permit {
                        Ok(permit) => return Admission::Admitted(permit),
                        Err(_) => return Admission::Aborted,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn admits_up_to_capacity() {
        let pool = Arc::new(WorkerPool::new(2));
        let mut permits = Vec::new();
        for _ in 0..2 {
            match pool.admit().await {
                Admission::Admitted(p) => permits.push(p),
                Admission::Aborted => panic!("unexpected abort"),
            }
        }
        assert_eq!(permits.len(), 2);
    }

    #[tokio::test]
    async fn abort_short_circuits_admission() {
        let pool = Arc::new(WorkerPool::new(1));
        pool.abort();
        match pool.admit().await {
            Admission::Aborted => {}
            Admission::Admitted(_) => panic!("expected abort"),
        }
    }

    #[tokio::test]
    async fn pause_blocks_until_play() {
        let pool = Arc::new(WorkerPool::new(1));
        pool.pause();

        let admitted = Arc::new(AtomicUsize::new(0));
        let admitted_clone = admitted.clone();
        let pool_clone = pool.clone();
        let handle = tokio::spawn(async move {
            match pool_clone.admit().await {
                Admission::Admitted(_permit) => {
                    admitted_clone.fetch_add(1, Ordering::SeqCst);
                }
                Admission::Aborted => {}
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 0);

        pool.play();
        handle.await.unwrap();
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
