//! Worker pool for fanning candidate scoring out across threads.
//!
//! Workers pull candidate indices from a shared queue, so the assignment of
//! candidates to threads is arbitrary. Results are returned in index order,
//! which keeps every reduction over them independent of the worker count.

use crate::error::RidgeprintError;
use crossbeam::channel::unbounded;
use std::num::NonZeroUsize;
use tracing::{debug, error};

#[derive(Debug, Clone, Copy)]
pub struct ScoringPool {
    num_workers: NonZeroUsize,
}

impl ScoringPool {
    /// # Errors
    /// Returns `Misconfiguration` if `num_workers` is 0.
    pub fn new(num_workers: usize) -> Result<Self, RidgeprintError> {
        let num_workers = NonZeroUsize::new(num_workers).ok_or(RidgeprintError::Misconfiguration(
            "Worker count must be greater than 0".to_string(),
        ))?;
        Ok(Self { num_workers })
    }

    pub fn num_workers(&self) -> NonZeroUsize {
        self.num_workers
    }

    /// Evaluates `task` for every index in `0..len`.
    ///
    /// Indices a worker never reported (failed spawn, panicking worker) are
    /// evaluated again on the calling thread.
    pub fn run<T, F>(&self, len: usize, task: F) -> Vec<Option<T>>
    where
        T: Send,
        F: Fn(usize) -> Option<T> + Sync,
    {
        let workers = self.num_workers.get().min(len);
        if workers <= 1 {
            return (0..len).map(&task).collect();
        }

        let (task_tx, task_rx) = unbounded::<usize>();
        for index in 0..len {
            // The receiver is alive until the end of this function
            let _ = task_tx.send(index);
        }
        drop(task_tx);

        let (result_tx, result_rx) = unbounded::<(usize, Option<T>)>();
        let task = &task;
        let scope_result = crossbeam::thread::scope(|scope| {
            for worker_id in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let spawned = scope.builder().name(format!("score-worker-{worker_id}")).spawn(move |_| {
                    let mut handled = 0usize;
                    for index in task_rx.iter() {
                        if result_tx.send((index, task(index))).is_err() {
                            break;
                        }
                        handled += 1;
                    }
                    debug!("Scoring worker {worker_id} handled {handled} candidate(s)");
                });
                if let Err(e) = spawned {
                    error!("Failed to spawn scoring worker {worker_id}: {e}");
                }
            }
        });
        drop(result_tx);

        if scope_result.is_err() {
            error!("A scoring worker panicked; unfinished candidates are scored sequentially");
        }

        let mut slots: Vec<Option<Option<T>>> = (0..len).map(|_| None).collect();
        for (index, result) in result_rx.try_iter() {
            slots[index] = Some(result);
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| match slot {
                Some(result) => result,
                None => task(index),
            })
            .collect()
    }
}
