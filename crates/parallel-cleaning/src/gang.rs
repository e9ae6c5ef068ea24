//! A minimal worker gang for running cleaning tasks.
//!
//! Collectors normally bring their own worker pool and just call
//! [`GangTask::work`] once per worker. `WorkGang` is for everyone else: it
//! spawns one scoped thread per worker id, runs the task, and joins.

use std::any::Any;
use std::panic;

use crate::config::CleaningConfig;

/// A task that a gang of workers runs in parallel.
///
/// `work` is called once for each worker id in `[0, N)`, concurrently.
pub trait GangTask: Sync {
    /// Human-readable task name, used for thread names and logging.
    fn name(&self) -> &'static str;

    /// Do this worker's share of the task.
    fn work(&self, worker_id: u32);
}

/// Runs [`GangTask`]s on freshly spawned scoped threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkGang {
    name: &'static str,
    active_workers: u32,
}

impl WorkGang {
    /// Create a gang of `active_workers` workers (at least 1).
    #[must_use]
    pub fn new(name: &'static str, active_workers: u32) -> Self {
        Self {
            name,
            active_workers: active_workers.max(1),
        }
    }

    /// Create a gang sized by `config`.
    #[must_use]
    pub fn with_config(name: &'static str, config: &CleaningConfig) -> Self {
        Self::new(name, config.effective_workers())
    }

    /// Gang name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of workers `run_task` uses.
    #[must_use]
    pub const fn active_workers(&self) -> u32 {
        self.active_workers
    }

    /// Run `task` on every worker and wait for all of them.
    ///
    /// If a thread can't be spawned, its worker id runs on the calling thread
    /// instead. No cleaning phase waits on another worker, so the pass still
    /// completes.
    ///
    /// # Panics
    ///
    /// If any worker panics, the panic is resumed on the calling thread after
    /// every worker has been joined.
    pub fn run_task<T: GangTask + ?Sized>(&self, task: &T) {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!(
            "gang_task",
            gang = self.name,
            task = task.name(),
            workers = self.active_workers
        )
        .entered();

        let result = crossbeam::scope(|scope| {
            let mut inline = Vec::new();

            for worker_id in 0..self.active_workers {
                let spawned = scope
                    .builder()
                    .name(format!("{}#{worker_id}", self.name))
                    .spawn(move |_| task.work(worker_id));

                if let Err(_err) = spawned {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(worker_id, error = %_err, "spawn failed, running worker inline");
                    inline.push(worker_id);
                }
            }

            for worker_id in inline {
                task.work(worker_id);
            }
        });

        if let Err(payload) = result {
            panic::resume_unwind(first_panic(payload));
        }
    }
}

/// Pull the first worker's payload out of what `crossbeam::scope` reports,
/// so the caller sees the original panic message.
fn first_panic(payload: Box<dyn Any + Send>) -> Box<dyn Any + Send> {
    match payload.downcast::<Vec<Box<dyn Any + Send>>>() {
        Ok(mut panics) if !panics.is_empty() => panics.swap_remove(0),
        Ok(panics) => panics as Box<dyn Any + Send>,
        Err(payload) => payload,
    }
}
