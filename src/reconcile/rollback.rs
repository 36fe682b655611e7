//! Append-only log of applied mutations, undone in reverse order

use std::future::Future;

/// Record of the steps a composite operation has applied so far
#[derive(Debug, Clone)]
pub struct RollbackLog<T> {
    applied: Vec<T>,
}

impl<T> Default for RollbackLog<T> {
    fn default() -> Self {
        Self {
            applied: Vec::new(),
        }
    }
}

/// Outcome of walking a rollback log
#[derive(Debug, Default)]
pub struct Unwound {
    pub undone: usize,
    /// One message per step that could not be undone
    pub failures: Vec<String>,
}

impl Unwound {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T> RollbackLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: T) {
        self.applied.push(step);
    }

    /// Drop the most recent step, for a mutation the server rejected
    pub fn discard_last(&mut self) -> Option<T> {
        self.applied.pop()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Undo every recorded step, most recent first
    ///
    /// A failing step does not stop the walk; all failures are collected.
    pub async fn unwind<F, Fut, E>(self, mut undo: F) -> Unwound
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: std::fmt::Display,
    {
        let mut outcome = Unwound::default();
        for step in self.applied.into_iter().rev() {
            match undo(step).await {
                Ok(()) => outcome.undone += 1,
                Err(e) => outcome.failures.push(e.to_string()),
            }
        }
        outcome
    }
}
