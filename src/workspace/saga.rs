//! workspace::saga
//!
//! Compensation bookkeeping for multi-append workflows.
//!
//! Workspace workflows touch several event streams without a surrounding
//! transaction. The pattern: reversible steps first, each registering its
//! undo here; destructive steps only after everything reversible has
//! succeeded. On failure the saga runs the registered compensations in
//! reverse order; on success `commit` drops them.

use tracing::warn;

use crate::stream::StreamError;

type Compensation<'a> = Box<dyn FnOnce() -> Result<(), StreamError> + 'a>;

/// Reverse-order compensation stack for one workflow run.
#[derive(Default)]
pub struct Saga<'a> {
    compensations: Vec<Compensation<'a>>,
}

impl<'a> Saga<'a> {
    /// Start a workflow with no compensations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the undo for a step that just succeeded.
    pub fn on_failure<F>(&mut self, label: &'static str, compensation: F)
    where
        F: FnOnce() -> Result<(), StreamError> + 'a,
    {
        let labelled = move || {
            compensation().map_err(|err| {
                warn!(step = label, error = %err, "compensation failed");
                err
            })
        };
        self.compensations.push(Box::new(labelled));
    }

    /// The workflow succeeded; nothing to undo.
    pub fn commit(mut self) {
        self.compensations.clear();
    }

    /// The workflow failed; undo everything in reverse order.
    ///
    /// A failing compensation is logged and skipped so the remaining ones
    /// still run.
    pub fn abort(mut self) {
        while let Some(compensation) = self.compensations.pop() {
            let _ = compensation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn abort_runs_compensations_in_reverse_order() {
        let order = RefCell::new(Vec::new());
        let mut saga = Saga::new();
        saga.on_failure("first", || {
            order.borrow_mut().push(1);
            Ok(())
        });
        saga.on_failure("second", || {
            order.borrow_mut().push(2);
            Ok(())
        });
        saga.abort();
        assert_eq!(*order.borrow(), vec![2, 1]);
    }

    #[test]
    fn commit_drops_compensations() {
        let ran = RefCell::new(false);
        let mut saga = Saga::new();
        saga.on_failure("step", || {
            *ran.borrow_mut() = true;
            Ok(())
        });
        saga.commit();
        assert!(!*ran.borrow());
    }

    #[test]
    fn failing_compensation_does_not_stop_the_rest() {
        let ran = RefCell::new(false);
        let mut saga = Saga::new();
        saga.on_failure("first", || {
            *ran.borrow_mut() = true;
            Ok(())
        });
        saga.on_failure("second", || {
            Err(StreamError::DoesNotExist(
                crate::core::types::ContentStreamId::from_string("gone"),
            ))
        });
        saga.abort();
        assert!(*ran.borrow());
    }
}
