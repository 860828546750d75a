//! Progress notifications of an optimization run.
//!
//! # Example
//!
//! ```
//! use sculpt::optim::{EventKind, Observer};
//!
//! let observer = Observer::new(|event| {
//!     if event.kind == EventKind::IterationEnd {
//!         println!("iteration {}: {}", event.iteration, event.value);
//!     }
//! });
//! # let _ = observer;
//! ```

/// Point in the optimization lifecycle at which observers are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// After the initial model update, before the first iteration.
    Start,
    /// Before an iteration.
    IterationStart,
    /// After an iteration, including the one that ended the run.
    IterationEnd,
    /// After the last iteration.
    End,
}

/// A notification sent to observers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerEvent {
    /// What happened.
    pub kind: EventKind,
    /// Current iteration, starting at 1 (0 for `Start`).
    pub iteration: usize,
    /// Current energy value.
    pub value: f64,
}

/// A callback receiving optimizer events.
///
/// Observers are invoked synchronously and cannot influence the run.
pub struct Observer {
    callback: Box<dyn Fn(&OptimizerEvent) + Send + Sync>,
}

impl Observer {
    /// Create a new observer with the given callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&OptimizerEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    /// An observer that writes every iteration to the `log` facade.
    pub fn logging() -> Self {
        Self::new(|event| match event.kind {
            EventKind::Start => log::info!("start: value = {:.6e}", event.value),
            EventKind::IterationStart => {}
            EventKind::IterationEnd => {
                log::info!("iteration {:3}: value = {:.6e}", event.iteration, event.value)
            }
            EventKind::End => log::info!(
                "end after {} iteration(s): value = {:.6e}",
                event.iteration,
                event.value
            ),
        })
    }

    /// An observer that discards all events.
    pub fn none() -> Self {
        Self::new(|_| {})
    }

    /// Deliver an event.
    #[inline]
    pub fn notify(&self, event: &OptimizerEvent) {
        (self.callback)(event);
    }
}

impl Default for Observer {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_notify_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let observer = Observer::new(move |event| sink.lock().unwrap().push(event.iteration));

        for iteration in 1..=3 {
            observer.notify(&OptimizerEvent {
                kind: EventKind::IterationEnd,
                iteration,
                value: 0.0,
            });
        }
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_none_and_logging_accept_all_events() {
        for observer in [Observer::none(), Observer::logging()] {
            for kind in [
                EventKind::Start,
                EventKind::IterationStart,
                EventKind::IterationEnd,
                EventKind::End,
            ] {
                observer.notify(&OptimizerEvent {
                    kind,
                    iteration: 1,
                    value: 1.0,
                });
            }
        }
    }
}
