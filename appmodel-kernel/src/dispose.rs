//! Undo handles for registrations.
//!
//! Every registration returns a [`Disposer`]. Disposing is idempotent: the
//! callback runs at most once no matter how many clones of the handle call
//! [`Disposer::dispose`]. Failures (errors or panics) are reported to the
//! caller but never stop sibling disposers in a composite or a stack.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

type DisposeFn = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

struct Inner {
    label: String,
    callback: Mutex<Option<DisposeFn>>,
}

/// A shareable, run-once undo callback.
#[derive(Clone)]
pub struct Disposer {
    inner: Arc<Inner>,
}

impl Disposer {
    pub fn new<F>(label: impl Into<String>, callback: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                callback: Mutex::new(Some(Box::new(callback))),
            }),
        }
    }

    /// A disposer with nothing to undo.
    pub fn noop(label: impl Into<String>) -> Self {
        Self::new(label, || Ok(()))
    }

    /// Combine `parts` into one disposer that undoes them in reverse order.
    ///
    /// Every part runs even if an earlier one fails; the failures are joined
    /// into the returned error.
    pub fn all(label: impl Into<String>, parts: Vec<Disposer>) -> Self {
        let label = label.into();
        let outer = label.clone();
        Self::new(label, move || {
            let failures: Vec<String> = parts
                .iter()
                .rev()
                .filter_map(|part| {
                    part.dispose().err().map(|e| format!("{}: {:#}", part.label(), e))
                })
                .collect();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "{} of {} disposers in {:?} failed: {}",
                    failures.len(),
                    parts.len(),
                    outer,
                    failures.join("; ")
                ))
            }
        })
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.callback.lock().is_none()
    }

    /// Run the undo callback if it has not run yet.
    ///
    /// A panicking callback is caught and reported as an error.
    pub fn dispose(&self) -> anyhow::Result<()> {
        let Some(callback) = self.inner.callback.lock().take() else {
            return Ok(());
        };
        match catch_unwind(AssertUnwindSafe(callback)) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "disposer {:?} panicked: {}",
                self.label(),
                panic_message(payload.as_ref())
            )),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("label", &self.inner.label)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// LIFO stack of disposers torn down together.
///
/// Entries already disposed through another handle are dropped on the next
/// push and never counted, so register/undo cycles do not grow the stack.
#[derive(Debug, Default)]
pub struct DisposerStack {
    entries: Mutex<Vec<Disposer>>,
}

impl DisposerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, disposer: Disposer) {
        let mut entries = self.entries.lock();
        entries.retain(|d| !d.is_disposed());
        entries.push(disposer);
    }

    /// Number of disposers still pending.
    pub fn len(&self) -> usize {
        self.entries.lock().iter().filter(|d| !d.is_disposed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Labels of pending disposers in registration order.
    pub fn labels(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|d| !d.is_disposed())
            .map(|d| d.label().to_string())
            .collect()
    }

    /// Pop and run every disposer, newest first.
    ///
    /// Failures are logged and skipped. Returns how many failed.
    pub fn dispose_all(&self) -> usize {
        let mut failed = 0;
        // Pop one at a time without holding the lock, so a disposer may push
        // or inspect the stack itself.
        loop {
            let Some(disposer) = self.entries.lock().pop() else {
                break;
            };
            if let Err(e) = disposer.dispose() {
                failed += 1;
                tracing::warn!(label = disposer.label(), "disposer failed: {:#}", e);
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispose_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let d = Disposer::new("once", move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let clone = d.clone();
        d.dispose().unwrap();
        clone.dispose().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(d.is_disposed());
    }

    #[test]
    fn test_panicking_disposer_reports_error() {
        let d = Disposer::new("boom", || panic!("kaboom"));
        let err = d.dispose().unwrap_err();
        assert!(err.to_string().contains("kaboom"));
    }

    #[test]
    fn test_all_runs_in_reverse_and_isolates_failures() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mk = |name: &'static str, fail: bool| {
            let order = Arc::clone(&order);
            Disposer::new(name, move || {
                order.lock().push(name);
                if fail {
                    Err(anyhow::anyhow!("{} failed", name))
                } else {
                    Ok(())
                }
            })
        };
        let all = Disposer::all("batch", vec![mk("a", false), mk("b", true), mk("c", false)]);
        let err = all.dispose().unwrap_err();
        assert!(err.to_string().contains("1 of 3"));
        assert_eq!(*order.lock(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_stack_is_lifo_and_best_effort() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let stack = DisposerStack::new();
        for (name, fail) in [("first", false), ("second", true), ("third", false)] {
            let order = Arc::clone(&order);
            stack.push(Disposer::new(name, move || {
                order.lock().push(name);
                if fail {
                    Err(anyhow::anyhow!("nope"))
                } else {
                    Ok(())
                }
            }));
        }
        assert_eq!(stack.dispose_all(), 1);
        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_disposed_entries_do_not_accumulate() {
        let stack = DisposerStack::new();
        for i in 0..1_000 {
            let d = Disposer::noop(format!("cycle {}", i));
            stack.push(d.clone());
            d.dispose().unwrap();
        }
        assert_eq!(stack.len(), 0);
        assert!(stack.entries.lock().len() <= 1);

        stack.push(Disposer::noop("live"));
        assert_eq!(stack.labels(), vec!["live".to_string()]);
        assert_eq!(stack.entries.lock().len(), 1);
    }
}
