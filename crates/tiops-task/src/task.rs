//! The task capability and its composition forms.

use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{Result, TaskError};
use crate::event::TaskEvent;

/// A unit of work against the cluster.
pub trait Task: Send + Sync {
    /// Performs the work.
    fn execute(&self, ctx: &Context) -> Result<()>;

    /// Best-effort undo. Tasks that cannot undo themselves return the
    /// [`TaskError::UnsupportedRollback`] sentinel.
    fn rollback(&self, _ctx: &Context) -> Result<()> {
        Err(TaskError::UnsupportedRollback)
    }

    /// Stable description used for logging and event labels.
    fn stringify(&self) -> String;
}

fn run_child(task: &dyn Task, ctx: &Context) -> Result<()> {
    ctx.event_bus().publish(&TaskEvent::Begin {
        task: task.stringify(),
    });
    debug!(task = %task.stringify(), "TaskBegin");

    let result = task.execute(ctx);

    ctx.event_bus().publish(&TaskEvent::Finish {
        task: task.stringify(),
        error: result.as_ref().err().map(|e| e.to_string()),
    });
    debug!(task = %task.stringify(), ok = result.is_ok(), "TaskFinish");
    result
}

fn rollback_child(task: &dyn Task, ctx: &Context) {
    match task.rollback(ctx) {
        Ok(()) => debug!(task = %task.stringify(), "Rolled back"),
        Err(e) if e.is_unsupported_rollback() => {
            debug!(task = %task.stringify(), "Rollback unsupported")
        }
        Err(e) => warn!(task = %task.stringify(), error = %e, "Rollback failed"),
    }
}

/// Runs children in declared order.
///
/// On the first failure the already-succeeded children are rolled back
/// in reverse order, then the failure surfaces wrapped with the
/// child's string form.
pub struct Serial {
    children: Vec<Box<dyn Task>>,
}

impl Serial {
    /// Creates a serial composition of `children`.
    pub fn new(children: Vec<Box<dyn Task>>) -> Self {
        Self { children }
    }
}

impl Task for Serial {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let mut done = 0;
        for (i, child) in self.children.iter().enumerate() {
            if let Err(e) = run_child(child.as_ref(), ctx) {
                for completed in self.children[..done].iter().rev() {
                    rollback_child(completed.as_ref(), ctx);
                }
                return Err(TaskError::child(self.children[i].stringify(), e));
            }
            done = i + 1;
        }
        Ok(())
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        for child in self.children.iter().rev() {
            rollback_child(child.as_ref(), ctx);
        }
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "Serial({})",
            self.children
                .iter()
                .map(|c| c.stringify())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Runs children concurrently, one worker thread per child.
///
/// There is no cancellation: a failing child lets its siblings run to
/// completion. Afterwards every successful child is rolled back and
/// the failures surface, aggregated when there is more than one.
pub struct Parallel {
    children: Vec<Box<dyn Task>>,
}

impl Parallel {
    /// Creates a parallel composition of `children`.
    pub fn new(children: Vec<Box<dyn Task>>) -> Self {
        Self { children }
    }

    /// Executes all children and returns each child's outcome in
    /// declaration order.
    fn run_all(&self, ctx: &Context) -> Vec<Result<()>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .children
                .iter()
                .map(|child| scope.spawn(|| run_child(child.as_ref(), ctx)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(_) => Err(TaskError::child(
                        "parallel worker".to_string(),
                        TaskError::Io(std::io::Error::other("worker panicked")),
                    )),
                })
                .collect()
        })
    }
}

impl Task for Parallel {
    fn execute(&self, ctx: &Context) -> Result<()> {
        let results = self.run_all(ctx);

        let mut failures = Vec::new();
        let mut succeeded = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(()) => succeeded.push(i),
                Err(e) => failures.push(TaskError::child(self.children[i].stringify(), e)),
            }
        }
        if failures.is_empty() {
            return Ok(());
        }

        // Undo whatever succeeded; failed children left no completed
        // work to undo.
        for i in succeeded {
            rollback_child(self.children[i].as_ref(), ctx);
        }

        if failures.len() == 1 {
            Err(failures.swap_remove(0))
        } else {
            Err(TaskError::Aggregate(failures))
        }
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        for child in &self.children {
            rollback_child(child.as_ref(), ctx);
        }
        Ok(())
    }

    fn stringify(&self) -> String {
        format!(
            "Parallel({})",
            self.children
                .iter()
                .map(|c| c.stringify())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

/// Wraps a task to emit progress events under a stable label.
pub struct StepDisplay {
    inner: Box<dyn Task>,
    label: String,
}

impl StepDisplay {
    /// Wraps `inner` with the given display label.
    pub fn new(inner: Box<dyn Task>, label: impl Into<String>) -> Self {
        Self {
            inner,
            label: label.into(),
        }
    }
}

impl Task for StepDisplay {
    fn execute(&self, ctx: &Context) -> Result<()> {
        ctx.event_bus().publish(&TaskEvent::Progress {
            task: self.inner.stringify(),
            progress: self.label.clone(),
        });
        let result = self.inner.execute(ctx);
        ctx.event_bus().publish(&TaskEvent::Progress {
            task: self.inner.stringify(),
            progress: match &result {
                Ok(()) => format!("{} - Done", self.label),
                Err(_) => format!("{} - Error", self.label),
            },
        });
        result
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        self.inner.rollback(ctx)
    }

    fn stringify(&self) -> String {
        self.label.clone()
    }
}

/// A [`Parallel`] whose children's progress aggregates under one label.
pub struct ParallelStepDisplay {
    inner: Parallel,
    label: String,
}

impl ParallelStepDisplay {
    /// Creates the aggregated display over `children`.
    pub fn new(label: impl Into<String>, children: Vec<Box<dyn Task>>) -> Self {
        Self {
            inner: Parallel::new(children),
            label: label.into(),
        }
    }
}

impl Task for ParallelStepDisplay {
    fn execute(&self, ctx: &Context) -> Result<()> {
        ctx.event_bus().publish(&TaskEvent::Progress {
            task: self.label.clone(),
            progress: self.label.clone(),
        });
        let result = self.inner.execute(ctx);
        ctx.event_bus().publish(&TaskEvent::Progress {
            task: self.label.clone(),
            progress: match &result {
                Ok(()) => format!("{} - Done", self.label),
                Err(_) => format!("{} - Error", self.label),
            },
        });
        result
    }

    fn rollback(&self, ctx: &Context) -> Result<()> {
        self.inner.rollback(ctx)
    }

    fn stringify(&self) -> String {
        self.label.clone()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Records execute/rollback calls for composition-law tests.
    pub struct Probe {
        pub name: &'static str,
        pub fail: bool,
        pub executed: Arc<AtomicUsize>,
        pub rolled_back: Arc<AtomicUsize>,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl Probe {
        pub fn new(
            name: &'static str,
            fail: bool,
            log: Arc<Mutex<Vec<String>>>,
        ) -> (Box<dyn Task>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let executed = Arc::new(AtomicUsize::new(0));
            let rolled_back = Arc::new(AtomicUsize::new(0));
            let probe = Probe {
                name,
                fail,
                executed: Arc::clone(&executed),
                rolled_back: Arc::clone(&rolled_back),
                log,
            };
            (Box::new(probe), executed, rolled_back)
        }
    }

    impl Task for Probe {
        fn execute(&self, _ctx: &Context) -> Result<()> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("execute {}", self.name));
            if self.fail {
                Err(TaskError::NoExecutor("probe".to_string()))
            } else {
                Ok(())
            }
        }

        fn rollback(&self, _ctx: &Context) -> Result<()> {
            self.rolled_back.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("rollback {}", self.name));
            Ok(())
        }

        fn stringify(&self) -> String {
            format!("Probe: {}", self.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Probe;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_serial_runs_in_order() {
        let log = log();
        let (a, a_exec, _) = Probe::new("a", false, Arc::clone(&log));
        let (b, b_exec, _) = Probe::new("b", false, Arc::clone(&log));

        let serial = Serial::new(vec![a, b]);
        serial.execute(&Context::new()).unwrap();

        assert_eq!(a_exec.load(Ordering::SeqCst), 1);
        assert_eq!(b_exec.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock().unwrap(), vec!["execute a", "execute b"]);
    }

    /// If the first task fails, the second never starts and nothing is
    /// rolled back (the failed task did not succeed).
    #[test]
    fn test_serial_first_failure_skips_rest() {
        let log = log();
        let (a, _, a_rb) = Probe::new("a", true, Arc::clone(&log));
        let (b, b_exec, b_rb) = Probe::new("b", false, Arc::clone(&log));

        let serial = Serial::new(vec![a, b]);
        serial.execute(&Context::new()).unwrap_err();

        assert_eq!(b_exec.load(Ordering::SeqCst), 0);
        assert_eq!(a_rb.load(Ordering::SeqCst), 0);
        assert_eq!(b_rb.load(Ordering::SeqCst), 0);
    }

    /// If the second task fails, the first is rolled back exactly once.
    #[test]
    fn test_serial_second_failure_rolls_back_first() {
        let log = log();
        let (a, _, a_rb) = Probe::new("a", false, Arc::clone(&log));
        let (b, _, b_rb) = Probe::new("b", true, Arc::clone(&log));

        let serial = Serial::new(vec![a, b]);
        let err = serial.execute(&Context::new()).unwrap_err();

        assert_eq!(a_rb.load(Ordering::SeqCst), 1);
        assert_eq!(b_rb.load(Ordering::SeqCst), 0);
        assert!(err.to_string().starts_with("Probe: b:"), "{err}");
    }

    /// A failing parallel child lets its sibling finish, then the
    /// successful sibling is rolled back exactly once.
    #[test]
    fn test_parallel_failure_rolls_back_survivors() {
        let log = log();
        let (a, a_exec, a_rb) = Probe::new("a", true, Arc::clone(&log));
        let (b, b_exec, b_rb) = Probe::new("b", false, Arc::clone(&log));

        let parallel = Parallel::new(vec![a, b]);
        parallel.execute(&Context::new()).unwrap_err();

        assert_eq!(a_exec.load(Ordering::SeqCst), 1);
        assert_eq!(b_exec.load(Ordering::SeqCst), 1);
        assert_eq!(a_rb.load(Ordering::SeqCst), 0);
        assert_eq!(b_rb.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_aggregates_multiple_failures() {
        let log = log();
        let (a, _, _) = Probe::new("a", true, Arc::clone(&log));
        let (b, _, _) = Probe::new("b", true, Arc::clone(&log));

        let parallel = Parallel::new(vec![a, b]);
        let err = parallel.execute(&Context::new()).unwrap_err();
        assert!(matches!(err, TaskError::Aggregate(ref v) if v.len() == 2), "{err}");
    }

    #[test]
    fn test_step_display_emits_progress() {
        let log = log();
        let (a, _, _) = Probe::new("a", false, Arc::clone(&log));
        let step = StepDisplay::new(a, "Copy files");

        let ctx = Context::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ctx.event_bus()
            .subscribe(crate::event::EventKind::TaskProgress, move |e| {
                if let TaskEvent::Progress { progress, .. } = e {
                    sink.lock().unwrap().push(progress.clone());
                }
            });

        step.execute(&ctx).unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec!["Copy files", "Copy files - Done"]);
    }
}
