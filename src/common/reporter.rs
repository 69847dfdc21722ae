use std::sync::{Arc, Mutex, MutexGuard};

/// The sink every check and the dispatcher report their findings to.
///
/// Two channels exist:
/// - [fail](TestReporter::fail) records a failure and lets the caller continue, so that
///   several independent mismatches of one request can all be reported.
/// - [fail_now](TestReporter::fail_now) records a failure and aborts the current test (or,
///   when called from inside a handler, the current request) by panicking.
///
/// Implementations must be usable from the mock server thread, hence `Send + Sync`.
pub trait TestReporter: Send + Sync {
    /// Records a failure and continues.
    fn fail(&self, message: String);

    /// Records a failure and aborts by panicking.
    fn fail_now(&self, message: String) -> !;

    /// Number of failures recorded so far.
    fn failure_count(&self) -> usize;

    /// Returns `true` if at least one failure has been recorded.
    fn has_failed(&self) -> bool {
        self.failure_count() > 0
    }
}

/// The default [TestReporter] implementation.
///
/// A `TestContext` collects failures for one test (or sub-test). Clones share the same
/// failure list, so a context can be handed to a [Mocker](crate::Mocker) and inspected
/// afterwards. When the last clone is dropped while the thread is not already panicking and
/// failures were recorded, the drop panics with all of them, which fails the enclosing
/// `#[test]`.
///
/// **Example**:
/// ```
/// use chatmock::{TestContext, TestReporter};
///
/// let ctx = TestContext::new("example");
/// assert!(!ctx.has_failed());
/// ctx.assert_passed();
/// ```
#[derive(Clone)]
pub struct TestContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    name: String,
    failures: Mutex<Vec<String>>,
}

impl TestContext {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                name: name.into(),
                failures: Mutex::new(Vec::new()),
            }),
        }
    }

    /// The name this context was created with.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A snapshot of all failures recorded so far.
    pub fn failures(&self) -> Vec<String> {
        self.inner.lock().clone()
    }

    /// Removes and returns all recorded failures. Useful for tests that expect a failure to
    /// happen and want to keep the context from failing on drop.
    pub fn take_failures(&self) -> Vec<String> {
        std::mem::take(&mut *self.inner.lock())
    }

    /// Panics with a report of every recorded failure, if any.
    pub fn assert_passed(&self) {
        let failures = self.take_failures();
        if !failures.is_empty() {
            panic!("{}", failure_report(&self.inner.name, &failures));
        }
    }
}

impl ContextInner {
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.failures.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TestReporter for TestContext {
    fn fail(&self, message: String) {
        tracing::error!("[{}] {}", self.inner.name, message);
        self.inner.lock().push(message);
    }

    fn fail_now(&self, message: String) -> ! {
        tracing::error!("[{}] {}", self.inner.name, message);
        self.inner.lock().push(message.clone());
        panic!("{}", message)
    }

    fn failure_count(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        let failures = std::mem::take(&mut *self.lock());
        if !failures.is_empty() {
            panic!("{}", failure_report(&self.name, &failures));
        }
    }
}

fn failure_report(name: &str, failures: &[String]) -> String {
    let mut output = format!("test '{}' failed:\n", name);
    for failure in failures {
        output.push_str("\n");
        output.push_str(failure);
        output.push_str("\n");
    }
    output
}
