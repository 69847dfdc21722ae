use chatmock::{Mocker, MockerBuilder, TestReporter};
use std::sync::{Arc, Mutex};

/// A reporter that only records, so tests can assert on the failures a scenario produces.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    failures: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn assert_no_failures(&self) {
        let failures = self.failures();
        assert!(failures.is_empty(), "unexpected failures: {:#?}", failures);
    }
}

impl TestReporter for RecordingReporter {
    fn fail(&self, message: String) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    fn fail_now(&self, message: String) -> ! {
        self.fail(message.clone());
        panic!("{}", message)
    }

    fn failure_count(&self) -> usize {
        self.failures.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Starts a plain HTTP mocker reporting to a fresh [RecordingReporter].
pub fn http_mocker() -> (Mocker, RecordingReporter) {
    init_logging();
    let reporter = RecordingReporter::new();
    let mocker = MockerBuilder::new().https(false).start(reporter.clone());
    (mocker, reporter)
}
