use crate::{
    api::{mocker::Mocker, Error},
    common::{reporter::TestReporter, util::read_env_flag},
    server::HandlerRegistry,
};
use std::sync::Arc;

/// Environment variable deciding whether the server speaks HTTPS when the builder leaves it
/// open. Defaults to `true`.
pub const HTTPS_ENV: &str = "CHATMOCK_HTTPS";

/// Environment variable enabling the access log when the builder leaves it open. Defaults
/// to `false`.
pub const ACCESS_LOG_ENV: &str = "CHATMOCK_ACCESS_LOG";

/// Resolved settings a [Mocker] runs with. Forks reuse them.
#[derive(Clone, Debug)]
pub(crate) struct MockerConfig {
    pub https: bool,
    pub base_path: String,
    pub print_access_log: bool,
    pub port: Option<u16>,
}

/// Configures a [Mocker] before starting it.
///
/// Every option has an `*_option` variant taking an `Option`. `None` leaves the option
/// unset, which makes it fall back to its environment variable or default when the mocker
/// starts.
///
/// **Example**:
/// ```
/// use chatmock::{MockerBuilder, TestContext};
///
/// let ctx = TestContext::new("builder");
/// let mocker = MockerBuilder::new()
///     .https(false)
///     .base_path("/api/v9")
///     .start(ctx.clone());
///
/// assert!(mocker.base_url().starts_with("http://127.0.0.1:"));
/// assert!(mocker.url("/users/@me").ends_with("/api/v9/users/@me"));
/// ```
#[derive(Default, Debug)]
pub struct MockerBuilder {
    https: Option<bool>,
    base_path: Option<String>,
    print_access_log: Option<bool>,
    port: Option<u16>,
}

impl MockerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve HTTPS with a self-signed certificate (`true`) or plain HTTP (`false`).
    pub fn https(self, enabled: bool) -> Self {
        self.https_option(Some(enabled))
    }

    pub fn https_option(mut self, enabled: Option<bool>) -> Self {
        self.https = enabled;
        self
    }

    /// A prefix prepended to every path registered on the mocker, e.g. the API version
    /// segment the client under test adds to all of its requests.
    pub fn base_path<S: Into<String>>(self, base_path: S) -> Self {
        self.base_path_option(Some(base_path))
    }

    pub fn base_path_option<S: Into<String>>(mut self, base_path: Option<S>) -> Self {
        self.base_path = base_path.map(|p| p.into());
        self
    }

    /// Logs one line per served request at info level.
    pub fn print_access_log(self, enabled: bool) -> Self {
        self.print_access_log_option(Some(enabled))
    }

    pub fn print_access_log_option(mut self, enabled: Option<bool>) -> Self {
        self.print_access_log = enabled;
        self
    }

    /// Binds a fixed port instead of a random free one.
    pub fn port(self, port: u16) -> Self {
        self.port_option(Some(port))
    }

    pub fn port_option(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    /// Starts the mocker, reporting startup errors through `reporter`.
    pub fn start<R: TestReporter + 'static>(self, reporter: R) -> Mocker {
        let reporter: Arc<dyn TestReporter> = Arc::new(reporter);
        match Mocker::launch(self.build(), HandlerRegistry::new(), reporter.clone()) {
            Ok(mocker) => mocker,
            Err(err) => reporter.fail_now(format!("cannot start mock server: {}", err)),
        }
    }

    /// Starts the mocker, returning startup errors to the caller.
    pub fn try_start<R: TestReporter + 'static>(self, reporter: R) -> Result<Mocker, Error> {
        Mocker::launch(self.build(), HandlerRegistry::new(), Arc::new(reporter))
    }

    pub(crate) fn build(self) -> MockerConfig {
        let https = self.https.unwrap_or_else(|| read_env_flag(HTTPS_ENV, true));

        #[cfg(not(feature = "https"))]
        let https = {
            if https {
                tracing::warn!("HTTPS requested but the `https` feature is disabled, using HTTP");
            }
            false
        };

        MockerConfig {
            https,
            base_path: normalize_base_path(self.base_path.unwrap_or_default()),
            print_access_log: self
                .print_access_log
                .unwrap_or_else(|| read_env_flag(ACCESS_LOG_ENV, false)),
            port: self.port,
        }
    }
}

// Ensures a leading slash and no trailing slash, so that joining with a registered path
// (which starts with a slash) never doubles or drops one.
fn normalize_base_path(base_path: String) -> String {
    let trimmed = base_path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
