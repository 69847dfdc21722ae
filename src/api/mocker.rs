use crate::{
    api::{builder::MockerConfig, response, Error, MockerBuilder},
    common::{reporter::TestReporter, util::Join},
    server::{
        handler::{lock, Dispatcher},
        server::{Error as ServerError, MockServer, MockServerConfig},
        Handler, HandlerRegistry,
    },
};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};
use tokio::sync::oneshot;

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<Result<(), ServerError>>,
}

/// A mock of the chat API for one test.
///
/// A `Mocker` runs a local test server and serves every request with the oldest handler
/// registered for the request's path and method. Requests nobody registered a handler for
/// are reported to the test as failures. When the mocker is finalized, explicitly or on drop,
/// every handler that was never invoked is reported as well.
///
/// **Example**:
/// ```
/// use chatmock::{response, Mocker, TestContext};
/// use http::{Method, StatusCode};
/// use serde_json::json;
///
/// let ctx = TestContext::new("current user");
/// let mocker = Mocker::start(ctx.clone());
///
/// mocker.register("CurrentUser", Method::GET, "/users/@me", |_req, _reporter| {
///     response::json(StatusCode::OK, &json!({"id": "1", "username": "tester"}))
/// });
///
/// let user: serde_json::Value = mocker
///     .blocking_client()
///     .get(mocker.url("/users/@me"))
///     .send()
///     .unwrap()
///     .json()
///     .unwrap();
///
/// assert_eq!(user["username"], "tester");
/// mocker.finalize();
/// ctx.assert_passed();
/// ```
pub struct Mocker {
    registry: Arc<Mutex<HandlerRegistry>>,
    reporter: Arc<dyn TestReporter>,
    config: MockerConfig,
    address: SocketAddr,
    server: Mutex<Option<RunningServer>>,
    finalized: AtomicBool,
}

impl Mocker {
    /// Starts a mocker with default settings. See [MockerBuilder] for the options.
    ///
    /// Startup errors are reported through [TestReporter::fail_now].
    pub fn start<R: TestReporter + 'static>(reporter: R) -> Self {
        MockerBuilder::new().start(reporter)
    }

    pub fn builder() -> MockerBuilder {
        MockerBuilder::new()
    }

    pub(crate) fn launch(
        config: MockerConfig,
        registry: HandlerRegistry,
        reporter: Arc<dyn TestReporter>,
    ) -> Result<Self, Error> {
        let registry = Arc::new(Mutex::new(registry));
        let dispatcher = Dispatcher::new(
            registry.clone(),
            reporter.clone(),
            config.print_access_log,
        );
        let server = MockServer::new(
            dispatcher,
            MockServerConfig {
                static_port: config.port,
                https: config.https,
            },
        )?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::RuntimeError)?;

        let (addr_sender, addr_receiver) = oneshot::channel::<SocketAddr>();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("chatmock-server".to_string())
            .spawn(move || {
                let shutdown = async move {
                    // A dropped sender means the mocker is gone, which also ends the server.
                    let _ = shutdown_receiver.await;
                };
                runtime.block_on(server.start_with_signals(Some(addr_sender), shutdown))
            })
            .map_err(Error::ThreadError)?;

        let address = match addr_receiver.join() {
            Ok(address) => address,
            Err(_) => {
                // The server thread ended before binding; its result explains why.
                return match thread.join() {
                    Ok(Err(err)) => Err(err.into()),
                    _ => Err(Error::StartupError),
                };
            }
        };

        Ok(Self {
            registry,
            reporter,
            config,
            address,
            server: Mutex::new(Some(RunningServer {
                shutdown: shutdown_sender,
                thread,
            })),
            finalized: AtomicBool::new(false),
        })
    }

    pub(crate) fn reporter(&self) -> &dyn TestReporter {
        self.reporter.as_ref()
    }

    /// The address the server is bound to.
    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    /// The URL of the server root, e.g. `https://127.0.0.1:5000`.
    pub fn base_url(&self) -> String {
        let scheme = if self.config.https { "https" } else { "http" };
        format!("{}://{}", scheme, self.address)
    }

    /// The full URL of `path`, including the configured base path.
    pub fn url<S: AsRef<str>>(&self, path: S) -> String {
        format!("{}{}{}", self.base_url(), self.config.base_path, path.as_ref())
    }

    /// An async client able to talk to this mocker. It accepts the self-signed certificate.
    pub fn client(&self) -> reqwest::Client {
        match reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
        {
            Ok(client) => client,
            Err(err) => self
                .reporter
                .fail_now(format!("cannot build HTTP client: {}", err)),
        }
    }

    /// A blocking client able to talk to this mocker. It accepts the self-signed
    /// certificate.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_client(&self) -> reqwest::blocking::Client {
        match reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()
        {
            Ok(client) => client,
            Err(err) => self
                .reporter
                .fail_now(format!("cannot build HTTP client: {}", err)),
        }
    }

    /// Registers a handler for the next request to `method` and `path`.
    ///
    /// Handlers for the same path and method are served in registration order, each one
    /// exactly once. `name` identifies the handler in the report of uninvoked handlers.
    pub fn register<N, P, F>(&self, name: N, method: Method, path: P, handler: F)
    where
        N: Into<String>,
        P: AsRef<str>,
        F: Fn(&Request<Bytes>, &dyn TestReporter) -> Response<Bytes> + Send + Sync + 'static,
    {
        let path = format!("{}{}", self.config.base_path, path.as_ref());
        lock(&self.registry).register(method, path, Handler::new(name, handler));
    }

    /// Registers a handler answering with the chat API's error envelope.
    pub fn mock_error<N, P, S>(
        &self,
        name: N,
        method: Method,
        path: P,
        status: StatusCode,
        code: u32,
        message: S,
    ) where
        N: Into<String>,
        P: AsRef<str>,
        S: Into<String>,
    {
        let message = message.into();
        self.register(name, method, path, move |_, _| {
            response::api_error(status, code, message.clone())
        });
    }

    /// Starts a new server with the same settings and a copy of the current handlers.
    ///
    /// The two mockers evolve independently from here on, so a shared setup can be
    /// registered once and forked for every sub-test. A fixed port is not carried over.
    pub fn fork<R: TestReporter + 'static>(&self, reporter: R) -> Self {
        let reporter: Arc<dyn TestReporter> = Arc::new(reporter);
        let registry = lock(&self.registry).clone();
        let config = MockerConfig {
            port: None,
            ..self.config.clone()
        };

        match Self::launch(config, registry, reporter.clone()) {
            Ok(mocker) => mocker,
            Err(err) => reporter.fail_now(format!("cannot start forked mock server: {}", err)),
        }
    }

    /// Returns `true` if every registered handler has been invoked.
    pub fn is_drained(&self) -> bool {
        lock(&self.registry).is_empty()
    }

    /// Shuts the server down, waiting for requests in flight to finish. Idempotent.
    pub fn close(&self) {
        let running = self
            .server
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(running) = running {
            tracing::debug!("Closing mock server on {}", self.address);
            let _ = running.shutdown.send(());
            match running.thread.join() {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!("Mock server stopped with error: {}", err),
                Err(_) => tracing::error!("Mock server thread panicked"),
            }
        }
    }

    /// Closes the server and reports every handler that was never invoked as a failure.
    ///
    /// Only the first call does anything. Dropping the mocker finalizes it as well.
    pub fn finalize(&self) {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }

        self.close();

        if let Some(report) = lock(&self.registry).uninvoked_report() {
            tracing::warn!("{}", report);
            self.reporter.fail(report);
        }
    }
}

impl Drop for Mocker {
    fn drop(&mut self) {
        if thread::panicking() {
            // The test already failed; only release the server.
            self.close();
            return;
        }
        self.finalize();
    }
}
