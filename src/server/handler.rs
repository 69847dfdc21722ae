use crate::{
    common::{reporter::TestReporter, util::panic_message},
    server::registry::{Error as DispatchError, Handler, HandlerRegistry},
};
use async_trait::async_trait;
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderValue, Request, Response, StatusCode};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot build response: {0}")]
    ResponseConstructionError(#[from] http::Error),
}

#[async_trait]
pub(crate) trait RequestHandler {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

/// Routes buffered requests to the oldest matching handler of a shared registry.
pub(crate) struct Dispatcher {
    registry: Arc<Mutex<HandlerRegistry>>,
    reporter: Arc<dyn TestReporter>,
    print_access_log: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Mutex<HandlerRegistry>>,
        reporter: Arc<dyn TestReporter>,
        print_access_log: bool,
    ) -> Self {
        Self {
            registry,
            reporter,
            print_access_log,
        }
    }

    /// Runs a handler, turning a panic into a recorded failure and a 500 response.
    ///
    /// Handlers abort through [TestReporter::fail_now], which records the failure before it
    /// panics. A panic that left the failure count untouched came from somewhere else and is
    /// recorded here.
    fn invoke(&self, handler: &Handler, req: &Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let failures_before = self.reporter.failure_count();
        let reporter = self.reporter.as_ref();

        match catch_unwind(AssertUnwindSafe(|| handler.invoke(req, reporter))) {
            Ok(response) => Ok(response),
            Err(payload) => {
                if self.reporter.failure_count() == failures_before {
                    self.reporter.fail(format!(
                        "handler '{}' panicked: {}",
                        handler.name(),
                        panic_message(payload.as_ref())
                    ));
                }
                tracing::debug!("Handler '{}' aborted the request", handler.name());
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("handler '{}' aborted", handler.name()),
                )
            }
        }
    }
}

#[async_trait]
impl RequestHandler for Dispatcher {
    async fn handle(&self, req: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        tracing::trace!("Routing incoming request: {:?}", req);

        let popped = lock(&self.registry).pop(req.method(), req.uri().path());

        let response = match popped {
            Ok(handler) => {
                tracing::debug!(
                    "Dispatching {} {} to handler '{}'",
                    req.method(),
                    req.uri().path(),
                    handler.name()
                );
                self.invoke(&handler, &req)?
            }
            Err(err) => {
                let status = match err {
                    DispatchError::UnhandledPath(_) => StatusCode::NOT_FOUND,
                    DispatchError::UnhandledMethod { .. } => StatusCode::METHOD_NOT_ALLOWED,
                };
                self.reporter.fail(err.to_string());
                error_response(status, err.to_string())?
            }
        };

        if self.print_access_log {
            tracing::info!(
                "{} {} -> {}",
                req.method(),
                req.uri(),
                response.status().as_u16()
            );
        }

        Ok(response)
    }
}

/// Locks the registry, recovering it from a poisoned lock.
pub(crate) fn lock(registry: &Mutex<HandlerRegistry>) -> MutexGuard<'_, HandlerRegistry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn error_response(code: StatusCode, message: String) -> Result<Response<Bytes>, Error> {
    Ok(Response::builder()
        .status(code)
        .header(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"))
        .body(Bytes::from(message))?)
}
