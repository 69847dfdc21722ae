use crate::common::{reporter::TestReporter, util::pluralize};
use bytes::Bytes;
use http::{Method, Request, Response};
use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    fmt,
    io::Write,
    sync::Arc,
};
use tabwriter::TabWriter;
use thiserror::Error;

/// The function a [Handler] runs when it is dispatched.
pub type HandlerFn =
    dyn Fn(&Request<Bytes>, &dyn TestReporter) -> Response<Bytes> + Send + Sync + 'static;

/// A single registered expectation: serves exactly one request.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    func: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<N, F>(name: N, func: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Request<Bytes>, &dyn TestReporter) -> Response<Bytes> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, req: &Request<Bytes>, reporter: &dyn TestReporter) -> Response<Bytes> {
        (self.func)(req, reporter)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unhandled path '{0}'")]
    UnhandledPath(String),
    #[error("unhandled method '{method}' on path '{path}'")]
    UnhandledMethod { method: Method, path: String },
}

/// Registered handlers, queued per path and method.
///
/// Empty queues and paths are removed eagerly, so an empty registry means every registered
/// handler has been invoked. Cloning copies the queue structure; the handler functions are
/// shared.
#[derive(Clone, Debug, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, HashMap<Method, VecDeque<Handler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler to the queue of `path` and `method`.
    pub fn register<P: Into<String>>(&mut self, method: Method, path: P, handler: Handler) {
        let path = path.into();
        tracing::debug!(
            "Registering handler '{}' for {} {}",
            handler.name(),
            method,
            path
        );

        self.handlers
            .entry(path)
            .or_default()
            .entry(method)
            .or_default()
            .push_back(handler);
    }

    /// Removes and returns the oldest handler registered for `path` and `method`.
    pub fn pop(&mut self, method: &Method, path: &str) -> Result<Handler, Error> {
        let methods = self
            .handlers
            .get_mut(path)
            .ok_or_else(|| Error::UnhandledPath(path.to_string()))?;

        let unhandled_method = || Error::UnhandledMethod {
            method: method.clone(),
            path: path.to_string(),
        };

        let queue = methods.get_mut(method).ok_or_else(unhandled_method)?;
        let handler = queue.pop_front().ok_or_else(unhandled_method)?;

        if queue.is_empty() {
            methods.remove(method);
        }
        if methods.is_empty() {
            self.handlers.remove(path);
        }

        Ok(handler)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Number of handlers that have not been invoked yet.
    pub fn len(&self) -> usize {
        self.handlers
            .values()
            .flat_map(|methods| methods.values())
            .map(|queue| queue.len())
            .sum()
    }

    /// Summarizes every handler that has not been invoked, grouped by path and handler name.
    /// Returns `None` if the registry is empty.
    pub fn uninvoked_report(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut tw = TabWriter::new(vec![]);
        // Writing into a Vec cannot fail.
        let _ = writeln!(tw, "there are uninvoked handlers:");

        for (path, methods) in &self.handlers {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for handler in methods.values().flatten() {
                *counts.entry(handler.name()).or_default() += 1;
            }

            let _ = writeln!(tw, "\n{}:", path);
            for (name, count) in counts {
                let _ = writeln!(tw, "\t{}:\t{}", name, pluralize(count, "uninvoked handler"));
            }
        }

        let _ = tw.flush();
        let output = tw
            .into_inner()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();

        Some(output)
    }
}
