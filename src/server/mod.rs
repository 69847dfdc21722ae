pub(crate) mod handler;
pub(crate) mod registry;
#[allow(clippy::module_inception)]
pub(crate) mod server;
#[cfg(feature = "https")]
pub(crate) mod tls;

pub use registry::{Handler, HandlerRegistry};
