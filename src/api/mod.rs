use std::io;
use thiserror::Error;

pub use builder::{MockerBuilder, ACCESS_LOG_ENV, HTTPS_ENV};
pub use mocker::Mocker;

mod builder;
mod mocker;
pub mod pagination;
pub mod response;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot start mock server: {0}")]
    ServerError(#[from] crate::server::server::Error),
    #[error("cannot build server runtime: {0}")]
    RuntimeError(io::Error),
    #[error("cannot spawn server thread: {0}")]
    ThreadError(io::Error),
    #[error("server thread stopped before it was ready")]
    StartupError,
}
