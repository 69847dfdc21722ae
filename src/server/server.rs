use crate::server::{
    handler::RequestHandler,
    server::Error::{BufferError, LocalSocketAddrError, PublishSocketAddrError, SocketBindError},
};
use futures_util::FutureExt;
use http::{Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{
    body::{Bytes, Incoming},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::{
    rt::tokio::TokioIo,
    server::graceful::{GracefulShutdown, Watcher},
};
use std::{future::Future, io, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::{oneshot::Sender, watch},
    task::spawn,
};

#[cfg(feature = "https")]
use crate::server::tls::{self, TcpStreamPeekBuffer};
#[cfg(feature = "https")]
use tls_detect::is_encrypted;
#[cfg(feature = "https")]
use tokio_rustls::TlsAcceptor;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot bind to socket addr {0}: {1}")]
    SocketBindError(SocketAddr, io::Error),
    #[error("cannot parse socket address: {0}")]
    SocketAddrParseError(#[from] std::net::AddrParseError),
    #[error("cannot obtain local address: {0}")]
    LocalSocketAddrError(io::Error),
    #[error("cannot send reserved TCP address to test thread {0}")]
    PublishSocketAddrError(SocketAddr),
    #[error("buffering error: {0}")]
    BufferError(hyper::Error),
    #[error("HTTP error: {0}")]
    HTTPError(#[from] http::Error),
    #[error("cannot process request: {0}")]
    HandlerError(#[from] crate::server::handler::Error),
    #[cfg(feature = "https")]
    #[error("HTTPS error: {0}")]
    TlsError(#[from] tls::Error),
    #[error("Server I/O error: {0}")]
    IOError(io::Error),
    #[error("Server error: {0}")]
    ServerError(#[from] hyper::Error),
}

pub struct MockServerConfig {
    pub static_port: Option<u16>,
    pub https: bool,
}

/// Accepts connections and hands every buffered request to a [RequestHandler].
///
/// With HTTPS enabled the server still accepts plain HTTP: the peeked start of every
/// connection decides whether a TLS handshake is performed.
pub(crate) struct MockServer<H>
where
    H: RequestHandler + Send + Sync + 'static,
{
    handler: H,
    config: MockServerConfig,
    #[cfg(feature = "https")]
    tls_acceptor: Option<TlsAcceptor>,
}

impl<H> MockServer<H>
where
    H: RequestHandler + Send + Sync + 'static,
{
    pub fn new(handler: H, config: MockServerConfig) -> Result<Self, Error> {
        #[cfg(feature = "https")]
        let tls_acceptor = if config.https {
            Some(TlsAcceptor::from(tls::self_signed_config()?))
        } else {
            None
        };

        Ok(MockServer {
            handler,
            config,
            #[cfg(feature = "https")]
            tls_acceptor,
        })
    }

    /// Binds the listener, publishes the bound address and serves until `shutdown`
    /// resolves. Connections still open at that point are drained before returning.
    pub async fn start_with_signals<F>(
        self,
        socket_addr_sender: Option<Sender<SocketAddr>>,
        shutdown: F,
    ) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let addr: SocketAddr =
            format!("127.0.0.1:{}", self.config.static_port.unwrap_or(0)).parse()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SocketBindError(addr, e))?;
        let addr = listener.local_addr().map_err(LocalSocketAddrError)?;

        if let Some(sender) = socket_addr_sender {
            sender.send(addr).map_err(PublishSocketAddrError)?;
        }

        tracing::info!(
            "Listening on {}://{}",
            if self.config.https { "https" } else { "http" },
            addr
        );
        self.run_accept_loop(listener, shutdown).await
    }

    async fn run_accept_loop<F>(self, listener: TcpListener, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()>,
    {
        let shutdown = shutdown.shared();
        let graceful = GracefulShutdown::new();
        // Dropped on shutdown, which aborts connections that are not serving HTTP yet.
        let (stop_handshakes, handshake_stopped) = watch::channel(());
        let server = Arc::new(self);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp_stream, _)) => {
                            let server = server.clone();
                            let watcher = graceful.watcher();
                            let stopped = handshake_stopped.clone();
                            spawn(async move {
                                let result =
                                    server.handle_tcp_stream(tcp_stream, watcher, stopped).await;
                                if let Err(err) = result {
                                    tracing::debug!("Connection closed with error: {:?}", err);
                                }
                            });
                        },
                        Err(err) => {
                            tracing::error!("TCP error: {:?}", err);
                        },
                    };
                }
                _ = shutdown.clone() => {
                    break;
                }
            }
        }

        drop(listener);
        drop(stop_handshakes);
        tracing::debug!("Shutting down, waiting for open connections to finish");
        graceful.shutdown().await;

        Ok(())
    }

    #[cfg_attr(not(feature = "https"), allow(unused_mut, unused_variables))]
    async fn handle_tcp_stream(
        self: Arc<Self>,
        tcp_stream: TcpStream,
        watcher: Watcher,
        mut stopped: watch::Receiver<()>,
    ) -> Result<(), Error> {
        tracing::trace!("new TCP connection incoming");

        #[cfg(feature = "https")]
        {
            if let Some(acceptor) = self.tls_acceptor.clone() {
                let encrypted = tokio::select! {
                    encrypted = async {
                        let mut peek_buffer = TcpStreamPeekBuffer::new(&tcp_stream);
                        is_encrypted(&mut peek_buffer, 0).await
                    } => encrypted,
                    _ = stopped.changed() => {
                        tracing::trace!("Dropping unclassified connection on shutdown");
                        return Ok(());
                    }
                };

                if encrypted {
                    tracing::trace!("TCP connection is TLS encrypted");
                    let tls_stream = tokio::select! {
                        accepted = acceptor.accept(tcp_stream) => accepted.map_err(Error::IOError)?,
                        _ = stopped.changed() => {
                            tracing::trace!("Dropping unfinished TLS handshake on shutdown");
                            return Ok(());
                        }
                    };
                    return self.serve_connection(tls_stream, watcher).await;
                }
            }
        }

        tracing::trace!("TCP connection is not TLS encrypted");
        self.serve_connection(tcp_stream, watcher).await
    }

    async fn serve_connection<S>(
        self: Arc<Self>,
        stream: S,
        watcher: Watcher,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server = self;
        let conn = http1::Builder::new().serve_connection(
            TokioIo::new(stream),
            service_fn(move |req| server.clone().service(req)),
        );

        watcher.watch(conn).await.map_err(Error::ServerError)
    }

    async fn service(
        self: Arc<Self>,
        req: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
        tracing::trace!("New HTTP request received: {}", req.uri());

        let req = match buffer_request(req).await {
            Ok(req) => req,
            Err(err) => {
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, BufferError(err));
            }
        };

        match self.handler.handle(req).await {
            Ok(response) => to_service_response(response),
            Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, err.into()),
        }
    }
}

async fn buffer_request(req: Request<Incoming>) -> Result<Request<Bytes>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Request::from_parts(parts, body))
}

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

fn error_response(
    code: StatusCode,
    err: Error,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    tracing::error!("failed to process request: {}", err);
    Ok(Response::builder()
        .status(code)
        .body(full(err.to_string()))?)
}

fn to_service_response(
    response: Response<Bytes>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, Error> {
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, full(body)))
}
