use crate::{common::util::read_env, server::tls::Error::GenerateCertificateError};
use async_trait::async_trait;
use rcgen::{CertificateParams, KeyPair, SanType};
use rustls::{
    pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer},
    ServerConfig,
};
use std::{
    io::{self, ErrorKind},
    net::IpAddr,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::net::TcpStream;

// Pause between peeks while only part of the requested bytes has arrived.
const PEEK_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Comma separated list of additional host names or IP addresses to put into the generated
/// certificate.
pub const EXTRA_SANS_ENV: &str = "CHATMOCK_EXTRA_SANS";

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot generate certificate: {0}")]
    GenerateCertificateError(String),
    #[error("cannot build TLS configuration: {0}")]
    ConfigError(#[from] rustls::Error),
}

/// Builds a TLS server configuration around a freshly generated self-signed certificate.
///
/// The certificate covers `localhost`, the IPv4 and IPv6 loopback addresses and everything
/// listed in [EXTRA_SANS_ENV]. Clients are expected to skip verification.
pub fn self_signed_config() -> Result<Arc<ServerConfig>, Error> {
    let mut params = CertificateParams::new(vec!["localhost".to_string()]).map_err(|err| {
        GenerateCertificateError(format!("invalid certificate parameters: {:?}", err))
    })?;

    let loopbacks = ["127.0.0.1", "::1"]
        .iter()
        .filter_map(|ip| ip.parse::<IpAddr>().ok())
        .map(SanType::IpAddress);
    push_unique_sans(&mut params.subject_alt_names, loopbacks.collect());
    push_unique_sans(&mut params.subject_alt_names, parse_extra_sans_from_env());

    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).map_err(|err| {
        GenerateCertificateError(format!("cannot generate key pair: {:?}", err))
    })?;
    let cert = params.self_signed(&key_pair).map_err(|err| {
        GenerateCertificateError(format!("cannot sign certificate: {:?}", err))
    })?;

    let certificates = vec![CertificateDer::from(cert.der().to_vec())];
    let private_key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certificates, private_key)?;

    config.alpn_protocols = vec![b"http/1.1".to_vec(), b"http/1.0".to_vec()];

    Ok(Arc::new(config))
}

/// Serves the first bytes of a connection to TLS detection without consuming them, so the
/// stream can still be handed to the TLS acceptor or the HTTP parser afterwards.
pub struct TcpStreamPeekBuffer<'a> {
    stream: &'a TcpStream,
    buffer: Vec<u8>,
}

impl<'a> TcpStreamPeekBuffer<'a> {
    pub fn new(stream: &'a TcpStream) -> Self {
        TcpStreamPeekBuffer {
            stream,
            buffer: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Waits until the byte at `offset` has arrived.
    pub async fn advance(&mut self, offset: usize) -> io::Result<()> {
        let required_size = offset + 1;
        if self.buffer.len() >= required_size {
            return Ok(());
        }

        let mut peeked = vec![0u8; required_size];
        loop {
            // Peeking always starts at the beginning of the stream.
            let n = self.stream.peek(&mut peeked).await?;
            if n == 0 {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed before enough bytes arrived",
                ));
            }
            if n >= required_size {
                self.buffer = peeked;
                return Ok(());
            }
            tokio::time::sleep(PEEK_RETRY_DELAY).await;
        }
    }
}

#[async_trait]
impl<'a> tls_detect::Read<'a> for TcpStreamPeekBuffer<'a> {
    async fn read_byte(&mut self, from_offset: usize) -> io::Result<u8> {
        self.advance(from_offset).await?;
        Ok(self.buffer[from_offset])
    }

    async fn read_bytes(&mut self, from_offset: usize, to_offset: usize) -> io::Result<Vec<u8>> {
        self.advance(to_offset).await?;
        Ok(self.buffer[from_offset..to_offset].to_vec())
    }

    async fn read_u16_from_be(&mut self, offset: usize) -> io::Result<u16> {
        let bytes = self.read_bytes(offset, offset + 2).await?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    async fn buffer_to(&mut self, limit: usize) -> io::Result<()> {
        self.advance(limit).await
    }
}

// Non-IP tokens are treated as DNS names.
fn parse_extra_sans_from_env() -> Vec<SanType> {
    let raw = read_env(EXTRA_SANS_ENV, "");
    let mut out = Vec::new();
    for item in raw.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if let Ok(ip) = item.parse::<IpAddr>() {
            out.push(SanType::IpAddress(ip));
        } else if let Ok(dns) = <rcgen::Ia5String as std::convert::TryFrom<&str>>::try_from(item) {
            out.push(SanType::DnsName(dns));
        } else {
            tracing::warn!("Ignoring invalid entry '{}' in {}", item, EXTRA_SANS_ENV);
        }
    }
    out
}

fn push_unique_sans(target: &mut Vec<SanType>, extras: Vec<SanType>) {
    for e in extras {
        let exists = target.iter().any(|t| match (t, &e) {
            (SanType::DnsName(a), SanType::DnsName(b)) => a == b,
            (SanType::IpAddress(a), SanType::IpAddress(b)) => a == b,
            _ => false,
        });
        if !exists {
            target.push(e);
        }
    }
}
