//! Connectivity Probe
//!
//! Raw TCP or TLS reachability checks against `host:port` with round-trip measurement.
//!
//! # Failure Classification
//! Probes never return `Err`. The outcome is a [`ReachabilityProbe`] whose `failure` names what
//! went wrong:
//! - [`ProbeFailure::HostUnknown`]: name resolution failed
//! - [`ProbeFailure::UnsupportedProtocol`]: the peer refused TLS 1.2 and 1.3; the detail names the
//!   version the peer announced when its first record carried one
//! - [`ProbeFailure::HandshakeFailed`]: any other TLS failure (untrusted certificate, cipher mismatch)
//! - [`ProbeFailure::ConnectionFailed`]: refused, reset or unreachable
//! - [`ProbeFailure::TimedOut`]: nothing completed within the timeout
//!
//! # Round Trip
//! Measured from the start of the TCP connect to the end of the TLS handshake (or the connect for
//! plain probes). Name resolution is not included.

mod latency;
mod tls;

pub use latency::{LatencyClass, ProbeKind};
pub use tls::TlsMaterial;

use rustls::pki_types::ServerName;
use rustls::{AlertDescription, ProtocolVersion};
use serde::Serialize;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

/// Why a probe did not connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeFailure {
    HostUnknown(String),
    UnsupportedProtocol(String),
    HandshakeFailed(String),
    ConnectionFailed(String),
    TimedOut(u64),
}

impl ProbeFailure {
    /// Remediation text for the operator
    #[must_use]
    pub const fn hint(&self) -> &'static str {
        match self {
            Self::HostUnknown(_) => "hostname is not known, check the server name",
            Self::UnsupportedProtocol(_) => "SSL protocol not supported, use TLSv1.2/TLSv1.3",
            Self::HandshakeFailed(_) => "check that the supplied certificate belongs to this server",
            Self::ConnectionFailed(_) => "check that the port is open and reachable from this machine",
            Self::TimedOut(_) => "no response in time, check network access to the server",
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostUnknown(host) => write!(f, "{host}: hostname is not known"),
            Self::UnsupportedProtocol(detail) => write!(f, "unsupported TLS protocol: {detail}"),
            Self::HandshakeFailed(detail) => write!(f, "TLS handshake failed: {detail}"),
            Self::ConnectionFailed(detail) => write!(f, "connection failed: {detail}"),
            Self::TimedOut(secs) => write!(f, "timed out after {secs}s"),
        }
    }
}

/// Outcome of one reachability probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReachabilityProbe {
    /// Connect plus handshake time; elapsed time until failure otherwise
    pub round_trip: Duration,

    /// Negotiated TLS version (`TLSv1.3`), `None` for plain probes
    pub protocol: Option<String>,

    pub failure: Option<ProbeFailure>,
}

impl ReachabilityProbe {
    #[must_use]
    pub const fn connected(&self) -> bool {
        self.failure.is_none()
    }

    /// Latency rating; only meaningful when connected
    #[must_use]
    pub fn latency(&self, kind: ProbeKind) -> LatencyClass {
        LatencyClass::classify(self.round_trip, kind)
    }
}

/// Check that `host:port` accepts a connection, optionally completing a TLS handshake
///
/// # Parameters
/// - `tls`: `None` for plain TCP. [`TlsMaterial::handshake_only`] completes the handshake without
///   verifying the server.
/// - `timeout`: Upper bound for resolution, connect and handshake together.
pub async fn check_reachable(
    host: &str,
    port: u16,
    tls: Option<&TlsMaterial>,
    timeout: Duration,
) -> ReachabilityProbe {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, connect(host, port, tls)).await;

    let probe = match outcome {
        Ok(Ok((round_trip, protocol))) => ReachabilityProbe { round_trip, protocol, failure: None },
        Ok(Err(failure)) => {
            ReachabilityProbe { round_trip: started.elapsed(), protocol: None, failure: Some(failure) }
        }
        Err(_) => ReachabilityProbe {
            round_trip: started.elapsed(),
            protocol: None,
            failure: Some(ProbeFailure::TimedOut(timeout.as_secs())),
        },
    };

    match &probe.failure {
        None => debug!(%host, port, round_trip_ms = probe.round_trip.as_millis(), protocol = ?probe.protocol, "probe connected"),
        Some(failure) => warn!(%host, port, %failure, "probe failed"),
    }
    probe
}

async fn connect(
    host: &str,
    port: u16,
    tls: Option<&TlsMaterial>,
) -> std::result::Result<(Duration, Option<String>), ProbeFailure> {
    let addresses: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| ProbeFailure::HostUnknown(host.to_string()))?
        .collect();
    if addresses.is_empty() {
        return Err(ProbeFailure::HostUnknown(host.to_string()));
    }

    let started = Instant::now();
    let stream = TcpStream::connect(addresses.as_slice())
        .await
        .map_err(|e| ProbeFailure::ConnectionFailed(e.to_string()))?;

    let Some(material) = tls else {
        return Ok((started.elapsed(), None));
    };

    let config = material.client_config().map_err(|e| ProbeFailure::HandshakeFailed(e.message()))?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ProbeFailure::HandshakeFailed(format!("invalid server name {host}: {e}")))?;

    let seen = Arc::new(Mutex::new(Vec::with_capacity(RECORD_PREFIX)));
    let stream = FirstBytes { inner: stream, seen: Arc::clone(&seen) };
    let connector = TlsConnector::from(Arc::new(config));
    let stream = connector.connect(server_name, stream).await.map_err(|e| {
        let peer = seen.lock().ok().and_then(|bytes| peer_version(&bytes));
        classify_tls_error(e, peer)
    })?;
    let round_trip = started.elapsed();

    let (_, session) = stream.get_ref();
    let protocol = session.protocol_version().map(protocol_label);
    Ok((round_trip, protocol))
}

fn protocol_label(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_3 => "TLSv1.3".to_string(),
        ProtocolVersion::TLSv1_2 => "TLSv1.2".to_string(),
        ProtocolVersion::TLSv1_1 => "TLSv1.1".to_string(),
        ProtocolVersion::TLSv1_0 => "TLSv1.0".to_string(),
        ProtocolVersion::SSLv3 => "SSLv3".to_string(),
        other => format!("{other:?}"),
    }
}

/// Bytes kept from the start of the server's reply: record header plus the ServerHello version
const RECORD_PREFIX: usize = 11;

/// TCP stream that keeps a copy of the first bytes the server sends
struct FirstBytes {
    inner: TcpStream,
    seen: Arc<Mutex<Vec<u8>>>,
}

impl AsyncRead for FirstBytes {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let (Poll::Ready(Ok(())), Ok(mut seen)) = (&polled, this.seen.lock()) {
            let fresh = &buf.filled()[before..];
            let room = RECORD_PREFIX.saturating_sub(seen.len()).min(fresh.len());
            seen.extend_from_slice(&fresh[..room]);
        }
        polled
    }
}

impl AsyncWrite for FirstBytes {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Protocol version announced by the server's first TLS record
///
/// A ServerHello carries the version the server picked; an alert only carries the record version,
/// which servers set to the highest version they speak.
fn peer_version(first: &[u8]) -> Option<ProtocolVersion> {
    const ALERT: u8 = 21;
    const HANDSHAKE: u8 = 22;
    const SERVER_HELLO: u8 = 2;

    let (major, minor) = match first {
        [HANDSHAKE, _, _, _, _, SERVER_HELLO, _, _, _, major, minor, ..] => (*major, *minor),
        [ALERT | HANDSHAKE, major, minor, ..] => (*major, *minor),
        _ => return None,
    };
    (major == 3).then(|| ProtocolVersion::from(u16::from_be_bytes([major, minor])))
}

fn classify_tls_error(error: io::Error, peer: Option<ProtocolVersion>) -> ProbeFailure {
    let Some(tls) = error.get_ref().and_then(|e| e.downcast_ref::<rustls::Error>()) else {
        return ProbeFailure::HandshakeFailed(error.to_string());
    };
    match tls {
        rustls::Error::AlertReceived(AlertDescription::ProtocolVersion)
        | rustls::Error::PeerIncompatible(_) => ProbeFailure::UnsupportedProtocol(match peer {
            Some(version) => {
                format!("server offered {}, TLSv1.2 or TLSv1.3 is required", protocol_label(version))
            }
            None => format!("server does not offer TLSv1.2 or TLSv1.3 ({tls})"),
        }),
        other => ProbeFailure::HandshakeFailed(other.to_string()),
    }
}
