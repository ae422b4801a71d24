//! Network collaborator
//!
//! The scheduler only needs to open a URL and pull the body in bounded reads.
//! [`NalNetwork`] provides that over any `embedded-nal-async` TCP/DNS stack
//! (embassy-net on the badge).

use core::net::{IpAddr, Ipv4Addr, SocketAddr};

use embedded_io_async::{Error as _, ErrorKind, ErrorType, Read, Write};
use embedded_nal_async::{AddrType, Dns, TcpConnect};
use log::{debug, info};

use crate::http::{self, HttpBody, HttpError, Scheme, Url};
use crate::tls::TlsStream;

/// Opens remote resources as readable streams
#[allow(async_fn_in_trait)]
pub trait Network {
    /// Response body; dropping it closes the connection
    type Stream: Read;

    /// Send a GET for `url` with the extra request headers and return the
    /// body stream once the response headers are in.
    async fn open(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Self::Stream, HttpError>;
}

/// TCP connection, optionally wrapped in TLS
pub enum Transport<'a, C>
where
    C: Read + Write + 'a,
{
    Plain(C),
    Tls(TlsStream<'a, C>),
}

impl<'a, C> ErrorType for Transport<'a, C>
where
    C: Read + Write + 'a,
{
    type Error = ErrorKind;
}

impl<'a, C> Read for Transport<'a, C>
where
    C: Read + Write + 'a,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        match self {
            Transport::Plain(conn) => conn.read(buf).await.map_err(|e| e.kind()),
            Transport::Tls(tls) => tls.read(buf).await.map_err(|e| e.kind()),
        }
    }
}

impl<'a, C> Write for Transport<'a, C>
where
    C: Read + Write + 'a,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        match self {
            Transport::Plain(conn) => conn.write(buf).await.map_err(|e| e.kind()),
            Transport::Tls(tls) => tls.write(buf).await.map_err(|e| e.kind()),
        }
    }

    async fn flush(&mut self) -> Result<(), ErrorKind> {
        match self {
            Transport::Plain(conn) => conn.flush().await.map_err(|e| e.kind()),
            Transport::Tls(tls) => tls.flush().await.map_err(|e| e.kind()),
        }
    }
}

/// HTTP and HTTPS over an `embedded-nal-async` stack
///
/// HTTPS runs TLS 1.3 through [`TlsStream`] without certificate checks.
pub struct NalNetwork<'a, T, D> {
    tcp: &'a T,
    dns: &'a D,
    seed: u64,
}

impl<'a, T, D> NalNetwork<'a, T, D>
where
    T: TcpConnect + 'a,
    D: Dns + 'a,
{
    pub fn new(tcp: &'a T, dns: &'a D) -> Self {
        Self { tcp, dns, seed: 0 }
    }

    /// Seed for the TLS key exchange, ideally from a hardware RNG
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Resolve a hostname to an address, accepting IPv4 literals directly
    async fn resolve(&self, host: &str) -> Result<IpAddr, HttpError> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(IpAddr::V4(ip));
        }

        debug!("Resolving hostname: {}", host);
        self.dns
            .get_host_by_name(host, AddrType::IPv4)
            .await
            .map_err(|_| HttpError::Dns)
    }
}

impl<'a, T, D> Network for NalNetwork<'a, T, D>
where
    T: TcpConnect + 'a,
    T::Connection<'a>: 'a,
    D: Dns + 'a,
{
    type Stream = HttpBody<Transport<'a, T::Connection<'a>>>;

    async fn open(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Self::Stream, HttpError> {
        let parsed = Url::parse(url)?;

        let ip = self.resolve(parsed.host).await?;
        info!("Connecting to {}:{}", parsed.host, parsed.port);

        let tcp: &'a T = self.tcp;
        let conn = tcp
            .connect(SocketAddr::new(ip, parsed.port))
            .await
            .map_err(|_| HttpError::Connect)?;

        let transport = match parsed.scheme {
            Scheme::Http => Transport::Plain(conn),
            Scheme::Https => {
                // fresh randomness for every session
                self.seed = self.seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
                Transport::Tls(TlsStream::connect(conn, parsed.host, self.seed).await?)
            }
        };

        http::get(transport, &parsed, headers).await
    }
}
