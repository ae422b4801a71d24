//! TLS transport for HTTPS endpoints using embedded-tls
//!
//! Wraps a TCP connection in a TLS 1.3 session. The server certificate is
//! not verified.

use alloc::boxed::Box;
use alloc::vec;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;

use embedded_io_async::{ErrorType, Read, Write};
use embedded_tls::{
    Aes128GcmSha256, TlsConfig, TlsConnection, TlsContext, TlsError, UnsecureProvider,
};
use log::{debug, warn};
use rand_core::{CryptoRng, RngCore};

use crate::http::HttpError;

/// Record read buffer: the largest TLS record
pub const TLS_READ_BUF_SIZE: usize = 16640;
/// Record write buffer
pub const TLS_WRITE_BUF_SIZE: usize = 4096;

/// Simple RNG using a seed
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x853c49e6748fea9b } else { seed },
        }
    }
}

impl RngCore for SimpleRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let val = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&val[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for SimpleRng {}

/// Open TLS session over `C`
///
/// The record buffers are heap allocated per session and freed when the
/// stream is dropped.
pub struct TlsStream<'a, C>
where
    C: Read + Write + 'a,
{
    tls: ManuallyDrop<TlsConnection<'a, C, Aes128GcmSha256>>,
    read_buf: NonNull<[u8]>,
    write_buf: NonNull<[u8]>,
}

impl<'a, C> TlsStream<'a, C>
where
    C: Read + Write + 'a,
{
    /// Run the handshake with `server_name` over an established connection
    pub async fn connect(conn: C, server_name: &str, seed: u64) -> Result<Self, HttpError> {
        let read_buf = NonNull::from(Box::leak(vec![0u8; TLS_READ_BUF_SIZE].into_boxed_slice()));
        let write_buf = NonNull::from(Box::leak(vec![0u8; TLS_WRITE_BUF_SIZE].into_boxed_slice()));

        // SAFETY: the buffers were just leaked, so these are the only
        // references to them. They live in `tls`, which `Drop` releases
        // before freeing the buffers.
        let tls = unsafe {
            TlsConnection::new(conn, &mut *read_buf.as_ptr(), &mut *write_buf.as_ptr())
        };
        let mut stream = Self {
            tls: ManuallyDrop::new(tls),
            read_buf,
            write_buf,
        };

        debug!("Starting TLS handshake with {}", server_name);
        let config = TlsConfig::new().with_server_name(server_name);
        let provider = UnsecureProvider::new::<Aes128GcmSha256>(SimpleRng::new(seed));
        stream
            .tls
            .open(TlsContext::new(&config, provider))
            .await
            .map_err(|e| {
                warn!("TLS handshake with {} failed: {:?}", server_name, e);
                HttpError::Tls
            })?;
        debug!("TLS handshake complete");

        Ok(stream)
    }
}

impl<'a, C> Drop for TlsStream<'a, C>
where
    C: Read + Write + 'a,
{
    fn drop(&mut self) {
        // SAFETY: `tls` holds the only references into the buffers and is
        // never used again once dropped here.
        unsafe {
            ManuallyDrop::drop(&mut self.tls);
            drop(Box::from_raw(self.read_buf.as_ptr()));
            drop(Box::from_raw(self.write_buf.as_ptr()));
        }
    }
}

impl<'a, C> ErrorType for TlsStream<'a, C>
where
    C: Read + Write + 'a,
{
    type Error = TlsError;
}

impl<'a, C> Read for TlsStream<'a, C>
where
    C: Read + Write + 'a,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TlsError> {
        self.tls.read(buf).await
    }
}

impl<'a, C> Write for TlsStream<'a, C>
where
    C: Read + Write + 'a,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TlsError> {
        self.tls.write(buf).await
    }

    async fn flush(&mut self) -> Result<(), TlsError> {
        self.tls.flush().await
    }
}
