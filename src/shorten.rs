//! URL shortening for the QR caption

use alloc::string::{String, ToString};
use core::fmt::Write as _;

use embedded_io_async::Read;
use log::{info, warn};

use crate::net::Network;

/// Largest shortener reply we accept
const MAX_REPLY_LEN: usize = 256;

/// Shorten `long_url` through the shortener at `template` (`{url}` is
/// replaced with the percent-encoded long URL).
///
/// Never fails: an error, an oversized reply or a reply that is not a
/// shorter `http` URL yields the long URL unchanged.
pub async fn shorten_url<N: Network>(
    net: &mut N,
    template: &str,
    long_url: &str,
    headers: &[(&str, &str)],
) -> String {
    let api_url = template.replace("{url}", &percent_encode(long_url));

    match request(net, &api_url, headers).await {
        Some(reply) if reply.starts_with("http") && reply.len() < long_url.len() => {
            info!("URL shortened: {}", reply);
            reply
        }
        Some(_) => {
            warn!("URL shortening failed, using original");
            long_url.to_string()
        }
        None => long_url.to_string(),
    }
}

async fn request<N: Network>(net: &mut N, url: &str, headers: &[(&str, &str)]) -> Option<String> {
    let mut stream = match net.open(url, headers).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("URL shortener error: {}", e);
            return None;
        }
    };

    let mut buf = [0u8; MAX_REPLY_LEN];
    let mut len = 0;
    while len < buf.len() {
        match stream.read(&mut buf[len..]).await {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(_) => {
                warn!("URL shortener read failed");
                return None;
            }
        }
    }

    let reply = core::str::from_utf8(&buf[..len]).ok()?;
    Some(reply.trim().to_string())
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => {
                let _ = write!(out, "%{:02X}", b);
            }
        }
    }
    out
}
