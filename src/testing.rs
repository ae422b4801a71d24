//! In-memory collaborators shared by the unit tests

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use embedded_io_async::{ErrorKind, ErrorType, Read, Write};

use crate::http::HttpError;
use crate::net::Network;
use crate::storage::{Storage, StorageError};
use crate::wifi::Radio;

pub use embassy_futures::block_on;

/// RAM-backed flat file storage
#[derive(Debug, Default)]
pub struct MemStorage {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl MemStorage {
    pub fn with_file(mut self, name: &str, data: &[u8]) -> Self {
        self.files.insert(name.to_string(), data.to_vec());
        self
    }

    pub fn len_of(&self, name: &str) -> Option<usize> {
        self.files.get(name).map(Vec::len)
    }
}

impl Storage for MemStorage {
    fn exists(&mut self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    fn truncate(&mut self, name: &str) -> Result<(), StorageError> {
        self.files.insert(name.to_string(), Vec::new());
        Ok(())
    }

    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.files
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn read_to_end(&mut self, name: &str, max_len: usize) -> Result<Vec<u8>, StorageError> {
        let data = self.files.get(name).ok_or(StorageError::NotFound)?;
        if data.len() > max_len {
            return Err(StorageError::TooLarge);
        }
        Ok(data.clone())
    }
}

/// Canned body served for one URL
#[derive(Debug, Clone)]
pub struct Script {
    pub body: Vec<u8>,
    /// Largest number of bytes returned per read
    pub chunk: usize,
    /// Zero-based read index that fails instead of returning data
    pub fail_at: Option<usize>,
}

impl Script {
    pub fn new(body: &[u8], chunk: usize) -> Self {
        Self {
            body: body.to_vec(),
            chunk,
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, read: usize) -> Self {
        self.fail_at = Some(read);
        self
    }
}

/// Network serving scripted bodies keyed by URL. Unknown URLs fail to connect.
#[derive(Debug, Default)]
pub struct MockNetwork {
    pub scripts: BTreeMap<String, Script>,
    /// Every URL passed to `open`, in order
    pub opened: Vec<String>,
    /// Headers seen by the most recent `open`
    pub last_headers: Vec<(String, String)>,
}

impl MockNetwork {
    pub fn serve(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }

    pub fn opens_of(&self, url: &str) -> usize {
        self.opened.iter().filter(|u| u.as_str() == url).count()
    }
}

impl Network for MockNetwork {
    type Stream = MockStream;

    async fn open(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Self::Stream, HttpError> {
        self.opened.push(url.to_string());
        self.last_headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let script = self.scripts.get(url).ok_or(HttpError::Connect)?;
        Ok(MockStream {
            script: script.clone(),
            pos: 0,
            reads: 0,
        })
    }
}

/// Stream half of [`MockNetwork`]
#[derive(Debug)]
pub struct MockStream {
    script: Script,
    pos: usize,
    reads: usize,
}

impl ErrorType for MockStream {
    type Error = ErrorKind;
}

impl Read for MockStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let read = self.reads;
        self.reads += 1;
        if self.script.fail_at == Some(read) {
            return Err(ErrorKind::ConnectionReset);
        }
        let remaining = &self.script.body[self.pos..];
        let n = remaining.len().min(self.script.chunk).min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

/// Byte connection replaying a canned server reply and capturing the request
#[derive(Debug, Default)]
pub struct MockConnection {
    pub incoming: Vec<u8>,
    pub pos: usize,
    pub chunk: usize,
    pub written: Vec<u8>,
}

impl MockConnection {
    pub fn replying(reply: &[u8], chunk: usize) -> Self {
        Self {
            incoming: reply.to_vec(),
            chunk,
            ..Self::default()
        }
    }
}

impl ErrorType for MockConnection {
    type Error = ErrorKind;
}

impl Read for MockConnection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let remaining = &self.incoming[self.pos..];
        let n = remaining.len().min(self.chunk).min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Write for MockConnection {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Radio whose network appears after a number of scans
#[derive(Debug, Default)]
pub struct ScriptedRadio {
    pub visible: Vec<String>,
    /// Scans that return nothing before `visible` shows up
    pub hidden_scans: usize,
    /// Connect requests that fail before one succeeds
    pub failed_connects: usize,
    pub scans: usize,
    pub connects: usize,
    pub linked: bool,
}

impl ScriptedRadio {
    pub fn with_network(ssid: &str) -> Self {
        Self {
            visible: alloc::vec![ssid.to_string()],
            ..Self::default()
        }
    }
}

impl Radio for ScriptedRadio {
    type Error = &'static str;

    fn is_connected(&mut self) -> bool {
        self.linked
    }

    async fn scan(&mut self) -> Result<Vec<String>, Self::Error> {
        self.scans += 1;
        if self.scans <= self.hidden_scans {
            return Ok(Vec::new());
        }
        Ok(self.visible.clone())
    }

    async fn connect(&mut self, ssid: &str, _password: Option<&str>) -> Result<(), Self::Error> {
        self.connects += 1;
        if self.connects <= self.failed_connects {
            return Err("association rejected");
        }
        if self.visible.iter().any(|s| s == ssid) {
            self.linked = true;
        }
        Ok(())
    }
}

/// 2x2 RGBA PNG: red, green / blue, half-transparent white
pub const PNG_RGBA_2X2: [u8; 76] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x02, 0x08, 0x06, 0x00, 0x00, 0x00, 0x72, 0xb6, 0x0d,
    0x24, 0x00, 0x00, 0x00, 0x13, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xf8, 0xcf, 0xc0, 0xf0,
    0x1f, 0x0c, 0x81, 0x34, 0x08, 0x34, 0x00, 0x00, 0x49, 0x49, 0x09, 0x78, 0x28, 0xa0, 0xdb, 0x77,
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

/// 3x2 RGB PNG: (10,20,30) (40,50,60) (70,80,90) / black, white, (1,2,3)
pub const PNG_RGB_3X2: [u8; 84] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x02, 0x08, 0x02, 0x00, 0x00, 0x00, 0x12, 0x16, 0xf1,
    0x4d, 0x00, 0x00, 0x00, 0x1b, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0xe0, 0x12, 0x91, 0xd3,
    0x30, 0xb2, 0x71, 0x0b, 0x88, 0x62, 0x00, 0x82, 0xff, 0xff, 0xff, 0x33, 0x32, 0x31, 0x03, 0x00,
    0x27, 0x15, 0x04, 0xc6, 0xc5, 0x24, 0xd8, 0xe3, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44,
    0xae, 0x42, 0x60, 0x82,
];
