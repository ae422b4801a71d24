//! Chunked network-to-disk downloads
//!
//! A [`FetchTask`] copies one URL into one file, a single bounded read per
//! [`FetchTask::step`]. The render loop drives it once per frame, so a
//! download never holds the loop for longer than one read and one append.

use alloc::string::String;

use embedded_io_async::{Error as _, ErrorKind, Read};
use log::{debug, info};
use thiserror::Error;

use crate::http::HttpError;
use crate::image::ImageError;
use crate::net::Network;
use crate::profile::ParseError;
use crate::storage::{Storage, StorageError};

/// Fetch error types
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] HttpError),
    #[error("stream read failed: {0:?}")]
    Read(ErrorKind),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    #[error("image: {0}")]
    Image(#[from] ImageError),
    #[error("no user handle configured")]
    NoHandle,
}

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Bytes were appended; call again
    Pending(usize),
    /// Source exhausted and stream closed; the file is complete
    Finished,
}

/// Resumable download of `url` into the file `path`
pub struct FetchTask<S> {
    url: String,
    path: &'static str,
    written: usize,
    done: bool,
    stream: Option<S>,
}

impl<S: Read> FetchTask<S> {
    /// Create a task. No I/O happens until the first step.
    pub fn new(url: String, path: &'static str) -> Self {
        Self {
            url,
            path,
            written: 0,
            done: false,
            stream: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &'static str {
        self.path
    }

    /// Bytes appended to the file so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance the download by one bounded read.
    ///
    /// The first step empties the destination file and opens the stream.
    /// A zero-length read completes the task. On error the stream is
    /// dropped and the task must be discarded.
    pub async fn step<N, St>(
        &mut self,
        net: &mut N,
        storage: &mut St,
        headers: &[(&str, &str)],
        buf: &mut [u8],
    ) -> Result<Step, FetchError>
    where
        N: Network<Stream = S>,
        St: Storage,
    {
        if self.done {
            return Ok(Step::Finished);
        }

        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                storage.truncate(self.path)?;
                net.open(&self.url, headers).await?
            }
        };

        let n = stream
            .read(buf)
            .await
            .map_err(|e| FetchError::Read(e.kind()))?;

        if n == 0 {
            self.done = true;
            info!("Fetched {} bytes from {} to {}", self.written, self.url, self.path);
            return Ok(Step::Finished);
        }

        storage.append(self.path, &buf[..n])?;
        self.written += n;
        self.stream = Some(stream);

        debug!("Fetched {} bytes", self.written);
        Ok(Step::Pending(n))
    }
}
