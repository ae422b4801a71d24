//! Best-effort WiFi association
//!
//! [`Association::poll`] is called every frame and never waits on the
//! radio for longer than one scan and one connect request. Access points
//! can drop out of scans intermittently, so a missing SSID or a rejected
//! request is retried on the next frame until the timeout runs out.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;

use log::{info, warn};

/// How often the "still scanning" notice is logged
const NOTICE_INTERVAL_MS: u64 = 3_000;

/// Link state as seen by the fetch scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    NotAttempted,
    Connecting,
    /// Timed out; stays failed until re-armed
    Failed,
    Connected,
}

/// Station-mode radio operations
#[allow(async_fn_in_trait)]
pub trait Radio {
    type Error: Debug;

    /// Whether the station currently has a usable link
    fn is_connected(&mut self) -> bool;

    /// SSIDs of the access points in range
    async fn scan(&mut self) -> Result<Vec<String>, Self::Error>;

    /// Request association. Returns once the request is made, which may be
    /// before the link is up.
    async fn connect(&mut self, ssid: &str, password: Option<&str>) -> Result<(), Self::Error>;
}

/// Association attempt with a wall-clock timeout
#[derive(Debug)]
pub struct Association {
    ssid: String,
    password: Option<String>,
    timeout_ms: u64,
    started_at: Option<u64>,
    last_notice: Option<u64>,
    state: Connectivity,
}

impl Association {
    pub fn new(ssid: String, password: Option<String>, timeout_ms: u64) -> Self {
        Self {
            ssid,
            password,
            timeout_ms,
            started_at: None,
            last_notice: None,
            state: Connectivity::NotAttempted,
        }
    }

    pub fn state(&self) -> Connectivity {
        self.state
    }

    /// Treat the link as up without touching the radio
    pub fn mark_connected(&mut self) {
        self.state = Connectivity::Connected;
    }

    /// Start over with a fresh timeout on the next poll
    pub fn rearm(&mut self) {
        self.started_at = None;
        self.last_notice = None;
        self.state = Connectivity::NotAttempted;
    }

    /// Make one association attempt at time `now_ms` and report the state.
    /// The timeout starts at the first poll after creation or re-arming.
    pub async fn poll<R: Radio>(&mut self, radio: &mut R, now_ms: u64) -> Connectivity {
        if matches!(self.state, Connectivity::Failed | Connectivity::Connected) {
            return self.state;
        }

        let started_at = *self.started_at.get_or_insert(now_ms);
        let within = now_ms.saturating_sub(started_at) < self.timeout_ms;

        self.state = self.attempt(radio, now_ms, within).await;
        if self.state == Connectivity::Failed {
            warn!("WiFi association timed out");
        }
        self.state
    }

    async fn attempt<R: Radio>(&mut self, radio: &mut R, now_ms: u64, within: bool) -> Connectivity {
        let still_trying = if within {
            Connectivity::Connecting
        } else {
            Connectivity::Failed
        };

        if radio.is_connected() {
            return Connectivity::Connected;
        }

        let visible = match radio.scan().await {
            Ok(ssids) => ssids.iter().any(|s| *s == self.ssid),
            Err(e) => {
                warn!("Scan failed: {:?}", e);
                false
            }
        };

        if !visible {
            if within && self.notice_due(now_ms) {
                info!("SSID not visible yet; rescanning...");
            }
            return still_trying;
        }

        if let Err(e) = radio.connect(&self.ssid, self.password.as_deref()).await {
            warn!("Connect request failed: {:?}", e);
            return still_trying;
        }
        info!("Connecting to WiFi...");

        if radio.is_connected() {
            info!("WiFi connected to {}", self.ssid);
            Connectivity::Connected
        } else {
            still_trying
        }
    }

    fn notice_due(&mut self, now_ms: u64) -> bool {
        let due = self
            .last_notice
            .is_none_or(|last| now_ms.saturating_sub(last) >= NOTICE_INTERVAL_MS);
        if due {
            self.last_notice = Some(now_ms);
        }
        due
    }
}
