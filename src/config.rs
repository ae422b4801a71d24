//! Badge configuration
//!
//! Endpoints and tuning constants live in [`Config`]; per-user details come
//! from `SECRETS.TXT` on the SD card:
//!
//! ```text
//! WIFI_SSID = "conference"
//! WIFI_PASSWORD = "hunter2"
//! GITHUB_USERNAME = "octocat"
//! LINKEDIN_PROFILE_URL = None
//! ```

use alloc::string::{String, ToString};

use log::{info, warn};

use crate::storage::{SECRETS_FILE, Storage};

/// User agent sent with every request
pub const USER_AGENT: &str = "GitHub Universe Badge 2025";

pub const DETAILS_URL: &str = "https://api.github.com/users/{user}";
pub const CONTRIB_URL: &str = "https://github.com/{user}.contribs";
pub const AVATAR_URL: &str = "https://wsrv.nl/?url=https://github.com/{user}.png&w=75&output=png";
pub const SHORTENER_URL: &str = "http://tinyurl.com/api-create.php?url={url}";

/// Time allowed for the WiFi association before giving up
pub const WIFI_TIMEOUT_MS: u64 = 60_000;
/// Bytes moved per fetch step
pub const CHUNK_SIZE: usize = 512;
/// Largest avatar/QR image accepted (a 75x75 avatar is 5625 pixels)
pub const MAX_IMAGE_PIXELS: u32 = 128 * 128;

/// Largest secrets file we read
const MAX_SECRETS_LEN: usize = 1024;

/// Endpoints and limits used by the fetch scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub details_url: String,
    pub contrib_url: String,
    pub avatar_url: String,
    pub shortener_url: String,
    pub user_agent: &'static str,
    pub wifi_timeout_ms: u64,
    pub chunk_size: usize,
    pub max_image_pixels: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            details_url: DETAILS_URL.to_string(),
            contrib_url: CONTRIB_URL.to_string(),
            avatar_url: AVATAR_URL.to_string(),
            shortener_url: SHORTENER_URL.to_string(),
            user_agent: USER_AGENT,
            wifi_timeout_ms: WIFI_TIMEOUT_MS,
            chunk_size: CHUNK_SIZE,
            max_image_pixels: MAX_IMAGE_PIXELS,
        }
    }
}

impl Config {
    pub fn with_details_url(mut self, template: &str) -> Self {
        self.details_url = template.to_string();
        self
    }

    pub fn with_contrib_url(mut self, template: &str) -> Self {
        self.contrib_url = template.to_string();
        self
    }

    pub fn with_avatar_url(mut self, template: &str) -> Self {
        self.avatar_url = template.to_string();
        self
    }

    pub fn with_shortener_url(mut self, template: &str) -> Self {
        self.shortener_url = template.to_string();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Headers sent with every request
    pub fn headers(&self) -> [(&'static str, &'static str); 1] {
        [("User-Agent", self.user_agent)]
    }
}

/// Substitute `{user}` in an endpoint template
pub fn url_for(template: &str, user: &str) -> String {
    template.replace("{user}", user)
}

/// Credentials and account details read from `SECRETS.TXT`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub wifi_ssid: Option<String>,
    pub wifi_password: Option<String>,
    pub github_username: Option<String>,
    pub linkedin_url: Option<String>,
}

impl Secrets {
    /// Parse `KEY=value` lines. Values may be quoted; empty values and
    /// `None` leave the key unset. Unknown keys are ignored.
    pub fn parse(text: &str) -> Self {
        let mut secrets = Self::default();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            let value = unquote(value.trim());
            let value = (!value.is_empty() && value != "None").then(|| value.to_string());

            match key.trim() {
                "WIFI_SSID" => secrets.wifi_ssid = value,
                "WIFI_PASSWORD" => secrets.wifi_password = value,
                "GITHUB_USERNAME" => secrets.github_username = value,
                "LINKEDIN_PROFILE_URL" => secrets.linkedin_url = value,
                other => warn!("Unknown secrets key: {}", other),
            }
        }

        secrets
    }

    /// Read and parse the secrets file, treating a missing or unreadable
    /// file as empty
    pub fn load<S: Storage>(storage: &mut S) -> Self {
        match storage.read_to_end(SECRETS_FILE, MAX_SECRETS_LEN) {
            Ok(bytes) => {
                let secrets = Self::parse(&String::from_utf8_lossy(&bytes));
                info!(
                    "Secrets loaded: ssid={:?} user={:?}",
                    secrets.wifi_ssid, secrets.github_username
                );
                secrets
            }
            Err(e) => {
                warn!("No secrets: {}", e);
                Self::default()
            }
        }
    }

    /// An SSID and a username are the minimum to fetch anything
    pub fn is_complete(&self) -> bool {
        self.wifi_ssid.is_some() && self.github_username.is_some()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
