//! Profile and contribution JSON
//!
//! Profile format (`/users/{user}`), unknown fields ignored:
//! ```json
//! {"login": "octocat", "name": "The Octocat", "followers": 42, "public_repos": 8}
//! ```
//!
//! Contribution format (`/{user}.contribs`):
//! ```json
//! {"total_contributions": 1234,
//!  "weeks": [{"contribution_days": [{"level": 0}, {"level": 3}]}]}
//! ```

use core::fmt;
use core::marker::PhantomData;

use alloc::string::{String, ToString};
use alloc::vec;
use heapless::Vec;
use log::info;
use serde::Deserialize;
use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use thiserror::Error;

/// Weeks in the contribution graph
pub const WEEKS: usize = 53;
/// Days per week
pub const DAYS: usize = 7;
/// Highest contribution level
pub const MAX_LEVEL: u8 = 4;

/// Longest display name we keep, in bytes; longer names are cut
const MAX_NAME_LEN: usize = 64;
/// GitHub logins are at most 39 characters
const MAX_LOGIN_LEN: usize = 40;

/// Parse error types
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid JSON document")]
    Json,
}

/// Fields of the user details document the card shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: Option<String>,
    pub login: String,
    pub followers: u32,
    pub repos: u32,
}

/// Contribution total and level matrix, `levels[day][week]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contributions {
    pub total: u32,
    pub levels: [[u8; WEEKS]; DAYS],
}

impl Default for Contributions {
    fn default() -> Self {
        Self {
            total: 0,
            levels: [[0; WEEKS]; DAYS],
        }
    }
}

#[derive(Deserialize)]
struct RawProfile {
    name: Option<Clipped<MAX_NAME_LEN>>,
    login: Clipped<MAX_LOGIN_LEN>,
    #[serde(default)]
    followers: u32,
    #[serde(default)]
    public_repos: u32,
}

#[derive(Deserialize)]
struct RawDay {
    #[serde(default)]
    level: u8,
}

#[derive(Deserialize)]
struct RawWeek {
    contribution_days: Capped<RawDay, DAYS>,
}

#[derive(Deserialize)]
struct RawContributions {
    total_contributions: u32,
    weeks: Capped<RawWeek, WEEKS>,
}

/// JSON string cut down to at most `N` bytes on a character boundary
struct Clipped<const N: usize>(String);

impl<'de, const N: usize> Deserialize<'de> for Clipped<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ClippedVisitor<const N: usize>;

        impl<'de, const N: usize> Visitor<'de> for ClippedVisitor<N> {
            type Value = Clipped<N>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                let mut end = v.len().min(N);
                while !v.is_char_boundary(end) {
                    end -= 1;
                }
                Ok(Clipped(v[..end].to_string()))
            }
        }

        deserializer.deserialize_str(ClippedVisitor)
    }
}

/// JSON array keeping the first `N` elements and skipping the rest
struct Capped<T, const N: usize>(Vec<T, N>);

impl<'de, T: Deserialize<'de>, const N: usize> Deserialize<'de> for Capped<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CappedVisitor<T, const N: usize>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>, const N: usize> Visitor<'de> for CappedVisitor<T, N> {
            type Value = Capped<T, N>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an array")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut items = Vec::new();
                while !items.is_full() {
                    match seq.next_element()? {
                        Some(item) => {
                            let _ = items.push(item);
                        }
                        None => return Ok(Capped(items)),
                    }
                }
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(Capped(items))
            }
        }

        deserializer.deserialize_seq(CappedVisitor(PhantomData))
    }
}

/// Parse the user details document
///
/// Escapes in strings are decoded. An unescaped string is never longer than
/// its escaped form, so a buffer the size of the document always fits.
pub fn parse_profile(json: &[u8]) -> Result<Profile, ParseError> {
    let mut unescape = vec![0u8; json.len()];
    let (raw, _): (RawProfile, _) =
        serde_json_core::from_slice_escaped(json, &mut unescape).map_err(|_| ParseError::Json)?;

    let profile = Profile {
        name: raw.name.map(|n| n.0),
        login: raw.login.0,
        followers: raw.followers,
        repos: raw.public_repos,
    };
    info!(
        "Profile: {} ({} followers, {} repos)",
        profile.login, profile.followers, profile.repos
    );
    Ok(profile)
}

/// Parse the contribution calendar into a 7 x 53 level matrix
pub fn parse_contributions(json: &[u8]) -> Result<Contributions, ParseError> {
    let (raw, _): (RawContributions, _) =
        serde_json_core::from_slice(json).map_err(|_| ParseError::Json)?;

    let mut contributions = Contributions {
        total: raw.total_contributions,
        ..Contributions::default()
    };
    for (week, days) in raw.weeks.0.iter().enumerate() {
        for (day, entry) in days.contribution_days.0.iter().enumerate() {
            contributions.levels[day][week] = entry.level.min(MAX_LEVEL);
        }
    }

    info!("Contributions: {} total", contributions.total);
    Ok(contributions)
}
