//! Contribution badge firmware
//!
//! Shows a GitHub identity card (name, handle, avatar, contribution graph and
//! a QR code for a secondary profile) on a small LCD badge. Remote data is
//! fetched over WiFi one bounded chunk per frame so the render loop keeps a
//! steady frame rate while downloads are in flight.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app;
pub mod card;
pub mod config;
pub mod fetch;
pub mod framebuffer;
pub mod http;
pub mod image;
pub mod net;
pub mod panel;
pub mod profile;
pub mod scheduler;
pub mod shorten;
pub mod storage;
pub mod tls;
pub mod user;
pub mod wifi;

#[cfg(test)]
mod testing;
