//! The badge owner's record, filled in as fetches complete

use alloc::string::String;

use crate::image::Image;
use crate::profile::{Contributions, Profile};

/// Everything the card shows about the user
#[derive(Debug, Clone, Default)]
pub struct User {
    /// GitHub handle; replaced by the canonical login once the profile loads
    pub handle: Option<String>,
    pub profile: Option<Profile>,
    pub contributions: Option<Contributions>,
    pub avatar: Option<Image>,
    /// Secondary profile linked by the QR code
    pub linkedin_url: Option<String>,
    pub short_url: Option<String>,
    pub qr: Option<Image>,
}

impl User {
    pub fn new(handle: Option<String>, linkedin_url: Option<String>) -> Self {
        Self {
            handle,
            linkedin_url,
            ..Self::default()
        }
    }

    /// Clear every fetched and derived field. Identity and the configured
    /// secondary URL survive.
    pub fn reset(&mut self) {
        self.profile = None;
        self.contributions = None;
        self.avatar = None;
        self.short_url = None;
        self.qr = None;
    }

    /// Store the parsed profile, adopting its login as the handle
    pub fn apply_profile(&mut self, profile: Profile) {
        self.handle = Some(profile.login.clone());
        self.profile = Some(profile);
    }

    /// Display name, if the profile has one
    pub fn display_name(&self) -> Option<&str> {
        self.profile.as_ref()?.name.as_deref()
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn has_linkedin(&self) -> bool {
        self.linkedin_url.is_some()
    }
}
