//! Per-frame badge update

use log::info;

use crate::config::{Config, Secrets};
use crate::net::Network;
use crate::scheduler::{RenderHint, Scheduler};
use crate::storage::{AVATAR_FILE, PROFILE_FILE, Storage};
use crate::user::User;
use crate::wifi::{Association, Connectivity, Radio};

/// Button levels sampled for the frame, `true` while held
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buttons {
    pub a: bool,
    pub b: bool,
    pub c: bool,
}

impl Buttons {
    /// A and C together request a reload
    pub fn reload(&self) -> bool {
        self.a && self.c
    }
}

/// Screen to draw for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// No SSID or no username in the secrets file
    MissingDetails,
    /// WiFi association timed out
    ConnectionFailed,
    Card(RenderHint),
}

/// Badge application state
pub struct Badge<N: Network, S: Storage, R: Radio> {
    scheduler: Scheduler<N, S>,
    radio: R,
    user: User,
    secrets: Secrets,
    association: Option<Association>,
    reload_held: bool,
}

impl<N: Network, S: Storage, R: Radio> Badge<N, S, R> {
    /// Load the secrets and decide whether the card can start from the
    /// cache: with the profile and avatar on storage the badge starts out
    /// connected and never waits for WiFi.
    pub fn new(net: N, mut storage: S, radio: R, config: Config) -> Self {
        let secrets = Secrets::load(&mut storage);
        let cached = storage.exists(PROFILE_FILE) && storage.exists(AVATAR_FILE);

        let mut badge = Self {
            scheduler: Scheduler::new(net, storage, config),
            radio,
            user: User::default(),
            secrets: Secrets::default(),
            association: None,
            reload_held: false,
        };
        badge.apply_secrets(secrets);

        if cached {
            if let Some(association) = badge.association.as_mut() {
                info!("Cached profile found, starting from storage");
                association.mark_connected();
            }
        }
        badge
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn connectivity(&self) -> Connectivity {
        self.association
            .as_ref()
            .map_or(Connectivity::NotAttempted, Association::state)
    }

    pub fn scheduler(&self) -> &Scheduler<N, S> {
        &self.scheduler
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Run one frame at time `now_ms` and return what to draw
    pub async fn frame(&mut self, now_ms: u64, buttons: Buttons) -> Screen {
        let reload = buttons.reload();
        if reload && !self.reload_held {
            self.reload();
        }
        self.reload_held = reload;

        if !self.secrets.is_complete() {
            return Screen::MissingDetails;
        }
        let Some(association) = self.association.as_mut() else {
            return Screen::MissingDetails;
        };

        let link = association.poll(&mut self.radio, now_ms).await;
        if link == Connectivity::Failed {
            return Screen::ConnectionFailed;
        }

        Screen::Card(self.scheduler.advance(&mut self.user, link).await)
    }

    fn reload(&mut self) {
        info!("Reload requested");
        if !self.secrets.is_complete() {
            let secrets = Secrets::load(self.scheduler.storage());
            self.apply_secrets(secrets);
        }
        self.scheduler.reset(&mut self.user);
        if let Some(association) = self.association.as_mut() {
            association.rearm();
        }
    }

    fn apply_secrets(&mut self, secrets: Secrets) {
        let timeout = self.scheduler.config().wifi_timeout_ms;
        self.association = secrets
            .wifi_ssid
            .clone()
            .map(|ssid| Association::new(ssid, secrets.wifi_password.clone(), timeout));
        self.user = User::new(secrets.github_username.clone(), secrets.linkedin_url.clone());
        self.secrets = secrets;
    }
}
