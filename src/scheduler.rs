//! Incremental fetch scheduler
//!
//! [`Scheduler::advance`] is called once per render frame. It picks the
//! first missing piece of the user record in a fixed order:
//!
//! 1. profile JSON
//! 2. contribution JSON
//! 3. avatar PNG
//! 4. short LinkedIn URL (only with a LinkedIn URL configured)
//! 5. QR image (only with a LinkedIn URL configured)
//!
//! The first three are downloaded to storage by a [`FetchTask`], one chunk
//! per frame, then parsed into the record. A file already on storage is
//! parsed straight away unless a refresh was forced. The last two are
//! single calls. Any failure is reported for that frame and the work is
//! retried from scratch on a later one.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;

use log::{debug, info, warn};

use crate::config::{self, Config};
use crate::fetch::{FetchError, FetchTask, Step};
use crate::image::Image;
use crate::net::Network;
use crate::profile;
use crate::shorten;
use crate::storage::{AVATAR_FILE, CONTRIB_FILE, PROFILE_FILE, QR_FILE, Storage};
use crate::user::User;
use crate::wifi::Connectivity;

/// Largest profile document accepted from storage
const MAX_PROFILE_LEN: usize = 8 * 1024;
/// Largest contribution document accepted from storage
const MAX_CONTRIB_LEN: usize = 64 * 1024;
/// Largest PNG accepted from storage
const MAX_PNG_LEN: usize = 32 * 1024;

/// Position of a user record in the fetch order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NeedProfile,
    NeedContributions,
    NeedAvatar,
    NeedShortUrl,
    NeedQr,
    Ready,
}

impl Stage {
    /// First missing piece of `user`
    pub fn of(user: &User) -> Self {
        if user.profile.is_none() {
            Stage::NeedProfile
        } else if user.contributions.is_none() {
            Stage::NeedContributions
        } else if user.avatar.is_none() {
            Stage::NeedAvatar
        } else if user.has_linkedin() && user.short_url.is_none() {
            Stage::NeedShortUrl
        } else if user.has_linkedin() && user.qr.is_none() {
            Stage::NeedQr
        } else {
            Stage::Ready
        }
    }
}

/// What the card shows in its status line this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderHint {
    Connecting,
    FetchingProfile,
    FetchingContributions,
    FetchingAvatar,
    ShorteningUrl,
    LoadingQr,
    FetchError,
    Ready,
}

impl RenderHint {
    /// Status line text. `Ready` has none; the card shows the handle.
    pub fn caption(&self) -> Option<&'static str> {
        match self {
            RenderHint::Connecting => Some("connecting..."),
            RenderHint::FetchingProfile => Some("fetching user data..."),
            RenderHint::FetchingContributions => Some("fetching contributions..."),
            RenderHint::FetchingAvatar => Some("fetching avatar..."),
            RenderHint::ShorteningUrl => Some("shortening LinkedIn URL..."),
            RenderHint::LoadingQr => Some("loading QR code..."),
            RenderHint::FetchError => Some("fetch error"),
            RenderHint::Ready => None,
        }
    }
}

/// Downloaded resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Profile,
    Contributions,
    Avatar,
}

impl Resource {
    pub fn file(&self) -> &'static str {
        match self {
            Resource::Profile => PROFILE_FILE,
            Resource::Contributions => CONTRIB_FILE,
            Resource::Avatar => AVATAR_FILE,
        }
    }

    fn template<'c>(&self, config: &'c Config) -> &'c str {
        match self {
            Resource::Profile => &config.details_url,
            Resource::Contributions => &config.contrib_url,
            Resource::Avatar => &config.avatar_url,
        }
    }

    fn max_len(&self) -> usize {
        match self {
            Resource::Profile => MAX_PROFILE_LEN,
            Resource::Contributions => MAX_CONTRIB_LEN,
            Resource::Avatar => MAX_PNG_LEN,
        }
    }

    fn hint(&self) -> RenderHint {
        match self {
            Resource::Profile => RenderHint::FetchingProfile,
            Resource::Contributions => RenderHint::FetchingContributions,
            Resource::Avatar => RenderHint::FetchingAvatar,
        }
    }
}

/// Drives the fetches for one user record
pub struct Scheduler<N: Network, S: Storage> {
    net: N,
    storage: S,
    config: Config,
    task: Option<(Resource, FetchTask<N::Stream>)>,
    /// Chunk buffer, allocated while a download is running
    buf: Option<Box<[u8]>>,
    force_refresh: bool,
}

impl<N: Network, S: Storage> Scheduler<N, S> {
    pub fn new(net: N, storage: S, config: Config) -> Self {
        Self {
            net,
            storage,
            config,
            task: None,
            buf: None,
            force_refresh: false,
        }
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    pub fn storage(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn force_refresh(&self) -> bool {
        self.force_refresh
    }

    /// Resource being downloaded and bytes written so far
    pub fn active_task(&self) -> Option<(Resource, usize)> {
        self.task
            .as_ref()
            .map(|(resource, task)| (*resource, task.written()))
    }

    /// Do one bounded unit of work towards completing `user`.
    ///
    /// Without a link nothing happens and any running download is kept for
    /// when the link returns.
    pub async fn advance(&mut self, user: &mut User, link: Connectivity) -> RenderHint {
        if link != Connectivity::Connected {
            return RenderHint::Connecting;
        }

        match Stage::of(user) {
            Stage::NeedProfile => self.populate(user, Resource::Profile).await,
            Stage::NeedContributions => self.populate(user, Resource::Contributions).await,
            Stage::NeedAvatar => self.populate(user, Resource::Avatar).await,
            Stage::NeedShortUrl => {
                self.shorten(user).await;
                RenderHint::ShorteningUrl
            }
            Stage::NeedQr => match self.load_qr(user) {
                Ok(()) => RenderHint::LoadingQr,
                Err(e) => {
                    warn!("QR loading failed: {}", e);
                    RenderHint::FetchError
                }
            },
            Stage::Ready => {
                if self.force_refresh {
                    info!("Refresh complete");
                    self.force_refresh = false;
                }
                RenderHint::Ready
            }
        }
    }

    /// Forget everything fetched for `user` and bypass the cached files
    /// until the record is complete again
    pub fn reset(&mut self, user: &mut User) {
        info!("Resetting user data");
        user.reset();
        self.task = None;
        self.buf = None;
        self.force_refresh = true;
    }

    async fn populate(&mut self, user: &mut User, resource: Resource) -> RenderHint {
        match self.step(user, resource).await {
            Ok(()) => resource.hint(),
            Err(e) => {
                warn!("Fetch of {} failed: {}", resource.file(), e);
                RenderHint::FetchError
            }
        }
    }

    async fn step(&mut self, user: &mut User, resource: Resource) -> Result<(), FetchError> {
        if self.task.as_ref().is_some_and(|(r, _)| *r != resource) {
            self.task = None;
        }

        if self.task.is_none() {
            if !self.force_refresh && self.storage.exists(resource.file()) {
                match self.load(user, resource) {
                    Ok(()) => {
                        info!("Using cached {}", resource.file());
                        return Ok(());
                    }
                    Err(e) => warn!("Cached {} unusable ({}), refetching", resource.file(), e),
                }
            }

            let handle = user.handle().ok_or(FetchError::NoHandle)?;
            let url = config::url_for(resource.template(&self.config), handle);
            info!("Fetching {} to {}", url, resource.file());
            self.task = Some((resource, FetchTask::new(url, resource.file())));
        }

        let Some((_, task)) = self.task.as_mut() else {
            return Ok(());
        };
        let chunk_size = self.config.chunk_size;
        let buf = self
            .buf
            .get_or_insert_with(|| vec![0u8; chunk_size].into_boxed_slice());
        let headers = self.config.headers();

        let step = task
            .step(&mut self.net, &mut self.storage, &headers, buf)
            .await;

        match step {
            Ok(Step::Pending(n)) => {
                debug!("{}: +{} bytes", resource.file(), n);
                Ok(())
            }
            Ok(Step::Finished) => {
                self.task = None;
                self.buf = None;
                self.load(user, resource)
            }
            Err(e) => {
                self.task = None;
                self.buf = None;
                Err(e)
            }
        }
    }

    /// Parse a downloaded file into `user`
    fn load(&mut self, user: &mut User, resource: Resource) -> Result<(), FetchError> {
        let bytes = self
            .storage
            .read_to_end(resource.file(), resource.max_len())?;

        match resource {
            Resource::Profile => user.apply_profile(profile::parse_profile(&bytes)?),
            Resource::Contributions => {
                user.contributions = Some(profile::parse_contributions(&bytes)?)
            }
            Resource::Avatar => {
                user.avatar = Some(Image::decode(&bytes, self.config.max_image_pixels)?)
            }
        }
        Ok(())
    }

    async fn shorten(&mut self, user: &mut User) {
        let Some(long_url) = user.linkedin_url.clone() else {
            return;
        };
        info!("Shortening LinkedIn URL...");
        let headers = self.config.headers();
        let short: String = shorten::shorten_url(
            &mut self.net,
            &self.config.shortener_url,
            &long_url,
            &headers,
        )
        .await;
        user.short_url = Some(short);
    }

    fn load_qr(&mut self, user: &mut User) -> Result<(), FetchError> {
        info!("Loading LinkedIn QR code...");
        let bytes = self.storage.read_to_end(QR_FILE, MAX_PNG_LEN)?;
        user.qr = Some(Image::decode(&bytes, self.config.max_image_pixels)?);
        info!("LinkedIn QR code loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec::Vec;

    use crate::testing::{MemStorage, MockNetwork, PNG_RGB_3X2, PNG_RGBA_2X2, Script, block_on};

    const PROFILE_URL: &str = "https://api.github.com/users/octocat";
    const CONTRIB_URL: &str = "https://github.com/octocat.contribs";
    const AVATAR_URL: &str = "https://wsrv.nl/?url=https://github.com/octocat.png&w=75&output=png";
    const LINKEDIN: &str = "https://www.linkedin.com/in/octocat-the-cat";
    const SHORTEN_URL: &str = "http://tinyurl.com/api-create.php?url=https%3A%2F%2Fwww.linkedin.com%2Fin%2Foctocat-the-cat";

    const PROFILE_JSON: &[u8] =
        br#"{"login": "octocat", "name": "The Octocat", "followers": 42, "public_repos": 8}"#;
    const CONTRIB_JSON: &[u8] =
        br#"{"total_contributions": 5, "weeks": [{"contribution_days": [{"level": 1}]}]}"#;

    type TestScheduler = Scheduler<MockNetwork, MemStorage>;

    fn user() -> User {
        User::new(Some("octocat".to_string()), None)
    }

    fn scheduler(net: MockNetwork, storage: MemStorage) -> TestScheduler {
        Scheduler::new(net, storage, Config::default())
    }

    fn online_network(chunk: usize) -> MockNetwork {
        MockNetwork::default()
            .serve(PROFILE_URL, Script::new(PROFILE_JSON, chunk))
            .serve(CONTRIB_URL, Script::new(CONTRIB_JSON, chunk))
            .serve(AVATAR_URL, Script::new(&PNG_RGBA_2X2, chunk))
    }

    fn cached_storage() -> MemStorage {
        MemStorage::default()
            .with_file(PROFILE_FILE, PROFILE_JSON)
            .with_file(CONTRIB_FILE, CONTRIB_JSON)
            .with_file(AVATAR_FILE, &PNG_RGBA_2X2)
    }

    fn advance(s: &mut TestScheduler, user: &mut User) -> RenderHint {
        block_on(s.advance(user, Connectivity::Connected))
    }

    /// Advance until the stage changes, returning the number of calls
    fn run_stage(s: &mut TestScheduler, user: &mut User) -> usize {
        let stage = Stage::of(user);
        let mut calls = 0;
        while Stage::of(user) == stage {
            calls += 1;
            assert_ne!(advance(s, user), RenderHint::FetchError);
            assert!(calls < 1000);
        }
        calls
    }

    #[test]
    fn test_captions() {
        assert_eq!(RenderHint::Connecting.caption(), Some("connecting..."));
        assert_eq!(RenderHint::FetchingProfile.caption(), Some("fetching user data..."));
        assert_eq!(RenderHint::ShorteningUrl.caption(), Some("shortening LinkedIn URL..."));
        assert_eq!(RenderHint::FetchError.caption(), Some("fetch error"));
        assert_eq!(RenderHint::Ready.caption(), None);
    }

    #[test]
    fn test_no_bytes_never_leaves_profile_stage() {
        let mut s = scheduler(
            MockNetwork::default().serve(PROFILE_URL, Script::new(b"", 64)),
            MemStorage::default(),
        );
        let mut user = user();

        for _ in 0..10 {
            assert_eq!(advance(&mut s, &mut user), RenderHint::FetchError);
            assert_eq!(Stage::of(&user), Stage::NeedProfile);
        }

        let mut s = scheduler(MockNetwork::default(), MemStorage::default());
        for _ in 0..10 {
            assert_eq!(advance(&mut s, &mut user), RenderHint::FetchError);
            assert_eq!(Stage::of(&user), Stage::NeedProfile);
            assert!(s.active_task().is_none());
        }
    }

    #[test]
    fn test_fetches_in_priority_order() {
        let mut s = scheduler(online_network(16), MemStorage::default());
        let mut user = user();

        let profile_calls = run_stage(&mut s, &mut user);
        assert_eq!(profile_calls, PROFILE_JSON.len().div_ceil(16) + 1);
        assert_eq!(Stage::of(&user), Stage::NeedContributions);
        assert_eq!(user.display_name(), Some("The Octocat"));

        let contrib_calls = run_stage(&mut s, &mut user);
        assert_eq!(contrib_calls, CONTRIB_JSON.len().div_ceil(16) + 1);
        assert_eq!(user.contributions.as_ref().unwrap().total, 5);

        run_stage(&mut s, &mut user);
        assert_eq!(user.avatar.as_ref().unwrap().width(), 2);

        assert_eq!(advance(&mut s, &mut user), RenderHint::Ready);
        assert_eq!(s.net.opened, [PROFILE_URL, CONTRIB_URL, AVATAR_URL]);
        assert_eq!(s.storage.files[PROFILE_FILE], PROFILE_JSON);
        assert_eq!(s.storage.files[AVATAR_FILE], PNG_RGBA_2X2);
    }

    #[test]
    fn test_hint_follows_active_resource() {
        let mut s = scheduler(online_network(16), MemStorage::default());
        let mut user = user();

        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingProfile);
        assert_eq!(s.active_task(), Some((Resource::Profile, 16)));
        assert!(s.buf.is_some());

        run_stage(&mut s, &mut user);
        assert!(s.active_task().is_none());
        assert!(s.buf.is_none());

        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingContributions);
    }

    #[test]
    fn test_cached_files_skip_the_network() {
        let mut s = scheduler(MockNetwork::default(), cached_storage());
        let mut user = user();

        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingProfile);
        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingContributions);
        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingAvatar);
        assert_eq!(advance(&mut s, &mut user), RenderHint::Ready);

        assert!(s.net.opened.is_empty());
        assert_eq!(user.handle(), Some("octocat"));
    }

    #[test]
    fn test_read_failure_restarts_from_zero() {
        // only complete once all 1000 bytes are in
        let head: &[u8] = br#"{"login": "octocat","#;
        let tail: &[u8] = br#" "name": "The Octocat", "followers": 42, "public_repos": 8}"#;
        let mut body: Vec<u8> = head.to_vec();
        body.resize(1000 - tail.len(), b' ');
        body.extend_from_slice(tail);
        let net = MockNetwork::default().serve(PROFILE_URL, Script::new(&body, 300).failing_at(2));
        let mut s = scheduler(net, MemStorage::default());
        let mut user = user();

        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingProfile);
        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingProfile);
        assert!(s.buf.is_some());
        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchError);
        assert!(s.active_task().is_none());
        assert!(s.buf.is_none());
        assert_eq!(s.storage.files[PROFILE_FILE], body[..600]);

        s.net.scripts.insert(PROFILE_URL.to_string(), Script::new(&body, 300));
        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingProfile);
        assert_eq!(s.active_task(), Some((Resource::Profile, 300)));
        assert_eq!(s.storage.len_of(PROFILE_FILE), Some(300));
        assert_eq!(s.net.opens_of(PROFILE_URL), 2);

        run_stage(&mut s, &mut user);
        assert_eq!(s.storage.files[PROFILE_FILE], body);
        assert_eq!(user.profile.as_ref().unwrap().followers, 42);
    }

    #[test]
    fn test_corrupt_cache_is_refetched() {
        let storage = MemStorage::default().with_file(PROFILE_FILE, br#"{"login": "oct"#);
        let mut s = scheduler(online_network(512), storage);
        let mut user = user();

        run_stage(&mut s, &mut user);
        assert_eq!(s.net.opens_of(PROFILE_URL), 1);
        assert_eq!(s.storage.files[PROFILE_FILE], PROFILE_JSON);
    }

    #[test]
    fn test_reset_forces_refetch() {
        let mut s = scheduler(online_network(512), cached_storage());
        let mut user = user();
        while advance(&mut s, &mut user) != RenderHint::Ready {}
        assert!(s.net.opened.is_empty());

        s.reset(&mut user);
        assert!(user.profile.is_none());
        assert!(user.contributions.is_none());
        assert!(user.avatar.is_none());
        assert!(s.force_refresh());

        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchingProfile);
        assert_eq!(s.net.opens_of(PROFILE_URL), 1);

        while advance(&mut s, &mut user) != RenderHint::Ready {}
        assert_eq!(s.net.opened, [PROFILE_URL, CONTRIB_URL, AVATAR_URL]);
        assert!(!s.force_refresh());

        // back to the cache once complete
        s.reset(&mut user);
        s.force_refresh = false;
        while advance(&mut s, &mut user) != RenderHint::Ready {}
        assert_eq!(s.net.opened.len(), 3);
    }

    #[test]
    fn test_reset_discards_running_task() {
        let mut s = scheduler(online_network(8), MemStorage::default());
        let mut user = user();
        advance(&mut s, &mut user);
        assert!(s.active_task().is_some());

        s.reset(&mut user);
        assert!(s.active_task().is_none());

        advance(&mut s, &mut user);
        assert_eq!(s.active_task(), Some((Resource::Profile, 8)));
        assert_eq!(s.net.opens_of(PROFILE_URL), 2);
    }

    #[test]
    fn test_offline_parks_the_task() {
        let mut s = scheduler(online_network(8), MemStorage::default());
        let mut user = user();
        advance(&mut s, &mut user);

        for link in [Connectivity::Connecting, Connectivity::Failed, Connectivity::NotAttempted] {
            assert_eq!(block_on(s.advance(&mut user, link)), RenderHint::Connecting);
        }
        assert_eq!(s.active_task(), Some((Resource::Profile, 8)));

        advance(&mut s, &mut user);
        assert_eq!(s.active_task(), Some((Resource::Profile, 16)));
        assert_eq!(s.net.opens_of(PROFILE_URL), 1);
    }

    #[test]
    fn test_linkedin_short_url_and_qr() {
        let net = MockNetwork::default().serve(SHORTEN_URL, Script::new(b"https://tinyurl.com/oct", 64));
        let storage = cached_storage().with_file(QR_FILE, &PNG_RGB_3X2);
        let mut s = scheduler(net, storage);
        let mut user = User::new(Some("octocat".to_string()), Some(LINKEDIN.to_string()));

        for _ in 0..3 {
            advance(&mut s, &mut user);
        }
        assert_eq!(Stage::of(&user), Stage::NeedShortUrl);

        assert_eq!(advance(&mut s, &mut user), RenderHint::ShorteningUrl);
        assert_eq!(user.short_url.as_deref(), Some("https://tinyurl.com/oct"));

        assert_eq!(advance(&mut s, &mut user), RenderHint::LoadingQr);
        assert_eq!(user.qr.as_ref().unwrap().width(), 3);

        assert_eq!(advance(&mut s, &mut user), RenderHint::Ready);
        assert_eq!(s.net.opened, [SHORTEN_URL]);
    }

    #[test]
    fn test_missing_qr_is_retried() {
        let mut s = scheduler(MockNetwork::default(), cached_storage());
        let mut user = User::new(Some("octocat".to_string()), Some(LINKEDIN.to_string()));
        for _ in 0..4 {
            advance(&mut s, &mut user);
        }
        // shortener unreachable
        assert_eq!(user.short_url.as_deref(), Some(LINKEDIN));

        for _ in 0..3 {
            assert_eq!(advance(&mut s, &mut user), RenderHint::FetchError);
            assert_eq!(Stage::of(&user), Stage::NeedQr);
        }

        s.storage.files.insert(QR_FILE.to_string(), PNG_RGB_3X2.to_vec());
        assert_eq!(advance(&mut s, &mut user), RenderHint::LoadingQr);
        assert_eq!(advance(&mut s, &mut user), RenderHint::Ready);
    }

    #[test]
    fn test_no_handle_is_a_fetch_error() {
        let mut s = scheduler(online_network(64), MemStorage::default());
        let mut user = User::default();

        assert_eq!(advance(&mut s, &mut user), RenderHint::FetchError);
        assert!(s.net.opened.is_empty());
    }
}
