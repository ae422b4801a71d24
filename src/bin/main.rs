//! Contribution Badge Firmware - ESP32-S3 conference badge
//!
//! Wiring:
//! - LCD (SPI3): SCK=GPIO10, MOSI=GPIO11, CS=GPIO9, DC=GPIO8, RST=GPIO12
//! - SD card (SPI2): SCK=GPIO39, MOSI=GPIO41, MISO=GPIO40, CS=GPIO38
//! - Buttons A/B/C: GPIO4/GPIO5/GPIO6, active low
//!
//! Optional build-time environment variables override the endpoints:
//! - BADGE_DETAILS_URL, BADGE_CONTRIB_URL, BADGE_AVATAR_URL: templates
//!   with a `{user}` placeholder
//! - BADGE_SHORTENER_URL: template with a `{url}` placeholder

#![no_std]
#![no_main]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use contrib_badge_firmware::app::{Badge, Buttons};
use contrib_badge_firmware::card;
use contrib_badge_firmware::config::Config;
use contrib_badge_firmware::framebuffer::Framebuffer;
use contrib_badge_firmware::net::NalNetwork;
use contrib_badge_firmware::panel::{Offset, Panel};
use contrib_badge_firmware::storage::SdStorage;
use contrib_badge_firmware::wifi::Radio;
use embassy_executor::Spawner;
use embassy_net::{
    Runner, Stack, StackResources,
    dns::DnsSocket,
    tcp::client::{TcpClient, TcpClientState},
};
use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_alloc as _;
use esp_backtrace as _;
use esp_hal::{
    clock::CpuClock,
    gpio::{Input, InputConfig, Level, Output, OutputConfig, Pull},
    rng::Rng,
    spi::{
        Mode,
        master::{Config as SpiConfig, Spi},
    },
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_radio::{
    Controller,
    wifi::{
        ClientConfig, Config as WifiConfig, ModeConfig, ScanConfig, WifiController, WifiDevice,
        WifiError,
    },
};
use log::{error, info, warn};

esp_bootloader_esp_idf::esp_app_desc!();

// When you are okay with using a nightly compiler it's better to use https://docs.rs/static_cell/2.1.0/static_cell/macro.make_static.html
macro_rules! mk_static {
    ($t:ty,$val:expr) => {{
        static STATIC_CELL: static_cell::StaticCell<$t> = static_cell::StaticCell::new();
        #[deny(unused_attributes)]
        let x = STATIC_CELL.uninit().write(($val));
        x
    }};
}

/// Time between frames
const FRAME_INTERVAL_MS: u64 = 50;
/// Minimum gap between association requests while a link comes up
const CONNECT_RETRY_MS: u64 = 5_000;
/// Access points kept from one scan
const SCAN_MAX_APS: usize = 16;

type Tcp = TcpClient<'static, 1, 1024, 1024>;

/// esp-radio station behind the badge's [`Radio`] interface
struct EspRadio {
    controller: WifiController<'static>,
    stack: Stack<'static>,
    requested_at: Option<Instant>,
}

impl Radio for EspRadio {
    type Error = WifiError;

    fn is_connected(&mut self) -> bool {
        matches!(self.controller.is_connected(), Ok(true)) && self.stack.config_v4().is_some()
    }

    async fn scan(&mut self) -> Result<Vec<String>, WifiError> {
        let aps = self
            .controller
            .scan_with_config_async(ScanConfig::default().with_max(SCAN_MAX_APS))
            .await?;
        Ok(aps.iter().map(|ap| String::from(ap.ssid.as_str())).collect())
    }

    async fn connect(&mut self, ssid: &str, password: Option<&str>) -> Result<(), WifiError> {
        // a request is already in flight; give DHCP time before restarting it
        if let Some(at) = self.requested_at {
            if at.elapsed() < Duration::from_millis(CONNECT_RETRY_MS) {
                return Ok(());
            }
        }

        let client_config = ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(ssid.into())
                .with_password(password.unwrap_or_default().into()),
        );
        self.controller.set_config(&client_config)?;
        self.controller.connect()?;
        self.requested_at = Some(Instant::now());
        Ok(())
    }
}

/// Endpoint templates, with build-time overrides
fn config() -> Config {
    let mut config = Config::default();
    if let Some(url) = option_env!("BADGE_DETAILS_URL") {
        config = config.with_details_url(url);
    }
    if let Some(url) = option_env!("BADGE_CONTRIB_URL") {
        config = config.with_contrib_url(url);
    }
    if let Some(url) = option_env!("BADGE_AVATAR_URL") {
        config = config.with_avatar_url(url);
    }
    if let Some(url) = option_env!("BADGE_SHORTENER_URL") {
        config = config.with_shortener_url(url);
    }
    config
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // Init logger first so we can see any early crashes
    esp_println::logger::init_logger_from_env();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    info!("Initializing heap...");
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 64 * 1024);
    esp_alloc::heap_allocator!(size: 36 * 1024);

    // PSRAM for the framebuffer and fetched assets
    esp_alloc::psram_allocator!(&peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);
    info!("RTOS started");

    // ==================== SD Card ====================
    let sd_spi = Spi::new(
        peripherals.SPI2,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(20))
            .with_mode(Mode::_0),
    )
    .expect("SD SPI init failed")
    .with_sck(peripherals.GPIO39)
    .with_mosi(peripherals.GPIO41)
    .with_miso(peripherals.GPIO40);

    let sd_cs = Output::new(peripherals.GPIO38, Level::High, OutputConfig::default());
    let sd_spi_device = ExclusiveDevice::new_no_delay(sd_spi, sd_cs).unwrap();

    let mut storage = match SdStorage::new(sd_spi_device, Delay) {
        Ok(storage) => storage,
        Err(e) => {
            error!("SD card unavailable: {}", e);
            halt().await
        }
    };
    if let Err(e) = storage.init() {
        error!("SD card init failed: {}", e);
        halt().await
    }

    // ==================== LCD ====================
    let lcd_spi = Spi::new(
        peripherals.SPI3,
        SpiConfig::default()
            .with_frequency(Rate::from_mhz(40))
            .with_mode(Mode::_0),
    )
    .expect("LCD SPI init failed")
    .with_sck(peripherals.GPIO10)
    .with_mosi(peripherals.GPIO11);

    let lcd_cs = Output::new(peripherals.GPIO9, Level::High, OutputConfig::default());
    let lcd_spi_device = ExclusiveDevice::new_no_delay(lcd_spi, lcd_cs).unwrap();
    let dc = Output::new(peripherals.GPIO8, Level::Low, OutputConfig::default());
    let rst = Output::new(peripherals.GPIO12, Level::High, OutputConfig::default());

    let mut panel = Panel::new(lcd_spi_device, dc, rst, Offset::default(), &mut Delay)
        .expect("LCD init failed");
    let mut framebuffer = Framebuffer::new();

    let button_a = Input::new(peripherals.GPIO4, InputConfig::default().with_pull(Pull::Up));
    let button_b = Input::new(peripherals.GPIO5, InputConfig::default().with_pull(Pull::Up));
    let button_c = Input::new(peripherals.GPIO6, InputConfig::default().with_pull(Pull::Up));

    // ==================== WiFi ====================
    info!("Initializing WiFi...");
    let ctrl = mk_static!(Controller<'static>, esp_radio::init().unwrap());
    let (mut controller, ifaces) =
        esp_radio::wifi::new(ctrl, peripherals.WIFI, WifiConfig::default()).unwrap();

    // scanning needs the station running
    controller
        .set_config(&ModeConfig::Client(ClientConfig::default()))
        .unwrap();
    controller.start_async().await.unwrap();

    let rng = Rng::new();
    let net_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, runner) = embassy_net::new(
        ifaces.sta,
        net_config,
        mk_static!(StackResources<3>, StackResources::<3>::new()),
        rng.random() as u64,
    );
    spawner.spawn(net_task(runner)).ok();

    let tcp_state = mk_static!(TcpClientState<1, 1024, 1024>, TcpClientState::new());
    let tcp = mk_static!(Tcp, TcpClient::new(stack, tcp_state));
    let dns = mk_static!(DnsSocket<'static>, DnsSocket::new(stack));

    let radio = EspRadio {
        controller,
        stack,
        requested_at: None,
    };

    // ==================== Frame loop ====================
    let mut badge = Badge::new(
        NalNetwork::new(tcp, dns).with_seed(rng.random() as u64),
        storage,
        radio,
        config(),
    );
    info!("Badge ready");

    loop {
        let now = Instant::now().as_millis();
        let buttons = Buttons {
            a: button_a.is_low(),
            b: button_b.is_low(),
            c: button_c.is_low(),
        };

        let screen = badge.frame(now, buttons).await;
        let _ = card::draw(&mut framebuffer, screen, badge.user(), now);
        if let Err(e) = panel.flush(&framebuffer) {
            warn!("LCD flush failed: {:?}", e);
        }

        Timer::after(Duration::from_millis(FRAME_INTERVAL_MS)).await;
    }
}

/// Park forever after a fatal hardware error
async fn halt() -> ! {
    loop {
        Timer::after(Duration::from_secs(60)).await;
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}
