use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "auction-scout.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub appium: AppiumConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub waits: Waits,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Settings {
    /// Built-in defaults, overridden by `auction-scout.toml` (or the file named
    /// by `AUCTION_SCOUT_CONFIG`) if present, then by `SCOUT__*` variables such
    /// as `SCOUT__APPIUM__DEVICE_NAME`.
    pub fn load() -> Result<Self> {
        let file = std::env::var("AUCTION_SCOUT_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        Config::builder()
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix("SCOUT").separator("__"))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }
}

/// Appium server and device session
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppiumConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,

    #[serde(default = "default_device_name")]
    pub device_name: String,

    #[serde(default = "default_app_package")]
    pub app_package: String,

    #[serde(default = "default_app_activity")]
    pub app_activity: String,

    /// Implicit element wait applied by the server to every lookup
    #[serde(default = "default_implicit_wait_ms")]
    pub implicit_wait_ms: u64,

    /// Ceiling for polling the anchor element after launch
    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AppiumConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            device_name: default_device_name(),
            app_package: default_app_package(),
            app_activity: default_app_activity(),
            implicit_wait_ms: default_implicit_wait_ms(),
            launch_timeout_secs: default_launch_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// What identifies the alerts feed and its cards on screen
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// Accessibility label that is only visible on the feed screen
    #[serde(default = "default_anchor_label")]
    pub anchor_label: String,

    /// Phrase in a card description marking a listing that just went live
    #[serde(default = "default_live_marker")]
    pub live_marker: String,

    /// Prefix of the reference line on a listing header
    #[serde(default = "default_ref_prefix")]
    pub ref_prefix: String,

    #[serde(default = "default_card_selector")]
    pub card_selector: String,

    #[serde(default = "default_text_class")]
    pub text_class: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            anchor_label: default_anchor_label(),
            live_marker: default_live_marker(),
            ref_prefix: default_ref_prefix(),
            card_selector: default_card_selector(),
            text_class: default_text_class(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaginationConfig {
    /// Runaway guard for the scroll phase
    #[serde(default = "default_max_screens")]
    pub max_screens: usize,

    #[serde(default = "default_empty_screens_to_stop")]
    pub empty_screens_to_stop: usize,

    #[serde(default = "default_open_feed_attempts")]
    pub open_feed_attempts: usize,

    #[serde(default = "default_top_swipes")]
    pub top_swipes: usize,

    #[serde(default = "default_extra_top_swipes")]
    pub extra_top_swipes: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_screens: default_max_screens(),
            empty_screens_to_stop: default_empty_screens_to_stop(),
            open_feed_attempts: default_open_feed_attempts(),
            top_swipes: default_top_swipes(),
            extra_top_swipes: default_extra_top_swipes(),
        }
    }
}

/// Fixed settle waits, in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Waits {
    #[serde(default = "default_pre_click")]
    pub pre_click: u64,
    #[serde(default = "default_settle")]
    pub settle: u64,
    #[serde(default = "default_retry_settle")]
    pub retry_settle: u64,
    #[serde(default = "default_recheck")]
    pub recheck: u64,
    #[serde(default = "default_back")]
    pub back: u64,
    #[serde(default = "default_scroll")]
    pub scroll: u64,
    #[serde(default = "default_swipe_gap")]
    pub swipe_gap: u64,
    #[serde(default = "default_refresh")]
    pub refresh: u64,
    #[serde(default = "default_open_feed_retry")]
    pub open_feed_retry: u64,
    #[serde(default = "default_tab_open")]
    pub tab_open: u64,
    #[serde(default = "default_swipe_duration")]
    pub swipe_duration: u64,
}

impl Waits {
    /// No waiting at all, for scripted drivers
    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            pre_click: 0,
            settle: 0,
            retry_settle: 0,
            recheck: 0,
            back: 0,
            scroll: 0,
            swipe_gap: 0,
            refresh: 0,
            open_feed_retry: 0,
            tab_open: 0,
            swipe_duration: 0,
        }
    }
}

impl Default for Waits {
    fn default() -> Self {
        Self {
            pre_click: default_pre_click(),
            settle: default_settle(),
            retry_settle: default_retry_settle(),
            recheck: default_recheck(),
            back: default_back(),
            scroll: default_scroll(),
            swipe_gap: default_swipe_gap(),
            refresh: default_refresh(),
            open_feed_retry: default_open_feed_retry(),
            tab_open: default_tab_open(),
            swipe_duration: default_swipe_duration(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_backup_prefix")]
    pub backup_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            backup_prefix: default_backup_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_server_url() -> String {
    "http://127.0.0.1:4723".to_string()
}
fn default_device_name() -> String {
    "RZ8R81C9GWH".to_string()
}
fn default_app_package() -> String {
    "com.dubizzle.dealerapp".to_string()
}
fn default_app_activity() -> String {
    "com.dubizzle.dealerapp.MainActivity".to_string()
}
fn default_implicit_wait_ms() -> u64 {
    7_000
}
fn default_launch_timeout() -> u64 {
    60
}
fn default_request_timeout() -> u64 {
    60
}

fn default_anchor_label() -> String {
    "Alerts".to_string()
}
fn default_live_marker() -> String {
    "is now Live".to_string()
}
fn default_ref_prefix() -> String {
    "Ref".to_string()
}
fn default_card_selector() -> String {
    r#"new UiSelector().className("android.view.ViewGroup").clickable(true)"#.to_string()
}
fn default_text_class() -> String {
    "android.widget.TextView".to_string()
}

fn default_max_screens() -> usize {
    50
}
fn default_empty_screens_to_stop() -> usize {
    2
}
fn default_open_feed_attempts() -> usize {
    5
}
fn default_top_swipes() -> usize {
    7
}
fn default_extra_top_swipes() -> usize {
    5
}

fn default_pre_click() -> u64 {
    1_000
}
fn default_settle() -> u64 {
    7_000
}
fn default_retry_settle() -> u64 {
    10_000
}
fn default_recheck() -> u64 {
    1_000
}
fn default_back() -> u64 {
    2_000
}
fn default_scroll() -> u64 {
    3_000
}
fn default_swipe_gap() -> u64 {
    300
}
fn default_refresh() -> u64 {
    6_000
}
fn default_open_feed_retry() -> u64 {
    10_000
}
fn default_tab_open() -> u64 {
    3_000
}
fn default_swipe_duration() -> u64 {
    1_000
}

fn default_store_path() -> PathBuf {
    PathBuf::from("car_listings_cache.csv")
}
fn default_backup_prefix() -> String {
    "car_listings_backup".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}
