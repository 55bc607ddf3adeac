pub mod alerts;
pub mod appium;
pub mod feed;
pub mod header;
pub mod navigator;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use alerts::AlertsScraper;
pub use appium::{ensure_app_ready, AppiumDriver};
pub use traits::UiDriver;
