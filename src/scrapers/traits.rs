use crate::error::DriverError;
use async_trait::async_trait;
use std::time::Duration;

/// Opaque reference to an element in the current UI snapshot.
///
/// Invalid after any scroll or navigation; look the element up again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: i64,
    pub height: i64,
}

impl WindowSize {
    /// Point at mid-width, `fraction` of the way down the screen
    pub fn mid_at(&self, fraction: f64) -> Point {
        Point {
            x: self.width / 2,
            y: (self.height as f64 * fraction) as i64,
        }
    }
}

/// Lifecycle state reported by the device for the target app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    NotInstalled,
    NotRunning,
    Background,
    Foreground,
}

/// Accessibility-tree and gesture capabilities of a mobile UI driver.
///
/// The scraper only talks to the device through this trait.
#[async_trait]
pub trait UiDriver: Send + Sync {
    /// Elements whose accessibility label equals `label`
    async fn find_by_label(&self, label: &str) -> Result<Vec<ElementHandle>, DriverError>;

    /// Clickable container elements (feed cards)
    async fn find_cards(&self) -> Result<Vec<ElementHandle>, DriverError>;

    /// Text elements of the current screen, top to bottom
    async fn find_texts(&self) -> Result<Vec<ElementHandle>, DriverError>;

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError>;

    /// Raw accessibility description (`content-desc`)
    async fn description(&self, element: &ElementHandle) -> Result<Option<String>, DriverError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// System back navigation
    async fn back(&self) -> Result<(), DriverError>;

    async fn window_size(&self) -> Result<WindowSize, DriverError>;

    async fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<(), DriverError>;

    async fn app_state(&self) -> Result<AppState, DriverError>;

    async fn activate_app(&self) -> Result<(), DriverError>;

    async fn terminate_app(&self) -> Result<(), DriverError>;

    /// Name of the driver backend, for logs
    fn driver_name(&self) -> &'static str;
}
