use crate::config::{AppiumConfig, FeedConfig};
use crate::error::{DriverError, Transient};
use crate::scrapers::feed::FeedReader;
use crate::scrapers::traits::{AppState, ElementHandle, Point, UiDriver, WindowSize};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Key of a W3C element reference object
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
/// Pre-W3C fallback some servers still send
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

const LAUNCH_POLL: Duration = Duration::from_secs(1);

/// Appium session driving the target app over the W3C WebDriver protocol
pub struct AppiumDriver {
    client: Client,
    session_url: String,
    app_package: String,
    card_selector: String,
    text_class: String,
}

impl AppiumDriver {
    /// Open a new UiAutomator2 session
    pub async fn connect(appium: &AppiumConfig, feed: &FeedConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(appium.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let server = appium.server_url.trim_end_matches('/');
        info!("🔌 Connecting to Appium at {}", server);

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "platformName": "Android",
                    "appium:automationName": "UiAutomator2",
                    "appium:deviceName": appium.device_name,
                    "appium:appPackage": appium.app_package,
                    "appium:appActivity": appium.app_activity,
                    "appium:noReset": true,
                    "appium:fullReset": false,
                    "appium:autoGrantPermissions": true,
                },
                "firstMatch": [{}],
            }
        });

        let response = client
            .post(format!("{}/session", server))
            .json(&capabilities)
            .send()
            .await
            .context("Failed to reach Appium server")?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .context("Failed to parse session response")?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);
        if !status.is_success() {
            bail!("Appium refused the session: {}", classify(&value));
        }
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .context("Session response has no sessionId")?;

        let driver = Self {
            client,
            session_url: format!("{}/session/{}", server, session_id),
            app_package: appium.app_package.clone(),
            card_selector: feed.card_selector.clone(),
            text_class: feed.text_class.clone(),
        };
        driver
            .command(Method::POST, "/timeouts", Some(json!({ "implicit": appium.implicit_wait_ms })))
            .await
            .context("Failed to set implicit wait")?;

        info!("✅ Appium session {} started", session_id);
        Ok(driver)
    }

    /// End the session
    pub async fn quit(&self) -> Result<(), DriverError> {
        self.command(Method::DELETE, "", None).await?;
        info!("👋 Appium session closed");
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, DriverError> {
        let url = format!("{}{}", self.session_url, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                DriverError::SessionLost(format!("{}: {}", path, e))
            } else {
                DriverError::Command(format!("{}: {}", path, e))
            }
        })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| DriverError::Command(format!("{}: unreadable response: {}", path, e)))?;
        let value = body.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            Ok(value)
        } else {
            Err(classify(&value))
        }
    }

    async fn find(&self, using: &str, selector: &str) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .command(
                Method::POST,
                "/elements",
                Some(json!({ "using": using, "value": selector })),
            )
            .await?;
        Ok(element_handles(&value))
    }

    async fn mobile(&self, script: &str) -> Result<Value, DriverError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({
                "script": script,
                "args": [{ "appId": self.app_package }],
            })),
        )
        .await
    }
}

/// Map a W3C error payload to a [`DriverError`]
fn classify(value: &Value) -> DriverError {
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match error {
        "no such element" => DriverError::NoSuchElement(message),
        "stale element reference" => DriverError::StaleElement(message),
        "invalid session id" => DriverError::SessionLost(message),
        other => DriverError::Command(format!("{}: {}", other, message)),
    }
}

fn element_handles(value: &Value) -> Vec<ElementHandle> {
    value
        .as_array()
        .map(|elements| {
            elements
                .iter()
                .filter_map(|e| e.get(ELEMENT_KEY).or_else(|| e.get(LEGACY_ELEMENT_KEY)))
                .filter_map(Value::as_str)
                .map(|id| ElementHandle(id.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// `mobile: queryAppState` result code
fn app_state_from_code(code: u64) -> AppState {
    match code {
        0 => AppState::NotInstalled,
        1 => AppState::NotRunning,
        4 => AppState::Foreground,
        _ => AppState::Background,
    }
}

fn swipe_actions(from: Point, to: Point, duration: Duration) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": [
                { "type": "pointerMove", "duration": 0, "origin": "viewport", "x": from.x, "y": from.y },
                { "type": "pointerDown", "button": 0 },
                { "type": "pause", "duration": 100 },
                {
                    "type": "pointerMove",
                    "duration": duration.as_millis() as u64,
                    "origin": "viewport",
                    "x": to.x,
                    "y": to.y,
                },
                { "type": "pointerUp", "button": 0 },
            ],
        }]
    })
}

#[async_trait]
impl UiDriver for AppiumDriver {
    async fn find_by_label(&self, label: &str) -> Result<Vec<ElementHandle>, DriverError> {
        self.find("accessibility id", label).await
    }

    async fn find_cards(&self) -> Result<Vec<ElementHandle>, DriverError> {
        self.find("-android uiautomator", &self.card_selector).await
    }

    async fn find_texts(&self) -> Result<Vec<ElementHandle>, DriverError> {
        self.find("class name", &self.text_class).await
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self
            .command(Method::GET, &format!("/element/{}/text", element.0), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn description(&self, element: &ElementHandle) -> Result<Option<String>, DriverError> {
        let value = self
            .command(
                Method::GET,
                &format!("/element/{}/attribute/content-desc", element.0),
                None,
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.command(Method::POST, &format!("/element/{}/click", element.0), Some(json!({})))
            .await?;
        Ok(())
    }

    async fn back(&self) -> Result<(), DriverError> {
        self.command(Method::POST, "/back", Some(json!({}))).await?;
        Ok(())
    }

    async fn window_size(&self) -> Result<WindowSize, DriverError> {
        let value = self.command(Method::GET, "/window/rect", None).await?;
        let dimension = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_f64)
                .map(|v| v as i64)
                .ok_or_else(|| DriverError::Command(format!("window rect without {}", key)))
        };
        Ok(WindowSize {
            width: dimension("width")?,
            height: dimension("height")?,
        })
    }

    async fn swipe(&self, from: Point, to: Point, duration: Duration) -> Result<(), DriverError> {
        self.command(Method::POST, "/actions", Some(swipe_actions(from, to, duration)))
            .await?;
        Ok(())
    }

    async fn app_state(&self) -> Result<AppState, DriverError> {
        let value = self.mobile("mobile: queryAppState").await?;
        let code = value
            .as_u64()
            .ok_or_else(|| DriverError::Command(format!("unexpected app state {}", value)))?;
        Ok(app_state_from_code(code))
    }

    async fn activate_app(&self) -> Result<(), DriverError> {
        self.mobile("mobile: activateApp").await?;
        Ok(())
    }

    async fn terminate_app(&self) -> Result<(), DriverError> {
        self.mobile("mobile: terminateApp").await?;
        Ok(())
    }

    fn driver_name(&self) -> &'static str {
        "appium"
    }
}

/// Poll for the feed anchor until `timeout` has passed. Checks at least once.
async fn wait_for_anchor<D: UiDriver + ?Sized>(
    driver: &D,
    feed: &FeedReader,
    timeout: Duration,
) -> Result<bool, DriverError> {
    let deadline = Instant::now() + timeout;
    loop {
        if feed.on_feed(driver).await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(LAUNCH_POLL).await;
    }
}

/// Bring the app to the foreground and wait until its home screen shows the
/// feed anchor, relaunching it once if it never does.
pub async fn ensure_app_ready<D: UiDriver + ?Sized>(
    driver: &D,
    feed: &FeedReader,
    timeout: Duration,
) -> Result<()> {
    info!("📱 Checking app state...");
    let state = driver.app_state().await.context("Failed to query app state")?;
    debug!("App state: {:?}", state);

    match state {
        AppState::NotInstalled => bail!("Target app is not installed on the device"),
        AppState::Foreground => {}
        AppState::NotRunning | AppState::Background => {
            info!("🚀 Launching app...");
            driver.activate_app().await.context("Failed to launch app")?;
        }
    }

    if wait_for_anchor(driver, feed, timeout).await? {
        info!("✅ App is ready");
        return Ok(());
    }

    warn!("⚠️ App did not become ready, relaunching");
    driver.terminate_app().await.transient("Terminating app")?;
    driver.activate_app().await.context("Failed to relaunch app")?;

    if wait_for_anchor(driver, feed, timeout).await? {
        info!("✅ App is ready after relaunch");
        Ok(())
    } else {
        bail!("App never showed its home screen")
    }
}
