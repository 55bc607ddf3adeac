use crate::error::DriverError;
use crate::scrapers::traits::{AppState, ElementHandle, Point, UiDriver, WindowSize};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

const ANCHOR: &str = "Alerts";
const MARKER: &str = " is now Live";

/// Header lines of a listing screen titled `title`
pub fn header(title: &str) -> Vec<String> {
    vec![
        "Back".to_string(),
        title.to_string(),
        format!("Ref {}", title.len()),
        "Dubai".to_string(),
        "52,000 km".to_string(),
        "| GCC Specs".to_string(),
        "AED 20,000".to_string(),
        "Current Bid".to_string(),
        "Live".to_string(),
    ]
}

/// A live alert description, e.g. `A is now Live Monday at 1:00 PM`
pub fn alert(title: &str, live_time: &str) -> String {
    format!("{}{} {}", title, MARKER, live_time)
}

#[derive(Debug, Clone)]
enum Screen {
    Feed,
    /// Listing screen; each text read shows the next frame, the last one sticks
    Detail { frames: Vec<Vec<String>>, reads: usize },
}

/// State of the fake app
#[derive(Debug)]
pub struct FakeApp {
    pub feed: Vec<String>,
    pub page_size: usize,
    pub offset: usize,
    /// Alerts that show up at the top on the next refresh
    pub arrivals: Vec<String>,
    /// Per description, the frames shown for each successive click
    details: HashMap<String, VecDeque<Vec<Vec<String>>>>,
    /// Descriptions that disappear after being listed this many times
    vanishing: HashMap<String, usize>,
    /// Swipes that land on a card and open it
    pub misfire_swipes: usize,
    pub lose_session_at_click: Option<usize>,
    session_lost: bool,
    stack: Vec<Screen>,
    generation: u64,
    visible_lines: Vec<String>,
    pub clicks: Vec<String>,
    pub backs: usize,
    pub swipes: usize,
    pub refreshes: usize,
}

impl FakeApp {
    pub fn new(feed: Vec<String>) -> Self {
        Self {
            feed,
            page_size: 3,
            offset: 0,
            arrivals: Vec::new(),
            details: HashMap::new(),
            vanishing: HashMap::new(),
            misfire_swipes: 0,
            lose_session_at_click: None,
            session_lost: false,
            stack: vec![Screen::Feed],
            generation: 0,
            visible_lines: Vec::new(),
            clicks: Vec::new(),
            backs: 0,
            swipes: 0,
            refreshes: 0,
        }
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Script what each click on `description` shows
    pub fn detail(mut self, description: &str, clicks: Vec<Vec<Vec<String>>>) -> Self {
        self.details.insert(description.to_string(), clicks.into());
        self
    }

    pub fn vanishing(mut self, description: &str, listings: usize) -> Self {
        self.vanishing.insert(description.to_string(), listings);
        self
    }

    pub fn arrivals(mut self, arrivals: Vec<String>) -> Self {
        self.arrivals = arrivals;
        self
    }

    pub fn misfire_swipes(mut self, count: usize) -> Self {
        self.misfire_swipes = count;
        self
    }

    pub fn lose_session_at_click(mut self, click: usize) -> Self {
        self.lose_session_at_click = Some(click);
        self
    }

    /// Start on a screen with no recognisable content
    pub fn start_off_feed(mut self) -> Self {
        self.stack.push(Screen::Detail {
            frames: vec![Vec::new()],
            reads: 0,
        });
        self
    }

    pub fn on_feed(&self) -> bool {
        matches!(self.stack.last(), Some(Screen::Feed))
    }

    fn invalidate(&mut self) {
        self.generation += 1;
        self.visible_lines.clear();
    }

    fn check(&self) -> Result<(), DriverError> {
        if self.session_lost {
            return Err(DriverError::SessionLost("device disconnected".into()));
        }
        Ok(())
    }

    /// Index encoded in a handle of the current generation
    fn resolve(&self, handle: &ElementHandle, kind: &str) -> Result<usize, DriverError> {
        let mut parts = handle.0.split(':');
        let (Some(k), Some(generation), Some(index)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DriverError::NoSuchElement(handle.0.clone()));
        };
        if k != kind {
            return Err(DriverError::Command(format!("{} is not a {}", handle.0, kind)));
        }
        if generation != self.generation.to_string() {
            return Err(DriverError::StaleElement(handle.0.clone()));
        }
        index
            .parse()
            .map_err(|_| DriverError::NoSuchElement(handle.0.clone()))
    }

    fn visible_range(&self) -> std::ops::Range<usize> {
        let end = (self.offset + self.page_size).min(self.feed.len());
        self.offset.min(end)..end
    }

    fn open(&mut self, description: &str) {
        let frames = match self.details.get_mut(description) {
            Some(clicks) if clicks.len() > 1 => clicks.pop_front().unwrap_or_default(),
            Some(clicks) => clicks.front().cloned().unwrap_or_default(),
            None => {
                let title = description.split(MARKER).next().unwrap_or_default();
                vec![header(title)]
            }
        };
        self.stack.push(Screen::Detail { frames, reads: 0 });
    }
}

/// [`UiDriver`] over a [`FakeApp`]
pub struct FakeDriver {
    app: Mutex<FakeApp>,
}

impl FakeDriver {
    pub fn new(app: FakeApp) -> Self {
        Self {
            app: Mutex::new(app),
        }
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&FakeApp) -> R) -> R {
        f(&*self.app.lock().unwrap())
    }

    fn with<R>(&self, f: impl FnOnce(&mut FakeApp) -> Result<R, DriverError>) -> Result<R, DriverError> {
        let mut app = self.app.lock().unwrap();
        app.check()?;
        f(&mut *app)
    }
}

#[async_trait]
impl UiDriver for FakeDriver {
    async fn find_by_label(&self, label: &str) -> Result<Vec<ElementHandle>, DriverError> {
        self.with(|app| {
            if label == ANCHOR && app.on_feed() {
                Ok(vec![ElementHandle(format!("anchor:{}:0", app.generation))])
            } else {
                Ok(Vec::new())
            }
        })
    }

    async fn find_cards(&self) -> Result<Vec<ElementHandle>, DriverError> {
        self.with(|app| {
            if !app.on_feed() {
                return Ok(Vec::new());
            }
            let gone: Vec<String> = app
                .vanishing
                .iter()
                .filter(|(_, remaining)| **remaining == 0)
                .map(|(description, _)| description.clone())
                .collect();
            if !gone.is_empty() {
                app.feed.retain(|d| !gone.contains(d));
                for description in &gone {
                    app.vanishing.remove(description);
                }
                app.invalidate();
            }

            let range = app.visible_range();
            for i in range.clone() {
                if let Some(remaining) = app.vanishing.get_mut(&app.feed[i]) {
                    *remaining -= 1;
                }
            }
            Ok(range
                .map(|i| ElementHandle(format!("card:{}:{}", app.generation, i)))
                .collect())
        })
    }

    async fn find_texts(&self) -> Result<Vec<ElementHandle>, DriverError> {
        self.with(|app| {
            let lines = match app.stack.last_mut() {
                Some(Screen::Detail { frames, reads }) => {
                    let frame = frames
                        .get((*reads).min(frames.len().saturating_sub(1)))
                        .cloned()
                        .unwrap_or_default();
                    *reads += 1;
                    frame
                }
                _ => Vec::new(),
            };
            app.visible_lines = lines;
            Ok((0..app.visible_lines.len())
                .map(|i| ElementHandle(format!("text:{}:{}", app.generation, i)))
                .collect())
        })
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        self.with(|app| {
            let index = app.resolve(element, "text")?;
            app.visible_lines
                .get(index)
                .cloned()
                .ok_or_else(|| DriverError::StaleElement(element.0.clone()))
        })
    }

    async fn description(&self, element: &ElementHandle) -> Result<Option<String>, DriverError> {
        self.with(|app| {
            let index = app.resolve(element, "card")?;
            Ok(app.feed.get(index).cloned())
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.with(|app| {
            if element.0.starts_with("anchor:") {
                app.resolve(element, "anchor")?;
                app.invalidate();
                return Ok(());
            }
            let index = app.resolve(element, "card")?;
            let description = app
                .feed
                .get(index)
                .cloned()
                .ok_or_else(|| DriverError::NoSuchElement(element.0.clone()))?;
            app.clicks.push(description.clone());
            if app.lose_session_at_click == Some(app.clicks.len()) {
                app.session_lost = true;
                return Err(DriverError::SessionLost("device disconnected".into()));
            }
            app.open(&description);
            app.invalidate();
            Ok(())
        })
    }

    async fn back(&self) -> Result<(), DriverError> {
        self.with(|app| {
            app.backs += 1;
            if app.stack.len() > 1 {
                app.stack.pop();
            }
            app.invalidate();
            Ok(())
        })
    }

    async fn window_size(&self) -> Result<WindowSize, DriverError> {
        self.with(|_| {
            Ok(WindowSize {
                width: 1080,
                height: 2400,
            })
        })
    }

    async fn swipe(&self, from: Point, to: Point, _duration: Duration) -> Result<(), DriverError> {
        self.with(|app| {
            app.swipes += 1;
            app.invalidate();
            if !app.on_feed() {
                return Ok(());
            }
            if app.misfire_swipes > 0 {
                app.misfire_swipes -= 1;
                app.stack.push(Screen::Detail {
                    frames: vec![Vec::new()],
                    reads: 0,
                });
                return Ok(());
            }
            if from.y > to.y {
                let max_offset = app.feed.len().saturating_sub(app.page_size);
                app.offset = (app.offset + app.page_size).min(max_offset);
            } else if app.offset > 0 {
                app.offset = app.offset.saturating_sub(app.page_size);
            } else {
                app.refreshes += 1;
                let arrivals = std::mem::take(&mut app.arrivals);
                let rest = std::mem::take(&mut app.feed);
                app.feed = arrivals.into_iter().chain(rest).collect();
            }
            Ok(())
        })
    }

    async fn app_state(&self) -> Result<AppState, DriverError> {
        self.with(|_| Ok(AppState::Foreground))
    }

    async fn activate_app(&self) -> Result<(), DriverError> {
        self.with(|_| Ok(()))
    }

    async fn terminate_app(&self) -> Result<(), DriverError> {
        self.with(|_| Ok(()))
    }

    fn driver_name(&self) -> &'static str {
        "fake"
    }
}
