use crate::config::{PaginationConfig, Settings, Waits};
use crate::error::{DriverError, Transient};
use crate::scrapers::feed::FeedReader;
use crate::scrapers::header::HeaderParser;
use crate::scrapers::navigator::{Navigator, Verdict};
use crate::scrapers::traits::{UiDriver, WindowSize};
use crate::scrapers::types::{IdentifiedCard, RunSummary, SkipReason};
use crate::store::{CsvStore, SeenSet, Snapshot};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Scrapes newly live auctions from the app's alerts feed
pub struct AlertsScraper<D: UiDriver> {
    driver: D,
    feed: FeedReader,
    navigator: Navigator,
    header: Arc<HeaderParser>,
    store: CsvStore,
    pagination: PaginationConfig,
    waits: Waits,
}

/// Mutable state of one run
struct RunState {
    snapshot: Snapshot,
    seen: SeenSet,
    /// Index into `summary.listings` of the first record not yet flushed
    flushed: usize,
    summary: RunSummary,
}

impl<D: UiDriver> AlertsScraper<D> {
    pub fn new(driver: D, settings: &Settings) -> Result<Self> {
        let feed = FeedReader::new(&settings.feed)?;
        let header = Arc::new(HeaderParser::new(&settings.feed.ref_prefix));
        let navigator = Navigator::new(feed.clone(), header.clone(), settings.waits.clone());

        Ok(Self {
            driver,
            feed,
            navigator,
            header,
            store: CsvStore::new(&settings.store),
            pagination: settings.pagination.clone(),
            waits: settings.waits.clone(),
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn feed(&self) -> &FeedReader {
        &self.feed
    }

    async fn pause(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Scroll through the feed, then refresh it and sweep the top once more.
    ///
    /// Only a lost driver session makes this fail.
    pub async fn run(&self) -> Result<RunSummary, DriverError> {
        info!("🚀 Starting alerts scrape via {} driver", self.driver.driver_name());

        let snapshot = self.store.load();
        let mut run = RunState {
            seen: SeenSet::new(snapshot.keys.clone()),
            snapshot,
            flushed: 0,
            summary: RunSummary::default(),
        };
        info!("🔑 {} known listings in {}", run.seen.len(), self.store.path().display());

        if !self.open_feed().await? {
            error!("❌ Could not open the alerts tab, nothing scraped");
            return Ok(run.summary);
        }

        info!("📜 PHASE 1: SCROLL & SCRAPE");
        let mut consecutive_empty = 0;
        while run.summary.screens < self.pagination.max_screens
            && consecutive_empty < self.pagination.empty_screens_to_stop
        {
            run.summary.screens += 1;
            info!("📄 SCREEN #{}", run.summary.screens);

            let scraped = self.scrape_screen(&mut run).await?;
            run.summary.scroll_scraped += scraped;

            if scraped == 0 {
                consecutive_empty += 1;
                info!(
                    "⚠️ No new listings on screen #{} (strike {}/{})",
                    run.summary.screens, consecutive_empty, self.pagination.empty_screens_to_stop
                );
                if consecutive_empty >= self.pagination.empty_screens_to_stop {
                    info!("🛑 Feed exhausted, stopping scroll pagination");
                    break;
                }
            } else {
                consecutive_empty = 0;
                info!("✅ Scraped {} new listings from screen #{}", scraped, run.summary.screens);
            }

            if run.summary.screens < self.pagination.max_screens && !self.scroll_down().await? {
                warn!("⚠️ Could not scroll down, stopping");
                break;
            }
        }
        run.summary.consecutive_empty = consecutive_empty;

        if run.summary.scroll_scraped > 0 {
            self.flush(&mut run);
        } else {
            info!("ℹ️ No new listings scraped during scroll phase");
        }

        info!("🔄 PHASE 2: REFRESH FOR NEW LISTINGS");
        self.scroll_to_top().await?;
        self.pause(self.waits.back).await;
        self.refresh().await?;

        let refreshed = self.scrape_screen(&mut run).await?;
        run.summary.refresh_scraped = refreshed;
        if refreshed > 0 {
            info!("✅ Scraped {} new listings after refresh", refreshed);
            self.flush(&mut run);
        } else {
            info!("✅ No new listings found after refresh");
        }

        let summary = run.summary;
        info!("✅ SCRAPING COMPLETE");
        info!("📊 Screens processed: {}", summary.screens);
        info!("📊 Listings scraped: {}", summary.total_scraped());
        info!(
            "📊 Skipped: {} not loaded, {} wrong, {} blinked, {} stuck, {} unidentifiable",
            summary.never_loaded,
            summary.wrong_listing,
            summary.blinked,
            summary.stuck,
            summary.unidentifiable
        );
        info!("📊 Consecutive empty screens at end: {}", summary.consecutive_empty);

        Ok(summary)
    }

    /// Persist records scraped since the last flush and reload the seen keys.
    fn flush(&self, run: &mut RunState) {
        let pending = &run.summary.listings[run.flushed..];
        match self.store.checkpoint(&run.snapshot, pending) {
            Ok(reloaded) => {
                run.seen.reload(reloaded.keys.clone());
                run.snapshot = reloaded;
                run.flushed = run.summary.listings.len();
                run.summary.flushes += 1;
            }
            // Records stay pending for the next checkpoint
            Err(e) => error!("❌ Failed to save listings: {:#}", e),
        }
    }

    /// Open every unseen live card on the current screen. Returns how many
    /// were captured.
    async fn scrape_screen(&self, run: &mut RunState) -> Result<usize, DriverError> {
        let cards = self.feed.live_cards(&self.driver).await?;
        info!("📊 Found {} live alerts on screen", cards.len());

        let mut unseen: Vec<IdentifiedCard> = Vec::new();
        let mut cached = 0;
        for card in &cards {
            match self.feed.identify_card(card) {
                None => {
                    warn!("⚠️ Unidentifiable alert, skipping: {}", card.description);
                    run.summary.unidentifiable += 1;
                }
                Some(card) if run.seen.contains(&card.key) => {
                    debug!("📦 Cached: {}", card.description);
                    cached += 1;
                }
                Some(card) => {
                    if !unseen.iter().any(|u| u.key == card.key) {
                        info!("  🆕 New: {}", card.description);
                        unseen.push(card);
                    }
                }
            }
        }
        info!("📈 {} new, {} cached", unseen.len(), cached);

        let mut scraped = 0;
        for card in unseen {
            if run.seen.contains(&card.key) {
                continue;
            }
            info!("📩 PROCESSING: {}", card.description);

            match self.navigator.open(&self.driver, &card).await? {
                Verdict::Accepted => {
                    let record = self
                        .header
                        .capture(&self.driver, Some(card.live_time.clone()))
                        .await?;
                    if !self.navigator.return_to_feed(&self.driver).await? {
                        warn!("⚠️ Could not confirm return to alerts after capture");
                    }
                    if record.cache_key.is_none() {
                        warn!("⚠️ Captured listing has no cache key: {}", card.description);
                    }
                    run.seen.insert(card.key);
                    run.summary.listings.push(record);
                    scraped += 1;
                    info!("✅ Listing saved (total: {})", run.summary.listings.len());
                }
                Verdict::Rejected(reason) => {
                    info!("⏭️ Skipped ({:?}): {}", reason, card.description);
                    run.summary.record_skip(reason);
                }
                Verdict::Stuck { restored } => {
                    run.summary.record_skip(SkipReason::Stuck);
                    if !restored {
                        warn!("❌ Lost the alerts feed, abandoning: {}", card.description);
                    }
                }
            }
        }

        Ok(scraped)
    }

    /// Tap the alerts tab, retrying with a fixed wait.
    pub async fn open_feed(&self) -> Result<bool, DriverError> {
        info!("🔔 Opening Alerts tab");
        let attempts = self.pagination.open_feed_attempts.max(1);

        for attempt in 1..=attempts {
            info!("  📍 Attempt {}/{}...", attempt, attempts);
            match self.feed.anchor(&self.driver).await? {
                Some(anchor) => {
                    if self.driver.click(&anchor).await.transient("Opening alerts tab")?.is_some() {
                        self.pause(self.waits.tab_open).await;
                        info!("✅ Alerts tab opened");
                        return Ok(true);
                    }
                }
                None => warn!("⚠️ Alerts tab not visible"),
            }
            if attempt < attempts {
                self.pause(self.waits.open_feed_retry).await;
            }
        }

        Ok(false)
    }

    async fn window(&self) -> Result<Option<WindowSize>, DriverError> {
        self.driver.window_size().await.transient("Reading window size")
    }

    /// Vertical swipe at mid-width between two height fractions
    async fn swipe(&self, size: WindowSize, from: f64, to: f64) -> Result<bool, DriverError> {
        let done = self
            .driver
            .swipe(
                size.mid_at(from),
                size.mid_at(to),
                Duration::from_millis(self.waits.swipe_duration),
            )
            .await
            .transient("Swiping")?;
        Ok(done.is_some())
    }

    /// One page down. A swipe that opened a listing by accident is undone.
    pub async fn scroll_down(&self) -> Result<bool, DriverError> {
        info!("⬇️ Scrolling down to load more alerts...");
        self.pause(self.waits.swipe_gap).await;

        if let Some(size) = self.window().await? {
            if self.swipe(size, 0.7, 0.3).await? {
                self.pause(self.waits.scroll).await;
            }
        }
        self.navigator.ensure_feed(&self.driver).await
    }

    /// Best-effort return to the top of the feed.
    pub async fn scroll_to_top(&self) -> Result<bool, DriverError> {
        info!("⬆️ Scrolling to top of alerts...");
        let Some(size) = self.window().await? else {
            return self.navigator.ensure_feed(&self.driver).await;
        };

        for i in 0..self.pagination.top_swipes {
            self.pause(self.waits.swipe_gap).await;
            self.swipe(size, 0.2, 0.8).await?;
            self.pause(self.waits.swipe_gap).await;
            if !self.navigator.ensure_feed(&self.driver).await? {
                warn!("❌ Could not recover during scroll #{}, stopping scroll to top", i + 1);
                return Ok(false);
            }
        }

        // One more swipe; if the visible alerts barely change we are at the top
        self.pause(self.waits.recheck).await;
        let before = self.feed.live_cards(&self.driver).await?.len();
        self.pause(self.waits.swipe_gap).await;
        self.swipe(size, 0.2, 0.8).await?;
        self.pause(self.waits.recheck).await;
        self.navigator.ensure_feed(&self.driver).await?;
        let after = self.feed.live_cards(&self.driver).await?.len();
        debug!("alerts visible before/after verification swipe: {}/{}", before, after);

        if before.abs_diff(after) <= 1 {
            info!("  ✅ Confirmed at the top");
        } else {
            info!("  ⚠️ Not quite at top yet, doing additional swipes...");
            for _ in 0..self.pagination.extra_top_swipes {
                self.pause(self.waits.swipe_gap).await;
                self.swipe(size, 0.2, 0.8).await?;
                self.pause(self.waits.swipe_gap).await;
                if !self.navigator.ensure_feed(&self.driver).await? {
                    return Ok(false);
                }
            }
        }

        self.navigator.ensure_feed(&self.driver).await
    }

    /// Pull-to-refresh at the top of the feed
    pub async fn refresh(&self) -> Result<bool, DriverError> {
        info!("🔄 Refreshing Alerts tab...");
        let Some(size) = self.window().await? else {
            return Ok(false);
        };
        if !self.swipe(size, 0.3, 0.7).await? {
            return Ok(false);
        }
        self.pause(self.waits.refresh).await;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{make_cache_key, ListingRecord};
    use crate::scrapers::fake::{alert, header, FakeApp, FakeDriver};
    use chrono::Utc;
    use std::path::Path;

    fn settings(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.waits = Waits::none();
        settings.store.path = dir.join("cache.csv");
        settings.store.backup_prefix = "backup".to_string();
        settings
    }

    fn scraper(app: FakeApp, settings: &Settings) -> AlertsScraper<FakeDriver> {
        AlertsScraper::new(FakeDriver::new(app), settings).unwrap()
    }

    fn titles(summary: &RunSummary) -> Vec<String> {
        summary
            .listings()
            .iter()
            .filter_map(|r| r.title.clone())
            .collect()
    }

    fn count_backups(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("backup_"))
            .count()
    }

    #[tokio::test]
    async fn skips_cards_already_in_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let mut existing = ListingRecord::new(Utc::now());
        existing.title = Some("A".into());
        existing.live_time = Some("Monday at 1:00 PM".into());
        CsvStore::new(&settings.store)
            .flush(&[existing.with_derived_key()])
            .unwrap();

        let a = alert("A", "Monday at 1:00 PM");
        let b = alert("B", "Monday at 2:00 PM");
        let c = alert("C", "Monday at 3:00 PM");
        let scraper = scraper(FakeApp::new(vec![a.clone(), b.clone(), c.clone()]), &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.scroll_scraped, 2);
        assert_eq!(titles(&summary), vec!["B", "C"]);
        assert_eq!(scraper.driver().inspect(|app| app.clicks.clone()), vec![b, c]);

        let stored = CsvStore::new(&settings.store).load();
        assert_eq!(stored.rows.len(), 3);
        assert_eq!(stored.keys.len(), 3);
        assert!(stored.keys.contains(&make_cache_key("B", "Monday at 2:00 PM").unwrap()));
    }

    #[tokio::test]
    async fn wrong_listing_is_skipped_and_sweep_continues() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let a = alert("A", "Monday at 1:00 PM");
        let b = alert("B", "Monday at 2:00 PM");
        let app = FakeApp::new(vec![a.clone(), b.clone()]).detail(&a, vec![vec![header("Z")]]);
        let scraper = scraper(app, &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(titles(&summary), vec!["B"]);
        assert!(summary.wrong_listing >= 1);
        assert!(scraper.driver().inspect(|app| app.on_feed()));
        let clicks = scraper.driver().inspect(|app| app.clicks.clone());
        assert_eq!(&clicks[..2], &[a, b]);
    }

    #[tokio::test]
    async fn stops_after_two_empty_screens() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let scraper = scraper(FakeApp::new(Vec::new()), &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.screens, 2);
        assert_eq!(summary.consecutive_empty, 2);
        assert_eq!(summary.total_scraped(), 0);
        // Nothing scraped, nothing written
        assert!(!settings.store.path.exists());
        assert_eq!(count_backups(dir.path()), 0);
    }

    #[tokio::test]
    async fn productive_screen_resets_the_empty_streak() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        // First screen holds no live alerts, the second holds two
        let feed = vec![
            "Auction for 2017 Nissan Patrol ended".to_string(),
            "You were outbid on 2016 Kia Sorento".to_string(),
            alert("C", "Monday at 3:00 PM"),
            alert("D", "Monday at 4:00 PM"),
        ];
        let scraper = scraper(FakeApp::new(feed).page_size(2), &settings);

        let summary = scraper.run().await.unwrap();

        // empty, productive, empty, empty
        assert_eq!(summary.screens, 4);
        assert_eq!(summary.scroll_scraped, 2);
        assert_eq!(summary.consecutive_empty, 2);
        assert_eq!(titles(&summary), vec!["C", "D"]);
    }

    #[tokio::test]
    async fn screen_ceiling_bounds_the_scroll_phase() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.pagination.max_screens = 4;

        let feed = (0..30)
            .map(|i| alert(&format!("Car {}", i), "Friday at 9:30 AM"))
            .collect();
        let scraper = scraper(FakeApp::new(feed), &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.screens, 4);
        assert_eq!(summary.scroll_scraped, 12);
    }

    #[tokio::test]
    async fn seen_cards_are_not_reopened_after_scroll() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let feed: Vec<String> = ["A", "B", "C", "D"]
            .iter()
            .map(|t| alert(t, "Sunday at 8:00 PM"))
            .collect();
        let scraper = scraper(FakeApp::new(feed.clone()).page_size(2), &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.scroll_scraped, 4);
        assert_eq!(scraper.driver().inspect(|app| app.clicks.clone()), feed);
    }

    #[tokio::test]
    async fn duplicate_cards_on_one_screen_open_once() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let a = alert("A", "Monday at 1:00 PM");
        let scraper = scraper(FakeApp::new(vec![a.clone(), a.clone()]), &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.total_scraped(), 1);
        assert_eq!(scraper.driver().inspect(|app| app.clicks.len()), 1);
    }

    #[tokio::test]
    async fn refresh_picks_up_new_arrivals() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let a = alert("A", "Monday at 1:00 PM");
        let fresh = alert("Fresh", "Monday at 5:00 PM");
        let app = FakeApp::new(vec![a]).arrivals(vec![fresh.clone()]);
        let scraper = scraper(app, &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.scroll_scraped, 1);
        assert_eq!(summary.refresh_scraped, 1);
        assert_eq!(summary.flushes, 2);
        assert_eq!(CsvStore::new(&settings.store).load().rows.len(), 2);
        // Second flush backed up the first one
        assert_eq!(count_backups(dir.path()), 1);
        assert!(scraper.driver().inspect(|app| app.refreshes) >= 1);
    }

    #[tokio::test]
    async fn vanished_card_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let a = alert("A", "Monday at 1:00 PM");
        let b = alert("B", "Monday at 2:00 PM");
        let app = FakeApp::new(vec![a.clone(), b]).vanishing(&a, 1);
        let scraper = scraper(app, &settings);

        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.stuck, 1);
        assert_eq!(titles(&summary), vec!["B"]);
    }

    #[tokio::test]
    async fn unidentifiable_cards_never_open() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let app = FakeApp::new(vec!["Mystery car is now Live".to_string()]);
        let scraper = scraper(app, &settings);

        let summary = scraper.run().await.unwrap();

        assert!(summary.unidentifiable >= 1);
        assert!(scraper.driver().inspect(|app| app.clicks.is_empty()));
    }

    #[tokio::test]
    async fn misfired_scroll_returns_to_feed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let scraper = scraper(FakeApp::new(Vec::new()).misfire_swipes(1), &settings);

        assert!(scraper.scroll_down().await.unwrap());
        assert_eq!(scraper.driver().inspect(|app| app.backs), 1);
        assert!(scraper.driver().inspect(|app| app.on_feed()));
    }

    #[tokio::test]
    async fn lost_session_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());

        let feed = vec![alert("A", "Monday at 1:00 PM"), alert("B", "Monday at 2:00 PM")];
        let scraper = scraper(FakeApp::new(feed).lose_session_at_click(2), &settings);

        let err = scraper.run().await.unwrap_err();
        assert!(err.is_fatal());
        // Unflushed records are lost with the session
        assert!(!settings.store.path.exists());
    }
}
