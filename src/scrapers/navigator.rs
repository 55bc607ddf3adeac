use crate::config::Waits;
use crate::error::{DriverError, Transient};
use crate::scrapers::feed::FeedReader;
use crate::scrapers::header::{read_lines, HeaderParser};
use crate::scrapers::traits::UiDriver;
use crate::scrapers::types::{IdentifiedCard, SkipReason};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Clicked { retried: bool },
    FirstCheck { observed: Option<String>, retried: bool },
    SecondCheck,
    Accepted,
    Rejected(SkipReason),
    Stuck,
}

/// Result of trying to open a card
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The verified listing screen is showing
    Accepted,
    /// Skipped; the feed has been restored
    Rejected(SkipReason),
    /// The card was not on screen. `restored` tells whether the feed anchor
    /// is visible again.
    Stuck { restored: bool },
}

/// Opens listings from the feed and checks the right one showed up.
///
/// The UI sometimes opens nothing, opens a neighbouring card, or briefly shows
/// one listing before settling on another. [`Navigator::open`] hands back
/// control either on the verified listing screen or on the feed.
pub struct Navigator {
    feed: FeedReader,
    header: Arc<HeaderParser>,
    waits: Waits,
}

impl Navigator {
    pub fn new(feed: FeedReader, header: Arc<HeaderParser>, waits: Waits) -> Self {
        Self {
            feed,
            header,
            waits,
        }
    }

    async fn pause(&self, ms: u64) {
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Click the card whose description is `description`, then wait `settle` ms.
    ///
    /// `false` if the card is not on screen or the click failed.
    async fn click_card<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        description: &str,
        settle: u64,
    ) -> Result<bool, DriverError> {
        let Some(card) = self.feed.find_card(driver, description).await? else {
            warn!("⚠️ Alert not found in list: {}", description);
            return Ok(false);
        };

        self.pause(self.waits.pre_click).await;
        if driver.click(&card.handle).await.transient("Clicking alert")?.is_none() {
            return Ok(false);
        }
        self.pause(settle).await;
        Ok(true)
    }

    async fn observed_title<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> Result<Option<String>, DriverError> {
        let lines = read_lines(driver).await?;
        Ok(self.header.title(&lines))
    }

    /// One system back plus the settle wait
    pub async fn back<D: UiDriver + ?Sized>(&self, driver: &D) -> Result<(), DriverError> {
        info!("⬅️ Going back...");
        driver.back().await.transient("Navigating back")?;
        self.pause(self.waits.back).await;
        Ok(())
    }

    /// Make sure the feed is showing, going back once if it is not.
    pub async fn ensure_feed<D: UiDriver + ?Sized>(&self, driver: &D) -> Result<bool, DriverError> {
        if self.feed.on_feed(driver).await? {
            return Ok(true);
        }
        warn!("⚠️ Not on the alerts feed, going back...");
        self.back(driver).await?;
        let restored = self.feed.on_feed(driver).await?;
        if restored {
            info!("✅ Returned to alerts feed");
        } else {
            warn!("❌ Still not on the alerts feed");
        }
        Ok(restored)
    }

    /// Leave an accepted listing for the feed.
    pub async fn return_to_feed<D: UiDriver + ?Sized>(&self, driver: &D) -> Result<bool, DriverError> {
        self.back(driver).await?;
        self.feed.on_feed(driver).await
    }

    /// Open `card` and verify the listing screen shows its title twice.
    pub async fn open<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        card: &IdentifiedCard,
    ) -> Result<Verdict, DriverError> {
        let expected = card.title.as_str();
        let mut state = NavState::Idle;

        loop {
            debug!("navigation state: {:?}", state);
            state = match state {
                NavState::Idle => {
                    if self.click_card(driver, &card.description, self.waits.settle).await? {
                        NavState::Clicked { retried: false }
                    } else {
                        NavState::Stuck
                    }
                }

                NavState::Clicked { retried } => NavState::FirstCheck {
                    observed: self.observed_title(driver).await?,
                    retried,
                },

                NavState::FirstCheck {
                    observed: None,
                    retried: false,
                } => {
                    warn!("⚠️ Listing did not load, retrying click with longer wait");
                    self.back(driver).await?;
                    if self
                        .click_card(driver, &card.description, self.waits.retry_settle)
                        .await?
                    {
                        NavState::Clicked { retried: true }
                    } else {
                        NavState::Stuck
                    }
                }

                NavState::FirstCheck {
                    observed: None,
                    retried: true,
                } => {
                    warn!("❌ Listing still did not load after retry, skipping");
                    self.back(driver).await?;
                    NavState::Rejected(SkipReason::NeverLoaded)
                }

                NavState::FirstCheck {
                    observed: Some(title),
                    ..
                } if title != expected => {
                    warn!("❌ WRONG listing opened: expected {:?}, got {:?}", expected, title);
                    self.back(driver).await?;
                    NavState::Rejected(SkipReason::WrongListing)
                }

                NavState::FirstCheck { .. } => {
                    info!("✅ First check passed: {}", expected);
                    self.pause(self.waits.recheck).await;
                    NavState::SecondCheck
                }

                NavState::SecondCheck => match self.observed_title(driver).await? {
                    Some(title) if title != expected => {
                        warn!("❌ Listing changed after opening: expected {:?}, got {:?}", expected, title);
                        self.back(driver).await?;
                        NavState::Rejected(SkipReason::Blinked)
                    }
                    Some(_) => {
                        info!("✅ Second check passed, listing is stable");
                        NavState::Accepted
                    }
                    None => {
                        warn!("⚠️ Could not re-read title, proceeding with capture");
                        NavState::Accepted
                    }
                },

                NavState::Accepted => return Ok(Verdict::Accepted),

                NavState::Rejected(reason) => return Ok(Verdict::Rejected(reason)),

                NavState::Stuck => {
                    let restored = self.ensure_feed(driver).await?;
                    return Ok(Verdict::Stuck { restored });
                }
            };
        }
    }
}
