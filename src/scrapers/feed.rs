use crate::config::FeedConfig;
use crate::error::{DriverError, Transient};
use crate::models::make_cache_key;
use crate::scrapers::traits::{ElementHandle, UiDriver};
use crate::scrapers::types::{IdentifiedCard, LiveCard};
use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

const LIVE_TIME_PATTERN: &str =
    r"((?:Monday|Tuesday|Wednesday|Thursday|Friday|Saturday|Sunday)\s+at\s+\d{1,2}:\d{2}\s+(?:AM|PM))";

/// Reads live-alert cards from the alerts feed
#[derive(Debug, Clone)]
pub struct FeedReader {
    anchor_label: String,
    live_marker: String,
    title_re: Regex,
    live_time_re: Regex,
}

impl FeedReader {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let title_re = Regex::new(&format!(r"^(.+?)\s+{}", regex::escape(&config.live_marker)))
            .context("Failed to build alert title pattern")?;
        let live_time_re =
            Regex::new(LIVE_TIME_PATTERN).context("Failed to build live time pattern")?;

        Ok(Self {
            anchor_label: config.anchor_label.clone(),
            live_marker: config.live_marker.clone(),
            title_re,
            live_time_re,
        })
    }

    /// All cards on screen whose description carries the live marker, top to bottom.
    pub async fn live_cards<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> Result<Vec<LiveCard>, DriverError> {
        let Some(cards) = driver.find_cards().await.transient("Finding alert cards")? else {
            return Ok(Vec::new());
        };

        let mut live = Vec::new();
        for handle in cards {
            let description = match driver.description(&handle).await {
                Ok(Some(desc)) => desc,
                Ok(None) => continue,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    debug!("Skipping unreadable card {:?}: {}", handle, e);
                    continue;
                }
            };
            if description.contains(&self.live_marker) {
                live.push(LiveCard { handle, description });
            }
        }
        Ok(live)
    }

    /// Title (text before the live marker) and live time from a card description
    pub fn identify(&self, description: &str) -> (Option<String>, Option<String>) {
        let title = self
            .title_re
            .captures(description)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|t| !t.is_empty());
        (title, self.live_time(description))
    }

    /// Weekday + clock time, e.g. `Tuesday at 3:41 PM`
    pub fn live_time(&self, description: &str) -> Option<String> {
        self.live_time_re
            .captures(description)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// `None` when the card cannot be given an identity
    pub fn identify_card(&self, card: &LiveCard) -> Option<IdentifiedCard> {
        let (title, live_time) = self.identify(&card.description);
        let (title, live_time) = (title?, live_time?);
        let key = make_cache_key(&title, &live_time)?;
        Some(IdentifiedCard {
            description: card.description.clone(),
            title,
            live_time,
            key,
        })
    }

    /// Re-locate a card by its exact description
    pub async fn find_card<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        description: &str,
    ) -> Result<Option<LiveCard>, DriverError> {
        Ok(self
            .live_cards(driver)
            .await?
            .into_iter()
            .find(|card| card.description == description))
    }

    pub async fn anchor<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let found = driver
            .find_by_label(&self.anchor_label)
            .await
            .transient("Looking up feed anchor")?;
        Ok(found.and_then(|handles| handles.into_iter().next()))
    }

    /// Whether the feed screen is showing
    pub async fn on_feed<D: UiDriver + ?Sized>(&self, driver: &D) -> Result<bool, DriverError> {
        Ok(self.anchor(driver).await?.is_some())
    }
}
