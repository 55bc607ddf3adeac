use crate::models::{CacheKey, ListingRecord};
use crate::scrapers::traits::ElementHandle;

/// A feed card announcing that a listing went live
#[derive(Debug, Clone, PartialEq)]
pub struct LiveCard {
    pub handle: ElementHandle,
    pub description: String,
}

/// A live card whose title and live time could be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifiedCard {
    pub description: String,
    pub title: String,
    pub live_time: String,
    pub key: CacheKey,
}

/// Why a listing was not captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// Detail screen showed no title, even after one retry
    NeverLoaded,
    /// First check read a different title
    WrongListing,
    /// Second check read a different title
    Blinked,
    /// Card vanished from the feed
    Stuck,
}

/// Counters for one run, logged at the end
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Records captured this run, including ones that could not be persisted
    pub listings: Vec<ListingRecord>,
    pub screens: usize,
    pub scroll_scraped: usize,
    pub refresh_scraped: usize,
    pub consecutive_empty: usize,
    pub never_loaded: usize,
    pub wrong_listing: usize,
    pub blinked: usize,
    pub stuck: usize,
    pub unidentifiable: usize,
    pub flushes: usize,
}

impl RunSummary {
    pub fn listings(&self) -> &[ListingRecord] {
        &self.listings
    }

    pub fn total_scraped(&self) -> usize {
        self.scroll_scraped + self.refresh_scraped
    }

    pub fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NeverLoaded => self.never_loaded += 1,
            SkipReason::WrongListing => self.wrong_listing += 1,
            SkipReason::Blinked => self.blinked += 1,
            SkipReason::Stuck => self.stuck += 1,
        }
    }
}
