pub mod identity;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub use identity::{make_cache_key, CacheKey};

/// Emirate a listed car is located in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Emirate {
    Dubai,
    #[serde(rename = "Abu Dhabi")]
    AbuDhabi,
    Sharjah,
    Ajman,
    #[serde(rename = "Ras Al Khaimah")]
    RasAlKhaimah,
    Fujairah,
    #[serde(rename = "Umm Al Quwain")]
    UmmAlQuwain,
}

impl Emirate {
    pub const ALL: [Emirate; 7] = [
        Emirate::Dubai,
        Emirate::AbuDhabi,
        Emirate::Sharjah,
        Emirate::Ajman,
        Emirate::RasAlKhaimah,
        Emirate::Fujairah,
        Emirate::UmmAlQuwain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emirate::Dubai => "Dubai",
            Emirate::AbuDhabi => "Abu Dhabi",
            Emirate::Sharjah => "Sharjah",
            Emirate::Ajman => "Ajman",
            Emirate::RasAlKhaimah => "Ras Al Khaimah",
            Emirate::Fujairah => "Fujairah",
            Emirate::UmmAlQuwain => "Umm Al Quwain",
        }
    }
}

impl fmt::Display for Emirate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emirate {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emirate::ALL
            .into_iter()
            .find(|e| e.as_str() == s.trim())
            .ok_or(())
    }
}

/// State of the auction as shown on the listing header.
///
/// Stored as `Ended` / `Live`, with an empty cell for `Unknown`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "Option<String>", into = "String")]
pub enum AuctionStatus {
    Ended,
    Live,
    #[default]
    Unknown,
}

impl From<Option<String>> for AuctionStatus {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            Some("Ended") => AuctionStatus::Ended,
            Some("Live") => AuctionStatus::Live,
            _ => AuctionStatus::Unknown,
        }
    }
}

impl From<AuctionStatus> for String {
    fn from(status: AuctionStatus) -> Self {
        match status {
            AuctionStatus::Ended => "Ended".to_string(),
            AuctionStatus::Live => "Live".to_string(),
            AuctionStatus::Unknown => String::new(),
        }
    }
}

/// One scraped auction listing.
///
/// Field order is the column order of the durable CSV file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub title: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub location: Option<Emirate>,
    pub mileage: Option<String>,
    pub specs: Option<String>,
    pub transmission: Option<String>,
    pub engine_capacity: Option<String>,
    pub seller_expectation: Option<String>,
    pub current_bid: Option<String>,
    pub auction_status: AuctionStatus,
    pub auction_end_date: Option<String>,
    /// Weekday and time from the alert, e.g. `Tuesday at 4:00 PM`
    pub live_time: Option<String>,
    pub cache_key: Option<CacheKey>,
    #[serde(deserialize_with = "deserialize_scraped_at")]
    pub scraped_at: DateTime<Utc>,
}

/// RFC 3339, or a naive `2025-01-29 10:00:00.123456` stamp taken as UTC
pub fn parse_scraped_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

fn deserialize_scraped_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_scraped_at(&raw)
        .ok_or_else(|| de::Error::custom(format!("invalid scraped_at timestamp {:?}", raw)))
}

impl ListingRecord {
    /// Empty record stamped with the capture instant
    pub fn new(scraped_at: DateTime<Utc>) -> Self {
        Self {
            title: None,
            reference: None,
            location: None,
            mileage: None,
            specs: None,
            transmission: None,
            engine_capacity: None,
            seller_expectation: None,
            current_bid: None,
            auction_status: AuctionStatus::Unknown,
            auction_end_date: None,
            live_time: None,
            cache_key: None,
            scraped_at,
        }
    }

    /// Recompute the cache key from the captured title and live time.
    pub fn with_derived_key(mut self) -> Self {
        self.cache_key = match (&self.title, &self.live_time) {
            (Some(title), Some(live_time)) => make_cache_key(title, live_time),
            _ => None,
        };
        self
    }
}
