use crate::error::DriverError;
use crate::models::{AuctionStatus, Emirate, ListingRecord};
use crate::scrapers::traits::UiDriver;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderField {
    Title,
    Reference,
    Location,
    Mileage,
    Specs,
    Transmission,
    EngineCapacity,
    SellerExpectation,
    CurrentBid,
    AuctionStatus,
    AuctionEndDate,
}

/// Pulls one field out of the header lines
pub trait FieldExtractor: Send + Sync {
    fn extract(&self, lines: &[String]) -> Option<String>;
}

impl<F> FieldExtractor for F
where
    F: Fn(&[String]) -> Option<String> + Send + Sync,
{
    fn extract(&self, lines: &[String]) -> Option<String> {
        self(lines)
    }
}

/// Read every text element on screen, keeping positions.
///
/// Elements that fail to read become empty lines.
pub async fn read_lines<D: UiDriver + ?Sized>(driver: &D) -> Result<Vec<String>, DriverError> {
    let elements = match driver.find_texts().await {
        Ok(elements) => elements,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!("⚠️ Could not read screen texts: {}", e);
            return Ok(Vec::new());
        }
    };

    let mut lines = Vec::with_capacity(elements.len());
    for element in &elements {
        match driver.text(element).await {
            Ok(text) => lines.push(text.trim().to_string()),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!("Unreadable text element {:?}: {}", element, e);
                lines.push(String::new());
            }
        }
    }
    Ok(lines)
}

/// Line right before the first non-empty line matching `pred`. The top line
/// has nothing above it and is never a match.
fn preceding(lines: &[String], pred: impl Fn(&str) -> bool) -> Option<String> {
    let (idx, _) = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, l)| !l.is_empty() && pred(l.as_str()))?;
    let prev = lines.get(idx - 1)?;
    (!prev.is_empty()).then(|| prev.clone())
}

/// Line right after the first line matching `pred`
fn following(lines: &[String], pred: impl Fn(&str) -> bool) -> Option<String> {
    let idx = lines.iter().position(|l| !l.is_empty() && pred(l.as_str()))?;
    lines.get(idx + 1).filter(|l| !l.is_empty()).cloned()
}

/// First matching line with the `|` separators removed
fn piped(lines: &[String], pred: impl Fn(&str) -> bool) -> Option<String> {
    lines
        .iter()
        .find(|l| !l.is_empty() && pred(l.as_str()))
        .map(|l| l.replace('|', "").trim().to_string())
}

/// Parsed header values, keyed by field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderFields(HashMap<HeaderField, String>);

impl HeaderFields {
    pub fn get(&self, field: HeaderField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    fn owned(&self, field: HeaderField) -> Option<String> {
        self.get(field).map(str::to_string)
    }

    /// Build a record from the header and the alert's live time
    pub fn into_record(self, live_time: Option<String>, scraped_at: DateTime<Utc>) -> ListingRecord {
        let mut record = ListingRecord::new(scraped_at);
        record.title = self.owned(HeaderField::Title);
        record.reference = self.owned(HeaderField::Reference);
        record.location = self.get(HeaderField::Location).and_then(|l| l.parse().ok());
        record.mileage = self.owned(HeaderField::Mileage);
        record.specs = self.owned(HeaderField::Specs);
        record.transmission = self.owned(HeaderField::Transmission);
        record.engine_capacity = self.owned(HeaderField::EngineCapacity);
        record.seller_expectation = self.owned(HeaderField::SellerExpectation);
        record.current_bid = self.owned(HeaderField::CurrentBid);
        record.auction_status = AuctionStatus::from(self.owned(HeaderField::AuctionStatus));
        record.auction_end_date = self.owned(HeaderField::AuctionEndDate);
        record.live_time = live_time;
        record.with_derived_key()
    }
}

/// Set of per-field extractors applied to a listing header.
///
/// The header is read as a flat list of text lines and each field has its own
/// [`FieldExtractor`] over that list.
pub struct HeaderParser {
    extractors: Vec<(HeaderField, Box<dyn FieldExtractor>)>,
}

impl HeaderParser {
    /// Default heuristics for the listing header. `ref_prefix` starts the
    /// reference line; the title is the line just above it.
    pub fn new(ref_prefix: &str) -> Self {
        let title_prefix = ref_prefix.to_string();
        let ref_prefix = ref_prefix.to_string();

        let extractors: Vec<(HeaderField, Box<dyn FieldExtractor>)> = vec![
            (
                HeaderField::Title,
                Box::new(move |lines: &[String]| {
                    preceding(lines, |l| l.starts_with(title_prefix.as_str()))
                }),
            ),
            (
                HeaderField::Reference,
                Box::new(move |lines: &[String]| {
                    lines
                        .iter()
                        .enumerate()
                        .find(|(i, l)| *i > 0 && l.starts_with(ref_prefix.as_str()))
                        .map(|(_, l)| l.clone())
                }),
            ),
            (
                HeaderField::Location,
                Box::new(|lines: &[String]| {
                    lines
                        .iter()
                        .find(|l| l.parse::<Emirate>().is_ok())
                        .cloned()
                }),
            ),
            (
                HeaderField::Mileage,
                Box::new(|lines: &[String]| {
                    lines
                        .iter()
                        .find(|l| l.contains("km") && !l.starts_with('|'))
                        .cloned()
                }),
            ),
            (
                HeaderField::Specs,
                Box::new(|lines: &[String]| {
                    piped(lines, |l| {
                        ["GCC Specs", "American Specs", "European Specs", "others"]
                            .iter()
                            .any(|s| l.contains(s))
                    })
                }),
            ),
            (
                HeaderField::Transmission,
                Box::new(|lines: &[String]| {
                    piped(lines, |l| {
                        (l.contains("Automatic") || l.contains("Manual")) && l.contains('|')
                    })
                }),
            ),
            (
                HeaderField::EngineCapacity,
                Box::new(|lines: &[String]| piped(lines, |l| l.contains("cc") && l.contains('|'))),
            ),
            (
                HeaderField::SellerExpectation,
                Box::new(|lines: &[String]| preceding(lines, |l| l == "Seller Expectation")),
            ),
            (
                HeaderField::CurrentBid,
                Box::new(|lines: &[String]| preceding(lines, |l| l == "Current Bid")),
            ),
            (
                HeaderField::AuctionStatus,
                Box::new(|lines: &[String]| {
                    if lines.iter().any(|l| l == "Auction ended") {
                        Some("Ended".to_string())
                    } else if lines.iter().any(|l| l == "Live") {
                        Some("Live".to_string())
                    } else {
                        None
                    }
                }),
            ),
            (
                HeaderField::AuctionEndDate,
                Box::new(|lines: &[String]| following(lines, |l| l == "Auction ended")),
            ),
        ];

        Self { extractors }
    }

    /// Replace the strategy for one field
    #[cfg(test)]
    pub fn with_extractor(mut self, field: HeaderField, extractor: impl FieldExtractor + 'static) -> Self {
        self.extractors.retain(|(f, _)| *f != field);
        self.extractors.push((field, Box::new(extractor)));
        self
    }

    pub fn extract(&self, field: HeaderField, lines: &[String]) -> Option<String> {
        self.extractors
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, e)| e.extract(lines))
    }

    /// Listing title as shown on the header
    pub fn title(&self, lines: &[String]) -> Option<String> {
        self.extract(HeaderField::Title, lines)
    }

    pub fn parse(&self, lines: &[String]) -> HeaderFields {
        let fields = self
            .extractors
            .iter()
            .filter_map(|(field, e)| e.extract(lines).map(|value| (*field, value)))
            .collect();
        HeaderFields(fields)
    }

    /// Read the open listing screen into a fresh record
    pub async fn capture<D: UiDriver + ?Sized>(
        &self,
        driver: &D,
        live_time: Option<String>,
    ) -> Result<ListingRecord, DriverError> {
        let scraped_at = Utc::now();
        let lines = read_lines(driver).await?;
        let record = self.parse(&lines).into_record(live_time, scraped_at);

        info!("📊 HEADER DATA CAPTURED");
        info!("   Title: {:?}", record.title);
        info!("   Ref: {:?}", record.reference);
        info!("   Location: {:?}", record.location);
        info!("   Mileage: {:?}", record.mileage);
        info!("   Current Bid: {:?}", record.current_bid);
        info!("   Auction Status: {:?}", record.auction_status);
        info!("   🔑 Cache Key: {:?}", record.cache_key.as_ref().map(|k| k.as_str()));

        Ok(record)
    }
}
