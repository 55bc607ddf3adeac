use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a listing, derived from its title and live time.
///
/// Two alerts with the same title and weekday/time collapse to one key; the
/// feed's live time carries no year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        CacheKey(value.to_string())
    }
}

/// Build the composite cache key, e.g.
/// `("2019 Lincoln MKZ Premiere!", "Tuesday at 4:00 PM")` -> `2019_Lincoln_MKZ_Premiere_Tuesday_400PM`.
///
/// Returns `None` when either part is empty.
pub fn make_cache_key(title: &str, live_time: &str) -> Option<CacheKey> {
    let title = title.trim();
    let live_time = live_time.trim();
    if title.is_empty() || live_time.is_empty() {
        return None;
    }

    // Keep word characters and whitespace, then join words with underscores
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    let mut clean_title = String::with_capacity(kept.len());
    let mut in_space = false;
    for c in kept.chars() {
        if c.is_whitespace() {
            if !in_space {
                clean_title.push('_');
            }
            in_space = true;
        } else {
            clean_title.push(c);
            in_space = false;
        }
    }

    let clean_time = live_time
        .replace(" at ", "_")
        .replace(' ', "")
        .replace(':', "");

    Some(CacheKey(format!("{}_{}", clean_title, clean_time)))
}
