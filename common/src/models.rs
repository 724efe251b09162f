use crate::errors::SearchSpecError;
use serde::{Deserialize, Serialize};
use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub type UserId = i64;
pub type ItemId = String;

/// Coordinates used when a user never shared a location
pub const DEFAULT_LATITUDE: f64 = 41.383333;
pub const DEFAULT_LONGITUDE: f64 = 2.183333;

// ============================================================================
// User Models
// ============================================================================

/// User represents a bot user together with their saved searches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub chat_id: i64,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// Default search radius, 0 means unbounded
    #[serde(default)]
    pub radius_km: u32,
    #[serde(default)]
    pub searches: SavedSearches,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>, chat_id: i64) -> Self {
        Self {
            id,
            name: name.into(),
            chat_id,
            latitude: 0.0,
            longitude: 0.0,
            radius_km: 0,
            searches: SavedSearches::default(),
        }
    }

    /// Returns the user location, or the fallback point if either coordinate is unset
    pub fn location(&self) -> (f64, f64) {
        if self.latitude != 0.0 && self.longitude != 0.0 {
            return (self.latitude, self.longitude);
        }

        (DEFAULT_LATITUDE, DEFAULT_LONGITUDE)
    }
}

// ============================================================================
// Search Models
// ============================================================================

/// SearchSpec is the normalized description of what a saved search looks for
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchSpec {
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub max_price: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius_km: Option<u32>,
    /// Reject results whose title contains none of the keywords
    #[serde(default)]
    pub strict: bool,
    /// Reject results priced at zero
    #[serde(default)]
    pub no_zero: bool,
}

impl SearchSpec {
    pub fn new(keywords: impl Into<String>, max_price: u32) -> Self {
        Self {
            keywords: keywords.into(),
            max_price,
            ..Default::default()
        }
    }

    /// Canonical key of the search inside a user's saved searches
    pub fn signature(&self) -> String {
        self.keywords.trim().to_string()
    }
}

const KEY_VALUE_SEPARATOR: char = '=';

impl FromStr for SearchSpec {
    type Err = SearchSpecError;

    /// Parses free text such as `strict=true radius=3 road bike price=200`
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut spec = SearchSpec::default();
        let mut keywords: Vec<&str> = Vec::new();

        for field in raw.split_whitespace() {
            if !field.contains(KEY_VALUE_SEPARATOR) {
                keywords.push(field);
                continue;
            }

            let parts: Vec<&str> = field.split(KEY_VALUE_SEPARATOR).collect();
            if parts.len() != 2 {
                keywords.extend(parts);
                continue;
            }

            let key = parts[0].to_lowercase();
            let value = parts[1].to_lowercase();
            match key.as_str() {
                "max" | "price" => spec.max_price = parse_number(&key, &value)?,
                "min" | "minprice" => spec.min_price = Some(parse_number(&key, &value)?),
                "radius" => spec.radius_km = Some(parse_number(&key, &value)?),
                "strict" => spec.strict = parse_bool(&key, &value)?,
                "nozero" => spec.no_zero = parse_bool(&key, &value)?,
                _ => return Err(SearchSpecError::UnknownKey(key)),
            }
        }

        spec.keywords = keywords.join(" ");
        Ok(spec)
    }
}

impl fmt::Display for SearchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} price={}", self.keywords, self.max_price)?;
        if let Some(min_price) = self.min_price {
            write!(f, " min={}", min_price)?;
        }
        if let Some(radius_km) = self.radius_km {
            write!(f, " radius={}", radius_km)?;
        }
        if self.strict {
            write!(f, " strict=true")?;
        }
        if self.no_zero {
            write!(f, " nozero=true")?;
        }
        Ok(())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32, SearchSpecError> {
    value.parse().map_err(|_| SearchSpecError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SearchSpecError> {
    match value {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(SearchSpecError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Map of item ids to the price they had when the user was last notified
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SentItems(HashMap<ItemId, f64>);

impl SentItems {
    pub fn last_notified(&self, item_id: &str) -> Option<f64> {
        self.0.get(item_id).copied()
    }

    pub fn record(&mut self, item_id: impl Into<ItemId>, price: f64) {
        self.0.insert(item_id.into(), price);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// SavedSearch is a persisted search plus its notification history.
///
/// Decoding always goes through [`SavedSearchRecord`], so records written by older
/// versions with flat search fields come out in the current shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SavedSearchRecord")]
pub struct SavedSearch {
    pub search: SearchSpec,
    pub sent_items: SentItems,
}

impl SavedSearch {
    pub fn new(search: SearchSpec) -> Self {
        Self {
            search,
            sent_items: SentItems::default(),
        }
    }

    pub fn signature(&self) -> String {
        self.search.signature()
    }
}

/// On-disk shape of a saved search, covering both the structured layout and the
/// deprecated flat fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavedSearchRecord {
    #[serde(default)]
    pub search: Option<SearchSpec>,
    #[serde(default)]
    pub sent_items: Option<SentItems>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub radius_km: Option<u32>,
}

impl SavedSearchRecord {
    /// Normalizes the record into the current shape.
    ///
    /// A structured search with keywords always wins; the flat fields are only read when
    /// it is missing. They are never written back.
    pub fn migrate(self) -> SavedSearch {
        let sent_items = self.sent_items.unwrap_or_default();

        let search = match self.search {
            Some(search) if !search.keywords.trim().is_empty() => search,
            structured => {
                let base = structured.unwrap_or_default();
                SearchSpec {
                    keywords: self.keywords.unwrap_or_default(),
                    max_price: self.max_price.map(price_to_whole).unwrap_or(base.max_price),
                    min_price: self
                        .min_price
                        .map(price_to_whole)
                        .filter(|p| *p > 0)
                        .or(base.min_price),
                    radius_km: self.radius_km.filter(|r| *r > 0).or(base.radius_km),
                    strict: base.strict,
                    no_zero: base.no_zero,
                }
            }
        };

        SavedSearch { search, sent_items }
    }
}

impl From<SavedSearchRecord> for SavedSearch {
    fn from(record: SavedSearchRecord) -> Self {
        record.migrate()
    }
}

fn price_to_whole(price: f64) -> u32 {
    if price.is_finite() && price > 0.0 {
        price.trunc() as u32
    } else {
        0
    }
}

/// A user's saved searches keyed by search signature
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedSearches(HashMap<String, SavedSearch>);

impl SavedSearches {
    pub fn get(&self, signature: &str) -> Option<&SavedSearch> {
        self.0.get(signature)
    }

    pub fn get_mut(&mut self, signature: &str) -> Option<&mut SavedSearch> {
        self.0.get_mut(signature)
    }

    /// Inserts or replaces the search stored under its signature
    pub fn set(&mut self, search: SavedSearch) {
        self.0.insert(search.signature(), search);
    }

    /// Returns whether a search existed under the given signature
    pub fn delete(&mut self, signature: &str) -> bool {
        self.0.remove(signature).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, SavedSearch> {
        self.0.iter()
    }

    pub fn values(&self) -> hash_map::Values<'_, String, SavedSearch> {
        self.0.values()
    }
}

// ============================================================================
// Marketplace Models
// ============================================================================

/// Item is a single marketplace search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default, rename = "web_slug")]
    pub slug: String,
}

// ============================================================================
// Pipeline Models
// ============================================================================

/// Job is one saved search of one user, waiting in the backlog
#[derive(Debug, Clone)]
pub struct Job {
    pub user: Arc<User>,
    /// Key the saved search is stored under in the user record
    pub signature: String,
    pub search: SearchSpec,
}

impl Job {
    /// Job for a search stored under its own signature
    pub fn new(user: Arc<User>, search: SearchSpec) -> Self {
        Self {
            user,
            signature: search.signature(),
            search,
        }
    }
}

/// Notification is a match the user should hear about
#[derive(Debug, Clone)]
pub struct Notification {
    pub user: Arc<User>,
    pub item: Item,
    /// Signature of the saved search that matched
    pub search: String,
}
