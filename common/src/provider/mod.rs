// Marketplace search provider abstraction

pub mod http;

use crate::errors::ProviderError;
use crate::models::Item;
use async_trait::async_trait;

pub use http::HttpSearchProvider;

/// Normalized query parameters for one saved-search run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchArgs {
    pub keywords: String,
    pub min_price: Option<u32>,
    pub max_price: u32,
    /// Search radius in meters, `None` for unbounded
    pub radius_m: Option<u32>,
    pub latitude: f64,
    pub longitude: f64,
    pub strict: bool,
    pub no_zero: bool,
}

/// SearchProvider trait for querying the marketplace
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a search across every result page and return the items that pass the filters
    async fn search(&self, args: &SearchArgs) -> Result<Vec<Item>, ProviderError>;
}

/// Returns whether an item survives the strict and no-zero filters
pub fn passes_filters(args: &SearchArgs, item: &Item) -> bool {
    if args.no_zero && item.price == 0.0 {
        return false;
    }
    if args.strict && !contains_any(&item.title, &args.keywords) {
        return false;
    }
    true
}

/// Case-insensitive check that `text` contains at least one of the whitespace-separated keywords
pub fn contains_any(text: &str, keywords: &str) -> bool {
    let text = text.to_lowercase();
    keywords
        .split_whitespace()
        .any(|keyword| text.contains(&keyword.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(strict: bool, no_zero: bool) -> SearchArgs {
        SearchArgs {
            keywords: "Road Bike".to_string(),
            min_price: None,
            max_price: 200,
            radius_m: None,
            latitude: 0.0,
            longitude: 0.0,
            strict,
            no_zero,
        }
    }

    fn item(title: &str, price: f64) -> Item {
        Item {
            id: "1".to_string(),
            title: title.to_string(),
            description: String::new(),
            price,
            currency: "EUR".to_string(),
            slug: "x".to_string(),
        }
    }

    #[test]
    fn test_contains_any_is_case_insensitive() {
        assert!(contains_any("Vintage ROAD racer", "road bike"));
        assert!(contains_any("mountain bike", "Road BIKE"));
        assert!(!contains_any("kitchen table", "road bike"));
        assert!(!contains_any("anything", ""));
    }

    #[test]
    fn test_strict_filter() {
        assert!(passes_filters(&args(false, false), &item("lamp", 10.0)));
        assert!(!passes_filters(&args(true, false), &item("lamp", 10.0)));
        assert!(passes_filters(&args(true, false), &item("Old bike", 10.0)));
    }

    #[test]
    fn test_no_zero_filter() {
        assert!(passes_filters(&args(false, false), &item("bike", 0.0)));
        assert!(!passes_filters(&args(false, true), &item("bike", 0.0)));
        assert!(passes_filters(&args(false, true), &item("bike", 0.5)));
    }
}
