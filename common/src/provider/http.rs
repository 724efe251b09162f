// HTTP search provider for the marketplace REST API

use crate::config::ProviderConfig;
use crate::errors::ProviderError;
use crate::models::Item;
use crate::provider::{passes_filters, SearchArgs, SearchProvider};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Response header carrying the query string of the next result page
pub const NEXT_PAGE_HEADER: &str = "X-NextPage";

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    search_objects: Vec<Item>,
}

/// Result of fetching a single page
struct Page {
    items: Vec<Item>,
    next: Option<String>,
}

/// HttpSearchProvider queries `{base_url}/general/search` and follows the page cursor
pub struct HttpSearchProvider {
    client: Client,
    search_url: Url,
    max_pages: usize,
}

impl HttpSearchProvider {
    /// Create a new provider with the configured timeout and user agent
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let search_url = Url::parse(&format!(
            "{}/general/search",
            config.base_url.trim_end_matches('/')
        ))
        .map_err(|e| ProviderError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ProviderError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            search_url,
            max_pages: config.max_pages.max(1),
        })
    }

    /// Query parameters derived from the search arguments
    fn base_params(args: &SearchArgs) -> Vec<(&'static str, String)> {
        let mut params = vec![("keywords", args.keywords.clone())];
        if let Some(min_price) = args.min_price {
            params.push(("min_sale_price", min_price.to_string()));
        }
        if args.max_price > 0 {
            params.push(("max_sale_price", args.max_price.to_string()));
        }
        if let Some(radius_m) = args.radius_m {
            params.push(("distance", radius_m.to_string()));
        }
        params.push(("latitude", args.latitude.to_string()));
        params.push(("longitude", args.longitude.to_string()));
        params
    }

    /// Build the URL of a page: cursor pairs first, search arguments override them
    fn page_url(&self, args: &SearchArgs, cursor: Option<&str>) -> Url {
        let params = Self::base_params(args);

        let mut carried: Vec<(String, String)> = Vec::new();
        if let Some(cursor) = cursor {
            let mut scratch = self.search_url.clone();
            scratch.set_query(Some(cursor.trim_start_matches('?')));
            carried = scratch
                .query_pairs()
                .filter(|(key, _)| !params.iter().any(|(name, _)| name == key))
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
        }

        let mut url = self.search_url.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(carried.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        url
    }

    async fn fetch_page(&self, url: Url) -> Result<Page, ProviderError> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                url: url.path().to_string(),
            });
        }

        let next = response
            .headers()
            .get(NEXT_PAGE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let body = response.text().await?;
        let page: SearchPage =
            serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(Page {
            items: page.search_objects,
            next,
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    #[instrument(skip(self, args), fields(keywords = %args.keywords))]
    async fn search(&self, args: &SearchArgs) -> Result<Vec<Item>, ProviderError> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        for page_number in 1..=self.max_pages {
            let url = self.page_url(args, cursor.as_deref());
            let page = self.fetch_page(url).await?;

            if page.items.is_empty() {
                debug!(page = page_number, "Empty result page");
                break;
            }

            let fetched = page.items.len();
            results.extend(page.items.into_iter().filter(|item| passes_filters(args, item)));
            debug!(page = page_number, fetched, kept = results.len(), "Fetched result page");

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(results)
    }
}
