use crate::config::GeocoderConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    /// Resolvable to a coordinate via a detail lookup.
    Place,
    /// Only fills the search field when selected.
    Query,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub text: String,
    pub kind: SuggestionKind,
}

/// Client for a search-box style geocoder: incremental suggestions plus an
/// id-based detail lookup. One session token is reused across the whole
/// typing session so the provider bills it as one search.
pub struct GeocodeClient {
    http: reqwest::Client,
    config: GeocoderConfig,
    session_token: String,
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    suggestions: Vec<SuggestEntry>,
}

#[derive(Debug, Deserialize)]
struct SuggestEntry {
    mapbox_id: String,
    name: String,
    place_formatted: Option<String>,
    feature_type: Option<String>,
}

impl SuggestEntry {
    fn into_suggestion(self) -> Suggestion {
        let kind = match self.feature_type.as_deref() {
            Some("category") | Some("query") | Some("brand") => SuggestionKind::Query,
            _ => SuggestionKind::Place,
        };
        let text = match self.place_formatted.filter(|p| !p.is_empty()) {
            Some(place) => format!("{}, {}", self.name, place),
            None => self.name,
        };
        Suggestion {
            id: self.mapbox_id,
            text,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    features: Vec<RetrieveFeature>,
}

#[derive(Debug, Deserialize)]
struct RetrieveFeature {
    geometry: RetrieveGeometry,
}

#[derive(Debug, Deserialize)]
struct RetrieveGeometry {
    /// [longitude, latitude]
    coordinates: [f64; 2],
}

impl GeocodeClient {
    pub fn new(config: GeocoderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            session_token: Uuid::new_v4().to_string(),
        }
    }

    pub async fn suggest(&self, query: &str) -> Result<Vec<Suggestion>> {
        let url = format!("{}/suggest", self.config.base_url.trim_end_matches('/'));
        let mut params = vec![
            ("q", query.to_string()),
            ("access_token", self.config.access_token.clone()),
            ("session_token", self.session_token.clone()),
            ("limit", self.config.limit.to_string()),
        ];
        if let Some(country) = &self.config.country {
            params.push(("country", country.clone()));
        }

        let response: SuggestResponse = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("geocoder suggest request failed")?
            .error_for_status()
            .context("geocoder suggest returned an error status")?
            .json()
            .await
            .context("could not decode suggest response")?;

        Ok(response
            .suggestions
            .into_iter()
            .map(SuggestEntry::into_suggestion)
            .collect())
    }

    /// Detail lookup for a selected place. Returns (longitude, latitude).
    pub async fn retrieve(&self, id: &str) -> Result<Option<(f64, f64)>> {
        let url = format!(
            "{}/retrieve/{}",
            self.config.base_url.trim_end_matches('/'),
            id
        );
        let params = [
            ("access_token", self.config.access_token.clone()),
            ("session_token", self.session_token.clone()),
        ];

        let response: RetrieveResponse = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("geocoder retrieve request failed")?
            .error_for_status()
            .context("geocoder retrieve returned an error status")?
            .json()
            .await
            .context("could not decode retrieve response")?;

        Ok(response
            .features
            .into_iter()
            .next()
            .map(|f| (f.geometry.coordinates[0], f.geometry.coordinates[1])))
    }
}

/// Session-scoped suggestion list. Responses are not cancellable, so each
/// issued search carries a monotonically increasing token and only the
/// latest token's response is applied — a slow response to an old keystroke
/// can never overwrite a fresher batch.
#[derive(Debug, Default)]
pub struct SuggestionController {
    latest_seq: u64,
    suggestions: Vec<Suggestion>,
}

impl SuggestionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new outgoing search and get the token its response must
    /// present.
    pub fn begin(&mut self) -> u64 {
        self.latest_seq += 1;
        self.latest_seq
    }

    /// Empty input clears synchronously and invalidates anything in flight.
    pub fn clear(&mut self) {
        self.latest_seq += 1;
        self.suggestions.clear();
    }

    /// Apply a response batch. Returns false (and leaves the list alone) for
    /// stale tokens.
    pub fn apply(&mut self, seq: u64, results: Vec<Suggestion>) -> bool {
        if seq != self.latest_seq {
            debug!(
                seq,
                latest = self.latest_seq,
                "discarding stale suggestion response"
            );
            return false;
        }
        self.suggestions = results;
        true
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }
}
