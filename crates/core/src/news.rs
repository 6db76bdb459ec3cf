//! Headline polling with last-known-value retention.

use crate::error::FeedError;
use crate::normalize::extract_headline;
use crate::traits::NewsSource;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Current and previous headline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewsState {
    pub current: String,
    pub previous: String,
}

impl NewsState {
    /// Applies the items of a successful poll, newest first.
    ///
    /// Item 0 overwrites `current` and item 1 overwrites `previous`, each
    /// only when the item yields a headline. Returns true if either field
    /// changed.
    pub fn apply(&mut self, items: &[Value]) -> bool {
        let before = self.clone();

        if let Some(current) = items.first().and_then(extract_headline) {
            self.current = current;
        }
        if let Some(previous) = items.get(1).and_then(extract_headline) {
            self.previous = previous;
        }

        *self != before
    }
}

/// Polls a news source and keeps the last successful headlines.
pub struct NewsFeed {
    source: Arc<dyn NewsSource>,
    state: NewsState,
}

impl NewsFeed {
    pub fn new(source: Arc<dyn NewsSource>) -> Self {
        Self {
            source,
            state: NewsState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &NewsState {
        &self.state
    }

    /// Polls the source once.
    ///
    /// Returns whether the headlines changed.
    ///
    /// # Errors
    /// Propagates the source error; state is left untouched.
    pub async fn poll(&mut self) -> Result<bool, FeedError> {
        let items = self.source.headlines().await?;
        let changed = self.state.apply(&items);

        if changed {
            tracing::info!("News: {}", self.state.current);
        }

        Ok(changed)
    }
}
