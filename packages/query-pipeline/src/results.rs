//! Parse step contract and lazily drained query results.
//!
//! A parser turns one [`RawResponse`] into a [`Parsed`] value: a lazy
//! iterator of items plus whatever error message the source reported in-band.
//! The pipeline wraps that in [`QueryResults`], which only consults the
//! source's message once the iterator is exhausted without yielding anything.

use tracing::info;

use crate::error::ParseError;
use crate::transport::RawResponse;

/// Parse step for one result shape of one source.
///
/// Implementations must be deterministic: parsing the same raw response twice
/// yields the same items, which is what makes cached responses reusable.
pub trait ResponseParser: Send + Sync {
    /// Item produced per structural record.
    type Item: Send + 'static;

    /// Name of the result shape, part of the cache key.
    ///
    /// One module may query the same key for unrelated shapes (e.g. domains
    /// and redirects); each shape gets its own cache entry.
    fn variant(&self) -> &'static str;

    /// Parse a raw response for `query`.
    fn parse(&self, raw: &RawResponse, query: &str) -> Result<Parsed<Self::Item>, ParseError>;
}

/// Output of a parse step.
pub struct Parsed<T> {
    items: Box<dyn Iterator<Item = T> + Send>,
    source_error: Option<String>,
}

impl<T: Send + 'static> Parsed<T> {
    /// Wrap a lazy iterator of items.
    pub fn new(items: impl Iterator<Item = T> + Send + 'static) -> Self {
        Self {
            items: Box::new(items),
            source_error: None,
        }
    }

    /// Nothing to yield.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Attach the source's in-band error message, if it reported one.
    ///
    /// Blank messages are dropped.
    pub fn with_source_error(mut self, message: Option<String>) -> Self {
        self.source_error = message.filter(|m| !m.trim().is_empty());
        self
    }

    /// The source's in-band error message.
    pub fn source_error(&self) -> Option<&str> {
        self.source_error.as_deref()
    }

    /// Consume into the item iterator.
    pub fn into_items(self) -> Box<dyn Iterator<Item = T> + Send> {
        self.items
    }
}

/// Lazily drained results of one `query()` call.
///
/// Yields each parsed item once. When the underlying iterator runs dry having
/// produced nothing, the source's own message (if any) is logged exactly once
/// and becomes available through [`QueryResults::no_results_reason`].
pub struct QueryResults<T> {
    module: String,
    query: String,
    items: Option<Box<dyn Iterator<Item = T> + Send>>,
    source_error: Option<String>,
    yielded: usize,
}

impl<T: Send + 'static> QueryResults<T> {
    pub(crate) fn new(module: &str, query: &str, parsed: Parsed<T>) -> Self {
        Self {
            module: module.to_string(),
            query: query.to_string(),
            items: Some(parsed.items),
            source_error: parsed.source_error,
            yielded: 0,
        }
    }

    /// Results of a failed or skipped query.
    pub fn empty(module: &str, query: &str) -> Self {
        Self {
            module: module.to_string(),
            query: query.to_string(),
            items: None,
            source_error: None,
            yielded: 0,
        }
    }

    /// The query key these results belong to.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Whether the iterator has been drained.
    pub fn is_exhausted(&self) -> bool {
        self.items.is_none()
    }

    /// Number of items yielded so far.
    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// The source's explanation for an empty result set.
    ///
    /// Only set after the results were fully drained and produced nothing.
    pub fn no_results_reason(&self) -> Option<&str> {
        if self.is_exhausted() && self.yielded == 0 {
            self.source_error.as_deref()
        } else {
            None
        }
    }

    fn finish(&mut self) {
        self.items = None;
        if self.yielded == 0 {
            if let Some(message) = &self.source_error {
                info!(
                    module = %self.module,
                    query = %self.query,
                    "No results for {}: {}",
                    self.query,
                    message
                );
            }
        }
    }
}

impl<T: Send + 'static> Iterator for QueryResults<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let next = self.items.as_mut()?.next();
        match next {
            Some(item) => {
                self.yielded += 1;
                Some(item)
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

impl<T> std::fmt::Debug for QueryResults<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResults")
            .field("module", &self.module)
            .field("query", &self.query)
            .field("exhausted", &self.items.is_none())
            .field("yielded", &self.yielded)
            .finish()
    }
}
