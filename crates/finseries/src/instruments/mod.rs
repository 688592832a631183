//! Lazy, paginated instrument search.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use log::debug;

use crate::dispatch::RequestDispatcher;
use crate::errors::SeriesError;
use crate::models::Instrument;
use crate::parser::ResponseParser;
use crate::source::SourceCatalog;

/// Instruments matching a search, page by page as they are polled.
pub type InstrumentStream = BoxStream<'static, Result<Instrument, SeriesError>>;

/// Enumerates the instruments a source offers.
///
/// Every [`search`](Self::search) returns a fresh stream; nothing is fetched
/// until it is polled. Pages go through the same worker pool, rate limiter
/// and retry policy as history downloads.
#[derive(Clone)]
pub struct InstrumentInfoProvider {
    catalog: Arc<SourceCatalog>,
    dispatcher: Arc<RequestDispatcher>,
    parser: ResponseParser,
    max_pages: usize,
}

struct Cursor {
    page_index: u32,
    finished: bool,
}

impl InstrumentInfoProvider {
    pub fn new(
        catalog: Arc<SourceCatalog>,
        dispatcher: Arc<RequestDispatcher>,
        parser: ResponseParser,
        max_pages: usize,
    ) -> Self {
        Self {
            catalog,
            dispatcher,
            parser,
            max_pages,
        }
    }

    /// Search `source_id` for instruments matching `query`.
    ///
    /// Sources whose listing takes no `{query}` are filtered here on code
    /// or name, case-insensitively. A blank query lists everything.
    pub fn search(&self, source_id: &str, query: &str) -> InstrumentStream {
        let provider = self.clone();
        let source_id = source_id.to_string();
        let query = query.trim().to_string();

        let start = Cursor {
            page_index: 0,
            finished: false,
        };

        stream::try_unfold(start, move |cursor| {
            let provider = provider.clone();
            let source_id = source_id.clone();
            let query = query.clone();
            async move {
                if cursor.finished {
                    return Ok::<_, SeriesError>(None);
                }
                let page = provider.fetch_page(&source_id, &query, &cursor).await?;
                Ok(Some((page.instruments, page.next)))
            }
        })
        .map_ok(|instruments| stream::iter(instruments.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn fetch_page(
        &self,
        source_id: &str,
        query: &str,
        cursor: &Cursor,
    ) -> Result<Page, SeriesError> {
        if cursor.page_index as usize >= self.max_pages {
            return Err(SeriesError::PageLimitExceeded {
                source_id: source_id.to_string(),
                limit: self.max_pages,
            });
        }

        let source = self.catalog.describe(source_id)?;
        let listing = source.listing.as_ref().ok_or_else(|| {
            SeriesError::validation(format!("source {} has no instrument listing", source_id))
        })?;

        let response = self
            .dispatcher
            .fetch_listing_page(source_id, query, cursor.page_index)
            .await?;
        let mut instruments = self.parser.parse_listing(source_id, &response)?;
        let received = instruments.len();

        let finished = match &listing.paging {
            Some(paging) => received < paging.size,
            None => true,
        };

        if !query.is_empty() && !listing.request.uses("query") {
            let needle = query.to_lowercase();
            instruments.retain(|instrument| {
                instrument.code().to_lowercase().contains(&needle)
                    || instrument.name().to_lowercase().contains(&needle)
            });
        }

        debug!(
            "{} listing page {}: {} entries, {} kept",
            source_id,
            cursor.page_index,
            received,
            instruments.len()
        );

        Ok(Page {
            instruments,
            next: Cursor {
                page_index: cursor.page_index + 1,
                finished,
            },
        })
    }
}

struct Page {
    instruments: Vec<Instrument>,
    next: Cursor,
}
