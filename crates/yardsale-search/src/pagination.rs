//! Offset pagination with a one-page prefetch cache.
//!
//! After a full first page lands, the following page is fetched in the
//! background so "load more" can be served without a round trip. Every
//! entry is tied to the shape hash of the query that produced it; a new
//! shape resets the cache.

use yardsale_core::Sale;

#[derive(Debug, Clone, PartialEq)]
pub struct PrefetchedPage {
    pub offset: u32,
    pub sales: Vec<Sale>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadMore {
    /// Served from the prefetch cache. `prefetch` is the next offset to
    /// fetch in the background, if the consumed page was full.
    Consumed {
        sales: Vec<Sale>,
        prefetch: Option<u32>,
    },
    /// Nothing cached; fetch `offset` now.
    Fetch { offset: u32 },
    Exhausted,
}

#[derive(Debug)]
pub struct PageCache {
    page_size: u32,
    shape_hash: Option<String>,
    next_offset: u32,
    has_more: bool,
    prefetched: Option<PrefetchedPage>,
    prefetch_requested: Option<u32>,
}

impl PageCache {
    #[must_use]
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            shape_hash: None,
            next_offset: 0,
            has_more: false,
            prefetched: None,
            prefetch_requested: None,
        }
    }

    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    #[must_use]
    pub fn shape_hash(&self) -> Option<&str> {
        self.shape_hash.as_deref()
    }

    #[must_use]
    pub fn prefetched(&self) -> Option<&PrefetchedPage> {
        self.prefetched.as_ref()
    }

    /// Start over for a new query shape.
    pub fn reset(&mut self, shape_hash: impl Into<String>) {
        self.shape_hash = Some(shape_hash.into());
        self.next_offset = 0;
        self.has_more = false;
        self.prefetched = None;
        self.prefetch_requested = None;
    }

    /// Record a successful page. Returns the offset to prefetch, at most once
    /// per offset, when a non-appending fetch filled the page.
    pub fn after_fetch(&mut self, offset: u32, len: usize, appended: bool) -> Option<u32> {
        let len = u32::try_from(len).unwrap_or(u32::MAX);
        self.next_offset = offset.saturating_add(len);
        self.has_more = len >= self.page_size;
        if appended || !self.has_more {
            return None;
        }
        self.request_prefetch()
    }

    /// Store a prefetched page. Pages for another shape or offset are dropped.
    pub fn prefetch_loaded(&mut self, shape_hash: &str, offset: u32, sales: Vec<Sale>) {
        if self.shape_hash.as_deref() != Some(shape_hash) || offset != self.next_offset {
            tracing::debug!(offset, "discarding prefetched page for an outdated query");
            return;
        }
        if sales.is_empty() {
            self.has_more = false;
            self.prefetched = None;
            return;
        }
        self.prefetched = Some(PrefetchedPage { offset, sales });
    }

    /// A failed prefetch leaves `load_more` to fetch the page itself.
    pub fn prefetch_failed(&mut self, offset: u32) {
        if self.prefetch_requested == Some(offset) {
            self.prefetch_requested = None;
        }
    }

    pub fn load_more(&mut self) -> LoadMore {
        if !self.has_more {
            return LoadMore::Exhausted;
        }
        match self.prefetched.take() {
            Some(page) if page.offset == self.next_offset => {
                let len = u32::try_from(page.sales.len()).unwrap_or(u32::MAX);
                self.next_offset = self.next_offset.saturating_add(len);
                self.has_more = len >= self.page_size;
                let prefetch = if self.has_more {
                    self.request_prefetch()
                } else {
                    None
                };
                LoadMore::Consumed {
                    sales: page.sales,
                    prefetch,
                }
            }
            _ => LoadMore::Fetch {
                offset: self.next_offset,
            },
        }
    }

    fn request_prefetch(&mut self) -> Option<u32> {
        if self.prefetch_requested == Some(self.next_offset) {
            return None;
        }
        self.prefetch_requested = Some(self.next_offset);
        Some(self.next_offset)
    }
}

#[cfg(test)]
mod tests {
    use yardsale_core::Marker;

    use super::*;

    fn sales(n: usize) -> Vec<Sale> {
        (0..n)
            .map(|i| {
                Sale::stub(&Marker {
                    id: format!("s{i}"),
                    title: "sale".to_owned(),
                    lat: 0.0,
                    lng: 0.0,
                })
            })
            .collect()
    }

    #[test]
    fn full_first_page_requests_one_prefetch() {
        let mut cache = PageCache::new(24);
        cache.reset("shape");
        assert_eq!(cache.after_fetch(0, 24, false), Some(24));
        assert!(cache.has_more());
        // A repeated result for the same page does not prefetch twice.
        assert_eq!(cache.after_fetch(0, 24, false), None);
    }

    #[test]
    fn short_page_clears_has_more() {
        let mut cache = PageCache::new(24);
        cache.reset("shape");
        assert_eq!(cache.after_fetch(0, 10, false), None);
        assert!(!cache.has_more());
        assert_eq!(cache.load_more(), LoadMore::Exhausted);
    }

    #[test]
    fn load_more_consumes_prefetched_page() {
        let mut cache = PageCache::new(24);
        cache.reset("shape");
        let offset = cache.after_fetch(0, 24, false).unwrap();
        cache.prefetch_loaded("shape", offset, sales(24));

        match cache.load_more() {
            LoadMore::Consumed { sales, prefetch } => {
                assert_eq!(sales.len(), 24);
                assert_eq!(prefetch, Some(48));
            }
            other => panic!("expected Consumed, got {other:?}"),
        }
        assert_eq!(cache.next_offset(), 48);
    }

    #[test]
    fn load_more_without_cache_fetches_next_offset() {
        let mut cache = PageCache::new(24);
        cache.reset("shape");
        cache.after_fetch(0, 24, false);
        assert_eq!(cache.load_more(), LoadMore::Fetch { offset: 24 });
    }

    #[test]
    fn empty_prefetch_clears_has_more() {
        let mut cache = PageCache::new(24);
        cache.reset("shape");
        cache.after_fetch(0, 24, false);
        cache.prefetch_loaded("shape", 24, Vec::new());
        assert!(!cache.has_more());
        assert_eq!(cache.load_more(), LoadMore::Exhausted);
    }

    #[test]
    fn prefetch_for_old_shape_is_ignored() {
        let mut cache = PageCache::new(24);
        cache.reset("old");
        cache.after_fetch(0, 24, false);
        cache.reset("new");
        cache.after_fetch(0, 24, false);
        cache.prefetch_loaded("old", 24, sales(24));
        assert!(cache.prefetched().is_none());
    }

    #[test]
    fn short_prefetched_page_ends_pagination_once_consumed() {
        let mut cache = PageCache::new(24);
        cache.reset("shape");
        cache.after_fetch(0, 24, false);
        cache.prefetch_loaded("shape", 24, sales(5));
        assert!(cache.has_more());
        assert!(matches!(
            cache.load_more(),
            LoadMore::Consumed { prefetch: None, .. }
        ));
        assert!(!cache.has_more());
    }

    #[test]
    fn appended_fetch_does_not_prefetch() {
        let mut cache = PageCache::new(24);
        cache.reset("shape");
        cache.after_fetch(0, 24, false);
        cache.prefetch_failed(24);
        assert_eq!(cache.after_fetch(24, 24, true), None);
        assert_eq!(cache.next_offset(), 48);
    }
}
