//! Mocks for endpoints that hand out a collection page by page.
//!
//! A client asked for `N` items of a paginated resource sends one request per page, moving a
//! cursor along the collection. The helpers here expand one such logical call into the page
//! requests the client is expected to send and register one handler per page.
//!
//! Page planning is exposed separately ([plan_forward], [plan_backward], [plan_around]) so
//! the arithmetic can be inspected without a server.
use crate::{
    api::{mocker::Mocker, response},
    check::query::{check_request_query, QueryMap},
};
use bytes::Bytes;
use http::{Method, StatusCode};
use serde::Serialize;
use std::ops::Range;

/// Upper bound of the `limit` of a request around a cursor.
pub const MAX_AROUND_LIMIT: usize = 100;

/// The `limit` sent by a request around a cursor that did not ask for a limit.
pub const DEFAULT_AROUND_LIMIT: usize = 50;

/// An item of a paginated collection, identified by a numeric ID the cursors refer to.
pub trait Paginated {
    fn id(&self) -> u64;
}

/// One page request a client is expected to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// The items served for this request, as indices into the full item list.
    pub items: Range<usize>,
    /// The `limit` query parameter.
    pub limit: usize,
    /// Cursor query parameters, omitted from the query when zero.
    pub before: u64,
    pub after: u64,
    pub around: u64,
}

impl Page {
    fn new(items: Range<usize>, limit: usize) -> Self {
        Self {
            items,
            limit,
            before: 0,
            after: 0,
            around: 0,
        }
    }

    /// The query the client is expected to send for this page.
    pub fn query(&self) -> QueryMap {
        let mut query = QueryMap::new();
        query.insert("limit".to_string(), vec![self.limit.to_string()]);

        for (key, value) in [
            ("before", self.before),
            ("after", self.after),
            ("around", self.around),
        ] {
            if value != 0 {
                query.insert(key.to_string(), vec![value.to_string()]);
            }
        }

        query
    }
}

/// Plans pages walking forward, each one starting after the last item of the previous page.
///
/// `ids` are the IDs of the items that will be served, in collection order. The first page
/// uses `after` as cursor (`0` for none). `limit == 0` means "all items".
///
/// # Panics
/// If `limit` is non-zero and smaller than the number of items, or `max_page_size` is zero.
pub fn plan_forward(ids: &[u64], after: u64, limit: usize, max_page_size: usize) -> Vec<Page> {
    check_preconditions(ids.len(), limit, max_page_size);

    let mut pages = Vec::new();
    let mut budget = PageBudget::new(limit, max_page_size);
    let mut start = 0;
    let mut cursor = after;

    loop {
        let fetch = budget.next_fetch();
        let end = (start + fetch).min(ids.len());

        let mut page = Page::new(start..end, fetch);
        page.after = cursor;
        pages.push(page);

        if budget.is_done(end - start) {
            break;
        }

        cursor = ids[end - 1];
        start = end;
    }

    pages
}

/// Plans pages walking backward from the end of the collection, each one ending before the
/// first item of the previous page.
///
/// `ids` are the IDs of the items that will be served, in collection order. The first page
/// uses `before` as cursor (`0` for none). `limit == 0` means "all items".
///
/// # Panics
/// If `limit` is non-zero and smaller than the number of items, or `max_page_size` is zero.
pub fn plan_backward(ids: &[u64], before: u64, limit: usize, max_page_size: usize) -> Vec<Page> {
    check_preconditions(ids.len(), limit, max_page_size);

    let mut pages = Vec::new();
    let mut budget = PageBudget::new(limit, max_page_size);
    let mut end = ids.len();
    let mut cursor = before;

    loop {
        let fetch = budget.next_fetch();
        let start = end.saturating_sub(fetch);

        let mut page = Page::new(start..end, fetch);
        page.before = cursor;
        pages.push(page);

        if budget.is_done(end - start) {
            break;
        }

        cursor = ids[start];
        end = start;
    }

    pages
}

/// Plans the single request fetching items around a cursor.
///
/// `limit` is clamped to `1..=100`, and `0` becomes `50`.
///
/// # Panics
/// If there are more items than the effective limit.
pub fn plan_around(item_count: usize, around: u64, limit: usize) -> Page {
    let limit = match limit {
        0 => DEFAULT_AROUND_LIMIT,
        limit => limit.clamp(1, MAX_AROUND_LIMIT),
    };
    check_preconditions(item_count, limit, MAX_AROUND_LIMIT);

    let mut page = Page::new(0..item_count, limit);
    page.around = around;
    page
}

/// Tracks how many items are left to request and decides when a client stops paging.
struct PageBudget {
    limit: usize,
    remaining: usize,
    max_page_size: usize,
}

impl PageBudget {
    fn new(limit: usize, max_page_size: usize) -> Self {
        Self {
            limit,
            remaining: limit,
            max_page_size,
        }
    }

    fn next_fetch(&mut self) -> usize {
        if self.limit == 0 {
            return self.max_page_size;
        }
        let fetch = self.max_page_size.min(self.remaining);
        self.remaining -= fetch;
        fetch
    }

    /// A short page means the collection is exhausted.
    fn is_done(&self, served: usize) -> bool {
        served < self.max_page_size || (self.limit != 0 && self.remaining == 0)
    }
}

fn check_preconditions(item_count: usize, limit: usize, max_page_size: usize) {
    assert!(max_page_size > 0, "max page size must be positive");
    if limit != 0 && item_count > limit {
        panic!(
            "cannot serve {} items with a limit of {}; the limit must cover all items",
            item_count, limit
        );
    }
}

/// A paginated endpoint of the mocked API.
///
/// **Example**:
/// ```
/// use chatmock::{pagination::{Paginated, PaginatedEndpoint}, Mocker, TestContext};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Message { id: u64 }
///
/// impl Paginated for Message {
///     fn id(&self) -> u64 { self.id }
/// }
///
/// let ctx = TestContext::new("messages");
/// let mocker = Mocker::builder().https(false).start(ctx.clone());
/// let messages: Vec<Message> = (1..=150).map(|id| Message { id }).collect();
///
/// PaginatedEndpoint::new("Messages", "/channels/1/messages", 100)
///     .mock_before(&mocker, &messages, 0, 0);
///
/// let client = mocker.blocking_client();
/// let newest: Vec<serde_json::Value> = client
///     .get(mocker.url("/channels/1/messages?limit=100"))
///     .send().unwrap().json().unwrap();
/// assert_eq!(newest.len(), 100);
///
/// let oldest: Vec<serde_json::Value> = client
///     .get(mocker.url("/channels/1/messages?limit=100&before=51"))
///     .send().unwrap().json().unwrap();
/// assert_eq!(oldest.len(), 50);
///
/// mocker.finalize();
/// ctx.assert_passed();
/// ```
#[derive(Debug, Clone)]
pub struct PaginatedEndpoint {
    name: String,
    path: String,
    max_page_size: usize,
}

impl PaginatedEndpoint {
    pub fn new<N: Into<String>, P: Into<String>>(name: N, path: P, max_page_size: usize) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            max_page_size,
        }
    }

    /// Expects the client to fetch up to `limit` items from the start of the collection.
    pub fn mock_all<T>(&self, mocker: &Mocker, items: &[T], limit: usize)
    where
        T: Paginated + Serialize,
    {
        self.mock_after(mocker, items, 0, limit);
    }

    /// Expects the client to fetch up to `limit` items after the `after` cursor.
    pub fn mock_after<T>(&self, mocker: &Mocker, items: &[T], after: u64, limit: usize)
    where
        T: Paginated + Serialize,
    {
        let pages = plan_forward(&ids(items), after, limit, self.max_page_size);
        self.register(mocker, items, pages);
    }

    /// Expects the client to fetch up to `limit` items before the `before` cursor.
    pub fn mock_before<T>(&self, mocker: &Mocker, items: &[T], before: u64, limit: usize)
    where
        T: Paginated + Serialize,
    {
        let pages = plan_backward(&ids(items), before, limit, self.max_page_size);
        self.register(mocker, items, pages);
    }

    /// Expects the client to fetch up to `limit` items around the `around` cursor.
    pub fn mock_around<T>(&self, mocker: &Mocker, items: &[T], around: u64, limit: usize)
    where
        T: Paginated + Serialize,
    {
        let page = plan_around(items.len(), around, limit);
        self.register(mocker, items, vec![page]);
    }

    fn register<T: Serialize>(&self, mocker: &Mocker, items: &[T], pages: Vec<Page>) {
        for (n, page) in pages.into_iter().enumerate() {
            let body = match serde_json::to_vec(&items[page.items.clone()]) {
                Ok(body) => Bytes::from(body),
                Err(err) => mocker
                    .reporter()
                    .fail_now(format!("cannot serialize page of {}: {}", self.name, err)),
            };
            let query = page.query();

            mocker.register(
                format!("{} #{}", self.name, n + 1),
                Method::GET,
                &self.path,
                move |req, reporter| {
                    check_request_query(reporter, req, &query);
                    response::json_bytes(StatusCode::OK, body.clone())
                },
            );
        }
    }
}

fn ids<T: Paginated>(items: &[T]) -> Vec<u64> {
    items.iter().map(|item| item.id()).collect()
}
