use crate::utils::http_mocker;
use chatmock::pagination::{Paginated, PaginatedEndpoint};
use serde::{Deserialize, Serialize};

const MAX_MESSAGES: usize = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct Message {
    id: u64,
    content: String,
}

impl Paginated for Message {
    fn id(&self) -> u64 {
        self.id
    }
}

fn messages(n: u64) -> Vec<Message> {
    (1..=n)
        .map(|id| Message {
            id,
            content: format!("message {}", id),
        })
        .collect()
}

fn endpoint() -> PaginatedEndpoint {
    PaginatedEndpoint::new("Messages", "/channels/1/messages", MAX_MESSAGES)
}

#[test]
fn unbounded_fetch_walks_all_pages() {
    let (mocker, reporter) = http_mocker();
    let all = messages(250);
    endpoint().mock_all(&mocker, &all, 0);

    let client = mocker.blocking_client();
    let mut received: Vec<Message> = Vec::new();
    let mut after = 0;

    loop {
        let mut url = mocker.url("/channels/1/messages?limit=100");
        if after != 0 {
            url.push_str(&format!("&after={}", after));
        }

        let page: Vec<Message> = client.get(url).send().unwrap().json().unwrap();
        let len = page.len();
        if let Some(last) = page.last() {
            after = last.id;
        }
        received.extend(page);

        if len < MAX_MESSAGES {
            break;
        }
    }

    assert_eq!(received, all);
    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn limited_backward_fetch_ends_with_the_remaining_items() {
    let (mocker, reporter) = http_mocker();
    let all = messages(150);
    endpoint().mock_before(&mocker, &all, 500, 150);

    let client = mocker.blocking_client();
    let fetch = |query: &str| -> Vec<Message> {
        client
            .get(mocker.url(format!("/channels/1/messages?{}", query)))
            .send()
            .unwrap()
            .json()
            .unwrap()
    };

    let newest = fetch("limit=100&before=500");
    assert_eq!(newest, all[50..].to_vec());

    let oldest = fetch("limit=50&before=51");
    assert_eq!(oldest, all[..50].to_vec());

    assert!(mocker.is_drained());
    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn wrong_cursor_is_reported() {
    let (mocker, reporter) = http_mocker();
    endpoint().mock_after(&mocker, &messages(30), 5, 30);

    let page: Vec<Message> = mocker
        .blocking_client()
        .get(mocker.url("/channels/1/messages?limit=30&after=6"))
        .send()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(page.len(), 30);
    mocker.finalize();

    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("'after'"));
}

#[test]
fn around_uses_default_limit() {
    let (mocker, reporter) = http_mocker();
    endpoint().mock_around(&mocker, &messages(3), 2, 0);

    let page: Vec<Message> = mocker
        .blocking_client()
        .get(mocker.url("/channels/1/messages?limit=50&around=2"))
        .send()
        .unwrap()
        .json()
        .unwrap();

    assert_eq!(page.len(), 3);
    mocker.finalize();
    reporter.assert_no_failures();
}

#[test]
fn unserved_pages_are_named_in_the_report() {
    let (mocker, reporter) = http_mocker();
    endpoint().mock_before(&mocker, &messages(150), 0, 0);

    mocker.finalize();

    let failures = reporter.failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("Messages #1"));
    assert!(failures[0].contains("Messages #2"));
}

#[test]
#[should_panic(expected = "cannot serve 2 items with a limit of 1")]
fn more_items_than_limit_panics() {
    let (mocker, _reporter) = http_mocker();
    endpoint().mock_all(&mocker, &messages(2), 1);
}
