use core::{
    flatten_patents, query_to_tables, DateRange, FetchError, Fetcher, HttpResponse, QuerySpec,
    RetryPolicy, Transport, PROBE_PER_PAGE,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Plays back scripted responses in order and records every payload sent.
struct FakeTransport {
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<Value>>,
}

impl FakeTransport {
    fn new(responses: Vec<HttpResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }
}

impl Transport for FakeTransport {
    fn send(&self, payload: &Value) -> Result<HttpResponse, FetchError> {
        self.requests.lock().push(payload.clone());
        Ok(self
            .responses
            .lock()
            .pop_front()
            .expect("transport ran out of scripted responses"))
    }
}

fn ok(body: Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        reason: "OK".to_string(),
        body: body.to_string(),
    }
}

fn server_error() -> HttpResponse {
    HttpResponse {
        status: 500,
        reason: "Internal Server Error".to_string(),
        body: "upstream unavailable".to_string(),
    }
}

fn page(total: u64, patents: Vec<Value>) -> Value {
    let count = patents.len();
    json!({ "patents": patents, "count": count, "total_patent_count": total })
}

fn numbered(range: std::ops::Range<u32>) -> Vec<Value> {
    range.map(|n| json!({ "patent_number": n.to_string() })).collect()
}

fn spec(fields: &[&str], per_page: usize) -> QuerySpec {
    QuerySpec::new(
        fields.iter().map(|f| f.to_string()).collect(),
        DateRange::parse("2020-01-01", "2020-01-02").unwrap(),
        per_page,
    )
    .unwrap()
}

#[test]
fn fetch_all_issues_one_probe_then_count_over_page_size_pages() {
    let transport = FakeTransport::new(vec![
        ok(page(5, numbered(0..1))),
        ok(page(5, numbered(0..2))),
        ok(page(5, numbered(2..4))),
        ok(page(5, numbered(4..5))),
    ]);
    let mut fetcher = Fetcher::new(&transport, RetryPolicy::default());

    let patents = fetcher.fetch_all(&spec(&["patent_number"], 2)).unwrap();

    assert_eq!(patents.len(), 5);
    let numbers: Vec<&str> = patents
        .iter()
        .map(|p| p["patent_number"].as_str().unwrap())
        .collect();
    assert_eq!(numbers, vec!["0", "1", "2", "3", "4"]);

    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    // Probe: minimal field list, small page size, page 1.
    assert_eq!(requests[0]["f"], json!(["patent_number"]));
    assert_eq!(requests[0]["o"]["per_page"], PROBE_PER_PAGE);
    assert_eq!(requests[0]["o"]["page"], 1);
    // Page sweep: 1-based pages at the requested size.
    for (i, request) in requests[1..].iter().enumerate() {
        assert_eq!(request["o"]["page"], i + 1);
        assert_eq!(request["o"]["per_page"], 2);
    }
}

#[test]
fn result_set_over_ceiling_fails_before_any_page_fetch() {
    let transport = FakeTransport::new(vec![ok(page(150_000, numbered(0..1)))]);
    let mut fetcher = Fetcher::new(&transport, RetryPolicy::default());

    let err = fetcher.fetch_all(&spec(&["patent_number"], 10_000)).unwrap_err();

    assert!(matches!(
        err,
        FetchError::ResultSetTooLarge { count: 150_000, ceiling: 100_000 }
    ));
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn zero_matches_yield_an_empty_aggregate_without_page_fetches() {
    let transport = FakeTransport::new(vec![ok(
        json!({ "patents": null, "count": 0, "total_patent_count": 0 }),
    )]);
    let mut fetcher = Fetcher::new(&transport, RetryPolicy::default());

    let patents = fetcher.fetch_all(&spec(&["patent_number"], 100)).unwrap();

    assert!(patents.is_empty());
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn automatic_retry_waits_and_reissues_the_identical_request() {
    let transport = FakeTransport::new(vec![
        ok(page(1, numbered(0..1))),
        server_error(),
        ok(page(1, numbered(0..1))),
    ]);
    let delay = Duration::from_millis(50);
    let mut fetcher = Fetcher::new(&transport, RetryPolicy::automatic(delay));

    let started = Instant::now();
    let patents = fetcher.fetch_all(&spec(&["patent_number"], 100)).unwrap();

    assert_eq!(patents.len(), 1);
    assert!(started.elapsed() >= delay);
    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1], requests[2]);
}

#[test]
fn interactive_decline_aborts_with_no_data() {
    let transport = FakeTransport::new(vec![ok(page(1, numbered(0..1))), server_error()]);
    let seen: Mutex<Vec<(u16, String)>> = Mutex::new(Vec::new());
    let mut fetcher = Fetcher::new(&transport, RetryPolicy::interactive()).with_confirm(
        |status, reason| {
            seen.lock().push((status, reason.to_string()));
            false
        },
    );

    let err = fetcher.fetch_all(&spec(&["patent_number"], 100)).unwrap_err();
    drop(fetcher);

    assert!(matches!(err, FetchError::UserAborted));
    assert_eq!(
        seen.into_inner(),
        vec![(500, "Internal Server Error".to_string())]
    );
}

#[test]
fn interactive_accept_reissues_until_success() {
    let transport = FakeTransport::new(vec![
        ok(page(1, numbered(0..1))),
        server_error(),
        server_error(),
        ok(page(1, numbered(0..1))),
    ]);
    let mut fetcher =
        Fetcher::new(&transport, RetryPolicy::interactive()).with_confirm(|_, _| true);

    let patents = fetcher.fetch_all(&spec(&["patent_number"], 100)).unwrap();

    assert_eq!(patents.len(), 1);
    assert_eq!(transport.requests().len(), 4);
}

#[test]
fn opt_in_retry_cap_is_enforced() {
    let transport = FakeTransport::new(vec![
        ok(page(1, numbered(0..1))),
        server_error(),
        server_error(),
    ]);
    let mut policy = RetryPolicy::automatic(Duration::from_millis(1));
    policy.max_retries = Some(2);
    let mut fetcher = Fetcher::new(&transport, policy);

    let err = fetcher.fetch_all(&spec(&["patent_number"], 100)).unwrap_err();

    assert!(matches!(err, FetchError::RetriesExhausted { attempts: 2 }));
    assert_eq!(transport.requests().len(), 3);
}

#[test]
fn malformed_success_body_is_fatal_not_retried() {
    let transport = FakeTransport::new(vec![ok(json!({ "patents": [] }))]);
    let mut fetcher = Fetcher::new(&transport, RetryPolicy::automatic(Duration::from_millis(1)));

    let err = fetcher.fetch_all(&spec(&["patent_number"], 100)).unwrap_err();

    assert!(matches!(err, FetchError::MalformedResponse(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn empty_page_before_the_probed_count_is_malformed() {
    let transport = FakeTransport::new(vec![
        ok(page(3, numbered(0..1))),
        ok(page(3, Vec::new())),
    ]);
    let mut fetcher = Fetcher::new(&transport, RetryPolicy::default());

    let err = fetcher.fetch_all(&spec(&["patent_number"], 100)).unwrap_err();

    assert!(matches!(err, FetchError::MalformedResponse(_)));
}

#[test]
fn query_to_tables_builds_parent_and_child_tables_sharing_the_key() {
    let transport = FakeTransport::new(vec![
        ok(page(1, numbered(0..1))),
        ok(page(
            1,
            vec![json!({
                "patent_number": "10000001",
                "patent_title": "Adjustable widget",
                "inventors": [
                    { "inventor_first_name": "Ada", "inventor_last_name": "Lovelace", "inventor_key_id": "1" },
                    { "inventor_first_name": "Grace", "inventor_last_name": "Hopper", "inventor_key_id": "2" },
                ],
            })],
        )),
    ]);

    let tables = query_to_tables(
        &transport,
        &["patent_number", "patent_title", "inventors"],
        "2020-01-01",
        "2020-01-02",
        10_000,
        RetryPolicy::default(),
        |_, _| false,
    )
    .unwrap();

    let parent = &tables["patent"];
    assert_eq!(parent.len(), 1);
    assert_eq!(parent.get(0, "patent_number").unwrap(), "10000001");
    assert_eq!(parent.get(0, "patent_title").unwrap(), "Adjustable widget");

    let inventor = &tables["inventor"];
    assert_eq!(inventor.len(), 2);
    assert_eq!(inventor.get(0, "patent_number").unwrap(), "10000001");
    assert_eq!(inventor.get(1, "patent_number").unwrap(), "10000001");
    assert_eq!(inventor.get(0, "inventor_last_name").unwrap(), "Lovelace");
    assert_eq!(inventor.get(1, "inventor_last_name").unwrap(), "Hopper");
}

#[test]
fn invalid_dates_fail_before_any_request() {
    let transport = FakeTransport::new(Vec::new());

    let err = query_to_tables(
        &transport,
        &["patent_number"],
        "2020-01-32",
        "2020-02-01",
        10_000,
        RetryPolicy::default(),
        |_, _| false,
    )
    .unwrap_err();

    assert!(matches!(err, FetchError::InvalidDate { .. }));
    assert!(transport.requests().is_empty());
}

#[test]
fn child_rows_join_back_to_the_parent_table() {
    let patents: Vec<core::Patent> = vec![
        json!({
            "patent_number": "1",
            "inventors": [
                { "inventor_first_name": "A" },
                { "inventor_first_name": "B" },
            ],
        }),
        json!({ "patent_number": "2" }),
        json!({
            "patent_number": "3",
            "inventors": [{ "inventor_first_name": "C" }],
        }),
    ]
    .into_iter()
    .map(|v| v.as_object().unwrap().clone())
    .collect();

    let fields: Vec<String> = ["patent_number", "inventors"]
        .iter()
        .map(|f| f.to_string())
        .collect();
    let tables = flatten_patents(&patents, &fields);

    let parent = &tables["patent"];
    let inventor = &tables["inventor"];
    let parent_keys: Vec<&Value> = (0..parent.len())
        .map(|row| parent.get(row, "patent_number").unwrap())
        .collect();

    // Referential integrity: every child key exists in the parent table.
    for row in 0..inventor.len() {
        let key = inventor.get(row, "patent_number").unwrap();
        assert!(parent_keys.contains(&key), "orphaned child key {key}");
    }

    // Cardinality: one row per nested element, one placeholder for the
    // patent with no inventors at all.
    let rows_for = |key: &str| {
        (0..inventor.len())
            .filter(|&row| inventor.get(row, "patent_number").unwrap() == key)
            .count()
    };
    assert_eq!(rows_for("1"), 2);
    assert_eq!(rows_for("2"), 1);
    assert_eq!(rows_for("3"), 1);
    let placeholder_row = (0..inventor.len())
        .find(|&row| inventor.get(row, "patent_number").unwrap() == "2")
        .unwrap();
    assert_eq!(
        inventor.get(placeholder_row, "inventor_first_name").unwrap(),
        &Value::Null
    );
}
