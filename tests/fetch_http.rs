//! HTTP fetcher behavior against a mock server.

use std::time::Duration;

use url::Url;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use yjtracker::fetch::{FetchError, Fetcher, HttpFetcher, RenderService};
use yjtracker::http_client::HttpClient;
use yjtracker::models::{CircuitPolicy, RateLimitPolicy, RenderOptions, RetryPolicy, Target};

const PAGE: &str = "<html><head><title>Youth Justice Pocket Stats</title></head>\
    <body><p>Queensland supervision rate: 175 per 10,000.</p></body></html>";

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(HttpClient::builder().build().unwrap())
}

fn target(server: &MockServer, route: &str) -> Target {
    let mut target = Target::new(
        "pocket-stats",
        &format!("{}{}", server.uri(), route),
        "youth_statistics",
    );
    target.timeout = Duration::from_secs(5);
    target.rate_limit = RateLimitPolicy {
        min_interval: Duration::ZERO,
    };
    target.retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
    };
    target
}

#[tokio::test]
async fn fetches_html_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let doc = fetcher().fetch(&target(&server, "/stats")).await.unwrap();

    assert_eq!(doc.target_id, "pocket-stats");
    assert_eq!(
        doc.metadata.title.as_deref(),
        Some("Youth Justice Pocket Stats")
    );
    assert!(doc.text.contains("175 per 10,000"));
    assert_eq!(doc.metadata.content_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html"))
        .mount(&server)
        .await;

    let doc = fetcher().fetch(&target(&server, "/flaky")).await.unwrap();
    assert!(doc.text.contains("supervision rate"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = fetcher().fetch(&target(&server, "/down")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 500, .. }));
}

#[tokio::test]
async fn does_not_retry_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = fetcher().fetch(&target(&server, "/gone")).await.unwrap_err();
    assert!(matches!(err, FetchError::Status { status: 404, .. }));
}

#[tokio::test]
async fn empty_body_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("   \n"))
        .mount(&server)
        .await;

    let err = fetcher().fetch(&target(&server, "/blank")).await.unwrap_err();
    assert!(matches!(err, FetchError::Empty));
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(PAGE, "text/html")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let mut target = target(&server, "/slow");
    target.timeout = Duration::from_millis(100);
    target.retry.max_attempts = 1;

    let err = fetcher().fetch(&target).await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout(_)));
}

#[tokio::test]
async fn open_circuit_fails_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut target = target(&server, "/broken");
    target.retry.max_attempts = 1;
    target.circuit = CircuitPolicy {
        failure_threshold: 1,
        cooldown: Duration::from_secs(600),
    };

    let fetcher = fetcher();
    let first = fetcher.fetch(&target).await.unwrap_err();
    assert!(matches!(first, FetchError::Status { .. }));

    let second = fetcher.fetch(&target).await.unwrap_err();
    assert!(matches!(second, FetchError::CircuitOpen { .. }));
}

#[tokio::test]
async fn circuit_holds_across_fresh_fetchers() {
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use yjtracker::pipeline::{Pipeline, PipelineOptions, SkipReason, TargetOutcome};
    use yjtracker::store::MemoryStore;

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mut target = target(&server, "/broken");
    target.retry.max_attempts = 1;
    target.circuit = CircuitPolicy {
        failure_threshold: 2,
        cooldown: Duration::from_secs(600),
    };
    let store = Arc::new(MemoryStore::new());

    let mut skipped = 0;
    for _ in 0..4 {
        let pipeline = Pipeline::new(vec![target.clone()], Arc::new(fetcher()), store.clone())
            .unwrap()
            .with_options(PipelineOptions {
                force: true,
                ..Default::default()
            });
        let report = pipeline.run(&CancellationToken::new()).await;
        if matches!(
            report.get("pocket-stats"),
            Some(TargetOutcome::Skipped(SkipReason::CircuitOpen))
        ) {
            skipped += 1;
        }
    }
    assert_eq!(skipped, 2);
}

#[tokio::test]
async fn render_target_without_service_is_rejected() {
    let server = MockServer::start().await;
    let mut target = target(&server, "/spa");
    target.render = Some(RenderOptions {
        wait: Duration::from_millis(500),
    });

    let err = fetcher().fetch(&target).await.unwrap_err();
    assert!(matches!(err, FetchError::RenderingUnavailable(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn render_target_goes_through_service() {
    let server = MockServer::start().await;
    let page_url = "https://www.childrens.qld.gov.au/dashboard";
    Mock::given(method("GET"))
        .and(path("/render"))
        .and(query_param("url", page_url))
        .and(query_param("wait_ms", "500"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PAGE, "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let service = RenderService::new(
        Url::parse(&format!("{}/render", server.uri())).unwrap(),
        Some("test-key".to_string()),
    );
    let fetcher = fetcher().with_render(service);

    let mut target = Target::new("dashboard", page_url, "youth_statistics");
    target.rate_limit.min_interval = Duration::ZERO;
    target.render = Some(RenderOptions {
        wait: Duration::from_millis(500),
    });

    let doc = fetcher.fetch(&target).await.unwrap();
    assert_eq!(doc.url, page_url);
    assert!(doc.text.contains("175 per 10,000"));
}
