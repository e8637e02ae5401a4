//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and exercise the
//! full crawl cycle end-to-end: robots handling, retry classification, depth
//! bounding, cancellation and session resumption.

use sitegrab::config::Config;
use sitegrab::fetcher::RetryPolicy;
use sitegrab::storage::{ImageStore, SessionState, SessionStore, SqliteStore};
use sitegrab::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The returned TempDir guard owns the database directory; hold it for the
/// life of the test.
fn test_registry() -> (SessionRegistry, tempfile::TempDir) {
    test_registry_with(Config::default())
}

fn test_registry_with(config: Config) -> (SessionRegistry, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("test.db")).unwrap());

    let registry = SessionRegistry::new(
        Arc::clone(&store) as Arc<dyn SessionStore>,
        store as Arc<dyn ImageStore>,
        config,
    )
    .unwrap()
    .with_retry_policy(RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(50),
        multiplier: 2.0,
    });
    (registry, dir)
}

fn html_page(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.to_string())
        .insert_header("content-type", "text/html")
}

async fn mount_robots(server: &MockServer, content: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(content.to_string()))
        .mount(server)
        .await;
}

async fn run_crawl(registry: &SessionRegistry, seed: &str, max_depth: u32) -> String {
    let id = registry
        .start_crawl(seed, max_depth, 0, vec![])
        .await
        .expect("crawl should start");
    tokio::time::timeout(Duration::from_secs(10), registry.wait_for(&id))
        .await
        .expect("crawl should finish");
    id
}

#[tokio::test]
async fn test_crawl_follows_links_and_respects_robots() {
    let server = MockServer::start().await;

    mount_robots(&server, "User-agent: *\nDisallow: /private/\n").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<html><body>
            <a href="/public">Public</a>
            <a href="/private/secret">Secret</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(html_page("<html><body>public</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html_page("<html><body>secret</body></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let (registry, _db_dir) = test_registry();
    run_crawl(&registry, &server.uri(), 2).await;
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /\n").await;

    // First request gets a 502, the retry succeeds.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><a href="/next">Next</a></body></html>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(html_page("<html><body>ok</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let (registry, _db_dir) = test_registry();
    run_crawl(&registry, &server.uri(), 2).await;
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /\n").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><a href="/missing">Gone</a></body></html>"#))
        .expect(1)
        .mount(&server)
        .await;

    // Exactly one attempt: a 404 is permanent.
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let (registry, _db_dir) = test_registry();
    run_crawl(&registry, &server.uri(), 2).await;
}

#[tokio::test]
async fn test_max_depth_bounds_the_crawl() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /\n").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><a href="/a">A</a></body></html>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html_page(r#"<html><body><a href="/b">B</a></body></html>"#))
        .expect(1)
        .mount(&server)
        .await;

    // /b is at depth 2, beyond max_depth 1.
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html_page("<html><body>too deep</body></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let (registry, _db_dir) = test_registry();
    run_crawl(&registry, &server.uri(), 1).await;
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = MockServer::start().await;

    // No robots.txt mock: the request 404s and the crawl proceeds.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><a href="/open">Open</a></body></html>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/open"))
        .respond_with(html_page("<html><body>open</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let (registry, _db_dir) = test_registry();
    run_crawl(&registry, &server.uri(), 2).await;
}

#[tokio::test]
async fn test_stop_crawl_cancels_pending_work() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /\n").await;

    // The seed responds slowly, leaving time to cancel before its links are
    // followed.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            html_page(r#"<html><body><a href="/next">Next</a></body></html>"#)
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/next"))
        .respond_with(html_page("<html><body>never</body></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let (registry, _db_dir) = test_registry();
    let id = registry
        .start_crawl(&server.uri(), 2, 0, vec![])
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(registry.stop_crawl(&id));

    tokio::time::timeout(Duration::from_secs(5), registry.wait_for(&id))
        .await
        .expect("canceled crawl should wind down");
}

#[tokio::test]
async fn test_unresponsive_image_server_does_not_stall_the_crawl() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /\n").await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<html><body><img src="/slow.png"></body></html>"#))
        .expect(1)
        .mount(&server)
        .await;

    // The image endpoint answers long after the pipeline's fetch timeout; the
    // timed-out fetch must retire its unit of work so the session drains.
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.crawler.image_timeout_ms = 200;
    let (registry, _db_dir) = test_registry_with(config);

    let id = registry
        .start_crawl(&server.uri(), 1, 0, vec![])
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), registry.wait_for(&id))
        .await
        .expect("crawl should complete despite the hung image fetch");
}

#[tokio::test]
async fn test_unfinished_session_is_resumed() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /\n").await;

    // The seed was already visited by the unfinished session, so it must not
    // be fetched again.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page("<html><body>seed</body></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("test.db")).unwrap());
    let seed_url = format!("{}/", server.uri());
    store
        .save_session(&SessionState {
            id: "previous-session".to_string(),
            domain: "127.0.0.1".to_string(),
            visited_links: vec![seed_url.clone()],
        })
        .unwrap();

    let registry = SessionRegistry::new(
        Arc::clone(&store) as Arc<dyn SessionStore>,
        store as Arc<dyn ImageStore>,
        Config::default(),
    )
    .unwrap();

    let id = registry
        .start_crawl(&server.uri(), 2, 0, vec![])
        .await
        .unwrap();
    assert_eq!(id, "previous-session");

    tokio::time::timeout(Duration::from_secs(10), registry.wait_for(&id))
        .await
        .expect("crawl should finish");
}
