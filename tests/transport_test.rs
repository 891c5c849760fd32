//! HTTP transport tests against a wiremock server

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use siphon::config::{Config, EngineConfig};
use siphon::models::{JobSpec, JobState, StrategyConfig, StrategyKind};
use siphon::scheduler::Engine;
use siphon::strategy::{self, FetchRequest, HttpTransport, Session, Transport};
use siphon::utils::error::FetchError;

fn transport() -> HttpTransport {
    let config = EngineConfig {
        requests_per_second: 50,
        rotate_user_agents: false,
        user_agent: String::from("siphon-test/1.0"),
        ..Default::default()
    };
    HttpTransport::new(&config).unwrap()
}

fn get(url: String) -> FetchRequest {
    FetchRequest::get(url, Duration::from_secs(5))
}

/// Test successful fetch with decoded text and content type
#[tokio::test]
async fn test_fetch_success() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/article"))
        .and(header("user-agent", "siphon-test/1.0"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string("<html><body><h1>Hello</h1></body></html>"),
        )
        .mount(&mock_server)
        .await;

    let page = transport()
        .fetch(&get(format!("{}/article", mock_server.uri())), None, &Session::default())
        .await
        .unwrap();

    assert_eq!(page.status, 200);
    assert_eq!(page.mime().as_deref(), Some("text/html"));
    assert!(page.text.contains("<h1>Hello</h1>"));
    assert!(page.error_for_status().is_ok());
}

/// Error statuses come back as pages; classification happens on top
#[tokio::test]
async fn test_status_classification() {
    let mock_server = MockServer::start().await;
    for (route, status) in [("/blocked", 403), ("/limited", 429), ("/down", 503), ("/gone", 404)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(&mock_server)
            .await;
    }

    let transport = transport();
    let uri = mock_server.uri();

    assert_eq!(status_error(&transport, &uri, "/blocked").await, FetchError::Blocked(403));
    assert_eq!(status_error(&transport, &uri, "/limited").await, FetchError::RateLimit);
    assert_eq!(status_error(&transport, &uri, "/down").await, FetchError::ServerError(503));
    assert_eq!(status_error(&transport, &uri, "/gone").await, FetchError::ClientError(404));
    assert!(!FetchError::ClientError(404).is_transient());
    assert!(FetchError::ServerError(503).is_transient());
}

async fn status_error(transport: &HttpTransport, uri: &str, route: &str) -> FetchError {
    transport
        .fetch(&get(format!("{uri}{route}")), None, &Session::default())
        .await
        .unwrap()
        .error_for_status()
        .unwrap_err()
}

/// Session cookies and headers are sent; Set-Cookie is captured
#[tokio::test]
async fn test_session_round_trip() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private"))
        .and(header("cookie", "sid=abc"))
        .and(header("authorization", "Bearer xyz"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "theme=dark; Path=/; HttpOnly")
                .set_body_string("ok"),
        )
        .mount(&mock_server)
        .await;

    let mut session = Session::default();
    session.set_cookie("sid", "abc");
    session.set_header("Authorization", "Bearer xyz");

    let page = transport()
        .fetch(&get(format!("{}/private", mock_server.uri())), None, &session)
        .await
        .unwrap();

    assert_eq!(page.status, 200);
    assert_eq!(page.set_cookies, vec![(String::from("theme"), String::from("dark"))]);

    session.absorb(&page);
    assert!(session.has_cookie("theme"));
}

/// Redirects are not followed when the request opts out
#[tokio::test]
async fn test_without_redirects() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_string_contains("username=alice"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/home")
                .insert_header("set-cookie", "sid=s3ss10n"),
        )
        .mount(&mock_server)
        .await;

    let request = get(format!("{}/login", mock_server.uri()))
        .with_method(reqwest::Method::POST)
        .with_body(strategy::transport::RequestBody::Form(vec![
            (String::from("username"), String::from("alice")),
            (String::from("password"), String::from("secret")),
        ]))
        .without_redirects();

    let page = transport()
        .fetch(&request, None, &Session::default())
        .await
        .unwrap();

    assert_eq!(page.status, 302);
    assert!(page.is_redirect());
    assert_eq!(page.set_cookies, vec![(String::from("sid"), String::from("s3ss10n"))]);
}

/// Fetch timeouts map to a transient error
#[tokio::test]
async fn test_timeout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let request = FetchRequest::get(format!("{}/slow", mock_server.uri()), Duration::from_millis(200));
    let result = transport().fetch(&request, None, &Session::default()).await;

    assert_eq!(result.unwrap_err(), FetchError::Timeout);
}

#[tokio::test]
async fn test_invalid_url() {
    let result = transport()
        .fetch(&get(String::from("not a url")), None, &Session::default())
        .await;
    assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
}

#[tokio::test]
async fn test_probe_classification() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/app"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<html><body><div id="root"></div><script src="/app.js"></script></body></html>"#),
        )
        .mount(&mock_server)
        .await;

    let transport = transport();
    let timeout = Duration::from_secs(5);
    let uri = mock_server.uri();

    assert_eq!(strategy::probe(&transport, &format!("{uri}/api"), timeout).await, StrategyKind::Api);
    assert_eq!(strategy::probe(&transport, &format!("{uri}/app"), timeout).await, StrategyKind::Browser);
    // Unmatched route answers 404
    assert_eq!(strategy::probe(&transport, &format!("{uri}/missing"), timeout).await, StrategyKind::Static);
}

/// Full engine run over real HTTP
#[tokio::test]
async fn test_engine_over_http() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("x-api-key", "k"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": 2})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = Config::default();
    config.engine.workers = 1;
    config.engine.requests_per_second = 50;
    let engine = Engine::builder(config).build().unwrap();
    engine.start();

    let spec = JobSpec::new(
        format!("{}/search", mock_server.uri()),
        StrategyConfig::Api(siphon::models::ApiConfig {
            method: String::from("post"),
            headers: [(String::from("x-api-key"), String::from("k"))].into_iter().collect(),
            body: Some(json!({"q": "widgets"})),
        }),
    );
    let id = engine.submit(spec).await.unwrap();
    let job = engine.wait_for(id).await.unwrap();

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(json!({"hits": 2})));

    engine.shutdown().await;
}
