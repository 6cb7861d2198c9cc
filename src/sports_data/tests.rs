use super::*;
use crate::test_helpers::{envelope, fast_retry, fixture_item, team_item, test_client};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fetch_sends_credentials_and_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fixtures"))
        .and(query_param("id", "123"))
        .and(header("X-RapidAPI-Key", "test-key"))
        .and(header("X-RapidAPI-Host", "api-football-v1.p.rapidapi.com"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(vec![fixture_item(123, 2, 1)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let session = client.session();
    let response = session
        .fetch(Endpoint::Fixtures, params([("id", 123)]))
        .await
        .unwrap();

    assert_eq!(response.attempts, 1);
    assert_eq!(response.items.len(), 1);
    assert_eq!(response.items[0]["fixture"]["id"], 123);
}

#[tokio::test]
async fn server_errors_then_success_retries_until_success() {
    let server = MockServer::start().await;
    // Two 503s, then a good payload on the third (and final) attempt
    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(vec![team_item(42, "Arsenal")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let session = client.session();
    let response = session
        .fetch(Endpoint::Teams, params([("id", 42)]))
        .await
        .unwrap();

    assert_eq!(response.attempts, 3, "exactly N attempts must be recorded");
    assert_eq!(response.items[0]["team"]["name"], "Arsenal");
    assert_eq!(client.requests_sent(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_with_upstream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/standings"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let session = client.session();
    let result = session
        .fetch(
            Endpoint::Standings,
            params([("league", 39), ("season", 2024)]),
        )
        .await;

    match result {
        Err(Error::UpstreamUnavailable {
            endpoint,
            attempts,
            last_error,
        }) => {
            assert_eq!(endpoint, Endpoint::Standings);
            assert_eq!(attempts, 3);
            assert!(last_error.contains("500"), "{last_error}");
        }
        other => panic!("expected UpstreamUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/players"))
        .respond_with(
            ResponseTemplate::new(403).set_body_string("You are not subscribed to this API."),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let session = client.session();
    let result = session.get_players(42, 2024).await;

    match result {
        Err(Error::ClientRequestError {
            status, message, ..
        }) => {
            assert_eq!(status, 403);
            assert!(message.contains("not subscribed"));
        }
        other => panic!("expected ClientRequestError, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_payload_is_rejected_not_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fixtures/statistics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [],
            "results": 1,
            "response": [{ "team": { "id": 42 } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let session = client.session();
    let result = session.get_match_statistics(123).await;

    assert!(
        matches!(
            result,
            Err(Error::MalformedResponse {
                endpoint: Endpoint::MatchStatistics,
                ..
            })
        ),
        "got {result:?}"
    );
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
        )
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.session().get_team(42).await;
    assert!(matches!(result, Err(Error::MalformedResponse { .. })));
}

#[tokio::test]
async fn invalid_params_never_reach_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(vec![])))
        .expect(0)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.session().get_fixtures(None, None, None).await;

    assert!(matches!(result, Err(Error::InvalidRequest { .. })));
    assert_eq!(client.requests_sent(), 0);
}

#[tokio::test]
async fn sessions_are_released_on_success_and_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    {
        let first = client.session();
        let second = client.session();
        assert_ne!(first.id(), second.id());
        assert_eq!(client.open_sessions(), 2);
        let _ = second.get_team(1).await;
    }
    assert_eq!(client.open_sessions(), 0);

    let failed = async {
        let session = client.session();
        session.get_team(1).await
    }
    .await;
    assert!(failed.is_err());
    assert_eq!(client.open_sessions(), 0);
}

#[tokio::test]
async fn rate_limit_exhaustion_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/teams"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(envelope(vec![team_item(42, "Arsenal")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = ProviderConfig {
        api_key: Some("test-key".to_string()),
        base_url: server.uri(),
        ..ProviderConfig::default()
    };
    let rate_limit = RateLimitConfig {
        capacity: 1,
        refill_per_second: 0.01,
        max_wait: Duration::from_millis(20),
    };
    let client = SportsDataClient::new(&provider, &rate_limit, &fast_retry(2)).unwrap();
    let session = client.session();

    session.get_team(42).await.unwrap();
    let second = session.get_team(42).await;
    assert!(matches!(second, Err(Error::RateLimitExceeded { .. })), "got {second:?}");
}

#[test]
fn missing_api_key_is_a_config_error() {
    let result = SportsDataClient::new(
        &ProviderConfig::default(),
        &RateLimitConfig::default(),
        &RetryConfig::default(),
    );
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn truncate_respects_char_boundaries() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("ééééé", 2), "éé...");
}
