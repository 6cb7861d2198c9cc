//! Provider endpoints, their query-parameter contracts and payload contracts

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Provider endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// Fixtures (matches)
    Fixtures,
    /// Teams
    Teams,
    /// League tables
    Standings,
    /// Per-fixture team statistics
    MatchStatistics,
    /// Players with season statistics
    Players,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Endpoint::Fixtures => "fixtures",
            Endpoint::Teams => "teams",
            Endpoint::Standings => "standings",
            Endpoint::MatchStatistics => "match_statistics",
            Endpoint::Players => "players",
        })
    }
}

/// Query parameters, kept sorted so requests are reproducible
pub type QueryParams = BTreeMap<String, String>;

/// Build [`QueryParams`] from key/value pairs
pub fn params<K, V, I>(pairs: I) -> QueryParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: ToString,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.to_string()))
        .collect()
}

const NUMERIC_KEYS: [&str; 6] = ["id", "league", "season", "team", "fixture", "page"];

impl Endpoint {
    /// Path relative to the provider base URL
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Fixtures => "fixtures",
            Endpoint::Teams => "teams",
            Endpoint::Standings => "standings",
            Endpoint::MatchStatistics => "fixtures/statistics",
            Endpoint::Players => "players",
        }
    }

    fn allowed_keys(&self) -> &'static [&'static str] {
        match self {
            Endpoint::Fixtures => &[
                "id", "league", "season", "date", "team", "from", "to", "status", "last", "next",
            ],
            Endpoint::Teams => &["id", "league", "season", "name", "search"],
            Endpoint::Standings => &["league", "season", "team"],
            Endpoint::MatchStatistics => &["fixture", "team"],
            Endpoint::Players => &["id", "team", "league", "season", "page"],
        }
    }

    /// JSON pointers every item of `response` must carry
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            Endpoint::Fixtures => &[
                "/fixture/id",
                "/league/id",
                "/league/season",
                "/teams/home/id",
                "/teams/away/id",
            ],
            Endpoint::Teams => &["/team/id", "/team/name"],
            Endpoint::Standings => &["/league/id", "/league/standings"],
            Endpoint::MatchStatistics => &["/team/id", "/statistics"],
            Endpoint::Players => &["/player/id", "/statistics"],
        }
    }

    /// Check `params` against this endpoint's contract before anything is sent
    pub fn validate_params(&self, params: &QueryParams) -> Result<()> {
        let invalid = |reason: String| Error::InvalidRequest {
            endpoint: *self,
            reason,
        };

        for (key, value) in params {
            if !self.allowed_keys().contains(&key.as_str()) {
                return Err(invalid(format!("unsupported parameter {key:?}")));
            }
            if NUMERIC_KEYS.contains(&key.as_str()) && value.parse::<u64>().is_err() {
                return Err(invalid(format!("{key} must be numeric, got {value:?}")));
            }
            if matches!(key.as_str(), "date" | "from" | "to")
                && chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err()
            {
                return Err(invalid(format!("{key} must be YYYY-MM-DD, got {value:?}")));
            }
        }

        let has = |key: &str| params.contains_key(key);
        match self {
            Endpoint::Fixtures => {
                if !(has("id") || has("league") || has("season") || has("date")) {
                    return Err(invalid(
                        "one of id, league, season or date is required".to_string(),
                    ));
                }
                if has("team") && !(has("season") || has("id") || has("date")) {
                    return Err(invalid("team lookups need a season".to_string()));
                }
            }
            Endpoint::Teams => {
                if !(has("id") || has("name") || has("search") || (has("league") && has("season")))
                {
                    return Err(invalid(
                        "id, name, search or league + season is required".to_string(),
                    ));
                }
            }
            Endpoint::Standings => {
                if !(has("season") && (has("league") || has("team"))) {
                    return Err(invalid(
                        "season and league (or team) are required".to_string(),
                    ));
                }
            }
            Endpoint::MatchStatistics => {
                if !has("fixture") {
                    return Err(invalid("fixture is required".to_string()));
                }
            }
            Endpoint::Players => {
                if !has("season") {
                    return Err(invalid("season is required".to_string()));
                }
                if !(has("id") || has("team") || has("league")) {
                    return Err(invalid("one of id, team or league is required".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Validate a provider envelope and return its `response` items
    ///
    /// The envelope looks like `{"get": .., "errors": [], "results": n, "response": [..]}`.
    /// A non-empty `errors` member means the provider refused the request even
    /// though it answered 200.
    pub fn validate_response(&self, body: &Value) -> Result<Vec<Value>> {
        let malformed = |reason: String| Error::MalformedResponse {
            endpoint: *self,
            reason,
        };

        let envelope = body
            .as_object()
            .ok_or_else(|| malformed("payload is not a JSON object".to_string()))?;

        let has_errors = match envelope.get("errors") {
            Some(Value::Array(errors)) => !errors.is_empty(),
            Some(Value::Object(errors)) => !errors.is_empty(),
            _ => false,
        };
        if has_errors {
            return Err(Error::ClientRequestError {
                endpoint: *self,
                status: 200,
                message: envelope
                    .get("errors")
                    .map(Value::to_string)
                    .unwrap_or_default(),
            });
        }

        let items = envelope
            .get("response")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing response array".to_string()))?;

        for (index, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(malformed(format!("item {index} is not an object")));
            }
            for pointer in self.required_fields() {
                match item.pointer(pointer) {
                    None | Some(Value::Null) => {
                        return Err(malformed(format!("item {index} missing {pointer}")));
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(results) = envelope.get("results").and_then(Value::as_u64)
            && results as usize != items.len()
        {
            tracing::debug!(
                endpoint = %self,
                results,
                items = items.len(),
                "provider results count differs from response length"
            );
        }

        Ok(items.clone())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fixtures_require_league_season_date_or_id() {
        assert!(Endpoint::Fixtures.validate_params(&params([("league", 39)])).is_ok());
        assert!(
            Endpoint::Fixtures
                .validate_params(&params([("date", "2024-05-19")]))
                .is_ok()
        );
        assert!(Endpoint::Fixtures.validate_params(&params([("id", 123)])).is_ok());

        let err = Endpoint::Fixtures
            .validate_params(&QueryParams::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { endpoint: Endpoint::Fixtures, .. }));
    }

    #[test]
    fn rejects_unknown_keys_bad_numbers_and_bad_dates() {
        assert!(
            Endpoint::Standings
                .validate_params(&params([
                    ("league", "39"),
                    ("season", "2024"),
                    ("colour", "red")
                ]))
                .is_err()
        );
        assert!(
            Endpoint::Standings
                .validate_params(&params([("league", "epl"), ("season", "2024")]))
                .is_err()
        );
        assert!(
            Endpoint::Fixtures
                .validate_params(&params([("date", "19/05/2024")]))
                .is_err()
        );
    }

    #[test]
    fn players_need_season_and_a_selector() {
        assert!(
            Endpoint::Players
                .validate_params(&params([("team", 42), ("season", 2024)]))
                .is_ok()
        );
        assert!(Endpoint::Players.validate_params(&params([("team", 42)])).is_err());
        assert!(Endpoint::Players.validate_params(&params([("season", 2024)])).is_err());
    }

    #[test]
    fn statistics_path_is_nested_under_fixtures() {
        assert_eq!(Endpoint::MatchStatistics.path(), "fixtures/statistics");
        assert_eq!(Endpoint::MatchStatistics.to_string(), "match_statistics");
    }

    #[test]
    fn validate_response_returns_items() {
        let body = json!({
            "get": "teams",
            "errors": [],
            "results": 1,
            "response": [{ "team": { "id": 42, "name": "Arsenal" } }]
        });
        let items = Endpoint::Teams.validate_response(&body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["team"]["name"], "Arsenal");
    }

    #[test]
    fn validate_response_flags_missing_required_field() {
        let body = json!({
            "errors": [],
            "results": 1,
            "response": [{ "team": { "name": "Arsenal" } }]
        });
        match Endpoint::Teams.validate_response(&body) {
            Err(Error::MalformedResponse { reason, .. }) => {
                assert!(reason.contains("/team/id"), "{reason}")
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn validate_response_flags_missing_response_array() {
        let body = json!({ "errors": [], "results": 0 });
        assert!(matches!(
            Endpoint::Fixtures.validate_response(&body),
            Err(Error::MalformedResponse { .. })
        ));
        assert!(matches!(
            Endpoint::Fixtures.validate_response(&json!([1, 2])),
            Err(Error::MalformedResponse { .. })
        ));
    }

    #[test]
    fn error_envelope_is_a_client_request_error() {
        let body = json!({
            "errors": { "token": "Error/Missing application key." },
            "results": 0,
            "response": []
        });
        match Endpoint::Fixtures.validate_response(&body) {
            Err(Error::ClientRequestError { status, message, .. }) => {
                assert_eq!(status, 200);
                assert!(message.contains("Missing application key"));
            }
            other => panic!("expected ClientRequestError, got {other:?}"),
        }
    }
}
