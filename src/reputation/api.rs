//! Direct RuneWatch case-list lookup.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{CaseDetails, ReputationChecker, ReputationResult};

/// The case list rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Fields a case may carry the accused name under.
const NAME_FIELDS: [&str; 3] = ["accused_name", "player", "rsn"];

/// Queries `GET {base}/api/cases` once per check.
pub struct RuneWatchApi {
    base_url: String,
    client: reqwest::Client,
}

impl RuneWatchApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn fetch_cases(&self) -> Result<Vec<Value>, String> {
        let resp = self
            .client
            .get(format!("{}/api/cases", self.base_url))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("case list returned {}", resp.status()));
        }

        match resp.json::<Value>().await.map_err(|e| e.to_string())? {
            Value::Array(cases) => Ok(cases),
            other => Err(format!("expected a case array, got {}", json_kind(&other))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// First case whose accused name equals `name`, ignoring case.
fn find_case(cases: &[Value], name: &str) -> Option<CaseDetails> {
    let wanted = name.to_lowercase();
    cases.iter().find_map(|case| {
        let accused = NAME_FIELDS
            .iter()
            .filter_map(|field| case.get(field).and_then(Value::as_str))
            .find(|candidate| candidate.to_lowercase() == wanted)?;

        Some(CaseDetails {
            accused: accused.to_string(),
            reason: text_field(case, &["reason", "type"]),
            evidence_rating: text_field(case, &["evidence_rating"]),
        })
    })
}

/// First of `fields` present as a string or number.
fn text_field(case: &Value, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match case.get(field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[async_trait]
impl ReputationChecker for RuneWatchApi {
    fn strategy(&self) -> &str {
        "api"
    }

    async fn check(&self, name: &str) -> ReputationResult {
        debug!(name, "Checking RuneWatch case list");
        let cases = match self.fetch_cases().await {
            Ok(cases) => cases,
            Err(e) => {
                warn!(name, error = %e, "RuneWatch lookup failed, treating as clean");
                return ReputationResult::clean();
            }
        };

        match find_case(&cases, name) {
            Some(case) => {
                info!(name, reason = ?case.reason, "Player flagged on RuneWatch");
                ReputationResult::flagged(case)
            }
            None => {
                debug!(name, "Player clean on RuneWatch");
                ReputationResult::clean()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn cases() -> serde_json::Value {
        serde_json::json!([
            { "accused_name": "Scammer Joe", "reason": "Trade scam", "evidence_rating": 5 },
            { "rsn": "Lure King", "type": "Luring" },
            { "victim": "Lil Bloat", "accused_name": "Someone Else" }
        ])
    }

    #[test]
    fn matches_case_insensitively() {
        let cases = cases().as_array().unwrap().clone();
        let case = find_case(&cases, "scammer JOE").unwrap();
        assert_eq!(case.accused, "Scammer Joe");
        assert_eq!(case.reason.as_deref(), Some("Trade scam"));
        assert_eq!(case.evidence_rating.as_deref(), Some("5"));

        let case = find_case(&cases, "lure king").unwrap();
        assert_eq!(case.reason.as_deref(), Some("Luring"));
        assert!(case.evidence_rating.is_none());
    }

    #[test]
    fn victims_are_not_matches() {
        let cases = cases().as_array().unwrap().clone();
        assert!(find_case(&cases, "Lil Bloat").is_none());
    }

    #[tokio::test]
    async fn flagged_player() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cases"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_json(cases()))
            .expect(1)
            .mount(&server)
            .await;

        let result = RuneWatchApi::new(server.uri()).check("Scammer Joe").await;
        assert!(result.flagged);
        assert_eq!(result.case.unwrap().accused, "Scammer Joe");
    }

    #[tokio::test]
    async fn clean_player() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(cases()))
            .mount(&server)
            .await;

        let result = RuneWatchApi::new(server.uri()).check("Zezima").await;
        assert_eq!(result, ReputationResult::clean());
    }

    #[tokio::test]
    async fn server_error_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cases"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let result = RuneWatchApi::new(server.uri()).check("Scammer Joe").await;
        assert!(!result.flagged);
    }

    #[tokio::test]
    async fn unexpected_body_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/cases"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"error": "nope"})))
            .mount(&server)
            .await;

        assert!(!RuneWatchApi::new(server.uri()).check("Scammer Joe").await.flagged);
    }

    #[tokio::test]
    async fn unreachable_host_fails_open() {
        let result = RuneWatchApi::new("http://127.0.0.1:9").check("Scammer Joe").await;
        assert!(!result.flagged);
    }
}
