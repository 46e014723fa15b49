//! Dashboard endpoints and the cache keys they populate.
//!
//! Each list query is cached under the same key the event stream invalidates,
//! which is the only coupling between the two clients.

use crate::client::RequestClient;
use crate::envelope::RequestOutcome;
use crate::error::RequestError;
use crate::options::RequestDescriptor;
use pulse_core::keys;
use serde_json::Value;
use std::sync::Arc;

/// A cached dashboard query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardQuery {
    pub cache_key: &'static str,
    pub path: &'static str,
}

pub const METRICS: DashboardQuery = DashboardQuery {
    cache_key: keys::METRICS,
    path: "/api/v1/metrics",
};

pub const SERVICES: DashboardQuery = DashboardQuery {
    cache_key: keys::SERVICES,
    path: "/api/v1/services",
};

pub const VIOLATIONS: DashboardQuery = DashboardQuery {
    cache_key: keys::VIOLATIONS,
    path: "/api/v1/security/violations",
};

pub const CIRCUIT_BREAKERS: DashboardQuery = DashboardQuery {
    cache_key: keys::CIRCUIT_BREAKERS,
    path: "/api/v1/circuit-breakers",
};

/// Every list query shown on the dashboard.
pub const DASHBOARD_QUERIES: [DashboardQuery; 4] =
    [METRICS, SERVICES, VIOLATIONS, CIRCUIT_BREAKERS];

/// Path of a single violation.
pub fn violation_path(id: &str) -> String {
    format!("{}/{id}", VIOLATIONS.path)
}

/// Descriptor that refreshes a cache key, if the key is known.
///
/// Handles the list keys and `violation:<id>` detail keys.
pub fn descriptor_for_key(key: &str) -> Option<RequestDescriptor> {
    if let Some(query) = DASHBOARD_QUERIES.iter().find(|q| q.cache_key == key) {
        return Some(RequestDescriptor::get(query.path));
    }
    key.strip_prefix(keys::VIOLATION_ITEM_PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .filter(|id| !id.is_empty())
        .map(|id| RequestDescriptor::get(violation_path(id)))
}

/// Typed wrappers over the dashboard endpoints.
#[derive(Clone)]
pub struct DashboardApi {
    client: Arc<RequestClient>,
}

impl DashboardApi {
    pub fn new(client: Arc<RequestClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<RequestClient> {
        &self.client
    }

    pub async fn fetch(
        &self,
        query: DashboardQuery,
    ) -> Result<RequestOutcome<Value>, RequestError> {
        self.client.get(query.path).await
    }

    pub async fn metrics(&self) -> Result<RequestOutcome<Value>, RequestError> {
        self.fetch(METRICS).await
    }

    pub async fn services(&self) -> Result<RequestOutcome<Value>, RequestError> {
        self.fetch(SERVICES).await
    }

    pub async fn violations(&self) -> Result<RequestOutcome<Value>, RequestError> {
        self.fetch(VIOLATIONS).await
    }

    pub async fn circuit_breakers(&self) -> Result<RequestOutcome<Value>, RequestError> {
        self.fetch(CIRCUIT_BREAKERS).await
    }

    pub async fn violation(&self, id: &str) -> Result<RequestOutcome<Value>, RequestError> {
        self.client.get(&violation_path(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::options::Method;
    use crate::transport::{Script, ScriptedTransport};
    use pulse_core::StaticToken;
    use serde_json::json;

    #[test]
    fn test_descriptor_for_list_keys() {
        for query in DASHBOARD_QUERIES {
            let d = descriptor_for_key(query.cache_key).unwrap();
            assert_eq!(d.path, query.path);
            assert_eq!(d.method, Method::Get);
        }
    }

    #[test]
    fn test_descriptor_for_violation_item() {
        let d = descriptor_for_key(&keys::violation_item("v-1")).unwrap();
        assert_eq!(d.path, "/api/v1/security/violations/v-1");

        assert!(descriptor_for_key("violation:").is_none());
        assert!(descriptor_for_key("violations-archive").is_none());
        assert!(descriptor_for_key("unknown").is_none());
    }

    #[tokio::test]
    async fn test_violation_detail_hits_item_path() {
        let body = json!({
            "data": {"id": "v-7"},
            "success": true,
            "timestamp": "2024-05-01T12:00:00Z",
            "requestId": "srv"
        })
        .to_string();
        let transport = Arc::new(ScriptedTransport::new([Script::Respond(200, body)]));
        let client = Arc::new(RequestClient::with_transport(
            ClientConfig::default(),
            transport.clone(),
            Arc::new(StaticToken::none()),
        ));

        let api = DashboardApi::new(client);
        let outcome = api.violation("v-7").await.unwrap();
        assert_eq!(outcome.payload, json!({"id": "v-7"}));
        assert_eq!(
            transport.requests()[0].url,
            "http://localhost:8080/api/v1/security/violations/v-7"
        );
    }
}
