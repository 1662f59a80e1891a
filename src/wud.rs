//! HTTP access to a What's Up Docker instance.
use crate::config::WudApiConfig;
use crate::models::{ContainerRecord, TriggerPayload, TriggerRecord};
use log::{debug, trace};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("WUD API url {0} cannot be used as a base url")]
    InvalidBaseUrl(Url),
    #[error("WUD API url not configured")]
    NotConfigured,
    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),
}

/// The requests this crate sends to What's Up Docker.
pub trait WudApi: Send + Sync + 'static {
    fn containers(&self) -> impl Future<Output = Result<Vec<ContainerRecord>, ApiError>> + Send;

    fn triggers(
        &self,
        container_id: &str,
    ) -> impl Future<Output = Result<Vec<TriggerRecord>, ApiError>> + Send;

    fn watch(&self) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn run_trigger(
        &self,
        trigger: &TriggerRecord,
        payload: &TriggerPayload,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

pub struct WudClient {
    client: Client,
    base: Url,
    auth: Option<String>,
}

impl WudClient {
    pub fn new(config: &WudApiConfig) -> Result<Self, ApiError> {
        if config.url.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl(config.url.clone()));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base: config.url.clone(),
            auth: config.auth.clone().filter(|token| !token.trim().is_empty()),
        })
    }

    /// Append percent-encoded `segments` to the base url. Dot segments would be collapsed by
    /// url normalization and are refused.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        if let Some(segment) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(ApiError::InvalidSegment(segment.to_string()));
        }
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidBaseUrl(self.base.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let url = self.endpoint(segments)?;
        debug!("GET {url}");
        let response = self.authorized(self.client.get(url)).send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Turn a non-2xx response into [`ApiError::Status`] carrying the text body.
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    trace!("request failed with {status}: {body}");
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

impl WudApi for WudClient {
    async fn containers(&self) -> Result<Vec<ContainerRecord>, ApiError> {
        self.get_json(&["api", "containers"]).await
    }

    async fn triggers(&self, container_id: &str) -> Result<Vec<TriggerRecord>, ApiError> {
        self.get_json(&["api", "containers", container_id, "triggers"])
            .await
    }

    async fn watch(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "containers", "watch"])?;
        debug!("POST {url}");
        let response = self.authorized(self.client.post(url)).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn run_trigger(
        &self,
        trigger: &TriggerRecord,
        payload: &TriggerPayload,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["api", "triggers", &trigger.kind, &trigger.name])?;
        debug!("POST {url}");
        let response = self
            .authorized(self.client.post(url))
            .json(payload)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer, auth: Option<&str>) -> WudClient {
        let config = WudApiConfig {
            url: server.uri().parse().unwrap(),
            auth: auth.map(str::to_string),
            show_update_buttons: true,
            request_timeout_ms: 5_000,
        };
        WudClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_containers_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/containers"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "1", "name": "mosquitto-broker", "watcher": "local"},
                {"id": "2", "name": "traefik"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let containers = client_for(&server, Some("secret")).containers().await.unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "mosquitto-broker");
        assert_eq!(containers[0].watcher, Some(json!("local")));
    }

    #[tokio::test]
    async fn test_no_authorization_header_without_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/containers"))
            .respond_with(|request: &Request| {
                if request.headers.contains_key("authorization") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!([]))
                }
            })
            .mount(&server)
            .await;

        // a blank token is treated as absent
        let containers = client_for(&server, Some("  ")).containers().await.unwrap();
        assert!(containers.is_empty());
    }

    #[tokio::test]
    async fn test_non_success_status_keeps_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/containers/watch"))
            .respond_with(ResponseTemplate::new(500).set_body_string("watcher busy"))
            .mount(&server)
            .await;

        let err = client_for(&server, None).watch().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert_eq!(err.to_string(), "HTTP 500: watcher busy");
    }

    #[tokio::test]
    async fn test_run_trigger_posts_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/triggers/docker/local"))
            .and(header("Content-Type", "application/json"))
            .and(body_partial_json(json!({"id": "1", "watcher": "docker.local"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let trigger = TriggerRecord::new("docker.local", "local", "docker");
        let payload = TriggerPayload::from(&ContainerRecord::new("1", "mosquitto"));
        client_for(&server, None)
            .run_trigger(&trigger, &payload)
            .await
            .unwrap();
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let config = WudApiConfig {
            url: "http://wud.local:3000/".parse().unwrap(),
            auth: None,
            show_update_buttons: true,
            request_timeout_ms: 1_000,
        };
        let client = WudClient::new(&config).unwrap();
        let url = client
            .endpoint(&["api", "containers", "a b/c", "triggers"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://wud.local:3000/api/containers/a%20b%2Fc/triggers"
        );
    }

    #[tokio::test]
    async fn test_dot_segments_are_refused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server, None);
        let trigger = TriggerRecord {
            id: "docker...".to_string(),
            name: "..".to_string(),
            kind: "docker".to_string(),
        };
        let payload = TriggerPayload::from(&ContainerRecord::new("1", ".."));
        let result = client.run_trigger(&trigger, &payload).await;
        assert!(matches!(result, Err(ApiError::InvalidSegment(s)) if s == ".."));
        assert!(matches!(
            client.endpoint(&["api", "containers", "."]),
            Err(ApiError::InvalidSegment(_))
        ));
        assert!(client.endpoint(&["api", "containers", "..a"]).is_ok());
    }
}
