//! `HttpClient` implementation backed by `reqwest`.
//!
//! The trait lives in opsline-core; this is the production adapter (same
//! dependency inversion as the SQLite repositories).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use opsline_core::execution::http::{HttpClient, HttpError, HttpRequest, HttpResponse};
use opsline_types::config::HttpConfig;

/// Shared `reqwest::Client` with the configured timeout and user agent.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let method: reqwest::Method = request
                .method
                .parse()
                .map_err(|_| HttpError::InvalidMethod(request.method.clone()))?;

            let mut builder = self.client.request(method, &request.url);
            for (key, value) in &request.headers {
                builder = builder.header(key.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| HttpError::Transport {
                url: request.url.clone(),
                reason: e.to_string(),
            })?;

            let status = response.status().as_u16();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_string(),
                        v.to_str().unwrap_or("<binary>").to_string(),
                    )
                })
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| HttpError::Body(e.to_string()))?;

            tracing::debug!(
                method = %request.method,
                url = %request.url,
                status,
                body_len = body.len(),
                "HTTP request completed"
            );

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> ReqwestHttpClient {
        ReqwestHttpClient::new(&HttpConfig::default()).unwrap()
    }

    fn request(method: &str, url: String) -> HttpRequest {
        HttpRequest {
            method: method.to_string(),
            url,
            headers: HashMap::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn sends_json_body_and_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tickets"))
            .and(header("x-team", "ops"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"env": "prod"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ticket": "T-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut req = request("POST", format!("{}/tickets", server.uri()));
        req.headers.insert("x-team".to_string(), "ops".to_string());
        req.body = Some(json!({"env": "prod"}));

        let response = client().send(req).await.unwrap();
        assert_eq!(response.status, 201);
        assert!(response.is_success());
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["ticket"], "T-9");
        assert!(response.headers.contains_key("content-type"));
    }

    #[tokio::test]
    async fn sends_configured_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "opsline/0.1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let response = client()
            .send(request("GET", format!("{}/health", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let response = client()
            .send(request("DELETE", format!("{}/x", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
        assert_eq!(response.body, "down");
    }

    #[tokio::test]
    async fn invalid_method_is_rejected() {
        let err = client()
            .send(request("GE T", "http://127.0.0.1:1/".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidMethod(m) if m == "GE T"));
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        // Bind then drop a listener to get a port nothing is serving.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = client()
            .send(request("GET", format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport { .. }));
    }
}
