use reqwest::Client;
use shared::{Endpoint, Message};
use std::time::Duration;
use url::Url;

use crate::transport::{SendRequest, Transport, TransportError};

/// Form-encoded HTTP client for the chat backend
pub struct HttpTransport {
    http: Client,
    base: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let trimmed = base_url.trim().trim_end_matches('/');
        Url::parse(trimmed).map_err(|source| TransportError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self {
            http,
            base: trimmed.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base, endpoint.path())
    }

    async fn post(
        &self,
        endpoint: Endpoint,
        fields: &[(&'static str, String)],
    ) -> Result<String, TransportError> {
        let resp = self
            .http
            .post(self.url(endpoint))
            .form(fields)
            .send()
            .await
            .map_err(|source| TransportError::Network { endpoint, source })?;
        if !resp.status().is_success() {
            return Err(TransportError::Status {
                endpoint,
                status: resp.status().as_u16(),
            });
        }
        resp.text()
            .await
            .map_err(|source| TransportError::Network { endpoint, source })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: SendRequest) -> Result<Vec<Message>, TransportError> {
        let endpoint = request.endpoint;
        let fields = request.form_fields()?;
        tracing::debug!(%endpoint, fields = fields.len(), "posting chat request");

        let body = self.post(endpoint, &fields).await?;
        let messages: Vec<Message> = serde_json::from_str(&body)
            .map_err(|source| TransportError::Decode { endpoint, source })?;
        if messages.is_empty() {
            return Err(TransportError::EmptyReply { endpoint });
        }
        Ok(messages)
    }

    async fn list_models(&self) -> Result<Vec<String>, TransportError> {
        let endpoint = Endpoint::Models;
        let body = self.post(endpoint, &[]).await?;
        serde_json::from_str(&body).map_err(|source| TransportError::Decode { endpoint, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Role;
    use std::io::Read;
    use std::thread::JoinHandle;

    /// Answer one request per canned response; returns `(url, body)` of each.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<(String, String)>>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let mut request = server.recv().unwrap();
                let mut content = String::new();
                request.as_reader().read_to_string(&mut content).unwrap();
                seen.push((request.url().to_string(), content));
                let response = tiny_http::Response::from_string(body)
                    .with_status_code(tiny_http::StatusCode(status));
                request.respond(response).unwrap();
            }
            seen
        });
        (format!("http://127.0.0.1:{}/", port), handle)
    }

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new(base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_send_posts_form_and_parses_reply() {
        let (base, server) = serve(vec![(
            200,
            r#"[{"role":"assistant","content":"hi","model":"mind",
                "usage":{"prompt_tokens":1,"completion_tokens":1,"total_tokens":2}}]"#,
        )]);

        let request = SendRequest::new(Endpoint::SendCompletion, "hello there")
            .with_model(Some("gpt-4".into()));
        let reply = transport(&base).send(request).await.unwrap();

        assert_eq!(reply.len(), 1);
        assert_eq!(reply[0].role, Role::Assistant);
        assert_eq!(reply[0].content, "hi");

        let seen = server.join().unwrap();
        assert_eq!(seen[0].0, "/send_completion");
        assert_eq!(seen[0].1, "message=hello+there&model=gpt-4");
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let (base, server) = serve(vec![(500, "oops")]);

        let err = transport(&base)
            .send(SendRequest::new(Endpoint::Send, "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::Status { status: 500, .. }));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_non_json_and_empty_bodies_are_rejected() {
        let (base, server) = serve(vec![(200, "<html>busy</html>"), (200, "[]")]);
        let client = transport(&base);

        let err = client
            .send(SendRequest::new(Endpoint::Send, "one"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode { .. }));

        let err = client
            .send(SendRequest::new(Endpoint::Send, "two"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::EmptyReply { .. }));
        server.join().unwrap();
    }

    #[tokio::test]
    async fn test_list_models() {
        let (base, server) = serve(vec![(200, r#"["gpt-4","text-embedding-ada-002"]"#)]);

        let models = transport(&base).list_models().await.unwrap();

        assert_eq!(models, vec!["gpt-4", "text-embedding-ada-002"]);
        assert_eq!(server.join().unwrap()[0].0, "/models");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_network_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = transport(&format!("http://127.0.0.1:{}", port));

        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, TransportError::Network { .. }));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = HttpTransport::new("not a url", Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }
}
