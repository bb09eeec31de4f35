//! Stateless command forwarding to the locally detected Kea Control Agent
//! and BIND9 statistics channel. Retries and backoff are the caller's
//! (the server's) responsibility; the agent makes one attempt per call.

use std::sync::Arc;

use stork_core::credentials::CredentialStore;
use stork_core::{CoreError, CoreResult};
use tokio::sync::RwLock;
use url::Url;

pub struct ForwardedResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

pub struct Forwarder {
    client: reqwest::Client,
    credentials: Arc<RwLock<CredentialStore>>,
}

impl Forwarder {
    pub fn new(credentials: Arc<RwLock<CredentialStore>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }

    /// Forwards a Kea command envelope to the Control Agent at `url`,
    /// attaching Basic-Auth when the target `(ip, port)` has a credentials
    /// record.
    pub async fn forward_to_kea_over_http(
        &self,
        url: &str,
        request_body: Vec<u8>,
    ) -> CoreResult<ForwardedResponse> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(request_body);

        if let Some((user, password)) = self.basic_auth_for(url).await {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await.map_err(|e| {
            CoreError::Unreachable(format!("Kea Control Agent at {url} unreachable: {e}"))
        })?;

        let status_code = response.status().as_u16();
        if status_code == 401 || status_code == 403 {
            return Err(CoreError::Unauthorized(format!(
                "Kea Control Agent at {url} rejected credentials"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CoreError::Unreachable(format!("reading Kea response body: {e}")))?
            .to_vec();

        Ok(ForwardedResponse { status_code, body })
    }

    /// Forwards a plain GET to BIND9's `statistics-channel`; BIND9 never
    /// authenticates this endpoint.
    pub async fn forward_to_named_stats(&self, url: &str) -> CoreResult<ForwardedResponse> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CoreError::Unreachable(format!("named stats channel at {url} unreachable: {e}")))?;

        let status_code = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| CoreError::Unreachable(format!("reading named stats response body: {e}")))?
            .to_vec();

        Ok(ForwardedResponse { status_code, body })
    }

    async fn basic_auth_for(&self, url: &str) -> Option<(String, String)> {
        let parsed = Url::parse(url).ok()?;
        let port = parsed.port_or_known_default()?;
        let host = match parsed.host()? {
            url::Host::Ipv4(v4) => v4.to_string(),
            url::Host::Ipv6(v6) => v6.to_string(),
            url::Host::Domain(_) => return None,
        };
        let guard = self.credentials.read().await;
        let creds = guard.get_basic_auth(&host, port)?;
        Some((creds.user.clone(), creds.password.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_target_surfaces_as_unreachable_error() {
        let forwarder = Forwarder::new(Arc::new(RwLock::new(CredentialStore::new())));
        let err = forwarder
            .forward_to_kea_over_http("http://127.0.0.1:1", Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn no_credentials_means_no_basic_auth_header() {
        let forwarder = Forwarder::new(Arc::new(RwLock::new(CredentialStore::new())));
        assert!(forwarder.basic_auth_for("http://10.0.0.1:8080/").await.is_none());
    }
}
