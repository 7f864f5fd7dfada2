//! Client for the console endpoints a terminal session needs before it can connect:
//! credential listing and reveal, server details and the client's public IP.

use async_trait::async_trait;
use fs_types::{
    ConnectionDetails, CustomerId, api::{ClientIp, CredentialSummary, RevealedCredential, ServerDetails, preferred_credential}, validation::validate_port
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::{SessionError, SessionResult};

/// Public IP echo service used when the console cannot report the client address.
pub const FALLBACK_IP_ECHO_URL: &str = "https://api.ipify.org?format=json";

#[async_trait]
pub trait ConsoleApi: Send + Sync {
    async fn list_credentials(&self, server_id: &str) -> SessionResult<Vec<CredentialSummary>>;

    async fn reveal_credential(&self, server_id: &str, credential_id: &str) -> SessionResult<RevealedCredential>;

    async fn server_details(&self, server_id: &str) -> SessionResult<ServerDetails>;

    async fn client_ip(&self) -> SessionResult<String>;
}

/// Everything needed to open a terminal for one server.
#[derive(Clone, Debug)]
pub struct ResolvedTarget {
    pub details: ConnectionDetails,
    pub hostname: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub client_ip: String,
}

/// Fetch credentials and metadata for `server_id` and build validated connection details.
pub async fn resolve_target(api: &dyn ConsoleApi, server_id: &str) -> SessionResult<ResolvedTarget> {
    let (credentials, server) = tokio::try_join!(api.list_credentials(server_id), api.server_details(server_id))?;
    let chosen = preferred_credential(&credentials).ok_or_else(|| SessionError::NoCredentials(server_id.to_string()))?;
    debug!(server_id, credential_id = %chosen.id, "revealing terminal credential");
    let revealed = api.reveal_credential(server_id, &chosen.id).await?;

    let port = validate_port(server.port)?;
    let password = revealed.secret.map(SecretString::from);
    let details = ConnectionDetails::new(server.host, port, revealed.username, password)?;

    let client_ip = api.client_ip().await?;

    Ok(ResolvedTarget {
        details,
        hostname: server.hostname,
        customer_id: server.customer_id,
        client_ip,
    })
}

/// [`ConsoleApi`] over the console's REST API, authenticated with a bearer token.
#[derive(Clone, Debug)]
pub struct HttpConsoleApi {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
    ip_fallback: Url,
}

impl HttpConsoleApi {
    pub fn new(base_url: &str, token: Option<SecretString>) -> SessionResult<Self> {
        Ok(Self {
            client: Client::builder().user_agent(concat!("fleetssh/", env!("CARGO_PKG_VERSION"))).build()?,
            base_url: Url::parse(base_url)?,
            token,
            ip_fallback: Url::parse(FALLBACK_IP_ECHO_URL)?,
        })
    }

    /// Replace the public IP echo service.
    pub fn with_ip_fallback(mut self, url: &str) -> SessionResult<Self> {
        self.ip_fallback = Url::parse(url)?;
        Ok(self)
    }

    fn endpoint(&self, segments: &[&str]) -> SessionResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SessionError::Credentials(format!("{} cannot be used as an API base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> SessionResult<T> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        Ok(request.send().await?.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl ConsoleApi for HttpConsoleApi {
    async fn list_credentials(&self, server_id: &str) -> SessionResult<Vec<CredentialSummary>> {
        self.get_json(self.endpoint(&["api", "servers", server_id, "credentials"])?).await
    }

    async fn reveal_credential(&self, server_id: &str, credential_id: &str) -> SessionResult<RevealedCredential> {
        let url = self.endpoint(&["api", "servers", server_id, "credentials", credential_id, "reveal"])?;
        let mut request = self.client.post(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        Ok(request.send().await?.error_for_status()?.json().await?)
    }

    async fn server_details(&self, server_id: &str) -> SessionResult<ServerDetails> {
        self.get_json(self.endpoint(&["api", "servers", server_id])?).await
    }

    async fn client_ip(&self) -> SessionResult<String> {
        let primary: SessionResult<ClientIp> = self.get_json(self.endpoint(&["api", "client-ip"])?).await;
        match primary {
            Ok(ClientIp { ip }) => Ok(ip),
            Err(err) => {
                warn!(error = %err, fallback = %self.ip_fallback, "client IP lookup failed; trying fallback");
                let response = self.client.get(self.ip_fallback.clone()).send().await?.error_for_status()?;
                let ClientIp { ip } = response.json().await?;
                Ok(ip)
            }
        }
    }
}

/// Fixed answers for a target given on the command line, bypassing the console API.
#[derive(Clone, Debug)]
pub struct StaticConsoleApi {
    server: ServerDetails,
    credential: RevealedCredential,
    client_ip: Option<String>,
}

impl StaticConsoleApi {
    pub fn new(server: ServerDetails, credential: RevealedCredential) -> Self {
        Self {
            server,
            credential,
            client_ip: None,
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }
}

#[async_trait]
impl ConsoleApi for StaticConsoleApi {
    async fn list_credentials(&self, _server_id: &str) -> SessionResult<Vec<CredentialSummary>> {
        Ok(vec![CredentialSummary {
            id: "static".into(),
            username: self.credential.username.clone(),
            kind: Some("password".into()),
            is_default: true,
        }])
    }

    async fn reveal_credential(&self, _server_id: &str, _credential_id: &str) -> SessionResult<RevealedCredential> {
        Ok(self.credential.clone())
    }

    async fn server_details(&self, _server_id: &str) -> SessionResult<ServerDetails> {
        Ok(self.server.clone())
    }

    async fn client_ip(&self) -> SessionResult<String> {
        self.client_ip
            .clone()
            .ok_or_else(|| SessionError::Credentials("client IP unavailable".into()))
    }
}
