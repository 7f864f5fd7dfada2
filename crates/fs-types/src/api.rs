//! Payloads returned by the console's REST API that the terminal session consumes.

use serde::{Deserialize, Serialize};

/// Credential listing entry; secrets are never part of a listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSummary {
    pub id: String,
    pub username: String,
    /// "password", "ssh_key", ...
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Result of revealing one credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RevealedCredential {
    pub username: String,
    #[serde(default)]
    pub secret: Option<String>,
}

/// Server record as far as the terminal needs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetails {
    pub id: String,
    pub host: String,
    /// APIs return this as a plain integer; validated before use.
    #[serde(default = "default_ssh_port")]
    pub port: i64,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Body of both the console's and the fallback echo service's IP lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIp {
    pub ip: String,
}

fn default_ssh_port() -> i64 {
    22
}

/// Pick the credential a terminal should log in with: the default one, else the first.
pub fn preferred_credential(credentials: &[CredentialSummary]) -> Option<&CredentialSummary> {
    credentials.iter().find(|c| c.is_default).or_else(|| credentials.first())
}
