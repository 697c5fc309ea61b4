//! Credential material discovery.
//!
//! The bridge authenticates with either a service-account key file (the
//! standard `GOOGLE_APPLICATION_CREDENTIALS` path) or an inline
//! client-email/private-key pair from the environment. Discovery is pure
//! inspection: it reports what is configured and what is wrong with it, and
//! never mutates anything.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::CredentialConfig;

/// Which kind of credential material is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    ServiceAccountFile,
    EnvironmentVariables,
    None,
}

/// Result of inspecting the configured credential sources.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialMaterial {
    pub kind: CredentialKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    /// Configuration problems found during discovery (file missing, key not
    /// decodable). Non-empty problems with `kind != None` mean "configured
    /// but broken".
    pub problems: Vec<String>,
}

impl CredentialMaterial {
    pub fn is_present(&self) -> bool {
        self.kind != CredentialKind::None
    }
}

/// Inspect the configured credential sources in precedence order: key file
/// first, then the inline environment pair.
pub fn discover(config: &CredentialConfig) -> CredentialMaterial {
    let mut problems = Vec::new();

    if let Some(path) = &config.service_account_file {
        if path.is_file() {
            return CredentialMaterial {
                kind: CredentialKind::ServiceAccountFile,
                service_account_path: Some(path.clone()),
                client_email: None,
                problems,
            };
        }
        problems.push(format!(
            "service account file configured but not found: {}",
            path.display()
        ));
    }

    match (&config.client_email, &config.private_key_base64) {
        (Some(email), Some(key_b64)) => {
            match base64::engine::general_purpose::STANDARD.decode(key_b64) {
                Ok(decoded) if !decoded.is_empty() => CredentialMaterial {
                    kind: CredentialKind::EnvironmentVariables,
                    service_account_path: None,
                    client_email: Some(email.clone()),
                    problems,
                },
                Ok(_) => {
                    problems.push("inline private key decodes to empty".to_string());
                    CredentialMaterial {
                        kind: CredentialKind::None,
                        service_account_path: None,
                        client_email: Some(email.clone()),
                        problems,
                    }
                }
                Err(e) => {
                    problems.push(format!("inline private key is not valid base64: {e}"));
                    CredentialMaterial {
                        kind: CredentialKind::None,
                        service_account_path: None,
                        client_email: Some(email.clone()),
                        problems,
                    }
                }
            }
        }
        (Some(_), None) => {
            problems.push("client email set but private key missing".to_string());
            CredentialMaterial {
                kind: CredentialKind::None,
                service_account_path: None,
                client_email: config.client_email.clone(),
                problems,
            }
        }
        (None, Some(_)) => {
            problems.push("private key set but client email missing".to_string());
            CredentialMaterial {
                kind: CredentialKind::None,
                service_account_path: None,
                client_email: None,
                problems,
            }
        }
        (None, None) => CredentialMaterial {
            kind: CredentialKind::None,
            service_account_path: None,
            client_email: None,
            problems,
        },
    }
}
