//! Concrete `AuthVerifier`: a static, config-loaded map of client id to
//! bearer token. Real deployments would hash-lookup against a token
//! store the way the teacher's `services/server/src/auth.rs` hashes
//! against `device_tokens`; a real token store is out of scope here
//! (`electric-core`'s `collaborators.rs` calls this out explicitly), so
//! this verifier is the whole of `electric-server`'s auth story.

use std::collections::HashMap;

use async_trait::async_trait;
use electric_core::{AuthOutcome, AuthVerifier};

pub struct StaticTokenAuthVerifier {
    tokens_by_client: HashMap<String, String>,
}

impl StaticTokenAuthVerifier {
    pub fn new(tokens_by_client: HashMap<String, String>) -> Self {
        Self { tokens_by_client }
    }
}

#[async_trait]
impl AuthVerifier for StaticTokenAuthVerifier {
    async fn verify(&self, id: &str, token: &str, _headers: &[(String, String)]) -> AuthOutcome {
        match self.tokens_by_client.get(id) {
            Some(expected) if expected == token => AuthOutcome::Ok { identity: id.to_owned() },
            Some(_) => AuthOutcome::InvalidCredentials,
            None => AuthOutcome::AuthFailed,
        }
    }
}

pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}
