use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims carried by the bearer token this crate verifies but does not mint
/// (authentication/registration is an external collaborator, see spec §1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, uuid::Error> {
        Uuid::parse_str(&self.sub)
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() > self.exp
    }
}

/// The identity extracted from a verified bearer token, available to handlers
/// via the `AuthenticatedUser` extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: Uuid,
}
