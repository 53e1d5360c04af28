//! clientDataJSON binding check.
//!
//! The browser writes the challenge it was given into clientDataJSON, and the
//! authenticator signs over a hash of that JSON. So "does this assertion
//! belong to this operation" comes down to: does the `challenge` *field* of
//! the parsed object equal the base64url of the challenge we derived.
//!
//! The JSON is parsed into a typed struct. Searching the raw bytes for the
//! encoded challenge would accept it sitting under any other key (or inside
//! some other string), which is exactly the confusion we are here to rule
//! out.

use serde::Deserialize;

use crate::challenge::Challenge;
use crate::config::{RelyingPartyPolicy, CLIENT_DATA_TYPE_GET, MAX_CLIENT_DATA_LENGTH};
use crate::error::AuthError;

/// The parts of `CollectedClientData` we care about. Unknown members are
/// ignored (browsers add some); duplicate known members are a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub cross_origin: bool,
}

impl CollectedClientData {
    pub fn parse(client_data_json: &[u8]) -> Result<Self, AuthError> {
        if client_data_json.len() > MAX_CLIENT_DATA_LENGTH {
            return Err(AuthError::MalformedAssertion(format!(
                "clientDataJSON is {} bytes, maximum is {}",
                client_data_json.len(),
                MAX_CLIENT_DATA_LENGTH
            )));
        }
        serde_json::from_slice(client_data_json)
            .map_err(|e| AuthError::MalformedAssertion(format!("clientDataJSON: {e}")))
    }
}

/// `verify_binding(client_data_json, expected_challenge)`.
///
/// Checks type and challenge only; origin is left to
/// [`verify_binding_with_policy`].
pub fn verify_binding(
    client_data_json: &[u8],
    expected: &Challenge,
) -> Result<CollectedClientData, AuthError> {
    let client_data = CollectedClientData::parse(client_data_json)?;

    if client_data.ty != CLIENT_DATA_TYPE_GET {
        return Err(AuthError::MalformedAssertion(format!(
            "clientData type is {:?}, expected {:?}",
            client_data.ty, CLIENT_DATA_TYPE_GET
        )));
    }

    match client_data.challenge.as_deref() {
        Some(challenge) if challenge == expected.to_base64url() => Ok(client_data),
        _ => Err(AuthError::ChallengeMismatch),
    }
}

/// [`verify_binding`] plus the relying party's origin allow-list.
pub fn verify_binding_with_policy(
    client_data_json: &[u8],
    expected: &Challenge,
    policy: &RelyingPartyPolicy,
) -> Result<CollectedClientData, AuthError> {
    let client_data = verify_binding(client_data_json, expected)?;

    if !policy.allowed_origins.is_empty() {
        let origin = client_data.origin.as_deref().unwrap_or_default();
        if !policy.origin_allowed(origin) {
            return Err(AuthError::OriginMismatch(origin.to_string()));
        }
        if client_data.cross_origin {
            return Err(AuthError::OriginMismatch(format!("{origin} (cross-origin)")));
        }
    }
    Ok(client_data)
}

/// Boolean form of [`verify_binding`].
pub fn binds(client_data_json: &[u8], expected: &Challenge) -> bool {
    verify_binding(client_data_json, expected).is_ok()
}
