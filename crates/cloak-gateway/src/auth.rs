//! Authentication gate for the websocket upgrade and the ask route.

use cloak_core::config::CloakConfig;
use cloak_core::types::{DeviceHash, UserId, UserIdHash};

/// Who is on the other end of an authenticated connection.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: UserId,
    pub user_id_hash: UserIdHash,
    pub device_hash: DeviceHash,
}

impl Identity {
    pub fn new(user_id: UserId, device_hash: DeviceHash) -> Self {
        let user_id_hash = user_id.hashed();
        Self {
            user_id,
            user_id_hash,
            device_hash,
        }
    }
}

/// Parameters presented with the upgrade request.
#[derive(Debug, serde::Deserialize)]
pub struct ConnectQuery {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub device_fingerprint_hash: Option<String>,
}

/// Validate the upgrade parameters against config. `None` closes the
/// connection before the message loop ever runs.
pub fn authenticate(query: &ConnectQuery, config: &CloakConfig) -> Option<Identity> {
    if let Some(expected) = &config.gateway.auth_token {
        if query.token.as_ref() != Some(expected) {
            return None;
        }
    }
    let user_id = query.user_id.as_deref().filter(|s| !s.is_empty())?;
    let device = query
        .device_fingerprint_hash
        .as_deref()
        .filter(|s| !s.is_empty())?;
    Some(Identity::new(
        UserId::from(user_id),
        DeviceHash::from(device),
    ))
}

/// Bearer-token check for the HTTP ask route.
pub fn check_bearer(auth_header: Option<&str>, config: &CloakConfig) -> bool {
    match &config.gateway.auth_token {
        None => true,
        Some(expected) => auth_header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|token| token == expected)
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_token(token: Option<&str>) -> CloakConfig {
        let mut config = CloakConfig::default();
        config.gateway.auth_token = token.map(str::to_string);
        config
    }

    fn query(token: Option<&str>, user: Option<&str>, device: Option<&str>) -> ConnectQuery {
        ConnectQuery {
            token: token.map(str::to_string),
            user_id: user.map(str::to_string),
            device_fingerprint_hash: device.map(str::to_string),
        }
    }

    #[test]
    fn rejects_wrong_token() {
        let config = config_with_token(Some("secret"));
        assert!(authenticate(&query(Some("nope"), Some("u1"), Some("d1")), &config).is_none());
        assert!(authenticate(&query(None, Some("u1"), Some("d1")), &config).is_none());
    }

    #[test]
    fn accepts_valid_params_and_hashes_user() {
        let config = config_with_token(Some("secret"));
        let identity =
            authenticate(&query(Some("secret"), Some("u1"), Some("d1")), &config).unwrap();
        assert_eq!(identity.user_id.as_str(), "u1");
        assert_eq!(identity.user_id_hash, UserId::from("u1").hashed());
    }

    #[test]
    fn requires_user_and_device() {
        let config = config_with_token(None);
        assert!(authenticate(&query(None, None, Some("d1")), &config).is_none());
        assert!(authenticate(&query(None, Some("u1"), None), &config).is_none());
        assert!(authenticate(&query(None, Some(""), Some("d1")), &config).is_none());
    }

    #[test]
    fn bearer_check_matches_token() {
        let config = config_with_token(Some("secret"));
        assert!(check_bearer(Some("Bearer secret"), &config));
        assert!(!check_bearer(Some("Bearer wrong"), &config));
        assert!(!check_bearer(None, &config));
        let open = config_with_token(None);
        assert!(check_bearer(None, &open));
    }
}
