use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::models::{SessionInfo, VoterSource};
use crate::validation::validate_voter_id;

pub const VOTER_ID_HEADER: &str = "X-Voter-Id";
pub const UNKNOWN_IP: &str = "0.0.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub voter_id: String,
    pub source: VoterSource,
    pub ip: String,
}

impl UserInfo {
    /// Picks the voter identity for a request: a well-formed id supplied by the
    /// client wins, then a fingerprint of address and user agent, then a fresh
    /// anonymous id when the request carries nothing to fingerprint.
    pub fn resolve(provided: Option<&str>, ip: Option<&str>, user_agent: Option<&str>) -> Self {
        let ip_str = ip.unwrap_or(UNKNOWN_IP).to_string();

        if let Some(id) = provided.filter(|id| validate_voter_id(id).is_ok()) {
            return Self { voter_id: id.to_string(), source: VoterSource::Provided, ip: ip_str };
        }

        if ip.is_none() && user_agent.is_none() {
            return Self {
                voter_id: Uuid::new_v4().simple().to_string(),
                source: VoterSource::Anonymous,
                ip: ip_str,
            };
        }

        Self {
            voter_id: generate_server_fingerprint(&ip_str, user_agent),
            source: VoterSource::Fingerprint,
            ip: ip_str,
        }
    }

    pub fn session(&self) -> SessionInfo {
        SessionInfo { voter_id: self.voter_id.clone(), source: self.source }
    }

    /// Who a rate limit counts against. The client address when known, since
    /// the voter id header is chosen by the client.
    pub fn rate_limit_subject(&self) -> &str {
        if self.ip == UNKNOWN_IP {
            &self.voter_id
        } else {
            &self.ip
        }
    }
}

pub fn generate_server_fingerprint(ip: &str, user_agent: Option<&str>) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use sha2::{Sha256, Digest};

    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    if let Some(ua) = user_agent {
        hasher.update(ua.as_bytes());
    }
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(feature = "backend")]
mod backend_impl {
    use super::*;
    use rocket::request::{FromRequest, Outcome};
    use rocket::Request;

    #[rocket::async_trait]
    impl<'r> FromRequest<'r> for UserInfo {
        type Error = ();

        async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
            let headers = req.headers();
            let ip = headers.get_one("X-Real-IP")
                .or_else(|| headers.get_one("X-Forwarded-For"))
                .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
                .or_else(|| req.client_ip().map(|addr| addr.to_string()));

            Outcome::Success(UserInfo::resolve(
                headers.get_one(VOTER_ID_HEADER),
                ip.as_deref(),
                headers.get_one("User-Agent"),
            ))
        }
    }
}
