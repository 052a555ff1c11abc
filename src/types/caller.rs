//! Caller identity as resolved by the external auth layer.

use serde::{Deserialize, Serialize};

/// Rate-limit tier of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Anonymous,
    Authenticated,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Authenticated => "authenticated",
        }
    }
}

/// A resolved caller identity.
///
/// Muninn never validates credentials; it trusts whatever identity the
/// auth collaborator resolved (user id, or network address for anonymous
/// callers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub identity: String,
    pub authenticated: bool,
}

impl Caller {
    /// An authenticated caller, keyed by user id.
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            identity: user_id.into(),
            authenticated: true,
        }
    }

    /// An anonymous caller, keyed by network identity.
    pub fn anonymous(network_id: impl Into<String>) -> Self {
        Self {
            identity: network_id.into(),
            authenticated: false,
        }
    }

    pub fn tier(&self) -> Tier {
        if self.authenticated {
            Tier::Authenticated
        } else {
            Tier::Anonymous
        }
    }
}
