//! Submission ledger model
//!
//! One submission row is written per metered action. The ledger is what the
//! quota enforcer counts; the stored input/output are only for the admin
//! listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Template tag reserved for entries made by anonymous callers
pub const ANONYMOUS_TEMPLATE_TAG: &str = "anonymous";

/// Template tag for entries attributed to a known email
pub const IDENTITY_TEMPLATE_TAG: &str = "user";

/// Who a ledger entry is charged to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LedgerSubject {
    /// A resolved or caller-supplied email
    Identity(String),
    /// No identity; charged to the client address
    Anonymous(String),
}

impl LedgerSubject {
    /// Charge a known email if there is one, otherwise the client address
    pub fn for_caller(email: Option<&str>, client_addr: &str) -> Self {
        match email {
            Some(email) => LedgerSubject::Identity(email.to_string()),
            None => LedgerSubject::Anonymous(client_addr.to_string()),
        }
    }

    pub fn template_tag(&self) -> &'static str {
        match self {
            LedgerSubject::Identity(_) => IDENTITY_TEMPLATE_TAG,
            LedgerSubject::Anonymous(_) => ANONYMOUS_TEMPLATE_TAG,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            LedgerSubject::Identity(email) => Some(email),
            LedgerSubject::Anonymous(_) => None,
        }
    }

    pub fn client_addr(&self) -> Option<&str> {
        match self {
            LedgerSubject::Identity(_) => None,
            LedgerSubject::Anonymous(addr) => Some(addr),
        }
    }
}

/// Submission entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub client_addr: Option<String>,
    pub template: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Submission {
    /// Whether this entry counts against `subject`'s allowance
    pub fn charged_to(&self, subject: &LedgerSubject) -> bool {
        match subject {
            LedgerSubject::Identity(email) => self.email.as_deref() == Some(email.as_str()),
            LedgerSubject::Anonymous(addr) => {
                self.email.is_none()
                    && self.template == ANONYMOUS_TEMPLATE_TAG
                    && self.client_addr.as_deref() == Some(addr.as_str())
            }
        }
    }
}

/// New ledger entry payload
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub subject: LedgerSubject,
    pub created_at: DateTime<Utc>,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(email: Option<&str>, addr: Option<&str>, template: &str) -> Submission {
        Submission {
            id: Uuid::new_v4(),
            email: email.map(str::to_string),
            client_addr: addr.map(str::to_string),
            template: template.to_string(),
            input: serde_json::Value::Null,
            output: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_anonymous_entries_match_only_their_address() {
        let subject = LedgerSubject::Anonymous("10.0.0.1".to_string());

        assert!(entry(None, Some("10.0.0.1"), ANONYMOUS_TEMPLATE_TAG).charged_to(&subject));
        assert!(!entry(None, Some("10.0.0.10"), ANONYMOUS_TEMPLATE_TAG).charged_to(&subject));
        assert!(!entry(None, Some("10.0.0.1"), IDENTITY_TEMPLATE_TAG).charged_to(&subject));
    }

    #[test]
    fn test_identity_entries_ignore_client_address() {
        let subject = LedgerSubject::Identity("a@example.com".to_string());

        assert!(entry(Some("a@example.com"), None, IDENTITY_TEMPLATE_TAG).charged_to(&subject));
        assert!(!entry(Some("b@example.com"), None, IDENTITY_TEMPLATE_TAG).charged_to(&subject));
        assert!(!entry(None, Some("a@example.com"), ANONYMOUS_TEMPLATE_TAG).charged_to(&subject));
    }
}
