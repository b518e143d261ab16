//! Rewrite request/response payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum length, in characters, of each free-text rewrite field
pub const MAX_FIELD_CHARS: usize = 3000;

/// Body of `POST /api/rewrite`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRequest {
    pub resume: String,
    pub job_description: String,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Structured rewrite returned by the rewriter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriteResponse {
    pub sections: BTreeMap<String, String>,
    pub markdown: String,
}
