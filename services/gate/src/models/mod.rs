//! Gate service models

pub mod rewrite;
pub mod submission;
pub mod user;

// Re-export for convenience
pub use rewrite::{MAX_FIELD_CHARS, RewriteRequest, RewriteResponse};
pub use submission::{
    ANONYMOUS_TEMPLATE_TAG, IDENTITY_TEMPLATE_TAG, LedgerSubject, NewSubmission, Submission,
};
pub use user::User;
