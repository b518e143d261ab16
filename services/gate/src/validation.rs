//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{MAX_FIELD_CHARS, RewriteRequest};

pub const MSG_INVALID_EMAIL: &str = "Please enter a valid email address";
pub const MSG_INVALID_INPUT: &str = "Invalid input";

/// Canonical form of an email used as an identity
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() || email.len() > 254 {
        return Err(MSG_INVALID_EMAIL.to_string());
    }

    static EMAIL_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = EMAIL_REGEX
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());

    match regex {
        Some(regex) if regex.is_match(email) => Ok(()),
        _ => Err(MSG_INVALID_EMAIL.to_string()),
    }
}

/// Validate and normalize a rewrite request in place
pub fn validate_rewrite_request(request: &mut RewriteRequest) -> Result<(), String> {
    let fields = [
        &request.resume,
        &request.job_description,
        &request.template,
    ];
    if fields
        .iter()
        .any(|field| field.chars().count() > MAX_FIELD_CHARS)
    {
        return Err(MSG_INVALID_INPUT.to_string());
    }

    if let Some(email) = request.user_email.take() {
        let email = normalize_email(&email);
        validate_email(&email).map_err(|_| MSG_INVALID_INPUT.to_string())?;
        request.user_email = Some(email);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(resume: &str, user_email: Option<&str>) -> RewriteRequest {
        RewriteRequest {
            resume: resume.to_string(),
            job_description: "Rust engineer".to_string(),
            template: "modern".to_string(),
            user_email: user_email.map(str::to_string),
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.io").is_ok());

        for bad in ["", "alice", "alice@", "@example.com", "alice@example", "a b@example.com"] {
            assert_eq!(validate_email(bad), Err(MSG_INVALID_EMAIL.to_string()), "{bad}");
        }
    }

    #[test]
    fn test_rewrite_field_limits_count_characters() {
        assert!(validate_rewrite_request(&mut rewrite(&"é".repeat(MAX_FIELD_CHARS), None)).is_ok());
        assert_eq!(
            validate_rewrite_request(&mut rewrite(&"a".repeat(MAX_FIELD_CHARS + 1), None)),
            Err(MSG_INVALID_INPUT.to_string())
        );
    }

    #[test]
    fn test_rewrite_email_is_normalized_or_rejected() {
        let mut request = rewrite("resume", Some(" Bob@Example.com"));
        validate_rewrite_request(&mut request).unwrap();
        assert_eq!(request.user_email.as_deref(), Some("bob@example.com"));

        assert!(validate_rewrite_request(&mut rewrite("resume", Some("not-an-email"))).is_err());
    }
}
