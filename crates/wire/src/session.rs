// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Textual form of the session ID pattern: `ses_` followed by one or more
/// alphanumeric characters.
pub const SESSION_ID_PATTERN: &str = r"^ses_[A-Za-z0-9]+$";

/// Validate a candidate session ID against `ses_[A-Za-z0-9]+`.
///
/// Hand-rolled rather than a compiled `Regex` so validation never allocates
/// and never has a fallible construction path to `unwrap` around.
pub fn validate_session_id(id: &str) -> bool {
    match id.strip_prefix("ses_") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_alphanumeric()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_ids() {
        assert!(validate_session_id("ses_abc"));
        assert!(validate_session_id("ses_ABC123"));
        assert!(validate_session_id("ses_1"));
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(!validate_session_id("ses_"));
        assert!(!validate_session_id("sess_abc"));
        assert!(!validate_session_id("ses_abc def"));
        assert!(!validate_session_id("ses_abc-def"));
        assert!(!validate_session_id(""));
    }
}
