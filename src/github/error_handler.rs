//! GitHub API error detection and classification
//!
//! Turns octocrab errors into [`ActionError`] variants and decides which merge
//! API failures are conflicts, which are worth retrying, and which are fatal.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::config::MergeSettings;
use crate::error::ActionError;
use crate::github::hosting::MergeOutcome;

/// Secondary rate limits mention "secondary rate limit" or "abuse detection"
static RATE_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(rate limit|abuse detection|limit exceeded)")
        .expect("Invalid regex pattern for rate limit detection")
});

/// Status code and message of an API error response, if it was one
pub fn api_error_parts(err: &octocrab::Error) -> Option<(u16, String)> {
    match err {
        octocrab::Error::GitHub { source, .. } => {
            Some((source.status_code.as_u16(), source.message.clone()))
        }
        _ => None,
    }
}

/// Classifies an octocrab error into a more specific ActionError if possible
pub fn classify_github_error(err: octocrab::Error) -> ActionError {
    if let Some((status, message)) = api_error_parts(&err) {
        if is_rate_limit_error(status, &message) {
            return ActionError::TransientRemote(format!("{} ({})", message, status));
        }
        if status == 404 {
            return ActionError::GitHubApi(format!(
                "{} (404). The repository or branch may not exist, or the token lacks access.",
                message
            ));
        }
        return ActionError::GitHubApi(format!("{} ({})", message, status));
    }

    // Display only returns the variant name, Debug carries the cause
    ActionError::GitHubApi(format!("{:?}", err))
}

/// Check if a response is a (primary or secondary) rate limit rejection
pub fn is_rate_limit_error(status: u16, message: &str) -> bool {
    status == 429 || ((status == 403 || status == 422) && RATE_LIMIT_PATTERN.is_match(message))
}

/// Map a failed merge response onto a retry decision
///
/// Returns `None` for statuses that are neither a conflict nor transient;
/// the caller treats those as fatal.
pub fn classify_merge_failure(
    settings: &MergeSettings,
    status: u16,
    message: &str,
) -> Option<MergeOutcome> {
    if settings.conflict_status_codes.contains(&status) {
        return Some(MergeOutcome::Conflict(format!("{} ({})", message, status)));
    }
    if settings.transient_status_codes.contains(&status) || is_rate_limit_error(status, message) {
        return Some(MergeOutcome::Transient(format!("{} ({})", message, status)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit_error(403, "API rate limit exceeded for installation"));
        assert!(is_rate_limit_error(403, "You have exceeded a secondary rate limit"));
        assert!(is_rate_limit_error(429, "Too Many Requests"));
        assert!(!is_rate_limit_error(403, "Resource not accessible by integration"));
        assert!(!is_rate_limit_error(500, "rate limit"));
    }

    #[test]
    fn test_default_merge_classification() {
        let settings = MergeSettings::default();
        assert!(matches!(
            classify_merge_failure(&settings, 405, "Pull Request is not mergeable"),
            Some(MergeOutcome::Conflict(_))
        ));
        assert!(matches!(
            classify_merge_failure(&settings, 409, "Head branch was modified"),
            Some(MergeOutcome::Transient(_))
        ));
        assert!(matches!(
            classify_merge_failure(&settings, 403, "secondary rate limit"),
            Some(MergeOutcome::Transient(_))
        ));
        assert_eq!(classify_merge_failure(&settings, 422, "Validation Failed"), None);
    }

    #[test]
    fn test_configured_codes_override_defaults() {
        let settings = MergeSettings {
            conflict_status_codes: vec![409],
            transient_status_codes: vec![405],
        };
        assert!(matches!(
            classify_merge_failure(&settings, 409, "conflict"),
            Some(MergeOutcome::Conflict(_))
        ));
        assert!(matches!(
            classify_merge_failure(&settings, 405, "not mergeable yet"),
            Some(MergeOutcome::Transient(_))
        ));
    }
}
