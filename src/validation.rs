use crate::constants::{MAX_BYPASS_MINUTES, MAX_SITE_LEN, MS_PER_MINUTE};
use crate::error::AppError;

/// Validate bypass duration in minutes.
/// Returns Ok(duration_ms) if valid.
pub fn validate_bypass_minutes(minutes: i64) -> Result<i64, AppError> {
    if minutes <= 0 {
        return Err(AppError::InvalidInput {
            field: "minutes",
            reason: "must be positive".into(),
        });
    }
    if minutes > MAX_BYPASS_MINUTES {
        return Err(AppError::InvalidInput {
            field: "minutes",
            reason: format!("cannot exceed {MAX_BYPASS_MINUTES} minutes"),
        });
    }
    Ok(minutes * MS_PER_MINUTE)
}

/// Resolve the site a bypass is for. A missing or blank site is the
/// "could not determine site" failure, not an input error.
pub fn require_site(site: Option<&str>) -> Result<&str, AppError> {
    match site.map(str::trim) {
        Some(site) if !site.is_empty() => Ok(site),
        Some(_) | None => Err(AppError::MissingSite),
    }
}

/// Validate a hostname typed into a site list.
pub fn validate_site(site: &str) -> Result<&str, AppError> {
    if site.is_empty() {
        return Err(AppError::InvalidInput {
            field: "site",
            reason: "cannot be empty".into(),
        });
    }
    if site.len() > MAX_SITE_LEN {
        return Err(AppError::InvalidInput {
            field: "site",
            reason: format!("cannot exceed {MAX_SITE_LEN} characters"),
        });
    }
    if site.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(AppError::InvalidInput {
            field: "site",
            reason: format!("'{site}' is not a hostname"),
        });
    }
    Ok(site)
}
