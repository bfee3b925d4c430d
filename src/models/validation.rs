use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::AsRefStr;

/// Why a license failed validation.
///
/// Variants are listed in evaluation order: the first failing check wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InvalidReason {
    /// No license with that key (and application scope)
    InvalidKey,
    /// No license with that key whose embedded API key matches
    InvalidCredentials,
    ApplicationInactive,
    Inactive,
    Banned,
    Expired,
    CapacityExceeded,
    HardwareMismatch,
}

impl InvalidReason {
    pub fn code(&self) -> &str {
        self.as_ref()
    }

    /// Message suitable for showing to the end user.
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidKey => "Invalid license key",
            Self::InvalidCredentials => "Invalid API key or license key",
            Self::ApplicationInactive => "Application is inactive",
            Self::Inactive => "License key is inactive",
            Self::Banned => "License key is banned",
            Self::Expired => "License key has expired",
            Self::CapacityExceeded => "License key has reached maximum user limit",
            Self::HardwareMismatch => "Hardware ID mismatch",
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// The state a license check looks at. Shared by general-store license keys
/// and license-store licenses.
#[derive(Debug, Clone, Copy)]
pub struct LicenseFacts<'a> {
    pub is_active: bool,
    pub is_banned: bool,
    pub expires_at: DateTime<Utc>,
    pub current_users: u32,
    pub max_users: u32,
    pub hwid_lock_enabled: bool,
    pub bound_hwid: Option<&'a str>,
}

impl LicenseFacts<'_> {
    /// Evaluate the check chain: inactive, banned, expired, capacity, HWID.
    pub fn evaluate(&self, now: DateTime<Utc>, hwid: Option<&str>) -> Option<InvalidReason> {
        if !self.is_active {
            return Some(InvalidReason::Inactive);
        }
        if self.is_banned {
            return Some(InvalidReason::Banned);
        }
        if now > self.expires_at {
            return Some(InvalidReason::Expired);
        }
        if self.current_users >= self.max_users {
            return Some(InvalidReason::CapacityExceeded);
        }
        if self.hwid_lock_enabled
            && let (Some(bound), Some(presented)) = (self.bound_hwid, hwid)
            && bound != presented
        {
            return Some(InvalidReason::HardwareMismatch);
        }
        None
    }
}

/// Result of validating a license. Failures are values, not errors.
#[derive(Debug, Clone, Serialize)]
pub struct Validation<T> {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    /// The matched record, present whenever a license was found
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<T>,
}

impl<T> Validation<T> {
    pub fn valid(license: T) -> Self {
        Self {
            valid: true,
            reason: None,
            license: Some(license),
        }
    }

    pub fn invalid(reason: InvalidReason, license: Option<T>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            license,
        }
    }

    pub fn message(&self) -> Option<&'static str> {
        self.reason.map(|r| r.message())
    }
}
