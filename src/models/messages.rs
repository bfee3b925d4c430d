use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

/// Outcome of an end-user login attempt that has a configurable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumIter)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum MessageKind {
    LoginSuccess,
    LoginFailed,
    AccountDisabled,
    AccountExpired,
    VersionMismatch,
    HwidMismatch,
}

/// Global login messages, overridable per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomMessages {
    pub login_success: String,
    pub login_failed: String,
    pub account_disabled: String,
    pub account_expired: String,
    pub version_mismatch: String,
    pub hwid_mismatch: String,
}

impl Default for CustomMessages {
    fn default() -> Self {
        Self {
            login_success: "Login successful! Welcome back.".into(),
            login_failed: "Invalid username or password. Please try again.".into(),
            account_disabled: "Your account has been disabled. Please contact support.".into(),
            account_expired: "Your account has expired. Please renew your subscription.".into(),
            version_mismatch: "Your application version is outdated. Please update to continue."
                .into(),
            hwid_mismatch: "Hardware ID mismatch detected. Please contact support for assistance."
                .into(),
        }
    }
}

impl CustomMessages {
    pub fn get(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::LoginSuccess => &self.login_success,
            MessageKind::LoginFailed => &self.login_failed,
            MessageKind::AccountDisabled => &self.account_disabled,
            MessageKind::AccountExpired => &self.account_expired,
            MessageKind::VersionMismatch => &self.version_mismatch,
            MessageKind::HwidMismatch => &self.hwid_mismatch,
        }
    }

    /// Overlay the fields present in `update`.
    pub fn merge(&mut self, update: &UpdateCustomMessages) {
        let fields = [
            (&mut self.login_success, &update.login_success),
            (&mut self.login_failed, &update.login_failed),
            (&mut self.account_disabled, &update.account_disabled),
            (&mut self.account_expired, &update.account_expired),
            (&mut self.version_mismatch, &update.version_mismatch),
            (&mut self.hwid_mismatch, &update.hwid_mismatch),
        ];
        for (target, value) in fields {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomMessages {
    pub login_success: Option<String>,
    pub login_failed: Option<String>,
    pub account_disabled: Option<String>,
    pub account_expired: Option<String>,
    pub version_mismatch: Option<String>,
    pub hwid_mismatch: Option<String>,
}
