mod activity;
mod app_user;
mod application;
mod blacklist;
mod document;
mod license;
mod license_key;
mod messages;
mod session;
mod user;
mod validation;
mod webhook;

pub use activity::*;
pub use app_user::*;
pub use application::*;
pub use blacklist::*;
pub use document::*;
pub use license::*;
pub use license_key::*;
pub use messages::*;
pub use session::*;
pub use user::*;
pub use validation::*;
pub use webhook::*;

use serde::{Deserialize, Deserializer};
use uuid::Uuid;

/// Generate a new record identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Identifiers as they appear in stored documents. Older documents used
/// millisecond timestamps as numeric ids; they are read back as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
    Float(f64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Signed(n) => n.to_string(),
            RawId::Unsigned(n) => n.to_string(),
            RawId::Float(n) => n.to_string(),
        }
    }
}

pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

pub(crate) fn lenient_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}

/// Read an explicit `null` as the field's default value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
