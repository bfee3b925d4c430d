use super::GeneralStore;
use crate::error::Result;
use crate::models::{CustomMessages, UpdateCustomMessages};
use crate::store::Outcome;

pub async fn get_custom_messages(store: &GeneralStore) -> Result<CustomMessages> {
    Ok(store.document().await?.custom_messages.clone())
}

/// Overlay the supplied messages on the stored ones.
pub async fn update_custom_messages(
    store: &GeneralStore,
    input: &UpdateCustomMessages,
) -> Result<CustomMessages> {
    store
        .transact("Update custom messages", |doc| {
            doc.custom_messages.merge(input);
            Ok(Outcome::Commit(doc.custom_messages.clone()))
        })
        .await
}

pub async fn reset_custom_messages(store: &GeneralStore) -> Result<CustomMessages> {
    store
        .transact("Reset custom messages to defaults", |doc| {
            doc.custom_messages = CustomMessages::default();
            Ok(Outcome::Commit(doc.custom_messages.clone()))
        })
        .await
}
