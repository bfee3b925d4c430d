//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use authstore::cache::CachePolicy;
use authstore::db::{self, Stores};
use authstore::models::{
    Application, ApplicationSnapshot, CreateApplication, CreateLicense, License,
};
use authstore::remote::MemoryRemote;

pub struct TestStores {
    pub stores: Stores,
    pub general_remote: Arc<MemoryRemote>,
    pub license_remote: Arc<MemoryRemote>,
}

/// Long TTL, no grace window, no settle delay: reads after a write see the
/// re-fetched document straight from cache.
pub fn test_policy() -> CachePolicy {
    CachePolicy::with_ttl(Duration::from_secs(60))
}

pub fn setup() -> TestStores {
    setup_with(MemoryRemote::new(), MemoryRemote::new())
}

pub fn setup_with(general: MemoryRemote, licenses: MemoryRemote) -> TestStores {
    let general_remote = Arc::new(general);
    let license_remote = Arc::new(licenses);
    let stores = Stores::new(
        general_remote.clone(),
        license_remote.clone(),
        test_policy(),
        3,
    );
    TestStores {
        stores,
        general_remote,
        license_remote,
    }
}

pub async fn create_test_app(stores: &Stores, owner: &str, name: &str) -> Application {
    let input = CreateApplication {
        name: name.to_string(),
        ..Default::default()
    };
    db::applications::create_application(&stores.general, owner, &input)
        .await
        .unwrap()
}

pub fn license_input(app: &Application) -> CreateLicense {
    CreateLicense {
        application_id: app.id.clone(),
        application_data: Some(ApplicationSnapshot::from(app)),
        ..Default::default()
    }
}

pub async fn create_test_license(stores: &Stores, app: &Application) -> License {
    db::licenses::create_license(&stores.licenses, &license_input(app))
        .await
        .unwrap()
}
