use authstore::db;
use authstore::error::AppError;
use authstore::models::{CreateLicense, InvalidReason, UpdateLicense};
use authstore::remote::MemoryRemote;
use authstore::store::Outcome;
use chrono::{Duration, Utc};

use crate::common::*;

#[tokio::test]
async fn test_create_license_defaults() {
    let t = setup();
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;

    assert_eq!(license.license_key.len(), 32);
    assert_eq!(license.max_users, 1);
    assert_eq!(license.validity_days, 30);
    assert_eq!(license.current_users, 0);
    assert!(license.is_active);
    assert!(!license.hwid_lock_enabled);
    assert!(license.matches_api_key(&app.api_key));
    let days = (license.expires_at - Utc::now()).num_days();
    assert!((29..=30).contains(&days));

    // the general document is not touched
    assert_eq!(t.general_remote.write_count(), 1);
    assert_eq!(t.license_remote.write_count(), 1);

    let stored: serde_json::Value =
        serde_json::from_slice(&t.license_remote.contents().unwrap()).unwrap();
    assert_eq!(stored["licenses"][0]["applicationData"]["apiKey"], app.api_key);
}

#[tokio::test]
async fn test_create_license_without_snapshot_is_rejected() {
    let t = setup();
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let input = CreateLicense {
        application_data: None,
        ..license_input(&app)
    };
    let err = db::licenses::create_license(&t.stores.licenses, &input)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invariant(_)));
    assert_eq!(t.license_remote.write_count(), 0);
}

#[tokio::test]
async fn test_duplicate_license_key_rejected() {
    let t = setup();
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let input = CreateLicense {
        license_key: Some("FIXED-KEY".into()),
        ..license_input(&app)
    };
    db::licenses::create_license(&t.stores.licenses, &input)
        .await
        .unwrap();
    let err = db::licenses::create_license(&t.stores.licenses, &input)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_validation_with_api_key() {
    let t = setup();
    let licenses = &t.stores.licenses;
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;

    let ok = db::licenses::validate_license_with_api_key(
        licenses,
        &app.api_key,
        &license.license_key,
        None,
    )
    .await
    .unwrap();
    assert!(ok.valid);
    assert!(ok.reason.is_none());

    let wrong_api = db::licenses::validate_license_with_api_key(
        licenses,
        "wrong-api-key",
        &license.license_key,
        None,
    )
    .await
    .unwrap();
    assert_eq!(wrong_api.reason, Some(InvalidReason::InvalidCredentials));
    assert!(wrong_api.license.is_none());

    let unknown = db::licenses::validate_license(licenses, "missing", None, None)
        .await
        .unwrap();
    assert_eq!(unknown.reason, Some(InvalidReason::InvalidKey));

    let other_app = db::licenses::validate_license(
        licenses,
        &license.license_key,
        Some("another-app"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(other_app.reason, Some(InvalidReason::InvalidKey));
}

#[tokio::test]
async fn test_banned_reported_before_expired() {
    let t = setup();
    let licenses = &t.stores.licenses;
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let input = CreateLicense {
        expires_at: Some(Utc::now() - Duration::days(1)),
        ..license_input(&app)
    };
    let license = db::licenses::create_license(&t.stores.licenses, &input)
        .await
        .unwrap();

    let expired = db::licenses::validate_license(licenses, &license.license_key, None, None)
        .await
        .unwrap();
    assert_eq!(expired.reason, Some(InvalidReason::Expired));
    assert!(expired.license.is_some());

    let banned = db::licenses::ban(&t.stores.licenses, &license.id).await.unwrap();
    assert!(banned.is_banned);
    assert!(!banned.is_active);

    // a banned license is also inactive; inactive is checked first
    let result = db::licenses::validate_license(licenses, &license.license_key, None, None)
        .await
        .unwrap();
    assert_eq!(result.reason, Some(InvalidReason::Inactive));

    db::licenses::update_license(
        &t.stores.licenses,
        &license.id,
        &UpdateLicense {
            is_active: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let result = db::licenses::validate_license(licenses, &license.license_key, None, None)
        .await
        .unwrap();
    assert_eq!(result.reason, Some(InvalidReason::Banned));

    let unbanned = db::licenses::unban(&t.stores.licenses, &license.id)
        .await
        .unwrap();
    assert!(unbanned.is_active);
    assert!(!unbanned.is_banned);
}

#[tokio::test]
async fn test_consume_slot_until_capacity() {
    let t = setup();
    let licenses = &t.stores.licenses;
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let input = CreateLicense {
        max_users: Some(2),
        ..license_input(&app)
    };
    let license = db::licenses::create_license(licenses, &input).await.unwrap();

    for expected in 1..=2 {
        let taken = db::licenses::consume_slot(licenses, &app.api_key, &license.license_key, None)
            .await
            .unwrap();
        assert!(taken.valid);
        assert_eq!(taken.license.unwrap().current_users, expected);
    }
    let writes = t.license_remote.write_count();

    let full = db::licenses::consume_slot(licenses, &app.api_key, &license.license_key, None)
        .await
        .unwrap();
    assert_eq!(full.reason, Some(InvalidReason::CapacityExceeded));
    assert_eq!(full.license.unwrap().current_users, 2);
    assert_eq!(t.license_remote.write_count(), writes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consume_slot_takes_last_slot_once() {
    let t = setup_with(
        MemoryRemote::new(),
        MemoryRemote::new().with_latency(std::time::Duration::from_millis(5)),
    );
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;
    assert_eq!(license.max_users, 1);

    let mut handles = Vec::new();
    for _ in 0..2 {
        let stores = t.stores.clone();
        let api_key = app.api_key.clone();
        let key = license.license_key.clone();
        handles.push(tokio::spawn(async move {
            db::licenses::consume_slot(&stores.licenses, &api_key, &key, None).await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.valid).count(), 1);
    let rejected: Vec<_> = results.iter().filter(|r| !r.valid).collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].reason, Some(InvalidReason::CapacityExceeded));

    let stored = db::licenses::get_license(&t.stores.licenses, &license.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.current_users, 1);
}

#[tokio::test]
async fn test_consume_slot_rechecks_after_external_write() {
    let t = setup();
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;

    // the cached copy still shows a free slot
    let cached = db::licenses::get_license(&t.stores.licenses, &license.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.current_users, 0);

    let mut stored: serde_json::Value =
        serde_json::from_slice(&t.license_remote.contents().unwrap()).unwrap();
    stored["licenses"][0]["currentUsers"] = serde_json::json!(1);
    t.license_remote
        .overwrite(serde_json::to_vec_pretty(&stored).unwrap());
    let writes = t.license_remote.write_count();

    let result = db::licenses::consume_slot(
        &t.stores.licenses,
        &app.api_key,
        &license.license_key,
        None,
    )
    .await
    .unwrap();
    assert!(!result.valid);
    assert_eq!(result.reason, Some(InvalidReason::CapacityExceeded));
    assert_eq!(result.license.unwrap().current_users, 1);

    // one write attempt, rejected by the version check
    assert_eq!(t.license_remote.write_count(), writes + 1);
    let after: serde_json::Value =
        serde_json::from_slice(&t.license_remote.contents().unwrap()).unwrap();
    assert_eq!(after["licenses"][0]["currentUsers"], 1);
}

#[tokio::test]
async fn test_usage_never_goes_negative() {
    let t = setup();
    let licenses = &t.stores.licenses;
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;

    let up = db::licenses::increment_usage(licenses, &license.license_key)
        .await
        .unwrap();
    assert_eq!(up.current_users, 1);
    db::licenses::decrement_usage(licenses, &license.license_key)
        .await
        .unwrap();
    let floor = db::licenses::decrement_usage(licenses, &license.license_key)
        .await
        .unwrap();
    assert_eq!(floor.current_users, 0);

    let err = db::licenses::increment_usage(licenses, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_hwid_lock_and_unlock() {
    let t = setup();
    let licenses = &t.stores.licenses;
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;
    let key = license.license_key.as_str();

    let locked = db::licenses::lock_hwid(licenses, &license.id, "HW-A")
        .await
        .unwrap();
    assert!(locked.hwid_lock_enabled);
    assert_eq!(locked.hwid.as_deref(), Some("HW-A"));

    let mismatch = db::licenses::validate_license(licenses, key, None, Some("HW-B"))
        .await
        .unwrap();
    assert_eq!(mismatch.reason, Some(InvalidReason::HardwareMismatch));
    let matching = db::licenses::validate_license(licenses, key, None, Some("HW-A"))
        .await
        .unwrap();
    assert!(matching.valid);

    let reset = db::licenses::reset_hwid(licenses, &license.id).await.unwrap();
    assert!(reset.hwid.is_none());
    assert!(reset.hwid_lock_enabled);
    let any = db::licenses::validate_license(licenses, key, None, Some("HW-B"))
        .await
        .unwrap();
    assert!(any.valid);

    db::licenses::lock_hwid(licenses, &license.id, "HW-C")
        .await
        .unwrap();
    let unlocked = db::licenses::update_license(
        licenses,
        &license.id,
        &UpdateLicense {
            hwid_lock_enabled: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(!unlocked.hwid_lock_enabled);
    assert!(unlocked.hwid.is_none());

    let unlocked = db::licenses::unlock_hwid(licenses, &license.id).await.unwrap();
    assert!(!unlocked.hwid_lock_enabled);
}

#[tokio::test]
async fn test_snapshot_is_stale_until_resync() {
    let t = setup();
    let general = &t.stores.general;
    let licenses = &t.stores.licenses;
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;
    let key = license.license_key.as_str();

    let app_id = app.id.clone();
    general
        .transact("rotate api key", |doc| {
            if let Some(app) = doc.applications.iter_mut().find(|a| a.id == app_id) {
                app.api_key = "rotated-api-key".into();
            }
            Ok(Outcome::Commit(()))
        })
        .await
        .unwrap();

    // validation only consults the embedded copy
    let old = db::licenses::validate_license_with_api_key(licenses, &app.api_key, key, None)
        .await
        .unwrap();
    assert!(old.valid);
    let new = db::licenses::validate_license_with_api_key(licenses, "rotated-api-key", key, None)
        .await
        .unwrap();
    assert_eq!(new.reason, Some(InvalidReason::InvalidCredentials));

    let rotated = db::applications::get_application(general, &app.id)
        .await
        .unwrap()
        .unwrap();
    let updated = db::licenses::resync_application_snapshot(licenses, &rotated)
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let new = db::licenses::validate_license_with_api_key(licenses, "rotated-api-key", key, None)
        .await
        .unwrap();
    assert!(new.valid);

    // nothing left to change
    let writes = t.license_remote.write_count();
    assert_eq!(
        db::licenses::resync_application_snapshot(licenses, &rotated)
            .await
            .unwrap(),
        0
    );
    assert_eq!(t.license_remote.write_count(), writes);
}

#[tokio::test]
async fn test_inactive_application_reported_after_resync() {
    let t = setup();
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;

    let inactive = db::applications::set_active(&t.stores.general, &app.id, false)
        .await
        .unwrap();
    db::licenses::resync_application_snapshot(&t.stores.licenses, &inactive)
        .await
        .unwrap();

    let result = db::licenses::validate_license_with_api_key(
        &t.stores.licenses,
        &app.api_key,
        &license.license_key,
        None,
    )
    .await
    .unwrap();
    assert_eq!(result.reason, Some(InvalidReason::ApplicationInactive));
    assert!(result.license.is_some());
}

#[tokio::test]
async fn test_legacy_license_blocks_only_its_own_writes() {
    let legacy = r#"{
        "licenses": [
            {"id": 17, "licenseKey": "LEGACY-KEY", "applicationId": "app-legacy",
             "expiresAt": "2099-01-01T00:00:00.000Z"}
        ]
    }"#;
    let t = setup_with(MemoryRemote::new(), MemoryRemote::with_content(legacy));
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;

    // still readable
    let found = db::licenses::get_license_by_key(&t.stores.licenses, "LEGACY-KEY")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, "17");
    assert!(found.application_data.is_none());

    // other licenses can still be written
    create_test_license(&t.stores, &app).await;

    // changing the legacy license itself needs a snapshot first
    let err = db::licenses::increment_usage(&t.stores.licenses, "LEGACY-KEY")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Invariant(_)));

    let mut legacy_app = app.clone();
    legacy_app.id = "app-legacy".into();
    let repaired = db::licenses::resync_application_snapshot(&t.stores.licenses, &legacy_app)
        .await
        .unwrap();
    assert_eq!(repaired, 1);

    let bumped = db::licenses::increment_usage(&t.stores.licenses, "LEGACY-KEY")
        .await
        .unwrap();
    assert_eq!(bumped.current_users, 1);

    let all = db::licenses::list_licenses(&t.stores.licenses).await.unwrap();
    assert_eq!(all.len(), 2);
    let for_app = db::licenses::list_licenses_for_application(&t.stores.licenses, &app.id)
        .await
        .unwrap();
    assert_eq!(for_app.len(), 1);
}

#[tokio::test]
async fn test_legacy_licenses_of_several_applications_resync() {
    let legacy = r#"{
        "licenses": [
            {"id": "l1", "licenseKey": "KEY-ONE", "applicationId": "app-1",
             "expiresAt": "2099-01-01T00:00:00.000Z"},
            {"id": "l2", "licenseKey": "KEY-TWO", "applicationId": "app-2",
             "expiresAt": "2099-01-01T00:00:00.000Z"},
            {"id": "l3", "licenseKey": "KEY-GONE", "applicationId": "app-deleted",
             "expiresAt": "2099-01-01T00:00:00.000Z"}
        ]
    }"#;
    let t = setup_with(MemoryRemote::new(), MemoryRemote::with_content(legacy));
    let mut first = create_test_app(&t.stores, "owner@example.com", "One").await;
    first.id = "app-1".into();
    let mut second = create_test_app(&t.stores, "owner@example.com", "Two").await;
    second.id = "app-2".into();

    let repaired = db::licenses::resync_application_snapshot(&t.stores.licenses, &first)
        .await
        .unwrap();
    assert_eq!(repaired, 1);
    let repaired = db::licenses::resync_application_snapshot(&t.stores.licenses, &second)
        .await
        .unwrap();
    assert_eq!(repaired, 1);

    let all = db::licenses::list_licenses(&t.stores.licenses).await.unwrap();
    let with_snapshot: Vec<_> = all
        .iter()
        .filter(|l| l.application_data.is_some())
        .map(|l| l.id.as_str())
        .collect();
    assert_eq!(with_snapshot, vec!["l1", "l2"]);
    assert_eq!(
        all[1].application_data.as_ref().map(|s| s.name.as_str()),
        Some("Two")
    );
}

#[tokio::test]
async fn test_resync_all_snapshots_in_one_write() {
    let legacy = r#"{
        "licenses": [
            {"id": "l1", "licenseKey": "KEY-ONE", "applicationId": "app-1",
             "expiresAt": "2099-01-01T00:00:00.000Z"},
            {"id": "l2", "licenseKey": "KEY-TWO", "applicationId": "app-2",
             "expiresAt": "2099-01-01T00:00:00.000Z"}
        ]
    }"#;
    let t = setup_with(MemoryRemote::new(), MemoryRemote::with_content(legacy));
    let mut first = create_test_app(&t.stores, "owner@example.com", "One").await;
    first.id = "app-1".into();
    let mut second = create_test_app(&t.stores, "owner@example.com", "Two").await;
    second.id = "app-2".into();

    let updated = db::licenses::resync_all_snapshots(&t.stores.licenses, &[first, second])
        .await
        .unwrap();
    assert_eq!(updated, 2);
    assert_eq!(t.license_remote.write_count(), 1);

    let again = db::licenses::resync_all_snapshots(&t.stores.licenses, &[])
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(t.license_remote.write_count(), 1);
}

#[tokio::test]
async fn test_delete_license() {
    let t = setup();
    let app = create_test_app(&t.stores, "owner@example.com", "Loader").await;
    let license = create_test_license(&t.stores, &app).await;

    db::licenses::delete_license(&t.stores.licenses, &license.id)
        .await
        .unwrap();
    assert!(
        db::licenses::get_license(&t.stores.licenses, &license.id)
            .await
            .unwrap()
            .is_none()
    );
    let err = db::licenses::delete_license(&t.stores.licenses, &license.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}
