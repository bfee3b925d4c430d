use std::time::Duration as StdDuration;

use authstore::cache::CachePolicy;
use authstore::config::{Config, DEFAULT_API_URL};
use authstore::db;
use authstore::error::AppError;
use authstore::models::{
    ACTIVITY_LOG_CAP, BlacklistType, CreateActivityLog, CreateBlacklistEntry, CreateSession,
    CreateUserWithCredentials, CreateWebhook, CustomMessages, UpdateBlacklistEntry,
    UpdateCustomMessages, UpdateUser, UpdateWebhook, UpsertUser,
};
use authstore::remote::{MemoryRemote, RetryPolicy};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use crate::common::*;

fn config_with_admin(email: Option<&str>, password: Option<&str>) -> Config {
    Config {
        github_token: None,
        github_owner: None,
        github_repo: None,
        api_url: DEFAULT_API_URL.to_string(),
        data_file: "data.json".into(),
        license_file: "License.json".into(),
        production: false,
        cache_policy: CachePolicy::with_ttl(StdDuration::from_secs(60)),
        retry_policy: RetryPolicy::immediate(1),
        conflict_retries: 3,
        bootstrap_admin_email: email.map(String::from),
        bootstrap_admin_password: password.map(String::from),
    }
}

#[tokio::test]
async fn test_upsert_user_merges_fields() {
    let t = setup();
    let general = &t.stores.general;

    let created = db::users::upsert_user(
        general,
        &UpsertUser {
            email: Some("ada@example.com".into()),
            first_name: Some("Ada".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(created.id, "ada@example.com");
    assert_eq!(created.role, "user");
    assert!(created.is_active);

    let merged = db::users::upsert_user(
        general,
        &UpsertUser {
            id: Some("ada@example.com".into()),
            last_name: Some("Lovelace".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(merged.first_name, "Ada");
    assert_eq!(merged.last_name, "Lovelace");
    assert_eq!(db::users::list_users(general).await.unwrap().len(), 1);

    let err = db::users::upsert_user(general, &UpsertUser::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_credentials_and_authentication() {
    let t = setup();
    let general = &t.stores.general;
    let input = CreateUserWithCredentials {
        email: "admin@example.com".into(),
        password: "correct horse".into(),
        role: Some("admin".into()),
        first_name: None,
        last_name: None,
        permissions: None,
        is_active: None,
    };
    let user = db::users::create_user_with_credentials(general, &input)
        .await
        .unwrap();
    assert!(user.is_admin());
    assert!(user.password_hash.is_some());

    let ok = db::users::authenticate_user(general, "ADMIN@example.com", "correct horse")
        .await
        .unwrap();
    assert_eq!(ok.map(|u| u.id), Some("admin@example.com".to_string()));
    assert!(
        db::users::authenticate_user(general, "admin@example.com", "wrong")
            .await
            .unwrap()
            .is_none()
    );

    db::users::set_user_password(general, &user.id, "battery staple")
        .await
        .unwrap();
    assert!(
        db::users::authenticate_user(general, "admin@example.com", "battery staple")
            .await
            .unwrap()
            .is_some()
    );

    db::users::update_user(
        general,
        &user.id,
        &UpdateUser {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(
        db::users::authenticate_user(general, "admin@example.com", "battery staple")
            .await
            .unwrap()
            .is_none()
    );

    // the hash never leaves the process
    let stored: serde_json::Value =
        serde_json::from_slice(&t.general_remote.contents().unwrap()).unwrap();
    assert!(stored["users"][0].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_user_without_password_cannot_log_in() {
    let t = setup();
    let general = &t.stores.general;
    db::users::upsert_user(
        general,
        &UpsertUser {
            email: Some("oauth@example.com".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(
        db::users::authenticate_user(general, "oauth@example.com", "")
            .await
            .unwrap()
            .is_none()
    );

    db::users::delete_user(general, "oauth@example.com")
        .await
        .unwrap();
    assert!(
        db::users::get_user(general, "oauth@example.com")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_user_with_bcrypt_hash_can_log_in() {
    let t = setup_with(
        MemoryRemote::with_content(
            r#"{"users": [{
                "id": "legacy@example.com",
                "email": "legacy@example.com",
                "passwordHash": "$2a$05$CCCCCCCCCCCCCCCCCCCCC.E5YPO9kmyuRGyh0XouQYb4YMJKvyOeW"
            }]}"#,
        ),
        MemoryRemote::new(),
    );
    let general = &t.stores.general;

    let user = db::users::authenticate_user(general, "legacy@example.com", "U*U")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.id, "legacy@example.com");
    assert!(
        db::users::authenticate_user(general, "legacy@example.com", "wrong")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_bootstrap_admin_created_once() {
    let t = setup();
    let general = &t.stores.general;

    let none = db::users::ensure_bootstrap_user(general, &config_with_admin(None, None))
        .await
        .unwrap();
    assert!(none.is_none());
    assert_eq!(t.general_remote.write_count(), 0);

    let config = config_with_admin(Some("root@example.com"), Some("changeme"));
    let created = db::users::ensure_bootstrap_user(general, &config)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.role, "admin");

    let again = db::users::ensure_bootstrap_user(general, &config)
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(t.general_remote.write_count(), 1);
}

#[tokio::test]
async fn test_blacklist_scoping() {
    let t = setup();
    let general = &t.stores.general;

    let scoped = db::blacklist::create_entry(
        general,
        &CreateBlacklistEntry {
            application_id: Some("app-1".into()),
            kind: BlacklistType::Ip,
            value: " 203.0.113.9 ".into(),
            reason: Some("abuse".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(scoped.value, "203.0.113.9");
    db::blacklist::create_entry(
        general,
        &CreateBlacklistEntry {
            application_id: None,
            kind: BlacklistType::Username,
            value: "mallory".into(),
            reason: None,
        },
    )
    .await
    .unwrap();

    let blocked = db::blacklist::check(general, "app-1", BlacklistType::Ip, "203.0.113.9")
        .await
        .unwrap();
    assert_eq!(blocked.map(|e| e.id), Some(scoped.id.clone()));
    let elsewhere = db::blacklist::check(general, "app-2", BlacklistType::Ip, "203.0.113.9")
        .await
        .unwrap();
    assert!(elsewhere.is_none());
    let global = db::blacklist::check(general, "app-2", BlacklistType::Username, "mallory")
        .await
        .unwrap();
    assert!(global.is_some_and(|e| e.is_global()));

    let updated = db::blacklist::update_entry(
        general,
        &scoped.id,
        &UpdateBlacklistEntry {
            reason: Some(None),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(updated.reason.is_none());

    let writes = t.general_remote.write_count();
    let err = db::blacklist::update_entry(
        general,
        &scoped.id,
        &UpdateBlacklistEntry {
            value: Some("   ".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(t.general_remote.write_count(), writes);

    let renamed = db::blacklist::update_entry(
        general,
        &scoped.id,
        &UpdateBlacklistEntry {
            value: Some("  10.0.0.9 ".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.value, "10.0.0.9");

    db::blacklist::delete_entry(general, &scoped.id).await.unwrap();
    assert_eq!(db::blacklist::list_entries(general).await.unwrap().len(), 1);
    assert!(db::blacklist::get_entry(general, &scoped.id).await.unwrap().is_none());

    let err = db::blacklist::create_entry(
        general,
        &CreateBlacklistEntry {
            application_id: None,
            kind: BlacklistType::Hwid,
            value: "  ".into(),
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_activity_log_capped_per_application() {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut logs: Vec<serde_json::Value> = (0..ACTIVITY_LOG_CAP)
        .map(|i| {
            json!({
                "id": format!("old-{}", i),
                "applicationId": "app-1",
                "event": "login",
                "success": true,
                "createdAt": base + Duration::minutes(i as i64),
            })
        })
        .collect();
    logs.push(json!({
        "id": "other-app",
        "applicationId": "app-2",
        "event": "login",
        "success": false,
        "createdAt": base,
    }));
    let seeded = json!({ "activityLogs": logs }).to_string();
    let t = setup_with(MemoryRemote::with_content(seeded), MemoryRemote::new());
    let general = &t.stores.general;

    let newest = db::activity::create_log(
        general,
        &CreateActivityLog {
            application_id: "app-1".into(),
            app_user_id: Some("u1".into()),
            event: "logout".into(),
            success: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let app1 = db::activity::list_for_application(general, "app-1", None)
        .await
        .unwrap();
    assert_eq!(app1.len(), ACTIVITY_LOG_CAP);
    assert_eq!(app1[0].id, newest.id);
    assert!(app1.iter().all(|l| l.id != "old-0"));

    let limited = db::activity::list_for_application(general, "app-1", Some(5))
        .await
        .unwrap();
    assert_eq!(limited.len(), 5);

    let app2 = db::activity::list_for_application(general, "app-2", None)
        .await
        .unwrap();
    assert_eq!(app2.len(), 1);

    let mine = db::activity::list_for_app_user(general, "u1").await.unwrap();
    assert_eq!(mine.len(), 1);
    assert!(db::activity::get_log(general, "old-1").await.unwrap().is_some());

    // pruning keeps the stored append order
    let stored: serde_json::Value =
        serde_json::from_slice(&t.general_remote.contents().unwrap()).unwrap();
    let ids: Vec<_> = stored["activityLogs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), ACTIVITY_LOG_CAP + 1);
    assert_eq!(ids[0], "old-1");
    assert_eq!(ids[1], "old-2");
    assert_eq!(ids[ACTIVITY_LOG_CAP - 1], "other-app");
    assert_eq!(ids[ACTIVITY_LOG_CAP], newest.id);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let t = setup();
    let general = &t.stores.general;

    let session = db::sessions::create_session(
        general,
        &CreateSession {
            application_id: "app-1".into(),
            app_user_id: "u1".into(),
            ip_address: Some("198.51.100.1".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(session.session_token.len(), 64);
    let hours = (session.expires_at - session.created_at).num_hours();
    assert_eq!(hours, 24);

    let expired = db::sessions::create_session(
        general,
        &CreateSession {
            application_id: "app-1".into(),
            app_user_id: "u2".into(),
            expires_at: Some(Utc::now() - Duration::minutes(1)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let duplicate = db::sessions::create_session(
        general,
        &CreateSession {
            application_id: "app-1".into(),
            app_user_id: "u3".into(),
            session_token: Some(session.session_token.clone()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(duplicate, AppError::BadRequest(_)));

    let live = db::sessions::list_active(general, "app-1").await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, session.id);

    let touched = db::sessions::touch_session(general, &session.session_token)
        .await
        .unwrap();
    assert!(touched.updated_at >= session.updated_at);

    let ended = db::sessions::end_session(general, &session.session_token)
        .await
        .unwrap();
    assert!(!ended.is_active);
    let writes = t.general_remote.write_count();
    db::sessions::end_session(general, &session.session_token)
        .await
        .unwrap();
    assert_eq!(t.general_remote.write_count(), writes);

    let pruned = db::sessions::prune_sessions(general, "app-1").await.unwrap();
    assert_eq!(pruned, 2);
    assert!(
        db::sessions::get_session(general, &expired.session_token)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(db::sessions::prune_sessions(general, "app-1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_custom_messages() {
    let t = setup();
    let general = &t.stores.general;

    assert_eq!(
        db::messages::get_custom_messages(general).await.unwrap(),
        CustomMessages::default()
    );
    let updated = db::messages::update_custom_messages(
        general,
        &UpdateCustomMessages {
            login_success: Some("Welcome!".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.login_success, "Welcome!");
    assert_eq!(updated.login_failed, CustomMessages::default().login_failed);

    let reset = db::messages::reset_custom_messages(general).await.unwrap();
    assert_eq!(reset, CustomMessages::default());
}

#[tokio::test]
async fn test_webhooks_for_event() {
    let t = setup();
    let general = &t.stores.general;
    let owner = "owner@example.com";

    let all = db::webhooks::create_webhook(
        general,
        owner,
        &CreateWebhook {
            url: "https://hooks.example.com/all".into(),
            events: vec![],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let logins = db::webhooks::create_webhook(
        general,
        owner,
        &CreateWebhook {
            url: "https://hooks.example.com/logins".into(),
            events: vec!["user.login".into()],
            secret: Some("s3cret".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    db::webhooks::create_webhook(
        general,
        "someone@else.io",
        &CreateWebhook {
            url: "https://hooks.example.com/theirs".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let err = db::webhooks::create_webhook(
        general,
        owner,
        &CreateWebhook {
            url: "ftp://hooks.example.com".into(),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let hooks = db::webhooks::webhooks_for_event(general, owner, "user.login")
        .await
        .unwrap();
    assert_eq!(hooks.len(), 2);
    let hooks = db::webhooks::webhooks_for_event(general, owner, "license.created")
        .await
        .unwrap();
    assert_eq!(hooks.len(), 1);
    assert_eq!(hooks[0].id, all.id);

    db::webhooks::update_webhook(
        general,
        &all.id,
        &UpdateWebhook {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let hooks = db::webhooks::webhooks_for_event(general, owner, "license.created")
        .await
        .unwrap();
    assert!(hooks.is_empty());

    db::webhooks::delete_webhook(general, &logins.id).await.unwrap();
    assert_eq!(db::webhooks::list_webhooks(general, owner).await.unwrap().len(), 1);
    assert!(db::webhooks::get_webhook(general, &logins.id).await.unwrap().is_none());
}
