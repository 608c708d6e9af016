use std::sync::Arc;
use std::time::Duration;

use notiprefs::config::DatabaseConfig;
use notiprefs::database::{self, Database};
use notiprefs::{Channel, ChannelSet, Error, PgStore, PreferenceResolver, Repository, Role};

/// Connects and migrates when `DATABASE_URL` is set; `None` skips the test.
async fn connect() -> Option<PgStore> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = DatabaseConfig {
        url,
        max_connections: 5,
        min_connections: 1,
        connect_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(60),
        max_lifetime: Duration::from_secs(300),
        statement_cache_size: 10,
    };

    let db = Database::new(&config).await.unwrap();
    database::run_migrations(db.pool()).await.unwrap();
    Some(PgStore::new(db.pool().clone()))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

#[tokio::test]
async fn pg_resolver_end_to_end() {
    let Some(store) = connect().await else {
        return;
    };

    let org = store.create_organization(&unique("org")).await.unwrap();
    let user = store
        .create_user(&format!("{}@example.io", unique("u")), &org.id, Role::Customer)
        .await
        .unwrap();
    let group = store.create_group("billing", &org.id).await.unwrap();
    let topic = store.create_topic("invoices", &group.id).await.unwrap();

    let email = Channel::from("EMAIL");
    let sms = Channel::from("SMS");
    store
        .upsert_topic_pref(&user.id, &topic.id, &email, true)
        .await
        .unwrap();

    let resolver = PreferenceResolver::new(Arc::new(store.clone()), ChannelSet::default());
    assert!(resolver
        .is_notification_allowed(&user.id, &topic.id, &email)
        .await
        .unwrap()
        .allowed);
    assert!(!resolver
        .is_notification_allowed(&user.id, &topic.id, &sms)
        .await
        .unwrap()
        .allowed);

    // Upsert overwrites the same key
    store
        .upsert_group_pref(&user.id, &group.id, false)
        .await
        .unwrap();
    let pref = store
        .upsert_group_pref(&user.id, &group.id, false)
        .await
        .unwrap();
    assert!(!pref.enabled);
    assert_eq!(store.list_group_prefs(&user.id).await.unwrap().len(), 1);

    assert!(!resolver
        .is_notification_allowed(&user.id, &topic.id, &email)
        .await
        .unwrap()
        .allowed);
}

#[tokio::test]
async fn pg_unique_names_conflict() {
    let Some(store) = connect().await else {
        return;
    };

    let name = unique("org");
    store.create_organization(&name).await.unwrap();
    let duplicate = store.create_organization(&name).await;
    assert!(matches!(duplicate, Err(Error::Conflict { .. })));
}
