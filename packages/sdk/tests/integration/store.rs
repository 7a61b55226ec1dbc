use std::sync::Arc;

use cumulus_sdk::config::RetryConfig;
use cumulus_sdk::{Client, FileStore, PersistedFile, Scope, SdkConfig, SdkError, User, UserId};

use crate::common::{TestClient, app_file, user_file};

mod scopes {
    use super::*;

    #[tokio::test]
    async fn same_name_is_separate_per_scope() {
        let t = TestClient::new();
        app_file(b"app copy", "shared.txt")
            .save(&t.client)
            .await
            .unwrap();
        user_file(b"user copy", "shared.txt", "u-1")
            .save_with_user(&t.client, &User::new("u-1"))
            .await
            .unwrap();

        let app = t.client.fetch_file(&Scope::App, "shared.txt").await.unwrap();
        let user = t
            .client
            .fetch_file(&Scope::User(UserId::new("u-1")), "shared.txt")
            .await
            .unwrap();
        assert_eq!(app.content(), b"app copy");
        assert_eq!(user.content(), b"user copy");
        assert!(!app.is_user_level());
        assert!(user.is_user_level());
    }

    #[tokio::test]
    async fn listing_is_per_scope_and_sorted() {
        let t = TestClient::new();
        for name in ["b.txt", "a.txt", "c.txt"] {
            app_file(name.as_bytes(), name).save(&t.client).await.unwrap();
        }
        user_file(b"x", "z.txt", "u-9")
            .save_with_user(&t.client, &User::new("u-9"))
            .await
            .unwrap();

        let names: Vec<_> = t
            .client
            .list_files(&Scope::App)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
        assert_eq!(
            t.client
                .list_files(&Scope::User(UserId::new("u-9")))
                .await
                .unwrap()
                .len(),
            1
        );
    }
}

mod updates {
    use super::*;

    #[tokio::test]
    async fn renamed_file_is_saved_under_new_name() {
        let t = TestClient::new();
        let file = app_file(b"body", "old.txt");
        file.save(&t.client).await.unwrap();

        file.set_name("new.txt").unwrap();
        file.save(&t.client).await.unwrap();

        let names: Vec<_> = t
            .client
            .list_files(&Scope::App)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, ["new.txt", "old.txt"]);
    }

    #[tokio::test]
    async fn explicit_mime_type_is_stored() {
        let t = TestClient::new();
        let file = PersistedFile::with_owner(
            b"{}".to_vec(),
            "data",
            User::new("u-1"),
            Some("application/vnd.custom+json".into()),
        )
        .unwrap();
        file.save_with_user(&t.client, &User::new("u-1"))
            .await
            .unwrap();

        let fetched = t
            .client
            .fetch_file(&Scope::User(UserId::new("u-1")), "data")
            .await
            .unwrap();
        assert_eq!(
            fetched.mime_type().as_deref(),
            Some("application/vnd.custom+json")
        );
    }

    #[tokio::test]
    async fn removed_file_can_no_longer_be_fetched() {
        let t = TestClient::new();
        let file = app_file(b"bye", "bye.txt");
        file.save(&t.client).await.unwrap();

        assert!(file.remove(&t.client).await.unwrap());
        assert!(matches!(
            t.client.fetch_file(&Scope::App, "bye.txt").await,
            Err(SdkError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn fetched_file_keeps_its_scope() {
        let t = TestClient::new();
        app_file(b"a", "a.txt").save(&t.client).await.unwrap();

        let fetched = t.client.fetch_file(&Scope::App, "a.txt").await.unwrap();
        assert!(matches!(
            fetched.save_with_user(&t.client, &User::new("u-1")).await,
            Err(SdkError::ScopeConflict { .. })
        ));
        fetched.save(&t.client).await.unwrap();
    }
}

mod persistence {
    use super::*;

    fn config(dir: &std::path::Path) -> SdkConfig {
        let mut config = SdkConfig::default();
        config.store.data_dir = dir.join("store");
        config.cache.root = dir.join("cache");
        config.retry = RetryConfig::immediate(0);
        config
    }

    #[tokio::test]
    async fn filesystem_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let client = Client::open(config(dir.path())).await.unwrap();
            let file = user_file(b"durable", "d.txt", "u-3");
            file.save_with_user(&client, &User::new("u-3"))
                .await
                .unwrap();
        }

        let client = Client::open(config(dir.path())).await.unwrap();
        let fetched = client
            .fetch_file(&Scope::User(UserId::new("u-3")), "d.txt")
            .await
            .unwrap();
        assert_eq!(fetched.content(), b"durable");
        assert!(fetched.is_user_level());
    }

    #[tokio::test]
    async fn size_limit_from_config_applies_to_default_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.store.max_file_size = 3;
        let client = Client::in_memory(config).unwrap();

        assert!(matches!(
            app_file(b"four", "f").save(&client).await,
            Err(SdkError::Remote(_))
        ));
        app_file(b"ok", "g").save(&client).await.unwrap();
    }

    #[tokio::test]
    async fn injected_default_store_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(cumulus_sdk::Store::in_memory(
            Arc::new(cumulus_sdk::Membership::new()),
            RetryConfig::immediate(0),
        ));
        let client = Client::with_default_store(config(dir.path()), store.clone()).unwrap();

        let file = app_file(b"injected", "i.txt");
        let receipt = file.save(&client).await.unwrap();
        assert_eq!(receipt.store_id, store.id());
        assert!(store.contains(file.id()));
        assert!(Arc::ptr_eq(client.membership(), store.membership()));
    }
}
