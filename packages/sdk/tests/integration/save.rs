use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ::common::storage::memory::MemoryBlobStore;
use cumulus_sdk::config::RetryConfig;
use cumulus_sdk::{FileStore, OwnershipLevel, Scope, SdkError, User, UserId};

use crate::common::{TestClient, app_file, user_file};

mod default_store {
    use super::*;

    #[tokio::test]
    async fn save_without_store_goes_to_default_and_calls_back_once() {
        let t = TestClient::new();
        let file = app_file(b"abc", "test.txt");
        assert!(file.store().is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        file.save(&t.client)
            .on_complete(move |result| {
                assert!(result.is_ok());
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        // Give a stray second invocation a chance to show up.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let default_store = t.client.default_store();
        assert_eq!(file.store().map(|s| s.id()), Some(default_store.id()));
        assert!(default_store.contains(file.id()));

        let stored = default_store.download(&Scope::App, "test.txt").await.unwrap();
        assert_eq!(stored.content, b"abc");
        assert_eq!(stored.object.mime_type, "text/plain");
    }

    #[tokio::test]
    async fn save_uses_assigned_store_instead_of_default() {
        let t = TestClient::new();
        let other = t.store();
        let file = app_file(b"elsewhere", "e.bin");
        file.set_store(other.clone()).unwrap();

        let receipt = file.save(&t.client).await.unwrap();
        assert_eq!(receipt.store_id, other.id());
        assert!(other.download(&Scope::App, "e.bin").await.is_ok());
        assert!(matches!(
            t.client.default_store().download(&Scope::App, "e.bin").await,
            Err(SdkError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn receipt_describes_the_upload() {
        let t = TestClient::new();
        let file = app_file(b"0123456789", "digits.json");
        let receipt = file.save(&t.client).await.unwrap();

        assert_eq!(receipt.scope, Scope::App);
        assert_eq!(receipt.name, "digits.json");
        assert_eq!(receipt.size, 10);
        assert_eq!(receipt.content_hash, file.content_hash());
        assert_eq!(receipt.mime_type, "application/json");
    }
}

mod ownership {
    use super::*;

    #[tokio::test]
    async fn anonymous_file_stays_app_level_after_save() {
        let t = TestClient::new();
        let file = app_file(b"a", "a.txt");
        assert!(!file.is_user_level());

        file.save(&t.client).await.unwrap();
        assert_eq!(file.ownership_level(), OwnershipLevel::AppLevel);
        assert!(!file.is_user_level());
    }

    #[tokio::test]
    async fn save_with_user_makes_file_user_level_for_good() {
        let t = TestClient::new();
        let file = app_file(b"u", "u.txt");
        let user = User::new("u-1");

        let receipt = file.save_with_user(&t.client, &user).await.unwrap();
        assert_eq!(receipt.scope, Scope::User(UserId::new("u-1")));
        assert!(file.is_user_level());
        assert_eq!(file.owner(), Some(user.clone()));

        file.save_with_user(&t.client, &user).await.unwrap();
        assert!(file.is_user_level());
    }

    #[tokio::test]
    async fn user_save_after_app_save_is_a_conflict() {
        let t = TestClient::new();
        let file = app_file(b"a", "a.txt");
        file.save(&t.client).await.unwrap();

        let err = file
            .save_with_user(&t.client, &User::new("u-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SdkError::ScopeConflict {
                current: OwnershipLevel::AppLevel,
                requested: Scope::User(_),
            }
        ));
        assert_eq!(file.ownership_level(), OwnershipLevel::AppLevel);
        assert!(file.owner().is_none());
        assert!(
            t.client
                .default_store()
                .list(&Scope::User(UserId::new("u-1")))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn app_save_after_user_save_is_a_conflict() {
        let t = TestClient::new();
        let file = user_file(b"u", "u.txt", "u-1");
        file.save_with_user(&t.client, &User::new("u-1"))
            .await
            .unwrap();

        let err = file.save(&t.client).await.unwrap_err();
        assert!(matches!(
            err,
            SdkError::ScopeConflict {
                current: OwnershipLevel::UserLevel,
                requested: Scope::App,
            }
        ));
        assert!(file.is_user_level());
    }

    #[tokio::test]
    async fn owned_file_cannot_be_saved_at_app_scope_even_before_attach() {
        let t = TestClient::new();
        let file = user_file(b"u", "u.txt", "u-1");

        let err = file.save(&t.client).await.unwrap_err();
        assert!(matches!(err, SdkError::ScopeConflict { .. }));
        assert_eq!(file.ownership_level(), OwnershipLevel::Unknown);
        assert!(file.store().is_none());
    }

    #[tokio::test]
    async fn saving_for_another_user_is_a_conflict() {
        let t = TestClient::new();
        let file = app_file(b"u", "u.txt");
        file.save_with_user(&t.client, &User::new("u-1"))
            .await
            .unwrap();

        let err = file
            .save_with_user(&t.client, &User::new("u-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::ScopeConflict { .. }));
        assert_eq!(file.owner().map(|u| u.id().clone()), Some(UserId::new("u-1")));
    }

    #[tokio::test]
    async fn conflict_callback_runs_once() {
        let t = TestClient::new();
        let file = app_file(b"a", "a.txt");
        file.save(&t.client).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        file.save_with_user(&t.client, &User::new("u-1"))
            .on_complete(move |result| {
                assert!(matches!(result, Err(SdkError::ScopeConflict { .. })));
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_app_and_user_saves_settle_on_one_scope() {
        for round in 0..20 {
            let t = TestClient::new();
            let file = app_file(b"race", "race.txt");
            let user = User::new("u-1");

            let (app, usr) = tokio::join!(file.save(&t.client), file.save_with_user(&t.client, &user));

            match (app, usr) {
                (Ok(_), Err(SdkError::ScopeConflict { .. })) => {
                    assert_eq!(file.ownership_level(), OwnershipLevel::AppLevel, "round {round}");
                }
                (Err(SdkError::ScopeConflict { .. }), Ok(_)) => {
                    assert_eq!(file.ownership_level(), OwnershipLevel::UserLevel, "round {round}");
                }
                other => panic!("round {round}: unexpected outcome {other:?}"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn saves_of_one_file_are_serialized() {
        let t = TestClient::new();
        let file = app_file(b"same", "same.txt");

        let tickets: Vec<_> = (0..8).map(|_| file.save(&t.client)).collect();
        for result in futures::future::join_all(tickets).await {
            result.unwrap();
        }

        let listed = t.client.list_files(&Scope::App).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "same.txt");
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.fail_next_puts(2);
        let t = TestClient::with_blobs(blobs.clone(), RetryConfig::immediate(3));

        let file = app_file(b"flaky", "flaky.txt");
        file.save(&t.client).await.unwrap();
        assert_eq!(blobs.put_calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_network_error() {
        let blobs = Arc::new(MemoryBlobStore::new());
        blobs.fail_next_puts(10);
        let t = TestClient::with_blobs(blobs.clone(), RetryConfig::immediate(2));

        let file = app_file(b"down", "down.txt");
        match file.save(&t.client).await {
            Err(SdkError::Network {
                attempts, history, ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(history.len(), 3);
            }
            other => panic!("expected network error, got {other:?}"),
        }
        assert!(file.last_receipt().is_none());
        // Failed uploads still leave the file attached at app level.
        assert_eq!(file.ownership_level(), OwnershipLevel::AppLevel);
    }

    #[tokio::test]
    async fn oversized_content_is_rejected_by_the_store() {
        let t = TestClient::new();
        let store = t
            .client
            .create_store(Arc::new(MemoryBlobStore::with_max_size(4)));
        let file = app_file(b"too large", "big.bin");
        file.set_store(store).unwrap();

        assert!(matches!(
            file.save(&t.client).await,
            Err(SdkError::Remote(_))
        ));
    }
}
