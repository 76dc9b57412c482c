//! Integration tests for the token manager
//!
//! Exercises refresh single-flight under contention and persistence through
//! the file-backed store.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use nimbus_common::auth::{
    CachedTokenStore, FileTokenStore, MemoryTokenStore, Token, TokenManager, TokenStore,
};
use nimbus_common::testing::MockTokenIssuer;
use tokio_util::sync::CancellationToken;

const BUFFER: Duration = Duration::from_secs(300);

/// Validates that concurrent callers trigger exactly one issuance.
///
/// # Test Steps
/// 1. Start with an empty store and a slow issuer
/// 2. Call `get_token` from 16 tasks at once
/// 3. Verify every caller received the same token
/// 4. Confirm the issuer was called once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_issues_once() {
    let issuer =
        Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)).with_delay(Duration::from_millis(50)));
    let manager =
        Arc::new(TokenManager::new(issuer.clone(), Arc::new(MemoryTokenStore::new()), BUFFER));

    let calls = (0..16).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get_token(&CancellationToken::new()).await })
    });

    for result in join_all(calls).await {
        assert_eq!(result.unwrap().unwrap(), "token-1");
    }
    assert_eq!(issuer.call_count(), 1);
    assert_eq!(manager.generation(), 1);
}

/// Validates that a token inside the refresh buffer is refreshed once, no
/// matter how many callers notice at the same time.
///
/// # Test Steps
/// 1. Obtain a token that expires within the buffer
/// 2. Call `get_token` from 16 tasks at once
/// 3. Verify every caller observed the refreshed token
/// 4. Confirm exactly one additional issuance happened
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_is_single_flight() {
    let issuer =
        Arc::new(MockTokenIssuer::new(Duration::from_secs(60)).with_delay(Duration::from_millis(50)));
    let manager =
        Arc::new(TokenManager::new(issuer.clone(), Arc::new(MemoryTokenStore::new()), BUFFER));
    manager.obtain_token(&CancellationToken::new()).await.unwrap();
    issuer.set_lifetime(Duration::from_secs(3600));

    let calls = (0..16).map(|_| {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get_token(&CancellationToken::new()).await })
    });

    for result in join_all(calls).await {
        assert_eq!(result.unwrap().unwrap(), "token-2");
    }
    assert_eq!(issuer.call_count(), 2);

    let remaining = manager.remaining().unwrap();
    assert!(remaining >= BUFFER, "token returned inside the buffer: {remaining:?}");
}

/// Validates that a second manager sharing the file store adopts the
/// persisted token instead of issuing a new one.
#[tokio::test]
async fn test_file_store_shares_token_between_managers() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();

    let first_issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
    let first = TokenManager::new(
        first_issuer.clone(),
        Arc::new(FileTokenStore::new(dir.path(), "client-a")),
        BUFFER,
    );
    assert_eq!(first.get_token(&cancel).await.unwrap(), "token-1");

    let second_issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
    let store = CachedTokenStore::new(Arc::new(FileTokenStore::new(dir.path(), "client-a")));
    let second = TokenManager::new(second_issuer.clone(), Arc::new(store), BUFFER);

    assert_eq!(second.get_token(&cancel).await.unwrap(), "token-1");
    assert_eq!(second_issuer.call_count(), 0);
}

/// Validates that an expired persisted token is replaced and overwritten.
#[tokio::test]
async fn test_expired_persisted_token_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path(), "client-b"));
    store.save_token(&Token::bearer("old", Duration::from_secs(10))).await.unwrap();

    let issuer = Arc::new(MockTokenIssuer::new(Duration::from_secs(3600)));
    let manager = TokenManager::new(issuer.clone(), store.clone(), BUFFER);

    assert_eq!(manager.get_token(&CancellationToken::new()).await.unwrap(), "token-1");
    let persisted = store.fetch_token().await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "token-1");
}

/// Validates that a manager whose cached token went stale adopts the token a
/// peer renewed on disk instead of issuing its own.
///
/// # Test Steps
/// 1. Manager A issues a short-lived token to the shared file
/// 2. Manager B, behind its own cache, adopts it
/// 3. Wait until the token is inside the refresh buffer
/// 4. A renews the token; B asks for a token
/// 5. Verify B returns A's renewed token and never called its issuer
#[tokio::test]
async fn test_stale_cached_token_adopts_peer_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let lifetime = Duration::from_secs(2);
    let buffer = Duration::from_secs(1);

    let shared = |dir: &std::path::Path| {
        Arc::new(CachedTokenStore::new(Arc::new(FileTokenStore::new(dir, "client-c"))))
    };

    let issuer_a = Arc::new(MockTokenIssuer::new(lifetime));
    let manager_a = TokenManager::new(issuer_a.clone(), shared(dir.path()), buffer);
    let issuer_b = Arc::new(MockTokenIssuer::new(lifetime));
    let manager_b = TokenManager::new(issuer_b.clone(), shared(dir.path()), buffer);

    assert_eq!(manager_a.obtain_token(&cancel).await.unwrap().access_token, "token-1");
    assert_eq!(manager_b.get_token(&cancel).await.unwrap(), "token-1");

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(manager_a.get_token(&cancel).await.unwrap(), "token-2");
    assert_eq!(manager_b.get_token(&cancel).await.unwrap(), "token-2");
    assert_eq!(issuer_a.call_count(), 2);
    assert_eq!(issuer_b.call_count(), 0);
    assert_eq!(manager_b.generation(), 0);
}
