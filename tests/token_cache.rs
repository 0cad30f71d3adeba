//! Token cache refresh semantics.

use alloy::primitives::U256;
use std::sync::Arc;
use std::time::Duration;
use wallet_sync::tokens::{TokenCache, TokenDescriptor, TokenMetadata, NATIVE_SLUG};
use wallet_sync::wallet::{ChainId, ConnectionManager, WalletError};

mod common;
use common::{MockWallet, OTHER_ACCOUNT, TOKEN_A, TOKEN_B};

fn watched() -> Vec<TokenDescriptor> {
    vec![
        TokenDescriptor::Native,
        TokenDescriptor::contract(TOKEN_A),
        TokenDescriptor::contract(TOKEN_B),
    ]
}

async fn connected() -> (MockWallet, ConnectionManager, TokenCache) {
    let wallet = MockWallet::new();
    let manager = common::manager(&wallet);
    manager.connect(Some(ChainId(1))).await.unwrap();
    let cache = TokenCache::new(manager.clone());
    cache.set_watched_tokens(watched());
    (wallet, manager, cache)
}

#[tokio::test]
async fn test_reset_drops_data() {
    let (_wallet, _manager, cache) = connected().await;
    cache.update_all_balances().await;

    cache.reset_balances();

    for token in watched() {
        let state = cache.balance(&token).unwrap();
        assert!(state.is_loading());
        assert!(state.data().is_none());
    }
}

#[tokio::test]
async fn test_update_all_settles_every_token() {
    let (_wallet, _manager, cache) = connected().await;
    assert!(cache.mark_outdated(&TokenDescriptor::contract(TOKEN_A).slug()));

    cache.update_all_balances().await;

    assert_eq!(cache.balance(&TokenDescriptor::Native).unwrap().data(), Some(&U256::from(5u64)));
    assert_eq!(
        cache.balance(&TokenDescriptor::contract(TOKEN_A)).unwrap().data(),
        Some(&U256::from(1_500_000u64))
    );
    assert!(cache.balances().get().values().all(|s| !s.is_loading()));
    assert!(cache.outdated_tokens().is_empty());
}

#[tokio::test]
async fn test_one_failing_token_does_not_fail_the_rest() {
    let (wallet, _manager, cache) = connected().await;
    let token_a = TokenDescriptor::contract(TOKEN_A);
    wallet.with(|s| {
        s.failing.insert(token_a.slug());
    });

    cache.update_all_balances().await;

    let failed = cache.balance(&token_a).unwrap();
    assert_eq!(failed.error(), Some(&WalletError::Other("timeout".into())));
    assert!(cache.balance(&TokenDescriptor::Native).unwrap().is_success());
    assert!(cache.balance(&TokenDescriptor::contract(TOKEN_B)).unwrap().is_success());

    wallet.with(|s| s.failing.clear());
    cache.update_balance(token_a).await;

    assert_eq!(
        cache.balance(&token_a).unwrap().data(),
        Some(&U256::from(1_500_000u64))
    );
}

#[tokio::test]
async fn test_outdated_refresh_reads_only_flagged_tokens() {
    let (wallet, _manager, cache) = connected().await;
    cache.update_all_balances().await;
    let reads = wallet.balance_reads();

    wallet.with(|s| s.native_balance = U256::from(7u64));
    assert!(cache.mark_outdated(NATIVE_SLUG));
    assert!(!cache.mark_outdated("0x0000000000000000000000000000000000000001"));

    cache.update_outdated_balances().await;

    assert_eq!(wallet.balance_reads(), reads + 1);
    assert!(!cache.is_outdated(NATIVE_SLUG));
    assert_eq!(cache.balance(&TokenDescriptor::Native).unwrap().data(), Some(&U256::from(7u64)));

    // Nothing flagged, nothing read.
    cache.update_outdated_balances().await;
    assert_eq!(wallet.balance_reads(), reads + 1);
}

#[tokio::test]
async fn test_fetch_without_connection() {
    let wallet = MockWallet::new();
    let cache = TokenCache::new(common::manager(&wallet));
    cache.set_watched_tokens(watched());

    cache.update_all_balances().await;

    for token in watched() {
        assert_eq!(
            cache.balance(&token).unwrap().error(),
            Some(&WalletError::NoConnection)
        );
    }
}

#[tokio::test]
async fn test_metadata_for_native_and_contract_tokens() {
    let (_wallet, _manager, cache) = connected().await;

    cache.update_all_metadata().await;

    assert_eq!(
        cache.token_metadata(&TokenDescriptor::Native).unwrap().data(),
        Some(&TokenMetadata::new("Ether", "ETH", 18))
    );
    assert_eq!(
        cache.token_metadata(&TokenDescriptor::contract(TOKEN_A)).unwrap().data(),
        Some(&TokenMetadata::new("Tether USD", "USDT", 6))
    );
}

#[tokio::test]
async fn test_watched_tokens_are_deduplicated() {
    let (_wallet, _manager, cache) = connected().await;

    cache.set_watched_tokens(vec![
        TokenDescriptor::Native,
        TokenDescriptor::contract(TOKEN_A),
        TokenDescriptor::Native,
    ]);

    assert_eq!(cache.tokens().len(), 2);
    assert!(!cache.mark_outdated(&TokenDescriptor::contract(TOKEN_B).slug()));
}

#[tokio::test]
async fn test_contract_handles_reused_per_connection() {
    let (wallet, manager, cache) = connected().await;
    let token_a = TokenDescriptor::contract(TOKEN_A);
    let first = manager.current().unwrap();

    let a = cache.contracts().get(&first, &token_a).unwrap();
    let b = cache.contracts().get(&first, &token_a).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(cache.contracts().get(&first, &TokenDescriptor::Native).is_none());

    wallet.with(|s| s.accounts = vec![OTHER_ACCOUNT]);
    manager.refresh_account().await.unwrap();
    let second = manager.current().unwrap();

    let c = cache.contracts().get(&second, &token_a).unwrap();
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(cache.contracts().len(), 1);
}

#[tokio::test]
async fn test_single_token_refresh_leaves_others_untouched() {
    let (wallet, _manager, cache) = connected().await;
    let token_a = TokenDescriptor::contract(TOKEN_A);
    wallet.with(|s| {
        s.failing.insert(token_a.slug());
    });
    cache.update_all_balances().await;
    let native_before = cache.balance(&TokenDescriptor::Native);
    let native_version = cache.balances().version();
    let reads = wallet.balance_reads();

    wallet.with(|s| {
        s.failing.clear();
        s.native_balance = U256::from(99u64);
    });
    cache.update_balance(token_a).await;

    assert_eq!(wallet.balance_reads(), reads + 1);
    assert!(cache.balance(&token_a).unwrap().is_success());
    assert_eq!(cache.balance(&TokenDescriptor::Native), native_before);
    // One store write to mark TokenA loading, one to settle it.
    assert_eq!(cache.balances().version(), native_version + 2);
}

#[tokio::test]
async fn test_refresh_keeps_previous_data_visible() {
    let (wallet, _manager, cache) = connected().await;
    cache.update_all_balances().await;
    wallet.with(|s| {
        s.read_delay = Duration::from_millis(50);
        s.native_balance = U256::from(6u64);
    });

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.update_all_balances().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let state = cache.balance(&TokenDescriptor::Native).unwrap();
    assert!(state.is_loading());
    assert_eq!(state.data(), Some(&U256::from(5u64)));

    refresh.await.unwrap();
    assert_eq!(
        cache.balance(&TokenDescriptor::Native).unwrap().data(),
        Some(&U256::from(6u64))
    );
}

#[tokio::test]
async fn test_token_unwatched_mid_refresh_is_dropped() {
    let (wallet, _manager, cache) = connected().await;
    wallet.with(|s| s.read_delay = Duration::from_millis(30));

    let refresh = tokio::spawn({
        let cache = cache.clone();
        async move { cache.update_all_balances().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    cache.set_watched_tokens(vec![TokenDescriptor::Native]);
    refresh.await.unwrap();

    let balances = cache.balances().get();
    assert_eq!(balances.len(), 1);
    assert!(balances.values().all(|s| !s.is_loading()));
    assert!(cache.balance(&TokenDescriptor::contract(TOKEN_A)).is_none());
    assert!(!cache.mark_outdated(&TokenDescriptor::contract(TOKEN_A).slug()));
}

#[tokio::test]
async fn test_network_tokens_record_their_network() {
    let (_wallet, manager, cache) = connected().await;
    assert_eq!(cache.network(), None);

    let polygon = manager.registry().default_tokens(ChainId(137));
    cache.set_network_tokens(ChainId(137), polygon.clone());
    assert_eq!(cache.network(), Some(ChainId(137)));
    assert_eq!(*cache.tokens(), polygon);

    cache.set_watched_tokens(Vec::new());
    assert_eq!(cache.network(), None);
}
