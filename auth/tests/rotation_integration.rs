//! Refresh-token rotation integration tests.
//!
//! These drive [`AuthService`] end to end against the in-memory providers
//! and check the security properties of rotation:
//!
//! - refresh tokens are single-use
//! - replaying any ancestor revokes the whole family
//! - concurrent rotations of one token yield exactly one winner
//! - other families of the same user are unaffected
//! - a chain of any length stays in one family

#![allow(clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use travio_identity::mocks::{MockRefreshTokenRepository, MockTokenBlacklist, MockUserRepository};
use travio_identity::{AuthService, ClientInfo, IdentityConfig, IdentityError, PasswordHashingConfig};
use travio_testing::mocks::{ManualClock, test_clock};
use travio_core::environment::Clock;

type Service =
    AuthService<MockUserRepository, MockRefreshTokenRepository, MockTokenBlacklist, ManualClock>;

struct Fixture {
    service: Arc<Service>,
    refresh: MockRefreshTokenRepository,
    clock: ManualClock,
}

fn fixture() -> Fixture {
    let clock = ManualClock::starting_at(test_clock().now());
    let refresh = MockRefreshTokenRepository::new();
    let config = IdentityConfig::new("access-secret", "refresh-secret")
        .with_hashing(PasswordHashingConfig::insecure_fast())
        .with_cleanup_interval(Duration::from_secs(3600));
    let service = AuthService::new(
        config,
        MockUserRepository::new(),
        refresh.clone(),
        MockTokenBlacklist::new(),
        clock.clone(),
    )
    .unwrap();
    Fixture {
        service: Arc::new(service),
        refresh,
        clock,
    }
}

fn client() -> ClientInfo {
    ClientInfo::new("Mozilla/5.0 (Windows NT 10.0; Win64; x64)", "203.0.113.7")
}

async fn registered(fx: &Fixture) {
    fx.service
        .register("alice@example.com", "correct horse", Some("org-1".into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn replaying_an_ancestor_terminates_the_family() {
    let fx = fixture();
    registered(&fx).await;

    let first = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    let second = fx.service.refresh_tokens(&first.refresh_token, &client()).await.unwrap();
    assert_ne!(first.refresh_token, second.refresh_token);
    assert_ne!(first.access_token, second.access_token);

    // Attacker replays R1.
    let replay = fx.service.refresh_tokens(&first.refresh_token, &client()).await;
    assert_eq!(replay, Err(IdentityError::RefreshReused));

    // Legitimate holder of R2 is now locked out too.
    let victim = fx.service.refresh_tokens(&second.refresh_token, &client()).await;
    assert_eq!(victim, Err(IdentityError::RefreshReused));

    // A fresh login still works and opens a new family.
    let again = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    assert!(fx.service.refresh_tokens(&again.refresh_token, &client()).await.is_ok());
}

#[tokio::test]
async fn rotation_preserves_the_family_id() {
    let fx = fixture();
    registered(&fx).await;

    let mut pair = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    for _ in 0..5 {
        pair = fx.service.refresh_tokens(&pair.refresh_token, &client()).await.unwrap();
    }

    let user = {
        let claims = fx.service.validate_access_token(&pair.access_token).await.unwrap();
        claims.user_id().unwrap()
    };
    let sessions = fx.service.list_active_sessions(user).await.unwrap();
    assert_eq!(sessions.len(), 1);

    let family = fx.refresh.family(&sessions[0].family_id);
    assert_eq!(family.len(), 6);
    assert_eq!(family.iter().filter(|r| !r.revoked).count(), 1);
}

#[tokio::test]
async fn reuse_leaves_other_sessions_alone() {
    let fx = fixture();
    registered(&fx).await;

    let laptop = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    let phone = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();

    fx.service.refresh_tokens(&laptop.refresh_token, &client()).await.unwrap();
    assert_eq!(
        fx.service.refresh_tokens(&laptop.refresh_token, &client()).await,
        Err(IdentityError::RefreshReused)
    );

    assert!(fx.service.refresh_tokens(&phone.refresh_token, &client()).await.is_ok());
}

#[tokio::test]
async fn concurrent_rotation_has_one_winner() {
    let fx = fixture();
    registered(&fx).await;
    let pair = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&fx.service);
        let token = pair.refresh_token.clone();
        handles.push(tokio::spawn(async move {
            service.refresh_tokens(&token, &client()).await
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) => assert_eq!(e, IdentityError::RefreshReused),
        }
    }
    assert!(ok <= 1, "at most one rotation may succeed, got {ok}");
}

#[tokio::test]
async fn logout_then_refresh_is_treated_as_reuse() {
    let fx = fixture();
    registered(&fx).await;
    let pair = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();

    fx.service.logout(&pair.refresh_token, None).await.unwrap();
    assert_eq!(
        fx.service.refresh_tokens(&pair.refresh_token, &client()).await,
        Err(IdentityError::RefreshReused)
    );
}

#[tokio::test]
async fn logout_all_revokes_every_family() {
    let fx = fixture();
    registered(&fx).await;
    let a = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    let b = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    let user = fx.service.validate_access_token(&a.access_token).await.unwrap().user_id().unwrap();

    assert_eq!(fx.service.logout_all(user).await.unwrap(), 2);
    assert!(fx.service.list_active_sessions(user).await.unwrap().is_empty());
    assert!(fx.service.refresh_tokens(&b.refresh_token, &client()).await.is_err());
}

#[tokio::test]
async fn sessions_are_ordered_by_last_use() {
    let fx = fixture();
    registered(&fx).await;
    let older = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    fx.clock.advance(chrono::Duration::minutes(1));
    fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    fx.clock.advance(chrono::Duration::minutes(1));
    let rotated = fx.service.refresh_tokens(&older.refresh_token, &client()).await.unwrap();

    let user = fx.service.validate_access_token(&rotated.access_token).await.unwrap().user_id().unwrap();
    let sessions = fx.service.list_active_sessions(user).await.unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions[0].last_active >= sessions[1].last_active);
    assert_eq!(sessions[0].device, "Web Browser");
    assert_eq!(sessions[0].last_active, fx.clock.now());
}

#[tokio::test(start_paused = true)]
async fn cleanup_worker_purges_hourly() {
    let fx = fixture();
    registered(&fx).await;
    fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
    assert_eq!(fx.refresh.len(), 1);

    let worker = fx.service.spawn_cleanup();
    fx.clock.advance(chrono::Duration::days(8));

    tokio::time::sleep(Duration::from_secs(3601)).await;
    assert!(fx.refresh.is_empty());

    worker.stop().await;
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn rotation_chains_stay_in_one_family(rotations in 1usize..10, replayed in any::<prop::sample::Index>()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let fx = fixture();
            registered(&fx).await;

            let mut pair = fx.service.login("alice@example.com", "correct horse", &client()).await.unwrap();
            let mut issued = vec![pair.refresh_token.clone()];
            for _ in 0..rotations {
                pair = fx.service.refresh_tokens(&pair.refresh_token, &client()).await.unwrap();
                issued.push(pair.refresh_token.clone());
            }

            let user = fx.service.validate_access_token(&pair.access_token).await.unwrap().user_id().unwrap();
            let sessions = fx.service.list_active_sessions(user).await.unwrap();
            assert_eq!(sessions.len(), 1);
            let family_id = sessions[0].family_id.clone();
            assert_eq!(fx.refresh.family(&family_id).len(), rotations + 1);

            let ancestor = &issued[replayed.index(rotations)];
            assert_eq!(
                fx.service.refresh_tokens(ancestor, &client()).await,
                Err(IdentityError::RefreshReused)
            );
            assert!(fx.refresh.family(&family_id).iter().all(|record| record.revoked));
            assert_eq!(
                fx.service.refresh_tokens(&pair.refresh_token, &client()).await,
                Err(IdentityError::RefreshReused)
            );
        });
    }
}
