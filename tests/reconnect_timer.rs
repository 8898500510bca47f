//! Scenario: a participant reconnects before their first reconnecting
//! timer fires. The stale timer's epoch no longer matches and must be
//! a no-op; only the freshly armed one may disconnect the call.

mod common;

use chat_calling_core::config::Config;
use chat_calling_core::models::CallStatus;
use chat_calling_core::Ctx;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn stale_reconnect_timer_is_invalidated_by_a_later_one() {
    let config = Config {
        call_reconnecting_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    let h = common::build(config, false);
    let chat = h.repo.add_direct(1, 2).unwrap();

    let caller = Ctx { user: 1, device: 101 };
    let callee = Ctx { user: 2, device: 202 };
    let call = h.service.call_start(caller, 2, chat).await.unwrap();
    let call_id = call.call.id;

    // First connecting attempt arms a timer due to fire at t=5s.
    h.service.call_set_user_status(callee, call_id, 2).await.unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;

    // A fresh attempt at t=2s rearms the epoch; the timer due at t=5s
    // is now stale and must not touch the call when it fires.
    h.service.call_set_user_status(callee, call_id, 2).await.unwrap();

    tokio::time::advance(Duration::from_secs(3) + Duration::from_millis(500)).await;
    tokio::task::yield_now().await;

    let mid = h.repo.get_call(call_id).unwrap().unwrap();
    assert!(
        !mid.call.status.is_terminal(),
        "the stale timer from t=0 must not disconnect the call at t=5.5s"
    );

    tokio::time::advance(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;

    let after = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(
        after.call.status,
        CallStatus::Ended,
        "the rearmed timer due at t=7s should disconnect the still-connecting participant"
    );
}
