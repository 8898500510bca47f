//! Scenario: a personal call is accepted and later ended, producing a
//! chat message with the call's duration.

mod common;

use chat_calling_core::config::Config;
use chat_calling_core::models::{CallStatus, MessageKind};
use chat_calling_core::Ctx;
use std::time::Duration;

#[tokio::test]
async fn accept_then_end_produces_duration_message() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();

    let caller = Ctx { user: 1, device: 101 };
    let callee = Ctx { user: 2, device: 202 };

    let call = h.service.call_start(caller, 2, chat).await.unwrap();
    assert_eq!(call.call.status, CallStatus::Initiated);
    let call_id = call.call.id;

    h.service.call_set_status(callee, call_id, 2).await.unwrap();
    let active = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(active.call.status, CallStatus::Active);
    assert!(active.call.start.is_some());

    h.service.call_set_status(caller, call_id, 902).await.unwrap();
    let ended = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(ended.call.status, CallStatus::Ended);
    assert!(ended.participants.iter().all(|p| p.status as i32 == 0));

    let messages = h.repo.get_all_messages(chat).unwrap();
    let duration_msg = messages
        .iter()
        .find(|m| m.kind == MessageKind::CallStartMessage)
        .expect("expected a call duration message");
    assert!(duration_msg.body.contains(':'));
}

#[tokio::test]
async fn rejecting_an_initiated_call_sends_a_rejected_message() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let caller = Ctx { user: 1, device: 101 };
    let callee = Ctx { user: 2, device: 202 };

    let call = h.service.call_start(caller, 2, chat).await.unwrap();
    h.service.call_set_status(callee, call.call.id, 901).await.unwrap();

    let rejected = h.repo.get_call(call.call.id).unwrap().unwrap();
    assert_eq!(rejected.call.status, CallStatus::Rejected);

    let messages = h.repo.get_all_messages(chat).unwrap();
    assert!(messages.iter().any(|m| m.kind == MessageKind::CallRejectedMessage));
}

#[tokio::test]
async fn not_accepted_timeout_marks_the_call_ignored() {
    let config = Config {
        call_not_accepted_timeout: Duration::from_millis(20),
        ..Config::default()
    };
    let h = common::build(config, false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let caller = Ctx { user: 1, device: 101 };

    let call = h.service.call_start(caller, 2, chat).await.unwrap();
    let call_id = call.call.id;

    tokio::time::sleep(Duration::from_millis(100)).await;

    let ignored = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(ignored.call.status, CallStatus::Ignored);

    let messages = h.repo.get_all_messages(chat).unwrap();
    assert!(messages.iter().any(|m| m.kind == MessageKind::CallMissedMessage));
}

#[tokio::test]
async fn rejoining_the_same_chat_is_idempotent() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let caller = Ctx { user: 1, device: 101 };

    let first = h.service.call_start(caller, 2, chat).await.unwrap();
    let second = h.service.call_start(caller, 2, chat).await.unwrap();
    assert_eq!(first.call.id, second.call.id);
}
