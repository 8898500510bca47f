//! Scenario: a target user already on one call is reported busy to a
//! third party, without a `Call` row ever being created for the
//! rejected attempt.

mod common;

use chat_calling_core::config::Config;
use chat_calling_core::models::{CallStatus, MessageKind};
use chat_calling_core::Ctx;

#[tokio::test]
async fn busy_target_yields_synthetic_snapshot_and_message() {
    let h = common::build(Config::default(), false);
    let chat_with_caller = h.repo.add_direct(1, 2).unwrap();
    let chat_with_third_party = h.repo.add_direct(3, 2).unwrap();

    let caller = Ctx { user: 1, device: 101 };
    h.service.call_start(caller, 2, chat_with_caller).await.unwrap();

    let third_party = Ctx { user: 3, device: 303 };
    let busy = h
        .service
        .call_start(third_party, 2, chat_with_third_party)
        .await
        .unwrap();

    assert_eq!(busy.call.status, CallStatus::Busy);
    assert_eq!(busy.call.id, 0, "busy snapshot must not be a persisted call");

    // No call row was ever created for this attempt.
    assert!(h.repo.check_if_chat_in_call(chat_with_third_party).unwrap().is_none());

    let messages = h.repo.get_all_messages(chat_with_third_party).unwrap();
    assert!(messages.iter().any(|m| m.kind == MessageKind::CallBusyMessage));
}
