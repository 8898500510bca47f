//! Scenario: a three-member group call stays active while any member
//! is active, and ends once the last active participant leaves — even
//! though the initiator itself never progressed past `connecting`.

mod common;

use chat_calling_core::config::Config;
use chat_calling_core::models::{CallKind, CallStatus, ParticipantStatus};
use chat_calling_core::Ctx;

#[tokio::test]
async fn group_call_ends_when_last_active_participant_leaves() {
    let h = common::build(Config::default(), true);
    let chat = h.repo.add_group("team", "", &[1, 2, 3]).unwrap();

    let initiator = Ctx { user: 1, device: 101 };
    let member_a = Ctx { user: 2, device: 202 };
    let member_b = Ctx { user: 3, device: 303 };

    let call = h.service.call_start(initiator, 0, chat).await.unwrap();
    assert_eq!(call.call.kind, CallKind::Group);
    let call_id = call.call.id;

    // First acceptance flips the call active directly.
    h.service.call_set_status(member_a, call_id, 2).await.unwrap();
    let active = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(active.call.status, CallStatus::Active);

    // A second join lands in `connecting` (the call is already under
    // way) until the participant explicitly reports `active`.
    h.service.call_set_status(member_b, call_id, 2).await.unwrap();
    let mid_join = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(
        mid_join.participant(3).unwrap().status,
        ParticipantStatus::Connecting
    );
    h.service.call_set_user_status(member_b, call_id, 3).await.unwrap();

    let both_active = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(both_active.participant(2).unwrap().status, ParticipantStatus::Active);
    assert_eq!(both_active.participant(3).unwrap().status, ParticipantStatus::Active);

    h.service.call_set_status(member_a, call_id, 801).await.unwrap();
    let still_active = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(still_active.call.status, CallStatus::Active);

    h.service.call_set_status(member_b, call_id, 801).await.unwrap();
    let ended = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(ended.call.status, CallStatus::Ended);
}

#[tokio::test]
async fn group_calls_are_rejected_without_an_sfu() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_group("team", "", &[1, 2, 3]).unwrap();
    let initiator = Ctx { user: 1, device: 101 };

    let err = h.service.call_start(initiator, 0, chat).await.unwrap_err();
    assert!(matches!(err, chat_calling_core::error::CoreError::FeatureDisabled));
}

#[tokio::test]
async fn members_already_on_another_call_are_not_invited() {
    let h = common::build(Config::default(), true);
    let direct_chat = h.repo.add_direct(2, 9).unwrap();
    let group_chat = h.repo.add_group("team", "", &[1, 2, 3]).unwrap();

    let busy_member = Ctx { user: 2, device: 202 };
    h.service.call_start(busy_member, 9, direct_chat).await.unwrap();

    let initiator = Ctx { user: 1, device: 101 };
    let call = h.service.call_start(initiator, 0, group_chat).await.unwrap();

    assert_eq!(
        call.participant(2).unwrap().status,
        ParticipantStatus::Disconnected,
        "a member already on another call should never be invited"
    );
}
