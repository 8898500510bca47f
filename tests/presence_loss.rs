//! Scenario: a device goes stale (simulating the presence sweeper's
//! grace-period eviction) while on an active call. The call is marked
//! `lost`, not silently rewritten to `ended`.

mod common;

use chat_calling_core::config::Config;
use chat_calling_core::models::CallStatus;
use chat_calling_core::Ctx;

#[tokio::test]
async fn stale_device_drops_its_call_as_lost_not_ended() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();

    let caller = Ctx { user: 1, device: 101 };
    let callee = Ctx { user: 2, device: 202 };
    let call = h.service.call_start(caller, 2, chat).await.unwrap();
    let call_id = call.call.id;

    h.service.call_set_status(callee, call_id, 2).await.unwrap();
    let active = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(active.call.status, CallStatus::Active);

    // What `Core::on_device_stale` does once the presence tracker
    // reports device 202 past its grace period.
    h.service.calls.disconnect(callee, call_id, CallStatus::Lost).await.unwrap();

    let after = h.repo.get_call(call_id).unwrap().unwrap();
    assert_eq!(after.call.status, CallStatus::Lost);
}
