//! Property-style checks for a handful of invariants the call engine
//! and message pipeline are expected to hold regardless of call kind.

mod common;

use chat_calling_core::config::Config;
use chat_calling_core::Ctx;

#[tokio::test]
async fn at_most_one_non_terminal_call_per_chat() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let caller = Ctx { user: 1, device: 101 };

    let first = h.service.call_start(caller, 2, chat).await.unwrap();
    let second = h.service.call_start(caller, 2, chat).await.unwrap();

    assert_eq!(first.call.id, second.call.id, "a chat never gets a second concurrent call");
}

#[tokio::test]
async fn reacting_to_the_same_message_twice_is_idempotent() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let author = Ctx { user: 1, device: 101 };
    let reactor = Ctx { user: 2, device: 202 };

    let msg = h.service.message_add(author, chat, "hello", "").unwrap();

    let first = h.service.message_add_reaction(reactor, msg.id, "👍").unwrap();
    let second = h.service.message_add_reaction(reactor, msg.id, "👍").unwrap();
    assert!(first, "first reaction is newly inserted");
    assert!(!second, "duplicate reaction is a no-op");

    let reactions = h.repo.reactions_for_message(msg.id).unwrap();
    assert_eq!(reactions.get("👍").map(Vec::len), Some(1));
}

#[tokio::test]
async fn reacting_to_your_own_message_is_rejected() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let author = Ctx { user: 1, device: 101 };

    let msg = h.service.message_add(author, chat, "hello", "").unwrap();
    let err = h.service.message_add_reaction(author, msg.id, "👍").unwrap_err();
    assert!(matches!(err, chat_calling_core::error::CoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn message_update_does_not_bump_unread_counters() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let author = Ctx { user: 1, device: 101 };

    let msg = h.service.message_add(author, chat, "hello", "").unwrap();
    let before = h.repo.get_membership(2, chat).unwrap().unread_count;
    assert_eq!(before, 1, "message.add increments the recipient's unread counter");

    h.service.message_update(author, msg.id, "hello, edited").unwrap();
    let after = h.repo.get_membership(2, chat).unwrap().unread_count;
    assert_eq!(after, before, "message.update must not touch unread counters");
}

#[tokio::test]
async fn only_the_author_may_edit_or_delete_a_message() {
    let h = common::build(Config::default(), false);
    let chat = h.repo.add_direct(1, 2).unwrap();
    let author = Ctx { user: 1, device: 101 };
    let other = Ctx { user: 2, device: 202 };

    let msg = h.service.message_add(author, chat, "hello", "").unwrap();

    let edit_err = h.service.message_update(other, msg.id, "nope").unwrap_err();
    assert!(matches!(edit_err, chat_calling_core::error::CoreError::AccessDenied));

    let delete_err = h.service.message_remove(other, msg.id).unwrap_err();
    assert!(matches!(delete_err, chat_calling_core::error::CoreError::AccessDenied));
}
