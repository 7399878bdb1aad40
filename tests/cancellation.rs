// Seed scenario 5 (spec §8): a server handler awaiting cancellation sees it,
// and the client's own recv-status observes CANCELLED.

mod common;

use std::time::Duration;

use rpcio::call::client::CallOption;
use rpcio::call::{Op, OpResult};
use rpcio::cq::Event;
use rpcio::deadline::Deadline;
use rpcio::status::StatusCode;
use rpcio::tag::Tag;

#[test]
fn explicit_cancellation_is_observed_by_the_server_and_the_client() {
    let fixture = common::setup("host");
    let server_cq = fixture.env.pick_cq();
    fixture.server.request_call(&server_cq, Tag::from(1));

    let client_cq = fixture.channel.cq();
    let opt = CallOption::new().timeout(Duration::from_secs(5));
    let call = fixture.channel.create_call("/svc/Method", &client_cq, &opt);
    call.start_batch(
        vec![Op::SendInitialMetadata(Default::default()), Op::RecvStatusOnClient],
        Tag::from(1),
    )
    .unwrap();

    let accept_deadline = Deadline::after(Duration::from_secs(2));
    let ctx = match server_cq.next(accept_deadline) {
        Event::IncomingCall { result, .. } => result.unwrap(),
        other => panic!("unexpected {other:?}"),
    };

    // The handler registers interest in cancellation before it happens.
    ctx.call.start_batch(vec![Op::RecvCloseOnServer], Tag::from(2)).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    call.cancel();

    match server_cq.next(accept_deadline) {
        Event::OpComplete { tag, result } => {
            assert_eq!(tag, Tag::from(2));
            let results = result.unwrap().results;
            match results.into_iter().next() {
                Some(OpResult::Closed { cancelled }) => assert!(cancelled),
                other => panic!("unexpected {other:?}"),
            }
        }
        other => panic!("unexpected {other:?}"),
    }

    match client_cq.next(accept_deadline) {
        Event::OpComplete { tag, result } => {
            assert_eq!(tag, Tag::from(1));
            let results = result.unwrap().results;
            match results.into_iter().last() {
                Some(OpResult::Status(status)) => {
                    assert!(matches!(
                        status.code,
                        StatusCode::Cancelled | StatusCode::DeadlineExceeded
                    ));
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn cancelling_twice_posts_only_one_completion() {
    let fixture = common::setup("host");
    let server_cq = fixture.env.pick_cq();
    fixture.server.request_call(&server_cq, Tag::from(1));

    let client_cq = fixture.channel.cq();
    let opt = CallOption::new().timeout(Duration::from_secs(5));
    let call = fixture.channel.create_call("/svc/Method", &client_cq, &opt);
    call.start_batch(
        vec![Op::SendInitialMetadata(Default::default()), Op::RecvStatusOnClient],
        Tag::from(1),
    )
    .unwrap();

    let accept_deadline = Deadline::after(Duration::from_secs(2));
    let ctx = match server_cq.next(accept_deadline) {
        Event::IncomingCall { result, .. } => result.unwrap(),
        other => panic!("unexpected {other:?}"),
    };
    ctx.call.start_batch(vec![Op::RecvCloseOnServer], Tag::from(2)).unwrap();

    std::thread::sleep(Duration::from_millis(20));
    // Calling cancel() a second time, including after the call has already
    // finished, must be a no-op rather than posting a second completion for
    // either tag (§4.5).
    call.cancel();
    call.cancel();

    match server_cq.next(accept_deadline) {
        Event::OpComplete { tag, result } => {
            assert_eq!(tag, Tag::from(2));
            assert!(matches!(
                result.unwrap().results.into_iter().next(),
                Some(OpResult::Closed { cancelled: true })
            ));
        }
        other => panic!("unexpected {other:?}"),
    }
    match client_cq.next(accept_deadline) {
        Event::OpComplete { tag, .. } => assert_eq!(tag, Tag::from(1)),
        other => panic!("unexpected {other:?}"),
    }

    call.cancel();
    // No further event should arrive on either cq for this call; a short
    // timeout stands in for "nothing more is ever posted".
    let short = Deadline::after(Duration::from_millis(100));
    assert!(matches!(server_cq.next(short), Event::QueueTimeout));
    assert!(matches!(client_cq.next(short), Event::QueueTimeout));
}
