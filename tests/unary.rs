// Seed scenario 1 (spec §8): a plain unary call, OK end to end.

mod common;

use std::time::Duration;

use rpcio::buffer::ByteBuffer;
use rpcio::call::client::CallOption;
use rpcio::call::{Op, OpResult};
use rpcio::cq::Event;
use rpcio::deadline::Deadline;
use rpcio::status::StatusCode;
use rpcio::tag::Tag;
use rpcio::transport::OpFlags;

#[test]
fn unary_call_round_trips_ok() {
    let fixture = common::setup("foo.test.google.fr");

    let server_cq = fixture.env.pick_cq();
    fixture.server.request_call(&server_cq, Tag::from(100));

    let client_cq = fixture.channel.cq();
    let call = fixture.channel.create_call("/foo", &client_cq, &CallOption::new());
    call.start_batch(
        vec![
            Op::SendInitialMetadata(Default::default()),
            Op::SendMessage(ByteBuffer::from("hello world"), OpFlags::empty()),
            Op::SendCloseFromClient,
            Op::RecvInitialMetadata,
            Op::RecvMessage,
            Op::RecvStatusOnClient,
        ],
        Tag::from(1),
    )
    .unwrap();

    let deadline = Deadline::after(Duration::from_secs(2));
    let ctx = match server_cq.next(deadline) {
        Event::IncomingCall { result, .. } => result.unwrap(),
        other => panic!("unexpected {other:?}"),
    };
    assert_eq!(ctx.method, "/foo");

    ctx.call
        .start_batch(
            vec![
                Op::RecvMessage,
                Op::SendInitialMetadata(Default::default()),
                Op::SendMessage(ByteBuffer::from("hello you"), OpFlags::empty()),
                Op::SendStatusFromServer(rpcio::status::RpcStatus::new(
                    StatusCode::Ok,
                    Some("xyz".into()),
                )),
                Op::RecvCloseOnServer,
            ],
            Tag::from(200),
        )
        .unwrap();

    let server_result = match server_cq.next(deadline) {
        Event::OpComplete { tag, result } => {
            assert_eq!(tag, Tag::from(200));
            result.unwrap()
        }
        other => panic!("unexpected {other:?}"),
    };
    let mut server_message = None;
    let mut cancelled = None;
    for op in server_result.results {
        match op {
            OpResult::Message(msg) => server_message = msg,
            OpResult::Closed { cancelled: c } => cancelled = Some(c),
            _ => {}
        }
    }
    assert_eq!(server_message.unwrap().to_vec(), b"hello world");
    assert_eq!(cancelled, Some(false));

    let client_result = match client_cq.next(deadline) {
        Event::OpComplete { tag, result } => {
            assert_eq!(tag, Tag::from(1));
            result.unwrap()
        }
        other => panic!("unexpected {other:?}"),
    };
    let mut client_message = None;
    let mut client_status = None;
    for op in client_result.results {
        match op {
            OpResult::Message(msg) => client_message = msg,
            OpResult::Status(status) => client_status = Some(status),
            _ => {}
        }
    }
    assert_eq!(client_message.unwrap().to_vec(), b"hello you");
    let status = client_status.unwrap();
    assert!(status.is_ok());
    assert_eq!(status.details.as_deref(), Some("xyz"));

    assert_eq!(call.method(), "/foo");
    assert_eq!(call.authority(), "foo.test.google.fr");

    call.destroy();
    ctx.call.destroy();
}
