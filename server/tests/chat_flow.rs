use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;

use futures::SinkExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use protocol::{ClientCodec, Request, Response};

use server::delivery::Delivery;
use server::registry::Registry;
use server::server_channel::ChannelReceiver;
use server::server_listener::ServerListener;
use server::server_types::RouteMsg;

type Reader = FramedRead<OwnedReadHalf, ClientCodec>;
type Writer = FramedWrite<OwnedWriteHalf, ClientCodec>;

const RECV_WINDOW: Duration = Duration::from_secs(5);

async fn start_server() -> SocketAddr {
    let listener = ServerListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = Registry::shared();
    let outgoing = Delivery::new(&registry);
    let (local_tx, local_rx) = mpsc::channel::<RouteMsg>(64);

    listener.spawn_accept(registry, local_tx);
    ChannelReceiver::spawn_receive(local_rx, outgoing);

    addr
}

async fn connect_as(addr: SocketAddr, name: &str) -> (Reader, Writer) {
    let socket = TcpStream::connect(addr).await.unwrap();
    let (tcp_read, tcp_write) = socket.into_split();

    let fr = FramedRead::new(tcp_read, ClientCodec);
    let mut fw = FramedWrite::new(tcp_write, ClientCodec);
    fw.send(Request::Hello { name: name.to_owned() }).await.unwrap();

    (fr, fw)
}

// The server re-announces the roster constantly; skip past the join
// chatter to the next message that was actually routed.
async fn next_routed(fr: &mut Reader) -> Response {
    loop {
        let frame = timeout(RECV_WINDOW, fr.next())
            .await
            .expect("timed out waiting for a frame");

        match frame {
            Some(Ok(Response::Join { .. })) => continue,
            Some(Ok(resp)) => return resp,
            other => panic!("stream ended unexpectedly: {:?}", other),
        }
    }
}

// Read join announcements until `n` distinct ids have shown up;
// returns id -> name in id order.
async fn await_roster(fr: &mut Reader, n: usize) -> Vec<(u32, String)> {
    let mut seen = BTreeMap::new();

    loop {
        let frame = timeout(RECV_WINDOW, fr.next())
            .await
            .expect("timed out waiting for roster")
            .expect("stream ended while waiting for roster")
            .expect("decode error while waiting for roster");

        match frame {
            Response::Join { id, name } => {
                seen.insert(id, name);
                if seen.len() >= n {
                    return seen.into_iter().collect();
                }
            }
            other => panic!("expected a join announce, got {:?}", other),
        }
    }
}

fn id_of(roster: &[(u32, String)], name: &str) -> u32 {
    roster.iter().find(|(_, n)| n == name).map(|(id, _)| *id).unwrap()
}

#[tokio::test]
async fn broadcast_echoes_to_everyone_in_sender_order() {
    let addr = start_server().await;

    let (mut alice_fr, mut alice_fw) = connect_as(addr, "alice").await;
    let roster = await_roster(&mut alice_fr, 1).await;
    let alice_id = id_of(&roster, "alice");

    let (mut bob_fr, _bob_fw) = connect_as(addr, "bob").await;
    await_roster(&mut bob_fr, 2).await;
    await_roster(&mut alice_fr, 2).await;

    alice_fw
        .send(Request::Broadcast { sender_id: alice_id, text: "hello".into() })
        .await
        .unwrap();

    let expected = Response::Broadcast { sender_id: alice_id, text: "hello".into() };
    // the sender hears its own echo too
    assert_eq!(next_routed(&mut alice_fr).await, expected);
    assert_eq!(next_routed(&mut bob_fr).await, expected);

    // FIFO per sender
    alice_fw
        .send(Request::Broadcast { sender_id: alice_id, text: "one".into() })
        .await
        .unwrap();
    alice_fw
        .send(Request::Broadcast { sender_id: alice_id, text: "two".into() })
        .await
        .unwrap();

    assert_eq!(
        next_routed(&mut bob_fr).await,
        Response::Broadcast { sender_id: alice_id, text: "one".into() }
    );
    assert_eq!(
        next_routed(&mut bob_fr).await,
        Response::Broadcast { sender_id: alice_id, text: "two".into() }
    );
}

#[tokio::test]
async fn relay_stamps_the_server_assigned_sender_id() {
    let addr = start_server().await;

    let (mut alice_fr, mut alice_fw) = connect_as(addr, "alice").await;
    let roster = await_roster(&mut alice_fr, 1).await;
    let alice_id = id_of(&roster, "alice");

    // a bogus claimed id gets overwritten by the server
    alice_fw
        .send(Request::Broadcast { sender_id: 9999, text: "trust me".into() })
        .await
        .unwrap();

    assert_eq!(
        next_routed(&mut alice_fr).await,
        Response::Broadcast { sender_id: alice_id, text: "trust me".into() }
    );
}

#[tokio::test]
async fn private_message_reaches_target_and_sender_only() {
    let addr = start_server().await;

    let (mut alice_fr, mut alice_fw) = connect_as(addr, "alice").await;
    await_roster(&mut alice_fr, 1).await;
    let (mut bob_fr, mut bob_fw) = connect_as(addr, "bob").await;
    await_roster(&mut bob_fr, 2).await;
    let (mut carol_fr, _carol_fw) = connect_as(addr, "carol").await;

    let roster = await_roster(&mut carol_fr, 3).await;
    let alice_id = id_of(&roster, "alice");
    let bob_id = id_of(&roster, "bob");
    await_roster(&mut alice_fr, 3).await;
    await_roster(&mut bob_fr, 3).await;

    bob_fw
        .send(Request::Private { target: "alice".into(), text: "psst".into() })
        .await
        .unwrap();

    let expected = Response::Private { sender_id: bob_id, text: "psst".into() };
    assert_eq!(next_routed(&mut alice_fr).await, expected);
    assert_eq!(next_routed(&mut bob_fr).await, expected);

    // fence: the next broadcast must be the first routed frame carol
    // sees -- the private never reached her
    alice_fw
        .send(Request::Broadcast { sender_id: alice_id, text: "fence".into() })
        .await
        .unwrap();
    assert_eq!(
        next_routed(&mut carol_fr).await,
        Response::Broadcast { sender_id: alice_id, text: "fence".into() }
    );
}

#[tokio::test]
async fn unresolved_private_target_reports_to_sender() {
    let addr = start_server().await;

    let (mut alice_fr, mut alice_fw) = connect_as(addr, "alice").await;
    await_roster(&mut alice_fr, 1).await;

    alice_fw
        .send(Request::Private { target: "dave".into(), text: "anyone there".into() })
        .await
        .unwrap();

    assert_eq!(
        next_routed(&mut alice_fr).await,
        Response::NoSuchTarget { name: "dave".into() }
    );
}

#[tokio::test]
async fn disconnect_is_announced_to_the_remaining_sessions() {
    let addr = start_server().await;

    let (mut alice_fr, _alice_fw) = connect_as(addr, "alice").await;
    await_roster(&mut alice_fr, 1).await;
    let (mut bob_fr, bob_fw) = connect_as(addr, "bob").await;

    let roster = await_roster(&mut bob_fr, 2).await;
    let bob_id = id_of(&roster, "bob");
    await_roster(&mut alice_fr, 2).await;

    drop(bob_fr);
    drop(bob_fw);

    assert_eq!(next_routed(&mut alice_fr).await, Response::Leave { id: bob_id });
}

#[tokio::test]
async fn roster_refresh_triggers_a_fresh_announce() {
    let addr = start_server().await;

    let (mut alice_fr, mut alice_fw) = connect_as(addr, "alice").await;
    let roster = await_roster(&mut alice_fr, 1).await;
    let alice_id = id_of(&roster, "alice");

    alice_fw.send(Request::RosterRefresh).await.unwrap();

    let frame = timeout(RECV_WINDOW, alice_fr.next())
        .await
        .expect("timed out waiting for the announce")
        .unwrap()
        .unwrap();
    assert_eq!(frame, Response::Join { id: alice_id, name: "alice".into() });
}

#[tokio::test]
async fn unrecognized_lines_do_not_kill_the_session() {
    let addr = start_server().await;

    let (mut alice_fr, mut alice_fw) = connect_as(addr, "alice").await;
    let roster = await_roster(&mut alice_fr, 1).await;
    let alice_id = id_of(&roster, "alice");

    // a tagged line the server has no routing for is dropped in place
    alice_fw.send(Request::Unknown).await.unwrap(); // encodes to nothing
    alice_fw
        .send(Request::Broadcast { sender_id: alice_id, text: "!exit:junk\nstill here".into() })
        .await
        .unwrap();

    // the flattened payload comes back intact
    assert_eq!(
        next_routed(&mut alice_fr).await,
        Response::Broadcast { sender_id: alice_id, text: "!exit:junk\nstill here".into() }
    );
}
