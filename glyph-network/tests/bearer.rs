//! End-to-end handshake over a real TCP loopback.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use glyph_network::bearer::{self, Bearer};
use glyph_network::session::{Role, Session, SessionEvent};

#[tokio::test]
async fn sessions_establish_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (server_events_tx, mut server_events) = mpsc::channel(16);
    let server = tokio::spawn(async move {
        let (accepted, _) = Bearer::accept_tcp(&listener).await.unwrap();
        let session = Session::new(Role::Server, 0x5EED);
        let _ = bearer::run(accepted, session, server_events_tx).await;
    });

    let (client_events_tx, mut client_events) = mpsc::channel(16);
    let client = tokio::spawn(async move {
        let connected = Bearer::connect_tcp(addr).await.unwrap();
        let session = Session::new(Role::Client, 0);
        let _ = bearer::run(connected, session, client_events_tx).await;
    });

    let client_event = timeout(Duration::from_secs(5), client_events.recv())
        .await
        .expect("client event in time")
        .expect("client event");
    assert!(matches!(client_event, SessionEvent::Established));

    let server_event = timeout(Duration::from_secs(5), server_events.recv())
        .await
        .expect("server event in time")
        .expect("server event");
    assert!(matches!(server_event, SessionEvent::Established));

    server.abort();
    client.abort();
}
