//! Runs a [`Session`] over a real socket.
//!
//! The session core is synchronous; this adapter owns the only
//! suspension points: reading transport bytes, writing queued frames,
//! and ticking the heartbeat clock.

use std::net::SocketAddr;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::select;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::session::{Role, Session, SessionEvent, CLIENT_HEARTBEAT, SERVER_HEARTBEAT};

pub enum Bearer {
    Tcp(TcpStream),
}

const BUFFER_LEN: usize = 1024 * 10;

impl Bearer {
    pub async fn connect_tcp(addr: impl ToSocketAddrs) -> tokio::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::Tcp(stream))
    }

    pub async fn accept_tcp(listener: &TcpListener) -> tokio::io::Result<(Self, SocketAddr)> {
        let (stream, addr) = listener.accept().await?;
        Ok((Self::Tcp(stream), addr))
    }

    async fn readable(&self) -> tokio::io::Result<()> {
        match self {
            Bearer::Tcp(x) => x.readable().await,
        }
    }

    fn try_read(&mut self, buf: &mut [u8]) -> tokio::io::Result<usize> {
        match self {
            Bearer::Tcp(x) => x.try_read(buf),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> tokio::io::Result<()> {
        match self {
            Bearer::Tcp(x) => x.write_all(buf).await,
        }
    }

    async fn flush(&mut self) -> tokio::io::Result<()> {
        match self {
            Bearer::Tcp(x) => x.flush().await,
        }
    }
}

/// Drives `session` over `bearer` until it closes or the peer hangs up.
///
/// Session events are forwarded over `events`; dropping the receiver
/// stops the driver.
pub async fn run(
    mut bearer: Bearer,
    mut session: Session,
    events: mpsc::Sender<SessionEvent>,
) -> tokio::io::Result<()> {
    let heartbeat = match session.role() {
        Role::Client => CLIENT_HEARTBEAT,
        Role::Server => SERVER_HEARTBEAT,
    };
    let mut ticker = tokio::time::interval(heartbeat);

    session.on_connected();
    flush_output(&mut bearer, &mut session).await?;

    loop {
        select! {
            readable = bearer.readable() => {
                readable?;
                let mut buf = vec![0u8; BUFFER_LEN];
                match bearer.try_read(&mut buf) {
                    Ok(0) => {
                        debug!("peer hung up");
                        break;
                    }
                    Ok(n) => {
                        trace!(n, "bytes from bearer");
                        let mut closed = false;
                        for event in session.on_bytes(&buf[..n]) {
                            closed |= matches!(event, SessionEvent::Closed(_));
                            if events.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                        flush_output(&mut bearer, &mut session).await?;
                        if closed {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == tokio::io::ErrorKind::WouldBlock => continue,
                    Err(e) => return Err(e),
                }
            }
            _ = ticker.tick() => {
                session.send_keep_alive();
                flush_output(&mut bearer, &mut session).await?;
            }
        }
    }

    Ok(())
}

async fn flush_output(bearer: &mut Bearer, session: &mut Session) -> tokio::io::Result<()> {
    let mut wrote = false;
    while let Some(frame) = session.poll_output() {
        if tracing::event_enabled!(tracing::Level::TRACE) {
            trace!(data = hex::encode(&frame), "write to bearer");
        }
        bearer.write_all(&frame).await?;
        wrote = true;
    }
    if wrote {
        bearer.flush().await?;
    }
    Ok(())
}
