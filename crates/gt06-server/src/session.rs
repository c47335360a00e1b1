//! One task per device connection.
//!
//! The task owns the socket. Inbound frames are decoded, acked and routed;
//! frames queued by other tasks arrive over the session's outbound channel
//! and are written here, so no lock is ever held across a write.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use gt06_frame::{protocol_name, Frame, FrameError, Gt06Codec};
use gt06_message::{build_ack, decode, requires_ack, DecodeContext, DecodeError, EventKind};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::capture::Direction;
use crate::registry::{SessionHandle, SessionId};
use crate::server::ServerState;

type Transport = Framed<TcpStream, Gt06Codec>;

enum Inbound {
    Frame(Frame),
    Malformed(FrameError),
    Failed(FrameError),
    Eof,
    Idle,
}

async fn next_inbound(framed: &mut Transport, idle_timeout: Option<Duration>) -> Inbound {
    let item = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, framed.next()).await {
            Ok(item) => item,
            Err(_) => return Inbound::Idle,
        },
        None => framed.next().await,
    };
    match item {
        Some(Ok(Ok(frame))) => Inbound::Frame(frame),
        Some(Ok(Err(bad))) => Inbound::Malformed(bad),
        Some(Err(err)) => Inbound::Failed(err),
        None => Inbound::Eof,
    }
}

/// Why a session ended.
#[derive(Debug)]
enum Closed {
    Eof,
    Idle,
    Error(FrameError),
}

struct DeviceSession {
    state: Arc<ServerState>,
    id: SessionId,
    peer: SocketAddr,
    imei: Option<String>,
    outbound: mpsc::Sender<Bytes>,
}

/// Drive one connection until EOF, error or idle timeout.
pub(crate) async fn run(state: Arc<ServerState>, stream: TcpStream, peer: SocketAddr, id: SessionId) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(session = %id, %err, "set_nodelay failed");
    }
    info!(session = %id, %peer, "device connected");

    let (outbound, outbound_rx) = mpsc::channel(state.config().outbound_capacity.max(1));
    let mut session = DeviceSession {
        state,
        id,
        peer,
        imei: None,
        outbound,
    };
    let closed = session.serve(stream, outbound_rx).await;
    session.finish(closed);
}

impl DeviceSession {
    async fn serve(&mut self, stream: TcpStream, mut outbound_rx: mpsc::Receiver<Bytes>) -> Closed {
        let codec = Gt06Codec::new(self.state.config().frame.clone());
        let mut framed = Framed::new(stream, codec);
        let idle_timeout = self.state.config().idle_timeout;

        loop {
            tokio::select! {
                inbound = next_inbound(&mut framed, idle_timeout) => match inbound {
                    Inbound::Frame(frame) => {
                        if let Err(err) = self.on_frame(&mut framed, frame).await {
                            return Closed::Error(err);
                        }
                    }
                    Inbound::Malformed(err) => {
                        warn!(imei = self.imei(), session = %self.id, %err, "dropping malformed frame");
                    }
                    Inbound::Failed(err) => return Closed::Error(err),
                    Inbound::Eof => return Closed::Eof,
                    Inbound::Idle => return Closed::Idle,
                },
                Some(frame) = outbound_rx.recv() => {
                    if let Err(err) = self.write(&mut framed, frame).await {
                        return Closed::Error(err);
                    }
                }
            }
        }
    }

    fn imei(&self) -> &str {
        self.imei.as_deref().unwrap_or("-")
    }

    async fn write(&self, framed: &mut Transport, frame: Bytes) -> Result<(), FrameError> {
        self.state
            .capture(Direction::Outbound, self.imei.as_deref(), &frame);
        framed.send(frame).await
    }

    async fn on_frame(&mut self, framed: &mut Transport, frame: Frame) -> Result<(), FrameError> {
        self.state
            .capture(Direction::Inbound, self.imei.as_deref(), &frame.raw);
        debug!(
            imei = self.imei(),
            protocol = format_args!("0x{:02X}", frame.protocol),
            serial = frame.serial,
            "frame received"
        );

        let ctx = DecodeContext::new(Utc::now())
            .with_imei(self.imei.as_deref())
            .with_timestamps(self.state.config().timestamps);
        let decoded = decode(&frame, &ctx);

        if requires_ack(frame.protocol) {
            self.write(framed, build_ack(frame.protocol, frame.serial)?)
                .await?;
        }

        let event = match decoded {
            Ok(event) => event,
            Err(DecodeError::UnknownProtocol(id)) => {
                info!(
                    imei = self.imei(),
                    protocol = format_args!("0x{id:02X}"),
                    raw = %frame.hex(),
                    "unknown protocol acked, no event"
                );
                return Ok(());
            }
            Err(err) => {
                warn!(
                    imei = self.imei(),
                    protocol = protocol_name(frame.protocol),
                    raw = %frame.hex(),
                    %err,
                    "undecodable frame"
                );
                return Ok(());
            }
        };

        match &event.kind {
            EventKind::Login(_) => {
                if let Some(imei) = &event.imei {
                    self.bind_imei(imei.clone());
                }
            }
            EventKind::CommandAck(ack) => match &self.imei {
                Some(imei) => self.state.on_command_ack(imei, &ack.text),
                None => warn!(session = %self.id, reply = %ack.text, "command reply before login"),
            },
            _ => {}
        }

        if let Err(err) = self.state.publish(&event) {
            warn!(imei = self.imei(), %err, "event sink failed");
        }
        Ok(())
    }

    fn bind_imei(&mut self, imei: String) {
        if let Some(previous) = self.imei.replace(imei.clone()) {
            if previous != imei {
                warn!(session = %self.id, previous = %previous, imei = %imei, "IMEI changed mid-session");
                self.state.on_disconnect(&previous, self.id);
            }
        }
        info!(imei = %imei, session = %self.id, peer = %self.peer, "device logged in");
        let handle = SessionHandle::new(self.id, imei, self.peer, self.outbound.clone());
        self.state.on_login(handle);
    }

    fn finish(self, closed: Closed) {
        match &closed {
            Closed::Eof => info!(imei = self.imei(), session = %self.id, "device disconnected"),
            Closed::Idle => info!(imei = self.imei(), session = %self.id, "idle timeout, closing"),
            Closed::Error(err) => {
                warn!(imei = self.imei(), session = %self.id, %err, "session ended with error")
            }
        }
        if let Some(imei) = &self.imei {
            self.state.on_disconnect(imei, self.id);
        }
    }
}
