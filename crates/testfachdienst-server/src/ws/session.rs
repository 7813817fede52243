//! Per-connection STOMP protocol state
//!
//! A `StompSession` is fed raw WebSocket payloads, decodes frames and
//! answers through the broker channel of its session.

use std::sync::Arc;

use testfachdienst_common::APP_VERSION;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::ws::broker::StompBroker;
use crate::ws::controller::ErezeptWsController;
use crate::ws::destinations::StompDestinations;
use crate::ws::frame::{
    FrameDecoder, HEADER_CONTENT_TYPE, HEADER_DESTINATION, HEADER_ID, HEADER_RECEIPT,
    HEADER_RECEIPT_ID, StompCommand, StompFrame,
};

/// Protocol versions in order of preference
pub const SUPPORTED_VERSIONS: [&str; 3] = ["1.2", "1.1", "1.0"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionState {
    AwaitingConnect,
    Connected,
    Closed,
}

/// What the connection loop should do after a message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionControl {
    Continue,
    Close,
}

pub struct StompSession {
    id: String,
    state: SessionState,
    decoder: FrameDecoder,
    broker: Arc<StompBroker>,
    destinations: StompDestinations,
    controller: ErezeptWsController,
}

impl StompSession {
    pub fn new(
        id: impl Into<String>,
        broker: Arc<StompBroker>,
        destinations: StompDestinations,
        controller: ErezeptWsController,
    ) -> Self {
        Self {
            id: id.into(),
            state: SessionState::AwaitingConnect,
            decoder: FrameDecoder::default(),
            broker,
            destinations,
            controller,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Feed one WebSocket message; may contain several or partial frames
    pub async fn on_message(&mut self, data: &[u8]) -> SessionControl {
        if self.state == SessionState::Closed {
            return SessionControl::Close;
        }
        self.decoder.push(data);

        loop {
            match self.decoder.decode() {
                Ok(Some(frame)) => {
                    if self.handle_frame(frame).await == SessionControl::Close {
                        self.state = SessionState::Closed;
                        return SessionControl::Close;
                    }
                }
                Ok(None) => return SessionControl::Continue,
                Err(e) => {
                    warn!(session = %self.id, error = %e, "Malformed STOMP frame");
                    self.send_error(&e.to_string(), None);
                    self.state = SessionState::Closed;
                    return SessionControl::Close;
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: StompFrame) -> SessionControl {
        metrics::record_stomp_frame(frame.command.as_str());
        let receipt = frame.get_header(HEADER_RECEIPT).map(str::to_string);

        if self.state == SessionState::AwaitingConnect
            && !matches!(
                frame.command,
                StompCommand::Connect | StompCommand::Stomp | StompCommand::Disconnect
            )
        {
            warn!(session = %self.id, command = %frame.command, "STOMP frame before CONNECT");
            self.send_error("Session is not connected", receipt.as_deref());
            return SessionControl::Close;
        }

        let control = match frame.command {
            StompCommand::Connect | StompCommand::Stomp => self.on_connect(&frame),
            StompCommand::Subscribe => self.on_subscribe(&frame),
            StompCommand::Unsubscribe => self.on_unsubscribe(&frame),
            StompCommand::Send => self.on_send(&frame).await,
            StompCommand::Ack | StompCommand::Nack => {
                debug!(
                    session = %self.id,
                    command = %frame.command,
                    "STOMP acknowledgement ignored"
                );
                SessionControl::Continue
            }
            StompCommand::Disconnect => {
                info!(session = %self.id, "STOMP DISCONNECT");
                if let Some(receipt) = &receipt {
                    self.send_receipt(receipt);
                }
                return SessionControl::Close;
            }
            other => {
                warn!(session = %self.id, command = %other, "Unsupported STOMP command");
                self.send_error(
                    &format!("Unsupported STOMP command {}", other),
                    receipt.as_deref(),
                );
                return SessionControl::Close;
            }
        };

        if control == SessionControl::Continue
            && let Some(receipt) = &receipt
        {
            self.send_receipt(receipt);
        }
        control
    }

    fn on_connect(&mut self, frame: &StompFrame) -> SessionControl {
        let host = frame.get_header("host").unwrap_or_default();
        let accept_version = frame.get_header("accept-version").unwrap_or_default();
        info!(session = %self.id, host, accept_version, "STOMP {{{}}}", frame.command);

        if self.state == SessionState::Connected {
            self.send_error("Session is already connected", None);
            return SessionControl::Close;
        }

        let Some(version) = negotiate_version(frame.get_header("accept-version")) else {
            self.send_error(
                &format!(
                    "Supported protocol versions are {}",
                    SUPPORTED_VERSIONS.join(",")
                ),
                None,
            );
            return SessionControl::Close;
        };

        self.state = SessionState::Connected;
        let connected = StompFrame::new(StompCommand::Connected)
            .header("version", version)
            .header("heart-beat", "0,0")
            .header("server", format!("testfachdienst/{}", APP_VERSION))
            .header("session", self.id.clone());
        self.broker.send_frame(&self.id, connected);
        SessionControl::Continue
    }

    fn on_subscribe(&mut self, frame: &StompFrame) -> SessionControl {
        let (Some(destination), Some(id)) =
            (frame.get_header(HEADER_DESTINATION), frame.get_header(HEADER_ID))
        else {
            self.send_error(
                "SUBSCRIBE requires destination and id headers",
                frame.get_header(HEADER_RECEIPT),
            );
            return SessionControl::Close;
        };
        info!(session = %self.id, destination, id, "STOMP SUBSCRIBE");

        if !self.destinations.is_broker_destination(destination)
            && !self.destinations.is_user_destination(destination)
        {
            debug!(session = %self.id, destination, "Subscription outside broker prefixes");
        }
        self.broker.subscribe(&self.id, id, destination);
        SessionControl::Continue
    }

    fn on_unsubscribe(&mut self, frame: &StompFrame) -> SessionControl {
        let Some(id) = frame.get_header(HEADER_ID) else {
            self.send_error(
                "UNSUBSCRIBE requires an id header",
                frame.get_header(HEADER_RECEIPT),
            );
            return SessionControl::Close;
        };
        info!(session = %self.id, id, "STOMP UNSUBSCRIBE");
        self.broker.unsubscribe(&self.id, id);
        SessionControl::Continue
    }

    async fn on_send(&mut self, frame: &StompFrame) -> SessionControl {
        let Some(destination) = frame.get_header(HEADER_DESTINATION) else {
            self.send_error(
                "SEND requires a destination header",
                frame.get_header(HEADER_RECEIPT),
            );
            return SessionControl::Close;
        };
        info!(session = %self.id, destination, "STOMP SEND");

        if let Some(handler) = self.destinations.application_destination(destination) {
            self.controller.handle(&self.id, handler, &frame.body).await;
        } else if self.destinations.is_broker_destination(destination) {
            let content_type = frame
                .get_header(HEADER_CONTENT_TYPE)
                .unwrap_or("text/plain");
            self.broker.broadcast(destination, content_type, &frame.body);
        } else {
            debug!(session = %self.id, destination, "SEND to unknown destination ignored");
        }
        SessionControl::Continue
    }

    fn send_receipt(&self, receipt: &str) {
        let frame = StompFrame::new(StompCommand::Receipt).header(HEADER_RECEIPT_ID, receipt);
        self.broker.send_frame(&self.id, frame);
    }

    fn send_error(&self, message: &str, receipt: Option<&str>) {
        let mut frame = StompFrame::new(StompCommand::Error)
            .header("message", message)
            .header(HEADER_CONTENT_TYPE, "text/plain")
            .body(message.as_bytes().to_vec());
        if let Some(receipt) = receipt {
            frame = frame.header(HEADER_RECEIPT_ID, receipt);
        }
        self.broker.send_frame(&self.id, frame);
    }
}

/// Highest common protocol version; a missing header means STOMP 1.0
pub fn negotiate_version(accept_version: Option<&str>) -> Option<&'static str> {
    let Some(accepted) = accept_version else {
        return Some("1.0");
    };
    SUPPORTED_VERSIONS
        .into_iter()
        .find(|supported| accepted.split(',').any(|v| v.trim() == *supported))
}
