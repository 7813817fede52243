//! WebSocket handshake and connection loop for STOMP clients

use actix_web::http::header::{self, HeaderValue};
use actix_web::{HttpRequest, HttpResponse, get, web};
use actix_ws::{AggregatedMessage, CloseCode, CloseReason, Closed, Session};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::model::app_state::AppState;
use crate::ws::broker::{QUEUE_OVERFLOW_MESSAGE, queue_overflow_frame};
use crate::ws::frame::StompFrame;
use crate::ws::session::{SessionControl, StompSession};

/// STOMP sub-protocols in order of preference
pub const STOMP_SUBPROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> &'a str {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// Pick the preferred STOMP sub-protocol offered by the client
pub fn negotiate_subprotocol(offered: Option<&str>) -> Option<&'static str> {
    let offered = offered?;
    STOMP_SUBPROTOCOLS
        .into_iter()
        .find(|p| offered.split(',').any(|o| o.trim().eq_ignore_ascii_case(p)))
}

fn log_handshake(req: &HttpRequest) {
    info!(
        uri = %req.uri(),
        remote = ?req.peer_addr(),
        host = header_str(req, "host"),
        x_forwarded_for = header_str(req, "x-forwarded-for"),
        x_forwarded_proto = header_str(req, "x-forwarded-proto"),
        origin = header_str(req, "origin"),
        protocol = header_str(req, "sec-websocket-protocol"),
        extensions = header_str(req, "sec-websocket-extensions"),
        version = header_str(req, "sec-websocket-version"),
        "WS handshake start"
    );
}

/// Frames go out as text messages unless the body is not valid UTF-8
async fn send_frame(ws: &mut Session, frame: &StompFrame) -> Result<(), Closed> {
    match String::from_utf8(frame.encode()) {
        Ok(text) => ws.text(text).await,
        Err(e) => ws.binary(e.into_bytes()).await,
    }
}

#[get("/ws")]
pub async fn stomp_endpoint(
    req: HttpRequest,
    body: web::Payload,
    data: web::Data<AppState>,
) -> actix_web::Result<HttpResponse> {
    log_handshake(&req);

    let subprotocol = negotiate_subprotocol(
        req.headers()
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok()),
    );

    let (mut response, mut ws, stream) = match actix_ws::handle(&req, body) {
        Ok(parts) => parts,
        Err(e) => {
            warn!(uri = %req.uri(), error = %e, "WS handshake failed");
            return Err(e);
        }
    };
    if let Some(protocol) = subprotocol {
        response.headers_mut().insert(
            header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(protocol),
        );
    }
    info!(uri = %req.uri(), status = response.status().as_u16(), "WS handshake success");

    let session_id = uuid::Uuid::new_v4().to_string();
    let mut outbound = data.broker.register_session(&session_id);
    let mut session = StompSession::new(
        session_id.clone(),
        data.broker.clone(),
        data.destinations.clone(),
        data.ws_controller.clone(),
    );
    let broker = data.broker.clone();
    info!(id = %session_id, protocol = subprotocol.unwrap_or("-"), "WS session established");

    let mut stream = stream.aggregate_continuations();

    actix_web::rt::spawn(async move {
        let mut close_reason: Option<CloseReason> = None;

        loop {
            tokio::select! {
                queued = outbound.recv() => {
                    let Some(frame) = queued else {
                        // the broker evicted this session for a full queue
                        let _ = send_frame(&mut ws, &queue_overflow_frame()).await;
                        close_reason = Some(CloseReason {
                            code: CloseCode::Policy,
                            description: Some(QUEUE_OVERFLOW_MESSAGE.to_string()),
                        });
                        break;
                    };
                    if send_frame(&mut ws, &frame).await.is_err() {
                        break;
                    }
                }
                incoming = stream.next() => {
                    let control = match incoming {
                        Some(Ok(AggregatedMessage::Text(text))) => {
                            session.on_message(text.as_bytes()).await
                        }
                        Some(Ok(AggregatedMessage::Binary(bin))) => {
                            session.on_message(&bin).await
                        }
                        Some(Ok(AggregatedMessage::Ping(bytes))) => {
                            if ws.pong(&bytes).await.is_err() {
                                SessionControl::Close
                            } else {
                                SessionControl::Continue
                            }
                        }
                        Some(Ok(AggregatedMessage::Pong(_))) => SessionControl::Continue,
                        Some(Ok(AggregatedMessage::Close(reason))) => {
                            close_reason = reason;
                            SessionControl::Close
                        }
                        Some(Err(e)) => {
                            warn!(id = %session.id(), error = %e, "WS protocol error");
                            close_reason = Some(CloseReason {
                                code: CloseCode::Protocol,
                                description: Some(e.to_string()),
                            });
                            SessionControl::Close
                        }
                        None => SessionControl::Close,
                    };
                    if control == SessionControl::Close {
                        break;
                    }
                }
            }
        }

        // flush ERROR and RECEIPT frames produced by the last message
        while let Ok(frame) = outbound.try_recv() {
            if send_frame(&mut ws, &frame).await.is_err() {
                break;
            }
        }
        broker.unregister_session(session.id());

        let code = close_reason
            .as_ref()
            .map(|r| u16::from(r.code))
            .unwrap_or(1000);
        let reason = close_reason
            .as_ref()
            .and_then(|r| r.description.clone())
            .unwrap_or_default();
        let _ = ws
            .close(close_reason.or(Some(CloseCode::Normal.into())))
            .await;
        info!(id = %session.id(), code, reason = %reason, "WS session closed");
    });

    debug!("WS connection task spawned");
    Ok(response)
}
