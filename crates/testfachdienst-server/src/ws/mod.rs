//! STOMP over WebSocket
//!
//! Frame codec, in-memory broker, per-connection sessions and the
//! prescription application handlers.

pub mod broker;
pub mod controller;
pub mod destinations;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod session;

pub use broker::{QUEUE_OVERFLOW_MESSAGE, StompBroker, queue_overflow_frame};
pub use controller::ErezeptWsController;
pub use destinations::{EREZEPT_REPLY_QUEUE, EREZEPT_TOPIC, StompDestinations};
pub use endpoint::stomp_endpoint;
pub use error::WsError;
pub use frame::{FrameDecoder, FrameError, StompCommand, StompFrame};
pub use session::{SessionControl, StompSession};
