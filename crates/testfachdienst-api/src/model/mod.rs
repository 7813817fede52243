//! API model types

mod erezept;
mod hello;
mod ws;

pub use erezept::{Erezept, ErezeptStatus};
pub use hello::{HelloZetaResource, JobInfo};
pub use ws::{DeleteConfirmation, WebSocketErrorResponse};
