pub mod emitter;
pub mod record;

pub use emitter::LogEmitter;
pub use record::{
    preview_body, preview_request_body, EventType, HttpLogData, Labels, LogLevel, LogPush, LogStream,
    OPAQUE_BODY, STREAM_BODY,
};
