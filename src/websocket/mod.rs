mod handler;
mod message;

pub use handler::ws_handler;
pub use message::{
    events, format, format_payload, Envelope, ErrorPayload, ReconnectPayload, RoomPayload,
    SessionRestoredPayload, TagsPayload, WelcomePayload,
};
