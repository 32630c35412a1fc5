mod app;
mod chat;
mod state;

pub use app::create_app;
pub use chat::register_chat_handlers;
pub use state::AppState;
