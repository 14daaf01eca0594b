//! Data models for sessions, profiles and shared events

mod event;
mod session;
mod user;

pub use event::*;
pub use session::*;
pub use user::*;
