//! View-model types consumed by the rest of the application.

pub mod session;
pub mod user;

pub use session::SessionState;
pub use user::User;
