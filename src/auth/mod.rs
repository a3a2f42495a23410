//! Session state, sign-in and the 401 recovery path.

pub mod authenticator;
pub mod service;
pub mod session;
pub mod validator;

pub use authenticator::Authenticator;
pub use service::AuthService;
pub use session::Session;
