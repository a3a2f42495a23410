pub mod context;
pub mod error;
pub mod events;

pub use context::AppContext;
pub use error::{CoursewareError, Result};
pub use events::{AppEvent, Notifier};
