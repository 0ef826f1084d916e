// Application layer - use cases and orchestration.
// Every operation takes a `Session` naming the user it acts for.

pub mod error;
pub mod reporting;
pub mod seed;
pub mod service;
pub mod session;

pub use error::*;
pub use reporting::*;
pub use seed::SAMPLE_USER_EMAIL;
pub use service::*;
pub use session::*;
