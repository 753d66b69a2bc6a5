mod dispatch;
mod targets;

pub use dispatch::{execute, execute_with};
pub(crate) use dispatch::{drain_statement, open_session, run_statement};
pub use targets::{Direct, QueryTarget};
