/// In-memory session driver
pub mod mock;
mod script;
pub mod test_helpers;

pub use mock::{IssuedRequest, MockConnector, MockReply, MockServer, MockSession};
pub use test_helpers::{create_test_row, test_config};
