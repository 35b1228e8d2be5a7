mod client;
mod status;

pub use crate::wpt::client::{TestRequest, TestService, WptClient};
pub use crate::wpt::status::TestStatus;
