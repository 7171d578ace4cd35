//! Request and response snapshots.
//!
//! These are the data structures the external request pipeline hands to the
//! scripting runtime. They are read-only from a script's point of view.

pub mod request;
pub mod response;

pub use request::{find_header, Header, HttpMethod, RequestSnapshot};
pub use response::ResponseSnapshot;
