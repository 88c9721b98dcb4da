pub mod fetch;
pub mod pending;

pub use fetch::{FetchError, FetchResult, HttpTransport, MockTransport, Transport};
pub use pending::{Fenced, Fetcher, Pending, Poll};
