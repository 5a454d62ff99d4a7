pub mod backoff;
pub mod env;
pub mod request_id;

pub use backoff::Backoff;
pub use request_id::RequestId;
