//! Physical transport: the injected capability that performs network
//! I/O, plus its response and error types.

mod http;
mod types;

pub use http::{ReqwestTransport, Transport};
pub use types::{Response, TransportError};

#[cfg(test)]
pub use http::tests::MockTransport;
