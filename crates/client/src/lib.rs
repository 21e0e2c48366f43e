pub mod client;
pub mod error;
pub mod transport;

pub use client::{DeleteOutcome, TimeTrackingClient};
pub use error::ApiError;
pub use transport::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, ScriptedTransport,
    TransportError,
};
