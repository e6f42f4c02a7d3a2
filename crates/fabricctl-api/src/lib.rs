// fabricctl-api: Async session client for the fabric controller REST API

pub mod credentials;
pub mod error;
pub mod request;
pub mod session;
pub mod transport;

pub use credentials::{CredentialSource, Credentials, NoPrompt};
pub use error::Error;
pub use request::{ApiRequest, ApiResponse};
pub use reqwest::Method;
pub use session::{Session, TOKEN_HEADER};
pub use transport::{RetryPolicy, TlsMode, TransportConfig};
