//! Signed client for the Dislo export API.
//!
//! Every request carries an HMAC-SHA512 signature over its path, query
//! string and body; every response is checked for algorithm, signature and
//! timestamp freshness before its CSV body is turned into records.

pub mod clock;
pub mod config;
pub mod decode;
pub mod error;
pub mod export;
pub mod protocol;
pub mod signer;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ApiSecret, ClientConfig, Credentials};
pub use decode::{decode_records, parse_rows, Record};
pub use error::{Error, ProtocolError, Result, TransportError};
pub use export::{ExportClient, ExportOptions};
pub use protocol::QueryHandler;
pub use transport::{HttpRequest, ReqwestTransport, Transport};
