//! Client for the MikroTik RouterOS binary API.
//!
//! One [`Client`] owns one stream connection to a device. Commands are
//! sentences (framed word lists, see [`rosapi_proto`]); each command's
//! reply sentences are folded into a [`Reply`]. Before
//! [`Client::start_async`] the calling thread reads its own reply; after
//! it, a dedicated dispatch thread owns the read side and any number of
//! threads may run requests or open [`Listener`] streams concurrently,
//! correlated by per-exchange tags.
//!
//! ```no_run
//! # fn main() -> rosapi::Result<()> {
//! let client = rosapi::Client::connect("192.168.88.1:8728", "admin", "secret")?;
//! let reply = client.run(["/system/resource/print"])?;
//! for sentence in &reply.re {
//!     println!("{sentence}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod listen;
pub mod query;
pub mod reply;
pub mod transport;

mod registry;

pub use client::{Client, ClientConfig};
pub use error::{DeviceError, Error, Result};
pub use listen::Listener;
pub use query::Query;
pub use reply::Reply;
pub use transport::Stream;

pub use rosapi_proto as proto;
pub use rosapi_proto::{Pair, Sentence};
