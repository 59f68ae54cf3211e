//! Wire framing and sentence model for the RouterOS API protocol.
//!
//! Every unit on the wire is a *word*: a self-describing big-endian length
//! prefix followed by that many raw bytes. A *sentence* is a run of words
//! terminated by an empty word. This crate frames and parses those and
//! nothing more; reply semantics and request routing live in the `rosapi`
//! crate.

pub mod codec;
pub mod error;
pub mod reader;
pub mod sentence;
pub mod writer;

pub use codec::{encode_length, DEFAULT_MAX_WORD};
pub use error::{ProtoError, Result};
pub use reader::Reader;
pub use sentence::{Pair, Sentence};
pub use writer::Writer;
