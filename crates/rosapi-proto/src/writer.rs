use std::io::Write;

use bytes::{BufMut, BytesMut};

use crate::codec::encode_length;
use crate::error::{ProtoError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes whole sentences to any `Write` stream.
///
/// A sentence is encoded into one buffer and emitted with a single
/// `write_all`, so any caller that serializes calls to this writer gets
/// atomic sentences on the wire. The wire format has no other message
/// boundary marker, so interleaving two sentences' bytes would corrupt
/// the stream.
pub struct Writer<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and send one sentence: every word plus the empty terminator.
    pub fn write_sentence<I, S>(&mut self, words: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.buf.clear();
        for word in words {
            encode_word(word.as_ref().as_bytes(), &mut self.buf)?;
        }
        self.buf.put_u8(0);
        self.inner.write_all(&self.buf)?;
        self.inner.flush()?;
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

fn encode_word(word: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(word.len()).map_err(|_| ProtoError::WordTooLong {
        len: word.len(),
        max: u32::MAX as usize,
    })?;
    encode_length(len, dst);
    dst.put_slice(word);
    Ok(())
}
