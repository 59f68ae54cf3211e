use std::io::{BufReader, ErrorKind, Read};

use crate::codec::{decode_length, prefix_extra, DEFAULT_MAX_WORD};
use crate::error::{ProtoError, Result};
use crate::sentence::Sentence;

/// Reads framed words and whole sentences from any `Read` stream.
///
/// Callers always get complete sentences; partial reads are handled
/// internally.
pub struct Reader<R> {
    inner: BufReader<R>,
    max_word: usize,
}

impl<R: Read> Reader<R> {
    /// Create a reader with the default word length cap.
    pub fn new(inner: R) -> Self {
        Self::with_max_word(inner, DEFAULT_MAX_WORD)
    }

    /// Create a reader with an explicit cap on accepted word length.
    pub fn with_max_word(inner: R, max_word: usize) -> Self {
        Self {
            inner: BufReader::new(inner),
            max_word,
        }
    }

    /// Read the next sentence (blocking).
    ///
    /// Returns [`ProtoError::ConnectionClosed`] when the stream ends at a
    /// word boundary and [`ProtoError::Truncated`] when it ends inside a
    /// length prefix or word body.
    pub fn read_sentence(&mut self) -> Result<Sentence> {
        let mut sentence = Sentence::default();
        let mut index = 0;
        loop {
            match self.read_word()? {
                Some(word) => {
                    sentence.push_word(index, &word);
                    index += 1;
                }
                None => return Ok(sentence),
            }
        }
    }

    /// Read one word; `None` is the sentence terminator (empty word).
    fn read_word(&mut self) -> Result<Option<String>> {
        let len = self.read_length()? as usize;
        if len == 0 {
            return Ok(None);
        }
        if len > self.max_word {
            return Err(ProtoError::WordTooLong {
                len,
                max: self.max_word,
            });
        }
        let mut buf = vec![0u8; len];
        self.read_exact_or_truncated(&mut buf)?;
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    fn read_length(&mut self) -> Result<u32> {
        let mut first = [0u8; 1];
        if let Err(err) = self.inner.read_exact(&mut first) {
            // EOF while expecting a prefix is a clean end of stream.
            return Err(if err.kind() == ErrorKind::UnexpectedEof {
                ProtoError::ConnectionClosed
            } else {
                err.into()
            });
        }
        let extra = prefix_extra(first[0])?;
        let mut rest = [0u8; 4];
        self.read_exact_or_truncated(&mut rest[..extra])?;
        Ok(decode_length(first[0], &rest[..extra]))
    }

    fn read_exact_or_truncated(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|err| {
            if err.kind() == ErrorKind::UnexpectedEof {
                ProtoError::Truncated
            } else {
                err.into()
            }
        })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Consume the reader and return the inner stream.
    ///
    /// Any buffered but unparsed bytes are discarded.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::encode_length;

    fn wire(words: &[&str]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for word in words {
            encode_length(word.len() as u32, &mut buf);
            buf.put_slice(word.as_bytes());
        }
        buf.put_u8(0);
        buf.to_vec()
    }

    #[test]
    fn read_single_sentence() {
        let mut reader = Reader::new(Cursor::new(wire(&["!done"])));
        let sen = reader.read_sentence().unwrap();
        assert_eq!(sen.word, "!done");
        assert!(sen.list.is_empty());
    }

    #[test]
    fn read_sentence_with_tag_and_attributes() {
        let mut reader = Reader::new(Cursor::new(wire(&[
            "!re",
            "=address=1.2.3.4/32",
            ".tag=l1",
        ])));
        let sen = reader.read_sentence().unwrap();
        assert_eq!(sen.tag, "l1");
        assert_eq!(sen.get("address"), Some("1.2.3.4/32"));
    }

    #[test]
    fn read_empty_sentence() {
        let mut reader = Reader::new(Cursor::new(vec![0u8]));
        let sen = reader.read_sentence().unwrap();
        assert!(sen.word.is_empty());
        assert!(sen.list.is_empty());
    }

    #[test]
    fn eof_before_sentence_is_connection_closed() {
        let mut reader = Reader::new(Cursor::new(Vec::<u8>::new()));
        let err = reader.read_sentence().unwrap_err();
        assert!(matches!(err, ProtoError::ConnectionClosed));
    }

    #[test]
    fn eof_between_words_is_connection_closed() {
        let mut bytes = wire(&["!re"]);
        bytes.pop(); // drop the terminator
        let mut reader = Reader::new(Cursor::new(bytes));
        let err = reader.read_sentence().unwrap_err();
        assert!(matches!(err, ProtoError::ConnectionClosed));
    }

    #[test]
    fn eof_mid_word_is_truncated() {
        let mut bytes = wire(&["!done"]);
        bytes.truncate(3); // prefix plus two body bytes
        let mut reader = Reader::new(Cursor::new(bytes));
        let err = reader.read_sentence().unwrap_err();
        assert!(matches!(err, ProtoError::Truncated));
    }

    #[test]
    fn eof_mid_prefix_is_truncated() {
        let mut reader = Reader::new(Cursor::new(vec![0x80u8]));
        let err = reader.read_sentence().unwrap_err();
        assert!(matches!(err, ProtoError::Truncated));
    }

    #[test]
    fn reserved_prefix_byte_rejected() {
        let mut reader = Reader::new(Cursor::new(vec![0xF9u8, 0, 0, 0, 0]));
        let err = reader.read_sentence().unwrap_err();
        assert!(matches!(err, ProtoError::ReservedLength(0xF9)));
    }

    #[test]
    fn oversized_word_rejected() {
        let mut reader = Reader::with_max_word(Cursor::new(wire(&["too-long"])), 4);
        let err = reader.read_sentence().unwrap_err();
        assert!(matches!(err, ProtoError::WordTooLong { len: 8, max: 4 }));
    }

    #[test]
    fn byte_by_byte_reads_assemble_a_sentence() {
        struct ByteByByte {
            bytes: Vec<u8>,
            pos: usize,
        }

        impl Read for ByteByByte {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.pos >= self.bytes.len() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.bytes[self.pos];
                self.pos += 1;
                Ok(1)
            }
        }

        let mut reader = Reader::new(ByteByByte {
            bytes: wire(&["!re", "=name=value"]),
            pos: 0,
        });
        let sen = reader.read_sentence().unwrap();
        assert_eq!(sen.word, "!re");
        assert_eq!(sen.get("name"), Some("value"));
    }
}
