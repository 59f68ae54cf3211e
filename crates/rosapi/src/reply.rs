use std::fmt;

use rosapi_proto::Sentence;

use crate::error::{DeviceError, Error};
use crate::registry::Flow;

/// Data sentence marker.
pub(crate) const RE: &str = "!re";
/// Success terminal marker.
pub(crate) const DONE: &str = "!done";
/// Recoverable device error marker.
pub(crate) const TRAP: &str = "!trap";
/// Fatal device error marker.
pub(crate) const FATAL: &str = "!fatal";
/// Benign empty sentence marker, ignored per the API docs.
pub(crate) const EMPTY: &str = "!empty";

/// Accumulated result of one request/response exchange. Immutable once
/// the exchange completes.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    /// Data (`!re`) sentences in arrival order.
    pub re: Vec<Sentence>,
    /// The terminal `!done` sentence; absent when the exchange was cut
    /// short by a connection close.
    pub done: Option<Sentence>,
    /// Last recoverable device error reported before the terminal
    /// sentence. The exchange still completed; callers that care must
    /// check this alongside the data.
    pub trap: Option<DeviceError>,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for sentence in &self.re {
            writeln!(f, "{sentence}")?;
        }
        if let Some(done) = &self.done {
            write!(f, "{done}")?;
        }
        Ok(())
    }
}

/// Folds the sentences of one exchange into a [`Reply`].
///
/// State machine: *collecting* until a terminal sentence arrives. `!trap`
/// is recoverable: it is recorded and collection continues, because a
/// device may emit one or more traps before its terminal sentence.
/// `!fatal` and unrecognized first words finish the exchange immediately.
#[derive(Debug, Default)]
pub(crate) struct ReplyAssembler {
    reply: Reply,
}

impl ReplyAssembler {
    pub(crate) fn feed(&mut self, sentence: Sentence) -> Flow {
        match sentence.word.as_str() {
            RE => {
                self.reply.re.push(sentence);
                Flow::Continue
            }
            DONE => {
                self.reply.done = Some(sentence);
                Flow::Finish(None)
            }
            TRAP => {
                self.reply.trap = Some(DeviceError { sentence });
                Flow::Continue
            }
            FATAL => Flow::Finish(Some(Error::Device(DeviceError { sentence }))),
            "" | EMPTY => Flow::Continue,
            _ => Flow::Finish(Some(Error::UnknownReply(sentence))),
        }
    }

    /// Take the accumulated reply, leaving the assembler empty.
    pub(crate) fn take(&mut self) -> Reply {
        std::mem::take(&mut self.reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(words: &[&str]) -> Sentence {
        let mut buf = Vec::new();
        let mut writer = rosapi_proto::Writer::new(&mut buf);
        writer.write_sentence(words).unwrap();
        let mut reader = rosapi_proto::Reader::new(std::io::Cursor::new(buf));
        reader.read_sentence().unwrap()
    }

    #[test]
    fn data_then_done_completes() {
        let mut assembler = ReplyAssembler::default();
        assert!(matches!(
            assembler.feed(sentence(&["!re", "=address=1.2.3.4/32"])),
            Flow::Continue
        ));
        assert!(matches!(
            assembler.feed(sentence(&["!done"])),
            Flow::Finish(None)
        ));

        let reply = assembler.take();
        assert_eq!(
            reply.to_string(),
            "!re [{`address` `1.2.3.4/32`}]\n!done []"
        );
        assert!(reply.trap.is_none());
    }

    #[test]
    fn trap_then_done_completes_with_secondary_error() {
        let mut assembler = ReplyAssembler::default();
        assert!(matches!(
            assembler.feed(sentence(&["!trap", "=message=out of memory"])),
            Flow::Continue
        ));
        assert!(matches!(
            assembler.feed(sentence(&["!done"])),
            Flow::Finish(None)
        ));

        let reply = assembler.take();
        assert!(reply.done.is_some());
        assert_eq!(reply.trap.unwrap().message(), "out of memory");
    }

    #[test]
    fn later_trap_replaces_earlier_one() {
        let mut assembler = ReplyAssembler::default();
        assembler.feed(sentence(&["!trap", "=message=first"]));
        assembler.feed(sentence(&["!trap", "=message=second"]));
        assembler.feed(sentence(&["!done"]));

        let reply = assembler.take();
        assert_eq!(reply.trap.unwrap().message(), "second");
    }

    #[test]
    fn fatal_fails_immediately() {
        let mut assembler = ReplyAssembler::default();
        let flow = assembler.feed(sentence(&["!fatal", "=message=session terminated"]));
        match flow {
            Flow::Finish(Some(Error::Device(err))) => {
                assert_eq!(err.message(), "session terminated");
            }
            other => panic!("expected fatal device error, got {other:?}"),
        }
    }

    #[test]
    fn trap_without_message_synthesizes_one() {
        let mut assembler = ReplyAssembler::default();
        assembler.feed(sentence(&["!trap", "=some=unknown key"]));
        assembler.feed(sentence(&["!done"]));

        let reply = assembler.take();
        assert_eq!(
            reply.trap.unwrap().message(),
            "unknown error: !trap [{`some` `unknown key`}]"
        );
    }

    #[test]
    fn empty_sentences_ignored() {
        let mut assembler = ReplyAssembler::default();
        assert!(matches!(assembler.feed(sentence(&[])), Flow::Continue));
        assert!(matches!(
            assembler.feed(sentence(&["!empty"])),
            Flow::Continue
        ));
        assert!(matches!(
            assembler.feed(sentence(&["!done"])),
            Flow::Finish(None)
        ));
    }

    #[test]
    fn unknown_word_fails_naming_it() {
        let mut assembler = ReplyAssembler::default();
        let flow = assembler.feed(sentence(&["!xxx"]));
        match flow {
            Flow::Finish(Some(Error::UnknownReply(sen))) => {
                assert_eq!(sen.word, "!xxx");
            }
            other => panic!("expected unknown reply error, got {other:?}"),
        }
    }
}
