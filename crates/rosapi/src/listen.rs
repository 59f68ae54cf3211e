//! Long-lived listen streams: subscription-style commands that keep
//! producing data sentences until cancelled.

use std::sync::{mpsc, Arc, Mutex};

use tracing::debug;

use rosapi_proto::Sentence;

use crate::client::{lock, Client};
use crate::error::{DeviceError, Error, Result};
use crate::registry::{Exchange, Flow};
use crate::reply::{self, Reply};

/// Handle for one open listen stream.
///
/// Data sentences arrive on a bounded queue and are consumed with
/// [`Listener::recv`] or [`Listener::iter`] until the device finishes the
/// stream or the connection goes down. The queue is single-pass: a
/// sentence handed out is gone.
///
/// The handle is shareable so one thread can consume while another calls
/// [`Listener::cancel`]; the queue itself still has single-consumer
/// semantics.
pub struct Listener<'a> {
    client: &'a Client,
    tag: String,
    rx: Mutex<mpsc::Receiver<Sentence>>,
    state: Arc<Mutex<ListenState>>,
}

#[derive(Default)]
struct ListenState {
    done: Option<Sentence>,
    err: Option<Error>,
}

impl Client {
    /// Start a listen command with the connection's default queue
    /// capacity.
    ///
    /// Enables concurrent mode if it is not active yet.
    pub fn listen<I, S>(&self, words: I) -> Result<Listener<'_>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.listen_queue(words, self.shared.queue)
    }

    /// Start a listen command with an explicit delivery queue capacity.
    ///
    /// The dispatcher blocks while the queue is full. That backpressure is
    /// deliberate: there is only one dispatch thread, so a slow consumer
    /// throttles every exchange sharing the connection.
    pub fn listen_queue<I, S>(&self, words: I, queue: usize) -> Result<Listener<'_>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: Vec<String> = words
            .into_iter()
            .map(|word| word.as_ref().to_string())
            .collect();
        debug!(?words, "listen");

        if !self.is_async() {
            match self.start_async() {
                Ok(_) => {}
                // Another caller won the race; the loop is running.
                Err(Error::AlreadyAsync) => {}
                Err(err) => return Err(err),
            }
        }

        let tag = format!("l{}", self.next_tag());
        words.push(format!(".tag={tag}"));

        let (tx, rx) = mpsc::sync_channel(queue);
        let state = Arc::new(Mutex::new(ListenState::default()));
        let exchange = Box::new(ListenExchange {
            tx,
            state: Arc::clone(&state),
        });
        self.shared
            .registry
            .send_and_register(&tag, exchange, || self.write_sentence(&words))?;
        debug!(%tag, "registered listen stream");

        Ok(Listener {
            client: self,
            tag,
            rx: Mutex::new(rx),
            state,
        })
    }
}

impl Listener<'_> {
    /// Tag identifying this stream on the connection.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Receive the next data sentence, blocking on an empty queue.
    /// Returns `None` once the stream has ended.
    pub fn recv(&self) -> Option<Sentence> {
        lock(&self.rx).recv().ok()
    }

    /// Iterate over data sentences until the stream ends.
    pub fn iter(&self) -> impl Iterator<Item = Sentence> + '_ {
        std::iter::from_fn(move || self.recv())
    }

    /// Ask the device to stop producing and finish this stream.
    ///
    /// Sends the protocol's `/cancel` command carrying this stream's tag,
    /// as an ordinary request under a tag of its own. The stream itself
    /// ends when the device answers with its terminal sentence.
    pub fn cancel(&self) -> Result<Reply> {
        self.client
            .run(vec!["/cancel".to_string(), format!("=tag={}", self.tag)])
    }

    /// The terminal sentence that ended the stream, once delivery is over.
    pub fn done(&self) -> Option<Sentence> {
        lock(&self.state).done.clone()
    }

    /// The error that ended the stream, if any. Cancellation is not an
    /// error: a cancelled stream ends with a terminal sentence instead.
    pub fn err(&self) -> Option<Error> {
        lock(&self.state).err.clone()
    }
}

/// Registry-side half of a listen stream: pushes data sentences onto the
/// bounded queue and records the terminal state.
struct ListenExchange {
    tx: mpsc::SyncSender<Sentence>,
    state: Arc<Mutex<ListenState>>,
}

impl Exchange for ListenExchange {
    fn process_sentence(&mut self, sentence: Sentence) -> Flow {
        match sentence.word.as_str() {
            reply::RE => {
                // Blocks while the queue is full; a vanished consumer just
                // discards the sentence.
                let _ = self.tx.send(sentence);
                Flow::Continue
            }
            reply::DONE => {
                lock(&self.state).done = Some(sentence);
                Flow::Finish(None)
            }
            // Category 2 is "execution of command interrupted": the
            // acknowledgement of /cancel, a clean end rather than an error.
            reply::TRAP if sentence.get("category") == Some("2") => {
                lock(&self.state).done = Some(sentence);
                Flow::Finish(None)
            }
            reply::TRAP | reply::FATAL => {
                Flow::Finish(Some(Error::Device(DeviceError { sentence })))
            }
            "" | reply::EMPTY => Flow::Continue,
            _ => Flow::Finish(Some(Error::UnknownReply(sentence))),
        }
    }

    fn close(&mut self, err: Option<Error>) {
        lock(&self.state).err = err;
        // Dropping the exchange drops `tx`, which wakes and ends the
        // consumer's iteration.
    }
}
