//! Connection handle, request path and the dispatch loop.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use md5::{Digest, Md5};
use tracing::{debug, warn};

use rosapi_proto::{Reader, Writer};

use crate::error::{Error, Result};
use crate::registry::{Exchange, Flow, Registry};
use crate::reply::{Reply, ReplyAssembler};
use crate::transport::Stream;

/// Lock a mutex, tolerating poisoning: the protected state stays usable
/// even if a panicking thread held the guard.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection-level configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default capacity of listen delivery queues. `0` means rendezvous:
    /// the dispatcher hands each data sentence directly to a waiting
    /// consumer.
    pub queue: usize,
    /// Maximum accepted inbound word length.
    pub max_word_len: usize,
    /// Read deadline on the underlying stream. The read side is shared by
    /// every exchange once concurrent mode is on, so expiry aborts the
    /// dispatch loop and tears down the whole connection, not just one
    /// exchange.
    pub read_timeout: Option<Duration>,
    /// Write deadline on the underlying stream.
    pub write_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            queue: 0,
            max_word_len: rosapi_proto::DEFAULT_MAX_WORD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) registry: Registry,
    writer: Mutex<Writer<Box<dyn Stream>>>,
    control: Box<dyn Stream>,
    closing: AtomicBool,
    next_tag: AtomicU64,
    pub(crate) queue: usize,
}

/// A RouterOS API client over one stream connection.
///
/// All methods take `&self`; a client can be shared across threads. Until
/// [`Client::start_async`] the calling thread performs both the write and
/// the read for its own request. Afterwards a dedicated dispatch thread
/// owns the read side and routes reply sentences to their exchanges by
/// tag, so any number of threads may run requests and listen streams
/// concurrently.
pub struct Client {
    pub(crate) shared: Arc<Shared>,
    reader: Mutex<Option<Reader<Box<dyn Stream>>>>,
}

impl Client {
    /// Wrap an already connected stream. Login must be called separately.
    pub fn new<S: Stream + 'static>(stream: S) -> Result<Self> {
        Self::with_config(stream, ClientConfig::default())
    }

    /// Wrap an already connected stream with explicit configuration.
    pub fn with_config<S: Stream + 'static>(stream: S, config: ClientConfig) -> Result<Self> {
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        let read_half = stream.try_clone()?;
        let write_half = stream.try_clone()?;
        Ok(Self {
            shared: Arc::new(Shared {
                registry: Registry::new(),
                writer: Mutex::new(Writer::new(write_half)),
                control: Box::new(stream),
                closing: AtomicBool::new(false),
                next_tag: AtomicU64::new(0),
                queue: config.queue,
            }),
            reader: Mutex::new(Some(Reader::with_max_word(read_half, config.max_word_len))),
        })
    }

    /// Connect over TCP and log in.
    pub fn connect(
        address: impl ToSocketAddrs,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let stream = TcpStream::connect(address)?;
        let client = Self::new(stream)?;
        client.login(username, password)?;
        Ok(client)
    }

    /// Connect over TCP with a dial timeout, then log in. The timeout is
    /// also installed as the connection's read and write deadline.
    pub fn connect_timeout(
        address: &SocketAddr,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let stream = TcpStream::connect_timeout(address, timeout)?;
        let client = Self::with_config(
            stream,
            ClientConfig {
                read_timeout: Some(timeout),
                write_timeout: Some(timeout),
                ..ClientConfig::default()
            },
        )?;
        client.login(username, password)?;
        Ok(client)
    }

    /// Whether concurrent mode has been enabled on this connection.
    pub fn is_async(&self) -> bool {
        self.shared.registry.is_async()
    }

    /// Enable concurrent mode: a dedicated thread takes over the read side
    /// and routes replies by tag until the connection fails or closes.
    ///
    /// Returns the channel on which a non-local loop failure is delivered;
    /// it is simply dropped when the loop ends through a deliberate
    /// [`Client::close`]. A second call fails with
    /// [`Error::AlreadyAsync`] and does not disturb the running loop.
    pub fn start_async(&self) -> Result<mpsc::Receiver<Error>> {
        self.shared.registry.start()?;
        let Some(reader) = lock(&self.reader).take() else {
            return Err(Error::AlreadyAsync);
        };

        let (err_tx, err_rx) = mpsc::sync_channel(1);
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("rosapi-dispatch".to_string())
            .spawn(move || dispatch_loop(&shared, reader, &err_tx));

        if let Err(err) = spawned {
            // The loop never ran; fail outstanding-registration attempts
            // fast rather than leaving the registry open with no reader.
            self.shared.registry.close_all();
            return Err(err.into());
        }
        debug!("concurrent mode started");
        Ok(err_rx)
    }

    /// Send one command sentence and wait for its full reply.
    ///
    /// The first word is the command path; later words are attribute or
    /// query words. A recoverable `!trap` followed by `!done` still
    /// succeeds, with the trap available on [`Reply::trap`].
    pub fn run<I, S>(&self, words: I) -> Result<Reply>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|word| word.as_ref().to_string())
            .collect();
        debug!(?words, "run");
        if self.is_async() {
            self.run_tagged(words)
        } else {
            self.run_inline(words)
        }
    }

    /// Pre-dispatcher path: this thread owns the whole connection, so it
    /// performs the read loop for its own reply inline.
    fn run_inline(&self, words: Vec<String>) -> Result<Reply> {
        let mut guard = lock(&self.reader);
        let Some(reader) = guard.as_mut() else {
            // Concurrent mode raced in after the is_async check.
            drop(guard);
            return self.run_tagged(words);
        };
        self.write_sentence(&words)?;

        let mut assembler = ReplyAssembler::default();
        loop {
            let sentence = reader.read_sentence()?;
            match assembler.feed(sentence) {
                Flow::Continue => {}
                Flow::Finish(None) => return Ok(assembler.take()),
                Flow::Finish(Some(err)) => return Err(err),
            }
        }
    }

    /// Concurrent path: tag the sentence, register a one-shot exchange and
    /// block until the dispatcher resolves it.
    fn run_tagged(&self, mut words: Vec<String>) -> Result<Reply> {
        let tag = format!("r{}", self.next_tag());
        words.push(format!(".tag={tag}"));

        let (tx, rx) = mpsc::sync_channel(1);
        let exchange = Box::new(RequestExchange {
            assembler: ReplyAssembler::default(),
            tx,
        });
        self.shared
            .registry
            .send_and_register(&tag, exchange, || self.write_sentence(&words))?;
        debug!(%tag, "registered request");

        rx.recv().unwrap_or(Err(Error::AsyncLoopEnded))
    }

    /// Log in, handling both current and pre-6.43 firmware.
    ///
    /// Credentials go in the first `/login` sentence; if the device
    /// answers with a `ret` challenge, the legacy MD5 response is sent in
    /// a second one.
    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        debug!(%username, "login");
        let reply = self.run(vec![
            "/login".to_string(),
            format!("=name={username}"),
            format!("=password={password}"),
        ])?;
        if let Some(trap) = reply.trap {
            return Err(Error::Device(trap));
        }
        let done = reply
            .done
            .as_ref()
            .ok_or_else(|| Error::Login("no terminal sentence received".to_string()))?;

        let Some(challenge_hex) = done.get("ret") else {
            return Ok(());
        };
        let challenge = decode_hex(challenge_hex).ok_or_else(|| {
            Error::Login(format!("invalid challenge hex string: {challenge_hex}"))
        })?;

        let reply = self.run(vec![
            "/login".to_string(),
            format!("=name={username}"),
            format!("=response={}", challenge_response(&challenge, password)),
        ])?;
        if let Some(trap) = reply.trap {
            return Err(Error::Device(trap));
        }
        Ok(())
    }

    /// Close the connection. Idempotent: a second call is a no-op.
    ///
    /// Outstanding exchanges are completed without an error; their replies
    /// carry whatever data had arrived.
    pub fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing connection");
        if let Err(err) = self.shared.control.shutdown() {
            debug!(%err, "shutdown during close");
        }
    }

    pub(crate) fn next_tag(&self) -> u64 {
        self.shared.next_tag.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Emit one sentence. The writer lock makes the sentence atomic with
    /// respect to other writers on this connection.
    pub(crate) fn write_sentence(&self, words: &[String]) -> Result<()> {
        lock(&self.shared.writer)
            .write_sentence(words)
            .map_err(Error::from)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// One-shot request exchange: collects a full reply, then signals the
/// caller blocked in `run_tagged` exactly once.
struct RequestExchange {
    assembler: ReplyAssembler,
    tx: mpsc::SyncSender<Result<Reply>>,
}

impl Exchange for RequestExchange {
    fn process_sentence(&mut self, sentence: rosapi_proto::Sentence) -> Flow {
        self.assembler.feed(sentence)
    }

    fn close(&mut self, err: Option<Error>) {
        let result = match err {
            Some(err) => Err(err),
            None => Ok(self.assembler.take()),
        };
        let _ = self.tx.try_send(result);
    }
}

/// The dispatch loop: sole owner of the read side for the rest of the
/// connection's life. Reads one sentence at a time and routes it by tag;
/// unknown tags are dropped, since replies to already-completed or
/// cancelled exchanges may still be in flight.
fn dispatch_loop(
    shared: &Shared,
    mut reader: Reader<Box<dyn Stream>>,
    err_tx: &mpsc::SyncSender<Error>,
) {
    let err = loop {
        let sentence = match reader.read_sentence() {
            Ok(sentence) => sentence,
            Err(err) => break err,
        };

        let tag = sentence.tag.clone();
        let Some(mut exchange) = shared.registry.remove(&tag) else {
            continue;
        };
        match exchange.process_sentence(sentence) {
            Flow::Continue => shared.registry.reinsert(tag, exchange),
            Flow::Finish(err) => {
                debug!(%tag, "exchange finished");
                exchange.close(err);
            }
        }
    };

    // A deliberate local close is not a failure: exchanges complete with
    // whatever they have and no error is reported.
    let deliberate = shared.closing.load(Ordering::SeqCst);
    let close_err = if deliberate {
        None
    } else {
        Some(Error::Proto(err.clone()))
    };
    for mut exchange in shared.registry.close_all() {
        exchange.close(close_err.clone());
    }
    if deliberate {
        debug!("dispatch loop ended by local close");
    } else {
        warn!(%err, "dispatch loop ended");
        let _ = err_tx.try_send(Error::Proto(err));
    }
}

/// Legacy challenge response: `"00"` + hex MD5 of a zero byte, the
/// password, and the binary challenge.
fn challenge_response(challenge: &[u8], password: &str) -> String {
    use std::fmt::Write as _;

    let mut hasher = Md5::new();
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.update(challenge);

    let mut response = String::with_capacity(34);
    response.push_str("00");
    for byte in hasher.finalize() {
        let _ = write!(response, "{byte:02x}");
    }
    response
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    fn nibble(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = hex.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes
        .chunks(2)
        .map(|pair| Some(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_response_matches_known_vector() {
        // Vector observed against a pre-6.43 device: user "userTest",
        // password "passTest", challenge hex "abc123".
        let challenge = decode_hex("abc123").unwrap();
        assert_eq!(
            challenge_response(&challenge, "passTest"),
            "0021277bff9ac7caf06aa608e46616d47f"
        );
    }

    #[test]
    fn decode_hex_accepts_mixed_case() {
        assert_eq!(decode_hex("Ab01"), Some(vec![0xAB, 0x01]));
        assert_eq!(decode_hex(""), Some(Vec::new()));
    }

    #[test]
    fn decode_hex_rejects_garbage() {
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
        assert_eq!(decode_hex("a\u{e9}"), None);
    }

    #[cfg(unix)]
    #[test]
    fn tags_are_unique_and_increasing() {
        let (left, _right) = std::os::unix::net::UnixStream::pair().unwrap();
        let client = Client::new(left).unwrap();
        assert_eq!(client.next_tag(), 1);
        assert_eq!(client.next_tag(), 2);
        assert_eq!(client.next_tag(), 3);
    }
}
