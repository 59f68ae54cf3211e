use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Byte stream the engine runs over.
///
/// The engine does not dial and does not care whether the bytes cross a
/// network; it consumes any connected stream that can hand out a second
/// independently owned handle for the opposite direction and abort a
/// blocked read from another thread. TCP and Unix sockets are provided;
/// tests run over socketpairs.
///
/// `Sync` is required because the connection keeps one handle around for
/// shutdown, reachable from any thread sharing the client.
pub trait Stream: Read + Write + Send + Sync {
    /// A second, independently owned handle onto the same stream.
    fn try_clone(&self) -> std::io::Result<Box<dyn Stream>>;

    /// Abort any blocked read or write on any handle and disallow further
    /// I/O. A dispatcher blocked in a read observes end-of-stream after
    /// this returns; this is the connection teardown primitive.
    fn shutdown(&self) -> std::io::Result<()>;

    /// Apply a read deadline to subsequent reads. Expiry surfaces as an
    /// I/O error on the shared read side, which tears down every
    /// outstanding exchange on the connection.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Apply a write deadline to subsequent writes.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
}

impl Stream for TcpStream {
    fn try_clone(&self) -> std::io::Result<Box<dyn Stream>> {
        Ok(Box::new(TcpStream::try_clone(self)?))
    }

    fn shutdown(&self) -> std::io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl Stream for UnixStream {
    fn try_clone(&self) -> std::io::Result<Box<dyn Stream>> {
        Ok(Box::new(UnixStream::try_clone(self)?))
    }

    fn shutdown(&self) -> std::io::Result<()> {
        UnixStream::shutdown(self, Shutdown::Both)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_write_timeout(self, timeout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::os::unix::net::UnixStream;

    use super::Stream;

    #[test]
    fn cloned_handles_share_the_stream() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut reader = Stream::try_clone(&right).unwrap();

        let mut left = left;
        left.write_all(b"ping").unwrap();

        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn shutdown_unblocks_a_pending_read() {
        let (left, right) = UnixStream::pair().unwrap();
        let control = Stream::try_clone(&right).unwrap();

        let reader = std::thread::spawn(move || {
            let mut right = right;
            let mut buf = [0u8; 1];
            right.read(&mut buf)
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        control.shutdown().unwrap();

        let n = reader.join().unwrap().unwrap();
        assert_eq!(n, 0, "shutdown should read as end-of-stream");
        drop(left);
    }
}
