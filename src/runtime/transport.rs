//! Transport boundary for the connection framer.
//!
//! A transport is a bidirectional byte stream that can answer a
//! zero-timeout readiness query, read with a bounded idle wait, and accept
//! partial writes. Closing is dropping: once the framer releases its
//! transport the socket is gone.

use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

/// Snapshot of socket readiness.
///
/// Level-triggered: a condition that still holds is reported again on the
/// next query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

pub trait Transport {
    /// Query readiness without blocking.
    fn poll_ready(&mut self) -> io::Result<Readiness>;

    /// Bound how long a single `recv` may wait for data.
    fn set_idle_timeout(&mut self, timeout: Duration);

    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer closed.
    ///
    /// Waits at most the idle timeout for data and fails with
    /// `TimedOut` if none arrives.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write as many bytes as the socket accepts right now.
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;
}

/// [`Transport`] over a non-blocking socket (std or mio `TcpStream`).
#[derive(Debug)]
pub struct SocketTransport<S> {
    stream: S,
    idle_timeout: Option<Duration>,
}

impl<S> SocketTransport<S>
where
    S: Read + Write + AsRawFd,
{
    /// Wrap a stream. The stream must already be in non-blocking mode.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            idle_timeout: None,
        }
    }
}

impl<S> Transport for SocketTransport<S>
where
    S: Read + Write + AsRawFd,
{
    fn poll_ready(&mut self) -> io::Result<Readiness> {
        let revents = poll_fd(self.stream.as_raw_fd(), libc::POLLIN | libc::POLLOUT, 0)?;
        Ok(Readiness {
            // Hangup and error count as readable so the next read observes them.
            readable: revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0,
            writable: revents & libc::POLLOUT != 0,
        })
    }

    fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout = Some(timeout);
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let deadline = self.idle_timeout.map(|t| Instant::now() + t);

        loop {
            match self.stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            let wait_ms = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "idle read timeout"));
                    }
                    // Round up so a sub-millisecond remainder still waits.
                    remaining
                        .as_nanos()
                        .div_ceil(1_000_000)
                        .min(libc::c_int::MAX as u128) as libc::c_int
                }
                None => -1,
            };

            // A poll timeout loops back so the deadline check decides.
            poll_fd(self.stream.as_raw_fd(), libc::POLLIN, wait_ms)?;
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match self.stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                Err(e) => return Err(e),
            }
        }
    }
}

/// Poll a single descriptor, returning its `revents` (0 on timeout).
fn poll_fd(fd: RawFd, events: libc::c_short, timeout_ms: libc::c_int) -> io::Result<libc::c_short> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };

    loop {
        // SAFETY: `pfd` is a valid, exclusively borrowed pollfd and nfds is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc >= 0 {
            return Ok(pfd.revents);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn socket_pair() -> (SocketTransport<TcpStream>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (SocketTransport::new(server), client)
    }

    fn wait_readable(transport: &mut SocketTransport<TcpStream>) -> bool {
        for _ in 0..200 {
            if transport.poll_ready().unwrap().readable {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_fresh_socket_is_writable_not_readable() {
        let (mut transport, _client) = socket_pair();
        let ready = transport.poll_ready().unwrap();
        assert!(ready.writable);
        assert!(!ready.readable);
    }

    #[test]
    fn test_recv_after_peer_write() {
        let (mut transport, mut client) = socket_pair();
        client.write_all(b"hello").unwrap();
        assert!(wait_readable(&mut transport));

        let mut buf = [0u8; 3];
        assert_eq!(transport.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
    }

    #[test]
    fn test_recv_times_out_when_idle() {
        let (mut transport, _client) = socket_pair();
        transport.set_idle_timeout(Duration::from_millis(20));

        let started = Instant::now();
        let mut buf = [0u8; 16];
        let err = transport.recv(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_recv_waits_out_fractional_timeout() {
        let (mut transport, _client) = socket_pair();
        let timeout = Duration::from_micros(30_900);
        transport.set_idle_timeout(timeout);

        let mut buf = [0u8; 16];
        for _ in 0..5 {
            let started = Instant::now();
            let err = transport.recv(&mut buf).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::TimedOut);
            assert!(started.elapsed() >= timeout);
        }
    }

    #[test]
    fn test_recv_waits_for_trickling_data() {
        let (mut transport, mut client) = socket_pair();
        transport.set_idle_timeout(Duration::from_secs(5));

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            client.write_all(b"late").unwrap();
            client
        });

        let mut buf = [0u8; 16];
        let n = transport.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"late");
        drop(writer.join().unwrap());
    }

    #[test]
    fn test_peer_close_reads_zero() {
        let (mut transport, client) = socket_pair();
        drop(client);
        assert!(wait_readable(&mut transport));

        let mut buf = [0u8; 16];
        assert_eq!(transport.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_send_reaches_peer() {
        let (mut transport, mut client) = socket_pair();
        assert_eq!(transport.send(b"OK").unwrap(), 2);

        let mut buf = [0u8; 2];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"OK");
    }
}
