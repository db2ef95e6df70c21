//! # Network Module
//!
//! This module provides a newline-framed connection over a TCP stream, used by the command
//! servers and the console client.
//!
//! Reads carry a timeout so that the owner of the connection can periodically check for shutdown
//! without losing a partially received line.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest line accepted from a peer before the connection is considered faulty.
pub const MAX_LINE_LEN: usize = 1024;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A newline-framed TCP connection.
pub struct LineConn {
    reader: BufReader<TcpStream>,
    writer: TcpStream,

    /// Bytes of the line currently being received
    pending: Vec<u8>,

    peer: Option<SocketAddr>,
}

/// Network parameters shared by the servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetParams {
    /// Address the server binds to.
    pub bind_addr: String,

    /// Port the server listens on.
    pub port: u16,

    /// Read timeout on client sockets.
    ///
    /// Units: milliseconds
    pub read_timeout_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The outcome of waiting for a line.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    /// A complete line, without its terminator.
    Line(String),

    /// The read timeout elapsed before a full line arrived.
    Timeout,

    /// The peer closed the connection.
    Closed,
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("Could not connect to {0}: {1}")]
    ConnectError(String, io::Error),

    #[error("Could not configure the socket: {0}")]
    SocketOptionError(io::Error),

    #[error("Could not read from the socket: {0}")]
    ReadError(io::Error),

    #[error("Could not write to the socket: {0}")]
    WriteError(io::Error),

    #[error("Received a line longer than {0} bytes")]
    LineTooLong(usize),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LineConn {
    /// Wrap an accepted stream, setting the read timeout.
    pub fn new(stream: TcpStream, read_timeout: Option<Duration>) -> Result<Self, NetError> {
        stream
            .set_read_timeout(read_timeout)
            .map_err(NetError::SocketOptionError)?;
        stream
            .set_nodelay(true)
            .map_err(NetError::SocketOptionError)?;

        let writer = stream.try_clone().map_err(NetError::SocketOptionError)?;
        let peer = stream.peer_addr().ok();

        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            pending: Vec::new(),
            peer,
        })
    }

    /// Connect to a server, waiting at most `timeout` for the connection.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
        read_timeout: Option<Duration>,
    ) -> Result<Self, NetError> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| NetError::ConnectError("<unresolved>".into(), e))?
            .collect();

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no addresses to connect to");

        for a in addrs.iter() {
            match TcpStream::connect_timeout(a, timeout) {
                Ok(s) => return Self::new(s, read_timeout),
                Err(e) => last_err = e,
            }
        }

        Err(NetError::ConnectError(format!("{:?}", addrs), last_err))
    }

    /// Address of the remote end, if known.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Wait for the next line.
    ///
    /// A timeout keeps any partially received bytes, so the next call continues the same line.
    /// More than [`MAX_LINE_LEN`] bytes without a terminator is an error, whether or not the peer
    /// keeps sending.
    pub fn recv(&mut self) -> Result<LineEvent, NetError> {
        loop {
            let buf = match self.reader.fill_buf() {
                Ok(b) => b,
                Err(e) => match e.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                        return Ok(LineEvent::Timeout)
                    }
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                        return Ok(LineEvent::Closed)
                    }
                    _ => return Err(NetError::ReadError(e)),
                },
            };

            if buf.is_empty() {
                // EOF, any unterminated bytes are dropped with the connection
                self.pending.clear();
                return Ok(LineEvent::Closed);
            }

            let end = buf.iter().position(|&b| b == b'\n');
            let used = end.unwrap_or(buf.len());

            // Never buffer more than one byte past the limit
            let room = (MAX_LINE_LEN + 1).saturating_sub(self.pending.len());
            self.pending.extend_from_slice(&buf[..used.min(room)]);

            if self.pending.len() > MAX_LINE_LEN {
                self.pending.clear();
                return Err(NetError::LineTooLong(MAX_LINE_LEN));
            }

            match end {
                Some(i) => {
                    self.reader.consume(i + 1);

                    let raw = std::mem::take(&mut self.pending);
                    let line = String::from_utf8_lossy(&raw);

                    return Ok(LineEvent::Line(line.trim_end_matches('\r').to_string()));
                }
                None => self.reader.consume(used),
            }
        }
    }

    /// Send a single line, appending the terminator.
    pub fn send_line(&mut self, line: &str) -> Result<(), NetError> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(NetError::WriteError)
    }

    /// Shut down both halves of the connection.
    pub fn close(self) {
        self.writer.shutdown(std::net::Shutdown::Both).ok();
    }
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            port: 5555,
            read_timeout_ms: 100,
        }
    }
}

impl NetParams {
    /// The `addr:port` string to bind to.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (LineConn, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        (
            LineConn::new(server, Some(Duration::from_millis(50))).unwrap(),
            client,
        )
    }

    #[test]
    fn test_lines_and_partial_lines() {
        let (mut conn, mut client) = pair();

        client.write_all(b"MOVE 1 0\r\nSTO").unwrap();
        assert_eq!(conn.recv().unwrap(), LineEvent::Line("MOVE 1 0".into()));

        // Partial line survives the timeout
        assert_eq!(conn.recv().unwrap(), LineEvent::Timeout);
        client.write_all(b"P\n").unwrap();
        assert_eq!(conn.recv().unwrap(), LineEvent::Line("STOP".into()));

        drop(client);
        assert_eq!(conn.recv().unwrap(), LineEvent::Closed);
    }

    #[test]
    fn test_unterminated_line_rejected() {
        let (mut conn, mut client) = pair();

        // Keep streaming without a terminator, the limit must trip before any timeout
        let writer = thread::spawn(move || {
            let chunk = [b'a'; 4096];
            for _ in 0..64 {
                if client.write_all(&chunk).is_err() {
                    return;
                }
            }
            client.write_all(b"\n").ok();
        });

        assert!(matches!(
            conn.recv(),
            Err(NetError::LineTooLong(MAX_LINE_LEN))
        ));
        assert!(conn.pending.is_empty());

        drop(conn);
        writer.join().unwrap();
    }

    #[test]
    fn test_line_at_limit_accepted() {
        let (mut conn, mut client) = pair();

        let mut data = vec![b'x'; MAX_LINE_LEN];
        data.push(b'\n');
        client.write_all(&data).unwrap();

        match conn.recv().unwrap() {
            LineEvent::Line(l) => assert_eq!(l.len(), MAX_LINE_LEN),
            e => panic!("Expected a line, got {:?}", e),
        }
    }

    #[test]
    fn test_send_and_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut conn = LineConn::new(stream, Some(Duration::from_secs(2))).unwrap();
            let line = conn.recv().unwrap();
            conn.send_line("OK").unwrap();
            line
        });

        let mut client =
            LineConn::connect(addr, Duration::from_secs(1), Some(Duration::from_secs(2))).unwrap();
        client.send_line("STOP").unwrap();
        assert_eq!(client.recv().unwrap(), LineEvent::Line("OK".into()));

        assert_eq!(server.join().unwrap(), LineEvent::Line("STOP".into()));
    }
}
