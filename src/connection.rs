//! Per-connection lifecycle.
//!
//! A connection is read exactly once, optionally answered once, and then
//! closed. The socket is owned by the `Connection`, so every exit path
//! (including errors) closes it when the value is dropped.

use crate::config::ProtocolType;
use crate::protocols;
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use tracing::{info, trace, warn};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Accepted, nothing read yet.
    Accepted,
    /// Waiting on the single read.
    Read,
    /// Turning the received bytes into a message.
    Parse,
    /// Writing the response.
    Respond,
}

/// What happened on a connection that finished without an I/O error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The peer closed without sending anything.
    Empty,
    /// The message was logged and nothing was written back.
    Logged { message: String },
    /// The message was logged and a response of `written` bytes was sent.
    Responded { message: String, written: usize },
}

/// A single accepted client connection.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnState,
}

impl Connection {
    /// Wrap an accepted stream.
    ///
    /// The listener is non-blocking; on some platforms accepted sockets
    /// inherit that, so blocking mode is restored here.
    pub fn new(stream: TcpStream, peer: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(false)?;
        Ok(Self {
            stream,
            peer,
            state: ConnState::Accepted,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Read once, process with `protocol`, and write the reply if any.
    pub fn process(&mut self, protocol: ProtocolType, buffer_size: usize) -> io::Result<Outcome> {
        self.state = ConnState::Read;
        let mut buffer = BytesMut::zeroed(buffer_size);
        let n = self.stream.read(&mut buffer)?;
        if n == 0 {
            info!(peer = %self.peer, "No data received");
            return Ok(Outcome::Empty);
        }
        buffer.truncate(n);
        trace!(peer = %self.peer, bytes = n, "Read request");

        self.state = ConnState::Parse;
        let exchange = protocols::process(protocol, &buffer);

        let Some(response) = exchange.response else {
            info!(peer = %self.peer, message = %exchange.message, "Received message");
            return Ok(Outcome::Logged {
                message: exchange.message,
            });
        };

        info!(peer = %self.peer, message = %exchange.message, "Extracted message");
        self.state = ConnState::Respond;
        self.stream.write_all(&response)?;
        info!(peer = %self.peer, bytes = response.len(), "Response sent");

        Ok(Outcome::Responded {
            message: exchange.message,
            written: response.len(),
        })
    }
}

/// Run a connection to completion on the current thread.
///
/// Errors are logged with the peer address and the state they happened
/// in; they never propagate past this point.
pub fn serve(
    mut connection: Connection,
    protocol: ProtocolType,
    buffer_size: usize,
) -> Option<Outcome> {
    let result = connection.process(protocol, buffer_size);
    if let Err(ref e) = result {
        warn!(
            peer = %connection.peer(),
            state = ?connection.state(),
            error = %e,
            "Error handling client"
        );
    }
    let peer = connection.peer();
    drop(connection);
    trace!(peer = %peer, "Connection closed");
    result.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Shutdown, TcpListener};
    use std::thread;
    use std::time::Duration;

    /// A connected (client, server-side connection) pair on loopback.
    fn pair() -> (TcpStream, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        (client, Connection::new(stream, peer).unwrap())
    }

    #[test]
    fn test_new_connection_state() {
        let (client, conn) = pair();
        assert_eq!(conn.state(), ConnState::Accepted);
        assert_eq!(conn.peer(), client.local_addr().unwrap());
    }

    #[test]
    fn test_empty_read() {
        let (client, mut conn) = pair();
        client.shutdown(Shutdown::Write).unwrap();

        let outcome = conn.process(ProtocolType::Http, 4096).unwrap();
        assert_eq!(outcome, Outcome::Empty);
        assert_eq!(conn.state(), ConnState::Read);
    }

    #[test]
    fn test_plain_logs_without_reply() {
        let (mut client, conn) = pair();
        client.write_all(b"hello from client\n").unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let outcome = serve(conn, ProtocolType::Plain, 1024);
        assert_eq!(
            outcome,
            Some(Outcome::Logged {
                message: "hello from client".to_string()
            })
        );

        let mut received = Vec::new();
        client.read_to_end(&mut received).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn test_http_reply() {
        let (mut client, conn) = pair();
        client.write_all(b"POST / HTTP/1.1\r\n\r\nhi there").unwrap();

        let outcome = serve(conn, ProtocolType::Http, 4096).unwrap();
        let expected = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nServer received: hi there";
        assert_eq!(
            outcome,
            Outcome::Responded {
                message: "hi there".to_string(),
                written: expected.len(),
            }
        );

        let mut received = Vec::new();
        client.read_to_end(&mut received).unwrap();
        assert_eq!(received, expected);
    }

    /// Client side that sends RST instead of FIN when dropped.
    fn resetting_pair() -> (socket2::Socket, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::STREAM,
            Some(socket2::Protocol::TCP),
        )
        .unwrap();
        client.set_linger(Some(Duration::ZERO)).unwrap();
        client
            .connect(&listener.local_addr().unwrap().into())
            .unwrap();
        let (stream, peer) = listener.accept().unwrap();
        (client, Connection::new(stream, peer).unwrap())
    }

    #[test]
    fn test_reset_before_read() {
        let (client, mut conn) = resetting_pair();
        drop(client);
        thread::sleep(Duration::from_millis(50));

        assert!(conn.process(ProtocolType::Http, 4096).is_err());
        assert_eq!(conn.state(), ConnState::Read);
    }

    #[test]
    fn test_serve_swallows_reset() {
        let (client, conn) = resetting_pair();
        drop(client);
        thread::sleep(Duration::from_millis(50));

        assert_eq!(serve(conn, ProtocolType::Plain, 1024), None);
    }

    #[test]
    fn test_reset_before_write() {
        let (client, conn) = resetting_pair();
        client.send(b"POST / HTTP/1.1\r\n\r\nhello").unwrap();
        drop(client);
        thread::sleep(Duration::from_millis(50));

        // Either the read or the write sees the reset
        assert_eq!(serve(conn, ProtocolType::Http, 4096), None);
    }

    #[test]
    fn test_read_is_truncated_to_buffer_size() {
        let (mut client, conn) = pair();
        client.write_all(b"abcdefgh").unwrap();
        client.shutdown(Shutdown::Write).unwrap();

        let outcome = serve(conn, ProtocolType::Plain, 4);
        assert_eq!(
            outcome,
            Some(Outcome::Logged {
                message: "abcd".to_string()
            })
        );
    }
}
