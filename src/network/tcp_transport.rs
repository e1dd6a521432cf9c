use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{Endpoint, TransportOptions};
use crate::core::Health;
use crate::error::{PoolError, Result};
use crate::network::Transport;

const BUFFER_SIZE: usize = 1024;
const MAX_REPLY_LINE: usize = 64 * 1024;

/// Encodes a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Plain TCP connection to a RESP-speaking backend.
///
/// Honours the `nodelay` option. I/O performed through [`send`](Self::send)
/// and [`recv`](Self::recv) marks the connection unhealthy on failure or EOF.
pub struct TcpTransport {
    stream: Option<TcpStream>,
    endpoint: Endpoint,
    health: Option<Health>,
}

impl TcpTransport {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.stream.as_mut()
    }

    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.write_all(data).await,
            None => Err(closed_error()),
        };
        if let Err(ref e) = result {
            self.fault(e);
        }
        result
    }

    pub async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.read(buf).await,
            None => Err(closed_error()),
        };
        match result {
            Ok(0) if !buf.is_empty() => {
                let err = io::Error::new(io::ErrorKind::UnexpectedEof, "backend closed the connection");
                self.fault(&err);
                Err(err)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.fault(&e);
                Err(e)
            }
        }
    }

    fn fault(&mut self, err: &io::Error) {
        if let Some(health) = &self.health {
            health.fail(&err.to_string());
        }
        self.close();
    }

    async fn read_line(&mut self) -> io::Result<String> {
        let mut line = Vec::new();
        let mut chunk = [0u8; BUFFER_SIZE];
        loop {
            let n = self.recv(&mut chunk).await?;
            line.extend_from_slice(&chunk[..n]);
            if let Some(pos) = line.windows(2).position(|w| w == b"\r\n") {
                line.truncate(pos);
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if line.len() > MAX_REPLY_LINE {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "reply line too long"));
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(endpoint: &Endpoint, options: &TransportOptions) -> io::Result<Self> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        if let Some(nodelay) = options.get_parsed::<bool>("nodelay") {
            stream.set_nodelay(nodelay)?;
        }
        Ok(TcpTransport {
            stream: Some(stream),
            endpoint: endpoint.clone(),
            health: None,
        })
    }

    async fn authenticate(&mut self, password: &str) -> Result<()> {
        if password.is_empty() {
            return Ok(());
        }

        let command = encode_command(&[b"AUTH", password.as_bytes()]);
        self.send(&command).await?;
        let reply = self.read_line().await?;

        match reply.as_bytes().first() {
            Some(b'+') => Ok(()),
            Some(b'-') => Err(PoolError::Auth(reply[1..].to_string())),
            _ => Err(PoolError::Auth(format!("unexpected reply: {reply}"))),
        }
    }

    fn is_alive(&self) -> bool {
        self.stream.is_some() && self.health.as_ref().map_or(true, Health::is_healthy)
    }

    fn close(&mut self) {
        // Dropping the stream closes the socket.
        self.stream.take();
    }

    fn watch(&mut self, health: Health) {
        self.health = Some(health);
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}
