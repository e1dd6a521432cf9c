mod transport;
mod tcp_transport;

pub use transport::Transport;
pub use tcp_transport::{encode_command, TcpTransport};
