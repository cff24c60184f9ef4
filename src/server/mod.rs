//! RESP TCP server
//!
//! Accepts client connections and runs one task per connection. Requests on
//! a connection are executed in order: read, execute, write.

use crate::dispatch::Dispatcher;
use crate::protocol::{read_request, write_reply, ProtocolError, Reply};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

/// Blob server bound to a listening socket
pub struct BlobServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
}

impl BlobServer {
    /// Bind the listening socket
    pub async fn bind(addr: &str, dispatcher: Arc<Dispatcher>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails
    pub async fn run(self) -> io::Result<()> {
        log::info!("Blob server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, peer, dispatcher).await {
                            log::warn!("Client {} handler error: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    log::error!("Connection error: {}", e);
                }
            }
        }
    }
}

/// Handle a client connection
async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), ProtocolError> {
    log::info!("New connection from {}", peer);
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let request = match read_request(&mut reader).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                log::info!("Client {} disconnected", peer);
                return Ok(());
            }
            Err(ProtocolError::Malformed(msg)) => {
                log::warn!("Malformed request from {}: {}", peer, msg);
                let reply = Reply::Error(format!("ERR protocol error: {}", msg));
                write_reply(&mut writer, &reply).await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if request.is_empty() {
            continue;
        }

        let reply = dispatcher.handle(&request).await;
        write_reply(&mut writer, &reply).await?;
    }
}
