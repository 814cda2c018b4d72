//! # TCP Transport
//!
//! One connection per exchange. Each frame is a big-endian `u32` length
//! followed by that many bytes of JSON-encoded [`WireMessage`]:
//!
//! ```text
//! client                         server
//!   │── frame(request) ──────────▶│  handler.handle(..)
//!   │◀──────── frame(reply) ──────│  only for request-style messages
//!   ╳ close                       ╳
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{EncodingError, WireMessage};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, SyncError};
use crate::ports::{MessageHandler, PeerTransport};

/// Largest frame either side will read. A full chain travels in one frame.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

fn io_error(peer: &str, e: std::io::Error) -> SyncError {
    SyncError::Io {
        peer: peer.to_string(),
        reason: e.to_string(),
    }
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, peer: &str, message: &WireMessage) -> Result<()> {
    let body = serde_json::to_vec(message).map_err(EncodingError::from)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(SyncError::FrameTooLarge {
            size: body.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    let len = u32::try_from(body.len()).map_err(|_| SyncError::FrameTooLarge {
        size: body.len(),
        max: MAX_FRAME_BYTES,
    })?;
    writer.write_all(&len.to_be_bytes()).await.map_err(|e| io_error(peer, e))?;
    writer.write_all(&body).await.map_err(|e| io_error(peer, e))?;
    writer.flush().await.map_err(|e| io_error(peer, e))
}

pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, peer: &str) -> Result<WireMessage> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len).await.map_err(|e| io_error(peer, e))?;
    let size = u32::from_be_bytes(len) as usize;
    if size > MAX_FRAME_BYTES {
        return Err(SyncError::FrameTooLarge {
            size,
            max: MAX_FRAME_BYTES,
        });
    }
    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await.map_err(|e| io_error(peer, e))?;
    Ok(serde_json::from_slice(&body).map_err(EncodingError::from)?)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    async fn connect(address: &str) -> Result<TcpStream> {
        TcpStream::connect(address).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused => SyncError::Unreachable {
                peer: address.to_string(),
            },
            _ => io_error(address, e),
        })
    }
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn send(&self, address: &str, message: &WireMessage) -> Result<()> {
        let mut stream = Self::connect(address).await?;
        write_frame(&mut stream, address, message).await?;
        stream.shutdown().await.map_err(|e| io_error(address, e))
    }

    async fn request(&self, address: &str, message: &WireMessage) -> Result<WireMessage> {
        let mut stream = Self::connect(address).await?;
        write_frame(&mut stream, address, message).await?;
        read_frame(&mut stream, address).await
    }
}

/// Accept connections until `shutdown` flips, one task per connection.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(address = %local, "Listening for peers");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (mut stream, remote) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        continue;
                    }
                };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let remote = remote.to_string();
                    let mut message = match read_frame(&mut stream, &remote).await {
                        Ok(message) => message,
                        Err(e) => {
                            debug!(%remote, error = %e, "Unreadable frame");
                            return;
                        }
                    };
                    let relay = message.relay_id.take();
                    if let Some(reply) = handler.handle(message, relay).await {
                        if let Err(e) = write_frame(&mut stream, &remote, &reply).await {
                            debug!(%remote, error = %e, "Reply not delivered");
                        }
                    }
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(address = %local, "Peer listener stopped");
                    return Ok(());
                }
            }
        }
    }
}
