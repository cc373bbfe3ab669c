//! TCP transport: owns the socket and delivers one framed packet per event.
//!
//! The session never touches the stream directly. [`connect`] splits the
//! socket into a writer task fed by an outbound channel and a reader task
//! that reassembles size-prefixed frames, so everything above this module
//! sees an opaque "one packet per event" contract.

use crate::error::RconError;
use log::{trace, warn};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Largest size field a well-behaved server will send.
const MAX_FRAME_SIZE: i32 = 4096;

const CHANNEL_CAPACITY: usize = 32;

/// One inbound notification from the transport.
pub enum TransportEvent {
    /// A complete frame, size field included.
    Packet(Vec<u8>),
    /// The peer closed the connection (or reading failed).
    Closed,
}

pub(crate) enum Outbound {
    Frame(Vec<u8>),
    Shutdown,
}

/// Cheap handle for writing to and shutting down the connection.
#[derive(Clone)]
pub struct TransportHandle {
    tx: mpsc::Sender<Outbound>,
}

impl TransportHandle {
    pub(crate) fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, frame: Vec<u8>) -> Result<(), RconError> {
        self.tx
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| RconError::ConnectionClosed)
    }

    /// Closes the write half of the connection. Idempotent; ignored if the
    /// transport is already gone.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Outbound::Shutdown).await;
    }
}

/// Opens a TCP connection and spawns the reader and writer tasks, returning
/// the write handle and the inbound event stream.
pub async fn connect(
    host: &str,
    port: u16,
) -> Result<(TransportHandle, mpsc::Receiver<TransportEvent>), RconError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(RconError::UnreachableHost)?;
    trace!("opened tcp stream to {}:{}", host, port);

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(write_loop(write_half, outbound_rx));
    tokio::spawn(read_loop(read_half, event_tx));

    Ok((TransportHandle::new(outbound_tx), event_rx))
}

async fn write_loop(mut stream: OwnedWriteHalf, mut outbound: mpsc::Receiver<Outbound>) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(frame) => {
                if let Err(e) = stream.write_all(&frame).await {
                    warn!("write failed: {}", e);
                    break;
                }
            }
            Outbound::Shutdown => break,
        }
    }
    let _ = stream.shutdown().await;
}

async fn read_loop(mut stream: OwnedReadHalf, events: mpsc::Sender<TransportEvent>) {
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(frame)) => {
                trace!("framed {} inbound bytes", frame.len());
                if events.send(TransportEvent::Packet(frame)).await.is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("read failed: {}", e);
                break;
            }
        }
    }
    let _ = events.send(TransportEvent::Closed).await;
}

/// Reads one size-prefixed frame, returning it with the size field still in
/// front so the codec sees the exact wire layout. `None` on a clean EOF.
async fn read_frame(stream: &mut OwnedReadHalf) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let size = i32::from_le_bytes(header);
    if !(0..=MAX_FRAME_SIZE).contains(&size) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {} out of range", size),
        ));
    }

    let mut frame = vec![0u8; 4 + size as usize];
    frame[..4].copy_from_slice(&header);
    stream.read_exact(&mut frame[4..]).await?;
    Ok(Some(frame))
}
