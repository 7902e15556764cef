//! Serial port 0 over TCP.
//!
//! The firmware's first serial port is normally the ground station link.
//! This module exposes it as a TCP listener so a ground station can connect,
//! and tracks how many bytes the firmware has written that have not yet
//! reached the client. That count is the queue depth the clock holds back on.

use crate::model::OutboundQueue;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Chunks that may be queued towards the client.
const TX_CHANNEL_DEPTH: usize = 256;

/// Firmware-facing end of the serial 0 TCP bridge.
pub struct Serial0Bridge {
    local_addr: SocketAddr,
    tx_sender: mpsc::Sender<Vec<u8>>,
    rx_receiver: Mutex<mpsc::Receiver<Vec<u8>>>,
    read_buffer: Mutex<VecDeque<u8>>,
    pending_tx: Arc<AtomicUsize>,
    connected: Arc<AtomicBool>,
}

impl Serial0Bridge {
    /// Bind the listener and start serving on `runtime`.
    ///
    /// Port 0 picks a free port; see [`local_addr`](Self::local_addr).
    /// Must not be called from inside the runtime.
    pub fn start(addr: SocketAddr, runtime: &tokio::runtime::Handle) -> io::Result<Self> {
        let listener = runtime.block_on(TcpListener::bind(addr))?;
        let local_addr = listener.local_addr()?;

        let (tx_sender, tx_receiver) = mpsc::channel::<Vec<u8>>(TX_CHANNEL_DEPTH);
        let (rx_sender, rx_receiver) = mpsc::channel::<Vec<u8>>(TX_CHANNEL_DEPTH);
        let pending_tx = Arc::new(AtomicUsize::new(0));
        let connected = Arc::new(AtomicBool::new(false));

        runtime.spawn(run_listener(
            listener,
            tx_receiver,
            rx_sender,
            Arc::clone(&pending_tx),
            Arc::clone(&connected),
        ));
        info!(addr = %local_addr, "serial0 listening");

        Ok(Serial0Bridge {
            local_addr,
            tx_sender,
            rx_receiver: Mutex::new(rx_receiver),
            read_buffer: Mutex::new(VecDeque::new()),
            pending_tx,
            connected,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether a client is connected.
    pub fn is_client_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Queue firmware output for the client.
    ///
    /// Returns the number of bytes accepted. Output is dropped when no client
    /// is connected or the channel is full.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.is_empty() || !self.is_client_connected() {
            return 0;
        }
        self.pending_tx.fetch_add(data.len(), Ordering::AcqRel);
        match self.tx_sender.try_send(data.to_vec()) {
            Ok(()) => data.len(),
            Err(e) => {
                self.pending_tx.fetch_sub(data.len(), Ordering::AcqRel);
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!("serial0 TX buffer full, dropping output")
                    }
                    mpsc::error::TrySendError::Closed(_) => debug!("serial0 channel closed"),
                }
                0
            }
        }
    }

    /// Read bytes already moved into the firmware read buffer.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut read_buffer = self.read_buffer.lock();
        let n = buf.len().min(read_buffer.len());
        for (slot, byte) in buf.iter_mut().zip(read_buffer.drain(..n)) {
            *slot = byte;
        }
        n
    }

    /// Bytes waiting in the firmware read buffer.
    pub fn available(&self) -> usize {
        self.read_buffer.lock().len()
    }
}

impl OutboundQueue for Serial0Bridge {
    fn queue_length(&self) -> usize {
        self.pending_tx.load(Ordering::Acquire)
    }

    fn service(&self) {
        let mut receiver = self.rx_receiver.lock();
        let mut read_buffer = self.read_buffer.lock();
        while let Ok(data) = receiver.try_recv() {
            read_buffer.extend(data);
        }
    }
}

impl std::fmt::Debug for Serial0Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serial0Bridge")
            .field("local_addr", &self.local_addr)
            .field("connected", &self.is_client_connected())
            .field("pending_tx", &self.queue_length())
            .finish()
    }
}

/// Accept clients one at a time.
async fn run_listener(
    listener: TcpListener,
    mut tx_receiver: mpsc::Receiver<Vec<u8>>,
    rx_sender: mpsc::Sender<Vec<u8>>,
    pending_tx: Arc<AtomicUsize>,
    connected: Arc<AtomicBool>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "serial0 accept failed");
                continue;
            }
        };
        info!(%peer, "serial0 client connected");
        connected.store(true, Ordering::Release);

        let result = handle_connection(stream, &mut tx_receiver, &rx_sender, &pending_tx).await;

        connected.store(false, Ordering::Release);
        // output queued for the old client is discarded
        while let Ok(data) = tx_receiver.try_recv() {
            pending_tx.fetch_sub(data.len(), Ordering::AcqRel);
        }

        match result {
            Ok(()) => info!(%peer, "serial0 client disconnected"),
            Err(e) => debug!(%peer, error = %e, "serial0 connection error"),
        }
    }
}

/// Pump bytes both ways until the client goes away.
async fn handle_connection(
    mut stream: TcpStream,
    tx_receiver: &mut mpsc::Receiver<Vec<u8>>,
    rx_sender: &mpsc::Sender<Vec<u8>>,
    pending_tx: &AtomicUsize,
) -> io::Result<()> {
    let (mut reader, mut writer) = stream.split();
    let mut read_buf = [0u8; 1024];

    loop {
        tokio::select! {
            result = reader.read(&mut read_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                if rx_sender.send(read_buf[..n].to_vec()).await.is_err() {
                    return Ok(());
                }
            }

            Some(data) = tx_receiver.recv() => {
                let written = writer.write_all(&data).await;
                pending_tx.fetch_sub(data.len(), Ordering::AcqRel);
                written?;
                writer.flush().await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::time::{Duration, Instant};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_output_dropped_without_client() {
        let rt = runtime();
        let bridge = Serial0Bridge::start("127.0.0.1:0".parse().unwrap(), rt.handle()).unwrap();
        assert_eq!(bridge.write(b"hello"), 0);
        assert_eq!(bridge.queue_length(), 0);
    }

    #[test]
    fn test_round_trip_with_client() {
        let rt = runtime();
        let bridge = Serial0Bridge::start("127.0.0.1:0".parse().unwrap(), rt.handle()).unwrap();
        let mut client = std::net::TcpStream::connect(bridge.local_addr()).unwrap();
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        assert!(wait_for(|| bridge.is_client_connected()));

        assert_eq!(bridge.write(b"ping"), 4);
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
        assert!(wait_for(|| bridge.queue_length() == 0));

        client.write_all(b"pong").unwrap();
        assert!(wait_for(|| {
            bridge.service();
            bridge.available() == 4
        }));
        let mut out = [0u8; 8];
        assert_eq!(bridge.read(&mut out), 4);
        assert_eq!(&out[..4], b"pong");
    }
}
