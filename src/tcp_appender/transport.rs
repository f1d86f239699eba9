//! Transport primitives for the TCP appender.
//!
//! A [`Connector`] produces boxed [`Transport`] values; the
//! [`Connection`] wrapper adds write buffering and guarantees the socket is
//! shut down when the connection is dropped. An [`Interrupter`] lets another
//! thread abort I/O the worker is blocked in.

use std::{
    io::{self, BufWriter, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    sync::Arc,
    time::Duration,
};

use log::debug;
use parking_lot::Mutex;

use super::{cancel::CancelToken, config::SOCKET_CHECK_TIMEOUT, error::ConnectError};

/// Byte stream to the collector.
pub trait Transport: Read + Write + Send {
    /// Whether the peer is still connected and neither direction is shut down.
    fn is_alive(&self) -> bool;

    /// Close both directions. Errors are ignored.
    fn shutdown(&mut self);

    /// Callback closing this transport from another thread, if supported.
    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        None
    }
}

/// Closes a transport from outside the thread using it.
pub type InterruptHandle = Box<dyn FnOnce() + Send>;

/// Plain TCP transport.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpTransport {
    fn is_alive(&self) -> bool {
        if self.stream.peer_addr().is_err() {
            return false;
        }
        if !matches!(self.stream.take_error(), Ok(None)) {
            return false;
        }
        if self.stream.set_nonblocking(true).is_err() {
            return false;
        }
        // EOF on peek means the collector shut its side down.
        let mut peeked = [0u8; 1];
        let alive = match self.stream.peek(&mut peeked) {
            Ok(0) => false,
            Ok(_) => true,
            Err(err) => err.kind() == io::ErrorKind::WouldBlock,
        };
        self.stream.set_nonblocking(false).is_ok() && alive
    }

    fn shutdown(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn interrupt_handle(&self) -> Option<InterruptHandle> {
        let stream = self.stream.try_clone().ok()?;
        Some(Box::new(move || {
            let _ = stream.shutdown(Shutdown::Both);
        }))
    }
}

#[derive(Default)]
struct InterruptSlot {
    interrupted: bool,
    handle: Option<InterruptHandle>,
}

/// Shared switch for aborting the worker's blocking socket I/O.
///
/// The worker arms it with each new transport; [`interrupt`] closes the armed
/// transport and every transport armed afterwards.
///
/// [`interrupt`]: Interrupter::interrupt
#[derive(Clone, Default)]
pub struct Interrupter {
    slot: Arc<Mutex<InterruptSlot>>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `transport`; closes it at once after an interrupt.
    pub fn arm(&self, transport: &dyn Transport) {
        let Some(handle) = transport.interrupt_handle() else {
            return;
        };
        let mut slot = self.slot.lock();
        if slot.interrupted {
            drop(slot);
            handle();
        } else {
            slot.handle = Some(handle);
        }
    }

    pub fn disarm(&self) {
        self.slot.lock().handle = None;
    }

    pub fn interrupt(&self) {
        let handle = {
            let mut slot = self.slot.lock();
            slot.interrupted = true;
            slot.handle.take()
        };
        if let Some(handle) = handle {
            handle();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.slot.lock().interrupted
    }
}

impl std::fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("Interrupter")
            .field("interrupted", &slot.interrupted)
            .field("armed", &slot.handle.is_some())
            .finish()
    }
}

/// Open connection owned by the delivery worker.
///
/// Writes are buffered until [`flush`](Write::flush). Closing or dropping the
/// connection flushes pending frames when the transport still accepts them,
/// then shuts the transport down.
pub struct Connection {
    writer: Option<BufWriter<Box<dyn Transport>>>,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            writer: Some(BufWriter::new(transport)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.writer
            .as_ref()
            .is_some_and(|writer| writer.get_ref().is_alive())
    }

    /// Flush what is buffered, then tear the connection down.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if !writer.buffer().is_empty() {
            if let Err(err) = writer.flush() {
                debug!("discarding {} unflushed bytes: {err}", writer.buffer().len());
            }
        }
        let (mut transport, _unflushed) = writer.into_parts();
        transport.shutdown();
    }

    fn writer(&mut self) -> io::Result<&mut BufWriter<Box<dyn Transport>>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connection closed"))
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.writer()?.get_mut().read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("open", &self.writer.is_some())
            .finish()
    }
}

/// Opens transports to the collector.
///
/// `Ok(None)` means "not ready yet": the caller should back off and retry.
pub trait Connector: Send {
    fn connect(&mut self, cancel: &CancelToken) -> Result<Option<Box<dyn Transport>>, ConnectError>;
}

/// Connector dialling a fixed set of resolved addresses.
#[derive(Clone, Debug)]
pub struct TcpConnector {
    addrs: Vec<SocketAddr>,
    retry_delay: Duration,
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Resolve `host:port` once; unresolvable hosts fail here.
    pub fn resolve(host: &str, port: u16, retry_delay: Duration) -> io::Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {host}"),
            ));
        }
        Ok(Self {
            addrs,
            retry_delay,
            connect_timeout: SOCKET_CHECK_TIMEOUT,
        })
    }

    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self, cancel: &CancelToken) -> Result<Option<Box<dyn Transport>>, ConnectError> {
        cancel.check()?;
        for addr in &self.addrs {
            match TcpStream::connect_timeout(addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_read_timeout(Some(self.connect_timeout))?;
                    stream.set_write_timeout(Some(self.connect_timeout))?;
                    return Ok(Some(Box::new(TcpTransport::new(stream))));
                }
                Err(err) => debug!("connect to {addr} failed: {err}"),
            }
        }
        cancel.sleep(self.retry_delay)?;
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory transport and connector for exercising the worker.

    use std::{
        collections::VecDeque,
        io::{self, Read, Write},
        sync::Arc,
    };

    use parking_lot::Mutex;

    use super::{Connector, InterruptHandle, Transport};
    use crate::tcp_appender::{cancel::CancelToken, error::ConnectError};

    /// Observable state shared between a mock transport and the test.
    #[derive(Default)]
    pub(crate) struct Wire {
        pub written: Vec<u8>,
        pub reply: VecDeque<u8>,
        pub flushes: usize,
        pub fail_writes: bool,
        pub dead: bool,
        pub shutdowns: usize,
        pub interrupts: usize,
    }

    #[derive(Clone, Default)]
    pub(crate) struct MockTransport {
        pub wire: Arc<Mutex<Wire>>,
    }

    impl MockTransport {
        pub(crate) fn with_reply(reply: &[u8]) -> Self {
            let transport = Self::default();
            transport.wire.lock().reply.extend(reply);
            transport
        }
    }

    impl Read for MockTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut wire = self.wire.lock();
            let n = buf.len().min(wire.reply.len());
            for slot in buf.iter_mut().take(n) {
                *slot = wire.reply.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for MockTransport {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut wire = self.wire.lock();
            if wire.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
            }
            wire.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            let mut wire = self.wire.lock();
            if wire.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock flush failure"));
            }
            wire.flushes += 1;
            Ok(())
        }
    }

    impl Transport for MockTransport {
        fn is_alive(&self) -> bool {
            !self.wire.lock().dead
        }

        fn shutdown(&mut self) {
            let mut wire = self.wire.lock();
            wire.dead = true;
            wire.shutdowns += 1;
        }

        fn interrupt_handle(&self) -> Option<InterruptHandle> {
            let wire = Arc::clone(&self.wire);
            Some(Box::new(move || {
                let mut wire = wire.lock();
                wire.dead = true;
                wire.interrupts += 1;
            }))
        }
    }

    /// Hands out queued transports; `None` entries simulate "not ready yet".
    #[derive(Clone, Default)]
    pub(crate) struct MockConnector {
        pub pending: Arc<Mutex<VecDeque<Option<MockTransport>>>>,
        pub attempts: Arc<Mutex<usize>>,
    }

    impl MockConnector {
        pub(crate) fn new(transports: impl IntoIterator<Item = Option<MockTransport>>) -> Self {
            Self {
                pending: Arc::new(Mutex::new(transports.into_iter().collect())),
                attempts: Arc::default(),
            }
        }

        pub(crate) fn attempts(&self) -> usize {
            *self.attempts.lock()
        }
    }

    impl Connector for MockConnector {
        fn connect(
            &mut self,
            cancel: &CancelToken,
        ) -> Result<Option<Box<dyn Transport>>, ConnectError> {
            cancel.check()?;
            *self.attempts.lock() += 1;
            Ok(self
                .pending
                .lock()
                .pop_front()
                .flatten()
                .map(|t| Box::new(t) as Box<dyn Transport>))
        }
    }
}
