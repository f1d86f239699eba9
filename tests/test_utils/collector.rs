//! In-process stand-in for a logdoc collector.
//!
//! The collector accepts connections one after another, answers login
//! requests with a configurable header and token, and forwards every event
//! it observes on a channel so tests can assert on the exact wire traffic.

use std::{
    io::{self, Read, Write},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

use serde::Deserialize;

pub const HEADER: [u8; 2] = [0xCA, 0xFE];
const OP_TOKEN_REQUEST: u8 = 0x01;
const OP_LOG_ENTRY: u8 = 0x02;
const OP_PARTIAL_ENTRY: u8 = 0x03;

/// Token handed out by default; long enough to be cached by the client.
pub const ISSUED_TOKEN: &[u8] = b"collector-issued-token";

/// Credentials presented by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    Password { login: String, password: String },
    Token(String),
}

/// Decoded MessagePack body of a frame.
#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    pub time: Option<i64>,
    pub source: Option<String>,
    pub level: Option<String>,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

/// Multipart header of a partial entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub partial_id: [u8; 8],
    pub index: u32,
    pub total_parts: u32,
    pub total_size_tokens: i32,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub token: Vec<u8>,
    pub part: Option<Part>,
    pub entry: Entry,
}

/// Everything the collector observed, in arrival order.
#[derive(Debug, Clone)]
pub enum Event {
    Connected(usize),
    Login(Login),
    Frame(Frame),
    Disconnected(usize),
}

/// How the collector answers connection number `n` (zero based).
pub type Responder = Box<dyn Fn(usize) -> Reply + Send>;

#[derive(Debug, Clone)]
pub struct Reply {
    pub header: [u8; 2],
    pub token: Vec<u8>,
    /// Close the connection after this many frames.
    pub close_after: Option<usize>,
}

impl Default for Reply {
    fn default() -> Self {
        Self {
            header: HEADER,
            token: ISSUED_TOKEN.to_vec(),
            close_after: None,
        }
    }
}

pub struct FakeCollector {
    addr: SocketAddr,
    events: Receiver<Event>,
}

impl FakeCollector {
    /// Start a collector answering every login with [`Reply::default`].
    pub fn start() -> Self {
        Self::with_responder(Box::new(|_: usize| Reply::default()))
    }

    pub fn with_responder(responder: Responder) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind collector");
        let addr = listener.local_addr().expect("collector address");
        let (tx, events) = mpsc::channel();
        thread::spawn(move || {
            for (n, stream) in listener.incoming().enumerate() {
                let Ok(stream) = stream else { return };
                if tx.send(Event::Connected(n)).is_err() {
                    return;
                }
                let _ = serve(stream, &responder(n), &tx);
                if tx.send(Event::Disconnected(n)).is_err() {
                    return;
                }
            }
        });
        Self { addr, events }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Next event, or `None` once `timeout` passes.
    pub fn next_event(&self, timeout: Duration) -> Option<Event> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Collect `count` frames, skipping other events.
    pub fn frames(&self, count: usize, timeout: Duration) -> Vec<Frame> {
        let deadline = Instant::now() + timeout;
        let mut frames = Vec::with_capacity(count);
        while frames.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining) {
                Some(Event::Frame(frame)) => frames.push(frame),
                Some(_) => {}
                None => break,
            }
        }
        frames
    }

    /// Collect login events until `count` have arrived or `timeout` passes.
    pub fn logins(&self, count: usize, timeout: Duration) -> Vec<Login> {
        let deadline = Instant::now() + timeout;
        let mut logins = Vec::with_capacity(count);
        while logins.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.next_event(remaining) {
                Some(Event::Login(login)) => logins.push(login),
                Some(_) => {}
                None => break,
            }
        }
        logins
    }
}

fn take<const N: usize>(stream: &mut impl Read) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

fn take_vec(stream: &mut impl Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(buf)
}

fn take_str(stream: &mut impl Read) -> io::Result<String> {
    let len = usize::from(u16::from_be_bytes(take(stream)?));
    String::from_utf8(take_vec(stream, len)?).map_err(io::Error::other)
}

fn serve(mut stream: TcpStream, reply: &Reply, tx: &Sender<Event>) -> io::Result<()> {
    let mut frames = 0;
    loop {
        if reply.close_after.is_some_and(|limit| frames >= limit) {
            return Ok(());
        }
        if take::<2>(&mut stream)? != HEADER {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad header"));
        }
        let [opcode] = take::<1>(&mut stream)?;
        let event = match opcode {
            OP_TOKEN_REQUEST => {
                let login = read_login(&mut stream)?;
                stream.write_all(&reply.header)?;
                stream.write_all(&(reply.token.len() as u16).to_be_bytes())?;
                stream.write_all(&reply.token)?;
                stream.flush()?;
                Event::Login(login)
            }
            OP_LOG_ENTRY | OP_PARTIAL_ENTRY => {
                frames += 1;
                Event::Frame(read_frame(&mut stream, opcode == OP_PARTIAL_ENTRY)?)
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown opcode {other:#04x}"),
                ));
            }
        };
        if tx.send(event).is_err() {
            return Ok(());
        }
    }
}

fn read_login(stream: &mut impl Read) -> io::Result<Login> {
    let [mode] = take::<1>(stream)?;
    if mode == 0 {
        let login = take_str(stream)?;
        let password = take_str(stream)?;
        Ok(Login::Password { login, password })
    } else {
        Ok(Login::Token(take_str(stream)?))
    }
}

fn read_frame(stream: &mut impl Read, partial: bool) -> io::Result<Frame> {
    let token_len = usize::from(u16::from_be_bytes(take(stream)?));
    let token = take_vec(stream, token_len)?;
    let part = if partial {
        Some(Part {
            partial_id: take(stream)?,
            index: u32::from_be_bytes(take(stream)?),
            total_parts: u32::from_be_bytes(take(stream)?),
            total_size_tokens: i32::from_be_bytes(take(stream)?),
        })
    } else {
        None
    };
    let body_len = u32::from_be_bytes(take(stream)?) as usize;
    let body = take_vec(stream, body_len)?;
    let entry = rmp_serde::from_slice(&body).map_err(io::Error::other)?;
    Ok(Frame { token, part, entry })
}
