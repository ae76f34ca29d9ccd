//! Outbound message sinks.
//!
//! The session never talks to a socket directly: it is handed a
//! [`MessageSink`] at construction. [`UdpSink`] is the live wiring,
//! [`FileDumpSink`] writes the replayable text export and [`MemorySink`]
//! records messages in memory.

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::net::SocketAddr;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::osc::{self, OscArg, OscMessage};
use crate::transport::{self, UdpSender};

/// Destination for outbound OSC messages.
pub trait MessageSink {
    /// Deliver one message. Failures are handled (logged) by the sink.
    fn send(&mut self, address: &str, args: &[OscArg]);

    /// Push any buffered output to its destination.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Minimum wait between two lookups of an unresolvable engine host.
const RESOLVE_RETRY: Duration = Duration::from_secs(1);

/// Sends every message as one UDP datagram to the engine.
///
/// The engine address is resolved once and cached. It is only looked up
/// again after a failed send, and failed lookups are retried at most once per
/// [`RESOLVE_RETRY`].
#[derive(Debug)]
pub struct UdpSink {
    sender: UdpSender,
    host: String,
    port: u16,
    target: Option<SocketAddr>,
    next_resolve: Option<Instant>,
}

impl UdpSink {
    /// Open the sender socket and resolve the engine address.
    ///
    /// An unresolvable host is not an error here: messages are dropped with a
    /// warning until a later lookup succeeds.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let mut sink = Self {
            sender: UdpSender::new()?,
            host: host.into(),
            port,
            target: None,
            next_resolve: None,
        };
        sink.target(Instant::now());
        Ok(sink)
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }

    fn target(&mut self, now: Instant) -> Option<SocketAddr> {
        if self.target.is_none() && self.next_resolve.map_or(true, |at| now >= at) {
            match transport::resolve(&self.host, self.port) {
                Ok(addr) => {
                    log::debug!("engine address {}:{} resolved to {}", self.host, self.port, addr);
                    self.target = Some(addr);
                    self.next_resolve = None;
                }
                Err(e) => {
                    log::warn!("{}", e);
                    self.next_resolve = Some(Instant::now() + RESOLVE_RETRY);
                }
            }
        }
        self.target
    }
}

impl MessageSink for UdpSink {
    fn send(&mut self, address: &str, args: &[OscArg]) {
        let Some(addr) = self.target(Instant::now()) else {
            log::debug!("osc message {} dropped, engine address unresolved", address);
            return;
        };
        let frame = osc::encode(address, args);
        match self.sender.send_to_addr(&frame, addr) {
            Ok(()) => log::debug!("-> {} {} {:?}", addr, address, args),
            Err(e) => {
                log::warn!("osc message {} dropped: {}", address, e);
                self.target = None;
            }
        }
    }
}

/// Writes messages as `<address> <args...>` lines.
///
/// `dsp` and `destroy` messages are left out so the dump only describes the
/// scene, not the session lifecycle around it.
pub struct FileDumpSink<W: Write = BufWriter<File>> {
    writer: W,
}

impl FileDumpSink<BufWriter<File>> {
    /// Create (or truncate) the dump file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FileDumpSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> MessageSink for FileDumpSink<W> {
    fn send(&mut self, address: &str, args: &[OscArg]) {
        if is_lifecycle_only(address) {
            return;
        }
        if let Err(e) = writeln!(self.writer, "{}", format_line(address, args)) {
            log::warn!("failed to write {} to export: {}", address, e);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

fn is_lifecycle_only(address: &str) -> bool {
    address
        .split('/')
        .any(|segment| segment == "dsp" || segment == "destroy")
}

/// Render one message as a dump line.
pub fn format_line(address: &str, args: &[OscArg]) -> String {
    let mut line = address.to_string();
    for arg in args {
        match arg {
            OscArg::Int(v) => line.push_str(&format!(" {}", v)),
            OscArg::Float(v) => line.push_str(&format!(" {}", format_float(*v))),
            OscArg::Str(s) => line.push_str(&format!(" {}", s)),
            OscArg::FloatArray(values) => {
                for v in values {
                    line.push_str(&format!(" {}", format_float(*v)));
                }
            }
        }
    }
    line
}

/// Round to 4 decimals and print without exponent notation.
/// Whole numbers keep one decimal (`343.0`) so floats stay recognisable.
fn format_float(v: f32) -> String {
    let rounded = (v as f64 * 10_000.0).round() / 10_000.0;
    // Avoid printing "-0.0" for tiny negatives.
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    let mut s = format!("{:.4}", rounded);
    while s.ends_with('0') && !s.ends_with(".0") {
        s.pop();
    }
    s
}

/// Records messages in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Rc<RefCell<Vec<OscMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    pub fn messages(&self) -> Vec<OscMessage> {
        self.messages.borrow().clone()
    }

    /// Addresses of everything sent so far, in order.
    pub fn addresses(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .map(|m| m.address.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }
}

impl MessageSink for MemorySink {
    fn send(&mut self, address: &str, args: &[OscArg]) {
        self.messages
            .borrow_mut()
            .push(OscMessage::new(address, args.to_vec()));
    }
}
