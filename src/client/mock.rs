//! Scripted station side of the serial link, for tests.

use std::collections::{HashMap, VecDeque};
use std::io;

use super::Transport;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// A full line, terminated with `\r` on the wire.
    Line(String),
    /// Bytes without the terminating `\r`.
    Partial(String),
    /// Nothing at all; the read times out.
    Silence,
    /// The device goes away.
    Disconnect,
}

pub(crate) fn line(text: &str) -> Reply {
    Reply::Line(text.to_string())
}

#[derive(Debug, Default)]
pub(crate) struct MockStation {
    queued: HashMap<String, VecDeque<Reply>>,
    defaults: HashMap<String, Reply>,
    pending: Vec<u8>,
    inbox: VecDeque<u8>,
    disconnected: bool,
    pub sent: Vec<String>,
}

impl MockStation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A station with a plausible answer to every command the driver sends.
    pub fn healthy() -> Self {
        let mut station = Self::new();
        for (command, reply) in [
            ("EC", "OK"),
            ("LS", "OK"),
            ("XCA", "OK"),
            ("CWGH", "OK"),
            ("RTI", "t022C"),
            ("RTO", "T045"),
            ("RHI", "h40"),
            ("RHO", "H85"),
            ("RWA", "w010M270D"),
            ("RWGH", "<W025M280D"),
            ("RB", "B2992"),
            ("RR", "R00125"),
            ("RRR", "RR00010"),
            ("RWCA", ">cT041"),
            ("RT", "123456"),
            ("RD", "240315"),
        ] {
            station.set(command, line(reply));
        }
        station
    }

    /// Sets the standing reply to `command`.
    pub fn set(&mut self, command: &str, reply: Reply) -> &mut Self {
        self.defaults.insert(command.to_string(), reply);
        self
    }

    /// Queues a one-shot reply that takes precedence over the standing one.
    pub fn push(&mut self, command: &str, reply: Reply) -> &mut Self {
        self.queued
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn count(&self, command: &str) -> usize {
        self.sent.iter().filter(|sent| sent.as_str() == command).count()
    }

    fn reply_to(&mut self, command: &str) -> Reply {
        if let Some(reply) = self.queued.get_mut(command).and_then(VecDeque::pop_front) {
            return reply;
        }
        self.defaults.get(command).cloned().unwrap_or(Reply::Silence)
    }

    fn unplugged() -> io::Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "station unplugged")
    }
}

impl Transport for MockStation {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.disconnected {
            return Err(Self::unplugged());
        }
        for &b in bytes {
            if b != b'\r' {
                self.pending.push(b);
                continue;
            }
            let request = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            let command = request.strip_prefix("AT").unwrap_or(&request).to_string();
            self.sent.push(command.clone());
            match self.reply_to(&command) {
                Reply::Line(text) => {
                    self.inbox.extend(text.bytes());
                    self.inbox.push_back(b'\r');
                }
                Reply::Partial(text) => self.inbox.extend(text.bytes()),
                Reply::Silence => {}
                Reply::Disconnect => self.disconnected = true,
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(b) = self.inbox.pop_front() {
            return Ok(Some(b));
        }
        if self.disconnected {
            Err(Self::unplugged())
        } else {
            Ok(None)
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        if self.disconnected {
            return Err(Self::unplugged());
        }
        self.inbox.clear();
        Ok(())
    }
}
