//! Scripted in-memory server for driving `sync::Conn` without a database.

#![allow(dead_code)]

use std::cell::RefCell;
use std::io::{Cursor, Read, Write};
use std::rc::Rc;

/// Stream that replays prepared backend messages and records what the
/// client writes.
pub struct ScriptedStream {
    input: Cursor<Vec<u8>>,
    written: Rc<RefCell<Vec<u8>>>,
}

impl ScriptedStream {
    pub fn new(script: Script) -> (Self, Written) {
        let written = Rc::new(RefCell::new(Vec::new()));
        let stream = Self {
            input: Cursor::new(script.bytes),
            written: Rc::clone(&written),
        };
        (stream, Written(written))
    }
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.written.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Handle on the bytes written by the client.
pub struct Written(Rc<RefCell<Vec<u8>>>);

impl Written {
    /// Frontend messages written since the last call.
    pub fn take(&self) -> Vec<(u8, Vec<u8>)> {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        split_messages(&bytes)
    }

    /// Type bytes of the messages written since the last call.
    pub fn take_types(&self) -> String {
        self.take().iter().map(|(t, _)| *t as char).collect()
    }
}

pub fn split_messages(mut bytes: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut messages = Vec::new();
    while !bytes.is_empty() {
        let len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        messages.push((bytes[0], bytes[5..1 + len].to_vec()));
        bytes = &bytes[1 + len..];
    }
    messages
}

fn cstr(bytes: &[u8]) -> (String, &[u8]) {
    let end = bytes.iter().position(|b| *b == 0).unwrap();
    (
        String::from_utf8(bytes[..end].to_vec()).unwrap(),
        &bytes[end + 1..],
    )
}

/// Decoded Bind message.
#[derive(Debug, PartialEq)]
pub struct Bind {
    pub portal: String,
    pub statement: String,
    pub params: Vec<Option<String>>,
}

pub fn decode_bind(payload: &[u8]) -> Bind {
    let (portal, rest) = cstr(payload);
    let (statement, rest) = cstr(rest);
    let formats = u16::from_be_bytes([rest[0], rest[1]]) as usize;
    let mut rest = &rest[2 + formats * 2..];
    let count = u16::from_be_bytes([rest[0], rest[1]]) as usize;
    rest = &rest[2..];

    let mut params = Vec::with_capacity(count);
    for _ in 0..count {
        let len = i32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        rest = &rest[4..];
        if len < 0 {
            params.push(None);
        } else {
            let len = len as usize;
            params.push(Some(String::from_utf8(rest[..len].to_vec()).unwrap()));
            rest = &rest[len..];
        }
    }
    Bind {
        portal,
        statement,
        params,
    }
}

/// Parse message: statement name and query text.
pub fn decode_parse(payload: &[u8]) -> (String, String) {
    let (name, rest) = cstr(payload);
    let (query, _) = cstr(rest);
    (name, query)
}

/// Backend messages in the order the server sends them.
#[derive(Default)]
pub struct Script {
    bytes: Vec<u8>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn msg(mut self, type_byte: u8, payload: &[u8]) -> Self {
        self.bytes.push(type_byte);
        self.bytes
            .extend_from_slice(&(payload.len() as u32 + 4).to_be_bytes());
        self.bytes.extend_from_slice(payload);
        self
    }

    pub fn parse_complete(self) -> Self {
        self.msg(b'1', b"")
    }

    pub fn bind_complete(self) -> Self {
        self.msg(b'2', b"")
    }

    pub fn close_complete(self) -> Self {
        self.msg(b'3', b"")
    }

    pub fn no_data(self) -> Self {
        self.msg(b'n', b"")
    }

    pub fn portal_suspended(self) -> Self {
        self.msg(b's', b"")
    }

    pub fn ready(self, status: u8) -> Self {
        self.msg(b'Z', &[status])
    }

    pub fn row_description(self, columns: &[(&str, u32)]) -> Self {
        let mut payload = (columns.len() as u16).to_be_bytes().to_vec();
        for (name, oid) in columns {
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
            payload.extend_from_slice(&0_u32.to_be_bytes());
            payload.extend_from_slice(&0_i16.to_be_bytes());
            payload.extend_from_slice(&oid.to_be_bytes());
            payload.extend_from_slice(&(-1_i16).to_be_bytes());
            payload.extend_from_slice(&(-1_i32).to_be_bytes());
            payload.extend_from_slice(&0_u16.to_be_bytes());
        }
        self.msg(b'T', &payload)
    }

    pub fn data_row(self, values: &[Option<&str>]) -> Self {
        let mut payload = (values.len() as u16).to_be_bytes().to_vec();
        for value in values {
            match value {
                Some(v) => {
                    payload.extend_from_slice(&(v.len() as i32).to_be_bytes());
                    payload.extend_from_slice(v.as_bytes());
                }
                None => payload.extend_from_slice(&(-1_i32).to_be_bytes()),
            }
        }
        self.msg(b'D', &payload)
    }

    pub fn command_complete(self, tag: &str) -> Self {
        let mut payload = tag.as_bytes().to_vec();
        payload.push(0);
        self.msg(b'C', &payload)
    }

    pub fn error(self, severity: &str, code: &str, message: &str) -> Self {
        let payload = format!("S{severity}\0V{severity}\0C{code}\0M{message}\0\0");
        self.msg(b'E', payload.as_bytes())
    }

    pub fn notice(self, message: &str) -> Self {
        let payload = format!("SNOTICE\0C00000\0M{message}\0\0");
        self.msg(b'N', payload.as_bytes())
    }

    pub fn parameter_status(self, name: &str, value: &str) -> Self {
        let payload = format!("{name}\0{value}\0");
        self.msg(b'S', payload.as_bytes())
    }
}
