//! Newline-delimited JSON input
//!
//! Lines are read as raw bytes so a line that is not valid UTF-8 is reported
//! like any other malformed line instead of ending the stream.

use crate::Result;
use serde_json::{Map, Value};
use std::io::BufRead;

/// One non-blank input line
#[derive(Debug)]
pub enum Line {
    Object(Map<String, Value>),
    /// Valid JSON, but not an object
    NotObject,
    Invalid(serde_json::Error),
}

/// Iterator over the non-blank lines of a reader, with 1-based line numbers
pub struct JsonLines<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: usize,
}

impl<R: BufRead> JsonLines<R> {
    pub fn new(reader: R) -> Self {
        JsonLines {
            reader,
            buf: Vec::new(),
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for JsonLines<R> {
    type Item = Result<(usize, Line)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => return Some(Err(err.into())),
            }
            self.line_number += 1;

            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let line = match serde_json::from_slice::<Value>(&self.buf) {
                Ok(Value::Object(record)) => Line::Object(record),
                Ok(_) => Line::NotObject,
                Err(err) => Line::Invalid(err),
            };
            return Some(Ok((self.line_number, line)));
        }
    }
}
