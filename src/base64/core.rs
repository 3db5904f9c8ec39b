use std::convert::Infallible;
use std::fmt::Display;
use std::io::{BufReader, Read, Write};

use base64_simd::AsOut;

use crate::common::cancel::{Cancellation, Cancelled};
use crate::common::io::{ReadError, read_chunk, read_line};

use super::error::Base64Error;

const BASE64_ENGINE: &base64_simd::Base64 = &base64_simd::STANDARD;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Column width used when none was given.
pub const DEFAULT_WRAP_WIDTH: usize = 76;

/// Input is pulled in chunks of this size, with a cancellation check per chunk.
const READ_CHUNK: usize = 32 * 1024;

/// Pure passes over long buffers poll the token once per this many characters.
const POLL_INTERVAL: usize = 1000;

/// Options for one base64 run, shared read-only by every input source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Decode instead of encode.
    pub decode: bool,
    /// When decoding, drop every byte outside the base64 alphabet.
    pub ignore_garbage: bool,
    /// Wrapping was requested explicitly.
    pub wrap: bool,
    /// Wrap column; `None` means [`DEFAULT_WRAP_WIDTH`], `Some(0)` disables wrapping.
    pub wrap_width: Option<usize>,
}

impl Config {
    pub fn width(&self) -> usize {
        self.wrap_width.unwrap_or(DEFAULT_WRAP_WIDTH)
    }

    /// Column after which encoded output is broken, or 0 for a single line.
    ///
    /// An unset width resolves to the default, so `wrap` never changes the
    /// column on its own; an explicit zero width disables wrapping even when
    /// `wrap` is set.
    pub fn wrap_column(&self) -> usize {
        self.width()
    }
}

/// Encode or decode one input source according to `config`.
pub fn process_source(
    reader: &mut impl Read,
    config: &Config,
    cancel: &Cancellation,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<(), Base64Error> {
    if config.decode {
        decode_source(reader, config, cancel, out, err)
    } else {
        encode_source(reader, config, cancel, out, err)
    }
}

/// Read `reader` to exhaustion and write its base64 encoding, wrapped per
/// `config`, followed by a single newline. Empty input produces no output.
///
/// Nothing is written until the whole source has been read and wrapped, so a
/// cancelled or failed read never leaves partial output behind.
pub fn encode_source(
    reader: &mut impl Read,
    config: &Config,
    cancel: &Cancellation,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<(), Base64Error> {
    cancel.check()?;

    let mut data = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match read_chunk(reader, &mut buf, cancel) {
            Ok(n) => n,
            Err(e) => return Err(report_read_error(e, err)),
        };
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    if data.is_empty() {
        return Ok(());
    }

    let enc_len = BASE64_ENGINE.encoded_length(data.len());
    let mut encode_buf = vec![0u8; enc_len];
    let encoded = BASE64_ENGINE.encode(data.as_slice(), encode_buf[..enc_len].as_out());

    let wrap_col = config.wrap_column();
    let wrapped;
    let text: &[u8] = if wrap_col > 0 {
        wrapped = wrap_with(encoded.iter().copied(), wrap_col, b'\n', || cancel.check())?;
        &wrapped
    } else {
        encoded
    };

    cancel.check()?;
    out.write_all(text).map_err(Base64Error::Write)?;
    out.write_all(b"\n").map_err(Base64Error::Write)
}

/// Read base64 text line by line and write the decoded bytes.
///
/// Without `ignore_garbage` each line is trimmed of surrounding whitespace;
/// with it, everything outside the alphabet is dropped instead. Lines are
/// joined and decoded in one pass: on failure nothing is written.
pub fn decode_source(
    reader: &mut impl Read,
    config: &Config,
    cancel: &Cancellation,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Result<(), Base64Error> {
    cancel.check()?;

    let mut reader = BufReader::with_capacity(READ_CHUNK, reader);
    let mut encoded = Vec::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        match read_line(&mut reader, &mut line, cancel) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => return Err(report_read_error(e, err)),
        }
        if config.ignore_garbage {
            retain_alphabet(&line, &mut encoded, || cancel.check())?;
        } else {
            encoded.extend_from_slice(line.trim_ascii());
        }
    }

    cancel.check()?;

    if config.ignore_garbage {
        complete_tail(&mut encoded);
    }
    if encoded.is_empty() {
        return Ok(());
    }
    clear_unused_bits(&mut encoded);

    let decoded = match BASE64_ENGINE.decode_to_vec(encoded.as_slice()) {
        Ok(decoded) => decoded,
        Err(_) => {
            cancel.check()?;
            let e = Base64Error::Decode;
            report(err, &e);
            return Err(e);
        }
    };

    cancel.check()?;
    out.write_all(&decoded).map_err(Base64Error::Write)
}

/// Insert a newline after every `width` characters of `s`, never after the
/// last one. A zero width returns `s` unchanged.
pub fn wrap(s: &str, width: usize) -> String {
    if width == 0 {
        return s.to_string();
    }
    let Ok(wrapped) = wrap_with(s.chars(), width, '\n', || Ok::<(), Infallible>(()));
    wrapped.into_iter().collect()
}

/// Keep only `A-Z a-z 0-9 + / =`, in order.
pub fn strip_garbage(s: &str) -> String {
    s.chars()
        .filter(|&c| c.is_ascii() && is_base64_char(c as u8))
        .collect()
}

/// Shared wrapping loop. `width` must be non-zero.
fn wrap_with<T: Copy, E>(
    items: impl IntoIterator<Item = T>,
    width: usize,
    newline: T,
    mut poll: impl FnMut() -> Result<(), E>,
) -> Result<Vec<T>, E> {
    let items = items.into_iter();
    let (len, _) = items.size_hint();
    let mut out = Vec::with_capacity(len + len / width);

    for (i, item) in items.enumerate() {
        if i % POLL_INTERVAL == 0 {
            poll()?;
        }
        if i > 0 && i % width == 0 {
            out.push(newline);
        }
        out.push(item);
    }
    Ok(out)
}

/// Append the alphabet bytes of `data` to `out`.
fn retain_alphabet(
    data: &[u8],
    out: &mut Vec<u8>,
    mut cancel: impl FnMut() -> Result<(), Cancelled>,
) -> Result<(), Cancelled> {
    for (i, &b) in data.iter().enumerate() {
        if i % POLL_INTERVAL == 0 {
            cancel()?;
        }
        if is_base64_char(b) {
            out.push(b);
        }
    }
    Ok(())
}

/// Make garbage-filtered text that stops mid-quantum decodable.
///
/// Trailing `=` of the partial quantum are dropped. Two or three symbols
/// still carry whole bytes and are re-padded. A lone symbol carries none
/// and is discarded.
fn complete_tail(encoded: &mut Vec<u8>) {
    let tail_start = encoded.len() - encoded.len() % 4;
    if tail_start == encoded.len() {
        return;
    }
    while encoded.len() > tail_start && encoded.last() == Some(&b'=') {
        encoded.pop();
    }

    let symbols = encoded.len() - tail_start;
    if symbols < 2 {
        encoded.truncate(tail_start);
        return;
    }

    encoded.resize(tail_start + 4, b'=');
}

/// Zero the bits of the final padded quantum that belong to no byte.
///
/// `YR==` carries one byte in twelve bits; the low four are padding noise
/// that a non-strict decoder ignores, so `YR==` reads the same as `YQ==`.
fn clear_unused_bits(encoded: &mut [u8]) {
    let len = encoded.len();
    if len < 4 || len % 4 != 0 {
        return;
    }
    let (pos, mask) = match &encoded[len - 2..] {
        b"==" => (len - 3, 0b11_0000),
        [_, b'='] => (len - 2, 0b11_1100),
        _ => return,
    };
    if let Some(value) = symbol_value(encoded[pos]) {
        encoded[pos] = ALPHABET[(value & mask) as usize];
    }
}

#[inline]
fn symbol_value(b: u8) -> Option<u8> {
    ALPHABET.iter().position(|&c| c == b).map(|p| p as u8)
}

/// Check if a byte is a valid base64 alphabet character or padding.
#[inline]
fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
}

fn report_read_error(e: ReadError, err: &mut impl Write) -> Base64Error {
    let e = Base64Error::from(e);
    if !e.is_cancelled() {
        report(err, &e);
    }
    e
}

/// One diagnostic line, GNU style. A failing diagnostic sink is ignored.
fn report(err: &mut impl Write, msg: &dyn Display) {
    let _ = writeln!(err, "base64: {}", msg);
}
