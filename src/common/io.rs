use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufRead, Read};
use std::path::Path;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use super::cancel::{Cancellation, Cancelled};

/// Failure of a cancellation-aware read.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error(transparent)]
    Io(io::Error),
}

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
/// After the first EPERM, we never try O_NOATIME again (saves one syscall per file).
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open a file with O_NOATIME on Linux to avoid atime inode writes.
#[cfg(target_os = "linux")]
fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                // O_NOATIME requires file ownership or CAP_FOWNER
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e),
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

enum Input {
    Stdin(io::Stdin),
    File(File),
}

/// A named, readable byte stream: standard input or an opened file.
/// The name is only used for diagnostics.
pub struct InputSource {
    name: String,
    input: Input,
}

impl InputSource {
    /// Open `name` for reading. `-` means standard input.
    pub fn open(name: &str) -> io::Result<Self> {
        if name == "-" {
            return Ok(Self::stdin());
        }
        let path = Path::new(name);
        if fs::metadata(path)?.is_dir() {
            return Err(io::Error::other("Is a directory"));
        }
        Ok(Self {
            name: name.to_string(),
            input: Input::File(open_noatime(path)?),
        })
    }

    pub fn stdin() -> Self {
        Self {
            name: "standard input".to_string(),
            input: Input::Stdin(io::stdin()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Read for InputSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.input {
            Input::Stdin(s) => s.read(buf),
            Input::File(f) => f.read(buf),
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSource").field("name", &self.name).finish()
    }
}

/// Read as many bytes as possible into buf, retrying on partial reads.
/// Returns 0 only at end of stream. The token is polled before every
/// read() and whenever a read is interrupted by a signal.
pub fn read_chunk(
    reader: &mut impl Read,
    buf: &mut [u8],
    cancel: &Cancellation,
) -> Result<usize, ReadError> {
    let mut total = 0;
    while total < buf.len() {
        cancel.check()?;
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ReadError::Io(e)),
        }
    }
    Ok(total)
}

/// Append the next line (including its `\n`, if any) to `line`.
/// Returns the number of bytes consumed; 0 means end of stream.
///
/// Unlike `BufRead::read_until`, an interrupted fill is not retried
/// blindly: the token is polled first, and again on every buffer refill,
/// so a single enormous line cannot hold off cancellation.
pub fn read_line(
    reader: &mut impl BufRead,
    line: &mut Vec<u8>,
    cancel: &Cancellation,
) -> Result<usize, ReadError> {
    let mut total = 0;
    loop {
        cancel.check()?;
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ReadError::Io(e)),
        };
        if available.is_empty() {
            return Ok(total);
        }
        match memchr::memchr(b'\n', available) {
            Some(pos) => {
                line.extend_from_slice(&available[..=pos]);
                reader.consume(pos + 1);
                return Ok(total + pos + 1);
            }
            None => {
                let n = available.len();
                line.extend_from_slice(available);
                reader.consume(n);
                total += n;
            }
        }
    }
}
