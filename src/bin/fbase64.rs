use std::io::{self, BufWriter, Write};
use std::process;

use clap::Parser;

use base64_rs::base64::{self as b64, Base64Error, Config};
use base64_rs::common::cancel::cancel_on_signals;
use base64_rs::common::io::InputSource;
use base64_rs::common::{Cancellation, io_error_msg, reset_sigpipe};

/// Exit status after SIGINT/SIGTERM, as a shell reports it (128 + SIGINT).
const EXIT_CANCELLED: i32 = 130;

#[derive(Parser)]
#[command(
    name = "base64",
    about = "Base64 encode or decode FILE, or standard input, to standard output.",
    after_help = "With no FILE, or when FILE is -, read standard input.\n\n\
        The data are encoded as described for the base64 alphabet in RFC 4648.\n\
        When decoding, the input may contain newlines in addition to the bytes of\n\
        the formal base64 alphabet.  Use --ignore-garbage to attempt to recover\n\
        from any other non-alphabet bytes in the encoded stream.",
    version
)]
struct Cli {
    /// Decode data
    #[arg(short = 'd', long = "decode")]
    decode: bool,

    /// When decoding, ignore non-alphabet characters
    #[arg(short = 'i', long = "ignore-garbage")]
    ignore_garbage: bool,

    /// Wrap encoded lines after COLS character (default 76).
    /// Use 0 to disable line wrapping
    #[arg(short = 'w', long = "wrap", value_name = "COLS")]
    wrap: Option<usize>,

    /// Files to process (reads stdin if omitted or -)
    files: Vec<String>,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            decode: self.decode,
            ignore_garbage: self.ignore_garbage,
            wrap: self.wrap.is_some(),
            wrap_width: self.wrap,
        }
    }
}

/// Enlarge pipe buffers on Linux for higher throughput.
#[cfg(target_os = "linux")]
fn enlarge_pipes() {
    const PIPE_SIZE: i32 = 8 * 1024 * 1024;
    unsafe {
        libc::fcntl(0, libc::F_SETPIPE_SZ, PIPE_SIZE); // stdin
        libc::fcntl(1, libc::F_SETPIPE_SZ, PIPE_SIZE); // stdout
    }
}

/// How a whole run ended.
enum Outcome {
    Success,
    Failed,
    Cancelled,
}

/// Process every file in order. A failing file does not stop the run;
/// cancellation does.
fn run(
    files: &[String],
    config: &Config,
    cancel: &Cancellation,
    out: &mut impl Write,
    err: &mut impl Write,
) -> Outcome {
    let mut had_error = false;

    for filename in files {
        let mut source = match InputSource::open(filename) {
            Ok(source) => source,
            Err(e) => {
                let _ = writeln!(err, "base64: {}: {}", filename, io_error_msg(&e));
                had_error = true;
                continue;
            }
        };

        match b64::process_source(&mut source, config, cancel, out, err) {
            Ok(()) => {}
            Err(Base64Error::Cancelled(_)) => return Outcome::Cancelled,
            Err(Base64Error::Write(e)) => {
                // On Unix SIGPIPE is fatal (see reset_sigpipe), so this only
                // fires where the platform reports EPIPE as an error instead.
                if e.kind() == io::ErrorKind::BrokenPipe {
                    process::exit(0);
                }
                let _ = writeln!(err, "base64: write error: {}", io_error_msg(&e));
                return Outcome::Failed;
            }
            // Read and decode failures were already reported by the engine.
            Err(Base64Error::Read(_) | Base64Error::Decode) => had_error = true,
        }
    }

    if had_error {
        Outcome::Failed
    } else {
        Outcome::Success
    }
}

fn main() {
    reset_sigpipe();

    #[cfg(target_os = "linux")]
    enlarge_pipes();

    let cli = Cli::parse();
    let config = cli.config();

    let cancel = Cancellation::new();
    if let Err(e) = cancel_on_signals(&cancel) {
        eprintln!("base64: {}", io_error_msg(&e));
        process::exit(1);
    }

    let files = if cli.files.is_empty() {
        vec!["-".to_string()]
    } else {
        cli.files.clone()
    };

    let stdout = io::stdout();
    let mut out = BufWriter::with_capacity(2 * 1024 * 1024, stdout.lock());
    let stderr = io::stderr();
    let mut err = stderr.lock();

    let outcome = run(&files, &config, &cancel, &mut out, &mut err);

    if let Err(e) = out.flush() {
        if e.kind() == io::ErrorKind::BrokenPipe {
            process::exit(0);
        }
        eprintln!("base64: write error: {}", io_error_msg(&e));
        process::exit(1);
    }

    match outcome {
        Outcome::Success => {}
        Outcome::Failed => process::exit(1),
        Outcome::Cancelled => process::exit(EXIT_CANCELLED),
    }
}
