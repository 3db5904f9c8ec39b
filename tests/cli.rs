use std::io::Write;
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn fbase64() -> Command {
    Command::new(env!("CARGO_BIN_EXE_fbase64"))
}

fn run_with_stdin(args: &[&str], stdin: &[u8]) -> Output {
    let mut child = fbase64()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(stdin).unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn test_encode_stdin() {
    let output = run_with_stdin(&[], b"Hello World");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"SGVsbG8gV29ybGQ=\n");
    assert!(output.stderr.is_empty());
}

#[test]
fn test_decode_stdin() {
    let output = run_with_stdin(&["-d"], b"SGVsbG8gV29ybGQ=\n");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"Hello World");
}

#[test]
fn test_wrap_width() {
    let output = run_with_stdin(&["-w", "20"], b"This is a longer string that will be wrapped");
    assert_eq!(
        output.stdout,
        b"VGhpcyBpcyBhIGxvbmdl\nciBzdHJpbmcgdGhhdCB3\naWxsIGJlIHdyYXBwZWQ=\n"
    );
}

#[test]
fn test_wrap_zero_disables() {
    let input = vec![b'x'; 300];
    let output = run_with_stdin(&["--wrap=0"], &input);
    assert_eq!(output.stdout.iter().filter(|&&b| b == b'\n').count(), 1);
}

#[test]
fn test_decode_invalid_exit_code() {
    let output = run_with_stdin(&["-d"], b"invalid base64!");
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert_eq!(String::from_utf8_lossy(&output.stderr), "base64: invalid input\n");
}

#[test]
fn test_decode_ignore_garbage() {
    let output = run_with_stdin(&["-d", "-i"], b"SGVs!!bG8=\n");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"Hello");
}

#[test]
fn test_multiple_files_continue_on_error() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    std::fs::write(&first, b"abc").unwrap();
    std::fs::write(&second, b"def").unwrap();
    let missing = dir.path().join("missing");

    let output = fbase64()
        .arg(&first)
        .arg(&missing)
        .arg(&second)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(output.stdout, b"YWJj\nZGVm\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing: No such file or directory"), "{}", stderr);
}

#[test]
fn test_decode_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.bin");
    let data: Vec<u8> = (0..5000).map(|i| (i % 256) as u8).collect();
    std::fs::write(&plain, &data).unwrap();

    let encoded = fbase64().arg(&plain).output().unwrap();
    assert!(encoded.status.success());

    let encoded_path = dir.path().join("plain.b64");
    std::fs::write(&encoded_path, &encoded.stdout).unwrap();
    let decoded = fbase64().arg("-d").arg(&encoded_path).output().unwrap();
    assert!(decoded.status.success());
    assert_eq!(decoded.stdout, data);
}

#[test]
fn test_directory_argument() {
    let dir = tempfile::tempdir().unwrap();
    let output = fbase64().arg(dir.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Is a directory"));
}

#[cfg(unix)]
#[test]
fn test_sigint_cancels_blocked_read() {
    let mut child = fbase64()
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // Keep stdin open with some data so the run is waiting on the pipe.
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(&vec![b'z'; 64 * 1024]).unwrap();
    thread::sleep(Duration::from_millis(100));

    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGINT);
    }

    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            assert_eq!(status.code(), Some(130));
            break;
        }
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "fbase64 ignored SIGINT"
        );
        thread::sleep(Duration::from_millis(10));
    }
    drop(stdin);

    let output = child.wait_with_output().unwrap();
    assert!(output.stdout.is_empty());
    assert!(output.stderr.is_empty());
}

#[cfg(unix)]
#[test]
fn test_closed_stdout_kills_with_sigpipe() {
    use std::io::Read;
    use std::os::unix::process::ExitStatusExt;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("big.bin");
    std::fs::write(&input, vec![0x42u8; 20 * 1024 * 1024]).unwrap();

    let mut child = fbase64()
        .arg(&input)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdout = child.stdout.take().unwrap();
    let mut head = [0u8; 10];
    stdout.read_exact(&mut head).unwrap();
    assert_eq!(&head, b"QkJCQkJCQk");
    drop(stdout);

    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.signal(), Some(libc::SIGPIPE));
    assert!(output.stderr.is_empty());
}
