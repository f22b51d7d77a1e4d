//! Stdout redirection into the log.
//!
//! Native libraries loaded next to WebKit print to stdout, which Android
//! discards. The pipe installed here turns every line into a `tracing`
//! event, so it ends up in logcat through the same logger as the glue's own
//! messages.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::{FromRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::info;

static STDOUT_PIPED: AtomicBool = AtomicBool::new(false);

/// Redirect stdout (and optionally stderr) into the log.
///
/// Installs a pipe over the standard descriptors and spawns a thread that
/// logs each line at info level. Returns `Ok(false)` if the redirect is
/// already in place. Stderr is only redirected on Android, where the logger
/// does not write to stderr itself.
pub fn pipe_stdout_to_logcat(include_stderr: bool) -> io::Result<bool> {
    if STDOUT_PIPED.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }

    install_pipe(include_stderr && cfg!(target_os = "android")).inspect_err(|_| {
        STDOUT_PIPED.store(false, Ordering::SeqCst);
    })?;
    Ok(true)
}

fn install_pipe(include_stderr: bool) -> io::Result<()> {
    let mut fds: [RawFd; 2] = [-1; 2];
    // SAFETY: `fds` has room for the two descriptors pipe() writes.
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    let [read_fd, write_fd] = fds;

    // SAFETY: read_fd is a fresh descriptor owned by nobody else.
    let reader = unsafe { File::from_raw_fd(read_fd) };

    // Anything already buffered goes to the old stdout
    let _ = io::stdout().flush();

    let mut targets = vec![libc::STDOUT_FILENO];
    if include_stderr {
        targets.push(libc::STDERR_FILENO);
    }
    for target in targets {
        // SAFETY: both descriptors are valid; dup2 does not take ownership.
        if unsafe { libc::dup2(write_fd, target) } == -1 {
            let err = io::Error::last_os_error();
            // SAFETY: write_fd is still ours to close.
            unsafe { libc::close(write_fd) };
            return Err(err);
        }
    }
    // SAFETY: the standard descriptors now hold their own copies.
    unsafe { libc::close(write_fd) };

    thread::Builder::new()
        .name("wpe-stdout".to_string())
        .spawn(move || {
            forward_lines(BufReader::new(reader), |line| info!(target: "stdout", "{}", line));
        })?;

    Ok(())
}

/// Feed every non-empty line from `reader` to `sink`; returns the count.
fn forward_lines<R, F>(mut reader: R, mut sink: F) -> usize
where
    R: BufRead,
    F: FnMut(&str),
{
    let mut forwarded = 0;
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end_matches(['\r', '\n']);
                if !text.is_empty() {
                    sink(text);
                    forwarded += 1;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    forwarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_forward_lines_skips_empty() {
        let input = Cursor::new(b"first\n\nsecond\r\n\nthird".to_vec());
        let mut lines = Vec::new();

        let count = forward_lines(input, |line| lines.push(line.to_string()));

        assert_eq!(count, 3);
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_forward_lines_lossy_utf8() {
        let input = Cursor::new(vec![b'o', b'k', 0xff, b'\n']);
        let mut lines = Vec::new();

        forward_lines(input, |line| lines.push(line.to_string()));

        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ok"));
    }
}
