//! Child-process runner shared by the tar, rsync and ssh collaborators.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;
use wait_timeout::ChildExt;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};

const POLL: Duration = Duration::from_millis(200);
const STDERR_TAIL: usize = 2048;

#[derive(Default)]
pub struct RunOptions<'a> {
    pub stdin: Option<Vec<u8>>,
    pub capture_stdout: bool,
    pub timeout: Option<Duration>,
    pub cancel: Option<&'a CancelToken>,
}

#[derive(Debug, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

fn drain<R: Read + Send + 'static>(r: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    r.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(h: Option<JoinHandle<Vec<u8>>>) -> String {
    h.and_then(|h| h.join().ok())
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}

fn tail(s: &str) -> String {
    let s = s.trim();
    match s.char_indices().rev().nth(STDERR_TAIL) {
        Some((i, _)) => s[i..].to_string(),
        None => s.to_string(),
    }
}

fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Run `cmd` to completion. A non-zero exit, a timeout or a cancellation is
/// an error; the child is killed in the latter two cases.
pub fn run(mut cmd: Command, opts: RunOptions<'_>) -> Result<CommandOutput> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("running {:?}", cmd);
    cmd.stdin(if opts.stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(if opts.capture_stdout { Stdio::piped() } else { Stdio::inherit() })
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| Error::io(&program, e))?;

    let feeder = match (opts.stdin, child.stdin.take()) {
        (Some(data), Some(mut pipe)) => Some(thread::spawn(move || pipe.write_all(&data))),
        _ => None,
    };
    let out = drain(child.stdout.take());
    let err = drain(child.stderr.take());

    let started = Instant::now();
    let status = loop {
        if let Some(c) = opts.cancel {
            if c.is_cancelled() {
                stop(&mut child);
                return Err(Error::Cancelled);
            }
        }
        let step = match opts.timeout {
            Some(limit) => {
                let elapsed = started.elapsed();
                if elapsed >= limit {
                    stop(&mut child);
                    return Err(Error::Timeout { program, after: limit });
                }
                POLL.min(limit - elapsed)
            }
            None => POLL,
        };
        if let Some(status) = child.wait_timeout(step).map_err(|e| Error::io(&program, e))? {
            break status;
        }
    };

    if let Some(f) = feeder {
        // a child that exits early closes the pipe; its exit status tells the story
        let _ = f.join();
    }
    let stdout = collect(out);
    let stderr = collect(err);
    if !status.success() {
        return Err(Error::CommandFailed { program, status: status.to_string(), stderr: tail(&stderr) });
    }
    if !stderr.trim().is_empty() {
        debug!("{program} stderr: {}", stderr.trim());
    }
    Ok(CommandOutput { stdout, stderr })
}
