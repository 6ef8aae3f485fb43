//! Engine runner: one child process per request, stdout/stderr drained concurrently.
//!
//! The engine gets the text and language as two positional arguments (argv, never a shell
//! string), writes encoded audio to stdout and diagnostics to stderr, and does not read stdin.
//! Two reader tasks forward chunks over a channel to the supervising task, which owns both
//! buffers and produces exactly one [`RawRunResult`].
//!
//! The engine runs as the leader of its own process group. Whatever the exit path (clean
//! exit, timeout, output cap, dropped future), the whole group is killed so helpers the
//! engine started do not outlive the request.

use crate::config::EngineConfig;
use crate::request::SynthesisRequest;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;
/// Diagnostics past this size are dropped; the engine keeps running.
const MAX_DIAGNOSTICS: usize = 64 * 1024;
/// How long to keep draining the pipes after the engine exited while something else
/// in its group still holds them open.
const EXIT_GRACE: Duration = Duration::from_millis(200);

/// Final state of one engine invocation, before any success/failure policy is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRunResult {
    /// The process never started.
    LaunchFailed { message: String },
    /// The process exited on its own. `exit_code` is `None` when it was killed by a signal.
    Exited {
        exit_code: Option<i32>,
        audio: Vec<u8>,
        diagnostics: String,
    },
    /// The process ran but its exit status could not be collected.
    StatusUnavailable { message: String, diagnostics: String },
    /// Killed after exceeding the wall-clock bound.
    TimedOut { after: Duration, diagnostics: String },
    /// Killed after writing more audio than allowed.
    OutputTooLarge { limit: usize, diagnostics: String },
}

enum Chunk {
    Audio(Vec<u8>),
    Diagnostics(Vec<u8>),
}

/// Buffers owned by one invocation. Append-only until the run result is produced.
#[derive(Default)]
struct Invocation {
    audio: Vec<u8>,
    diagnostics: Vec<u8>,
}

impl Invocation {
    /// Append one chunk. Returns false once the audio exceeds `limit`.
    fn accept(&mut self, chunk: Chunk, limit: usize) -> bool {
        match chunk {
            Chunk::Audio(bytes) => {
                self.audio.extend_from_slice(&bytes);
                self.audio.len() <= limit
            }
            Chunk::Diagnostics(bytes) => {
                let room = MAX_DIAGNOSTICS.saturating_sub(self.diagnostics.len());
                self.diagnostics.extend_from_slice(&bytes[..bytes.len().min(room)]);
                true
            }
        }
    }

    // Decoded once at the end so multi-byte characters split across reads survive.
    fn diagnostics_text(&self) -> String {
        String::from_utf8_lossy(&self.diagnostics).into_owned()
    }
}

/// SIGKILLs the engine's process group when killed explicitly or dropped.
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(child: &Child) -> Self {
        Self {
            pgid: child.id().map(|pid| Pid::from_raw(pid as i32)),
        }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            match killpg(pgid, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => debug!(pgid = pgid.as_raw(), error = %e, "killpg on engine group failed"),
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Build the argv invocation for one request.
pub fn engine_command(config: &EngineConfig, request: &SynthesisRequest) -> Command {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .arg(&request.text)
        .arg(&request.language)
        .current_dir(&config.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);
    cmd
}

/// Run the engine for one request and wait for its single completion signal.
///
/// Dropping the returned future kills the engine's process group; the runtime reaps the
/// direct child (kill-on-drop).
pub async fn run_engine(config: &EngineConfig, request: &SynthesisRequest) -> RawRunResult {
    let mut child = match engine_command(config, request).spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(program = ?config.program, error = %e, "failed to start synthesis engine");
            return RawRunResult::LaunchFailed {
                message: e.to_string(),
            };
        }
    };
    let mut group = ProcessGroup::new(&child);
    debug!(pid = ?child.id(), program = ?config.program, "synthesis engine started");

    let (tx, mut rx) = mpsc::channel::<Chunk>(16);
    let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward(stdout, tx.clone(), Chunk::Audio)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward(stderr, tx.clone(), Chunk::Diagnostics)));
    }
    drop(tx);

    let mut inv = Invocation::default();
    let limit = config.max_output_bytes;
    let timeout = config.timeout();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    // Pipes and exit are watched together: a helper holding stdout open must not hide
    // the engine's own exit.
    let mut pipes_open = true;
    let status = loop {
        tokio::select! {
            chunk = rx.recv(), if pipes_open => match chunk {
                Some(chunk) => {
                    if !inv.accept(chunk, limit) {
                        warn!(limit, "engine output exceeded limit, killing");
                        terminate(&mut child, &mut group, &readers).await;
                        return RawRunResult::OutputTooLarge {
                            limit,
                            diagnostics: inv.diagnostics_text(),
                        };
                    }
                }
                None => pipes_open = false,
            },
            status = child.wait() => break status,
            _ = &mut deadline => {
                warn!(timeout_ms = config.timeout_ms, "engine timed out, killing");
                terminate(&mut child, &mut group, &readers).await;
                return RawRunResult::TimedOut { after: timeout, diagnostics: inv.diagnostics_text() };
            }
        }
    };

    // Output written just before exit may still be in flight.
    if pipes_open {
        let grace = tokio::time::sleep(EXIT_GRACE);
        tokio::pin!(grace);
        loop {
            tokio::select! {
                chunk = rx.recv() => match chunk {
                    Some(chunk) => {
                        if !inv.accept(chunk, limit) {
                            warn!(limit, "engine output exceeded limit after exit");
                            group.kill();
                            abort_readers(&readers);
                            return RawRunResult::OutputTooLarge {
                                limit,
                                diagnostics: inv.diagnostics_text(),
                            };
                        }
                    }
                    None => break,
                },
                _ = &mut grace => {
                    debug!("engine exited but its pipes are still held open");
                    break;
                }
            }
        }
    }
    group.kill();
    abort_readers(&readers);

    match status {
        Ok(status) => {
            let exit_code = status.code();
            debug!(?exit_code, audio_bytes = inv.audio.len(), "synthesis engine exited");
            RawRunResult::Exited {
                exit_code,
                diagnostics: inv.diagnostics_text(),
                audio: inv.audio,
            }
        }
        Err(e) => {
            warn!(error = %e, "failed to collect engine exit status");
            RawRunResult::StatusUnavailable {
                message: e.to_string(),
                diagnostics: inv.diagnostics_text(),
            }
        }
    }
}

/// Copy one pipe into the channel until EOF. Read errors end this reader only.
async fn forward<R>(mut reader: R, tx: mpsc::Sender<Chunk>, wrap: fn(Vec<u8>) -> Chunk)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "engine pipe read failed");
                break;
            }
        }
    }
}

/// Kill the process group, reap the child, then stop the readers.
async fn terminate(child: &mut Child, group: &mut ProcessGroup, readers: &[JoinHandle<()>]) {
    group.kill();
    if let Err(e) = child.kill().await {
        debug!(error = %e, "kill on engine process failed");
    }
    abort_readers(readers);
}

fn abort_readers(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn stub_engine(dir: &Path, body: &str) -> EngineConfig {
        let script = dir.join("engine.sh");
        fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        EngineConfig::for_program(script, dir)
    }

    /// True while `pid` names a live (not zombie) process.
    #[cfg(target_os = "linux")]
    fn is_running(pid: &str) -> bool {
        match fs::read_to_string(format!("/proc/{}/stat", pid.trim())) {
            Ok(stat) => !matches!(
                stat.rsplit(')').next().and_then(|rest| rest.trim_start().chars().next()),
                Some('Z') | Some('X')
            ),
            Err(_) => false,
        }
    }

    /// Wait briefly for the helper recorded in `helper.pid` to die.
    #[cfg(target_os = "linux")]
    async fn helper_is_gone(dir: &Path) -> bool {
        let pid = fs::read_to_string(dir.join("helper.pid")).unwrap();
        for _ in 0..50 {
            if !is_running(&pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            language: "hi".to_string(),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn collects_stdout_and_stderr_separately() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = stub_engine(dir.path(), "printf 'AUDIO'\nprintf 'warming up' >&2\nprintf 'MORE'");
        let raw = run_engine(&cfg, &request("Hello")).await;
        assert_eq!(
            raw,
            RawRunResult::Exited {
                exit_code: Some(0),
                audio: b"AUDIOMORE".to_vec(),
                diagnostics: "warming up".to_string(),
            }
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn passes_text_and_language_as_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = stub_engine(dir.path(), "printf '%s|%s' \"$1\" \"$2\"");
        let req = SynthesisRequest {
            text: "Hello; touch pwned".to_string(),
            language: "en".to_string(),
        };
        match run_engine(&cfg, &req).await {
            RawRunResult::Exited { audio, .. } => assert_eq!(audio, b"Hello; touch pwned|en"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!dir.path().join("pwned").exists());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn leading_args_come_before_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = stub_engine(dir.path(), "printf '%s,%s,%s' \"$1\" \"$2\" \"$3\"");
        cfg.args = vec!["--fast".to_string()];
        match run_engine(&cfg, &request("Hi")).await {
            RawRunResult::Exited { audio, .. } => assert_eq!(audio, b"--fast,Hi,hi"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = stub_engine(dir.path(), "pwd -P | tr -d '\\n'");
        let expected = fs::canonicalize(dir.path()).unwrap();
        match run_engine(&cfg, &request("Hi")).await {
            RawRunResult::Exited { audio, .. } => {
                assert_eq!(String::from_utf8(audio).unwrap(), expected.to_string_lossy())
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_program_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::for_program(dir.path().join("no-such-engine"), dir.path());
        assert!(matches!(
            run_engine(&cfg, &request("Hi")).await,
            RawRunResult::LaunchFailed { .. }
        ));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn non_zero_exit_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = stub_engine(dir.path(), "printf 'half'\nprintf 'boom' >&2\nexit 3");
        assert_eq!(
            run_engine(&cfg, &request("Hi")).await,
            RawRunResult::Exited {
                exit_code: Some(3),
                audio: b"half".to_vec(),
                diagnostics: "boom".to_string(),
            }
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn large_output_is_collected_whole() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = stub_engine(dir.path(), "head -c 200000 /dev/zero");
        match run_engine(&cfg, &request("Hi")).await {
            RawRunResult::Exited { exit_code, audio, .. } => {
                assert_eq!(exit_code, Some(0));
                assert_eq!(audio.len(), 200_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn slow_engine_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = stub_engine(dir.path(), "printf 'loading' >&2\nexec sleep 5");
        cfg.timeout_ms = 200;
        match run_engine(&cfg, &request("Hi")).await {
            RawRunResult::TimedOut { after, diagnostics } => {
                assert_eq!(after, Duration::from_millis(200));
                assert_eq!(diagnostics, "loading");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn output_over_limit_is_cut_off() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = stub_engine(dir.path(), "head -c 4096 /dev/zero");
        cfg.max_output_bytes = 1024;
        assert_eq!(
            run_engine(&cfg, &request("Hi")).await,
            RawRunResult::OutputTooLarge {
                limit: 1024,
                diagnostics: String::new(),
            }
        );
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn diagnostics_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = stub_engine(dir.path(), "head -c 100000 /dev/zero | tr '\\0' 'e' >&2\nprintf 'ok'");
        match run_engine(&cfg, &request("Hi")).await {
            RawRunResult::Exited { audio, diagnostics, .. } => {
                assert_eq!(audio, b"ok");
                assert_eq!(diagnostics.len(), MAX_DIAGNOSTICS);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn output_at_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = stub_engine(dir.path(), "head -c 1024 /dev/zero");
        cfg.max_output_bytes = 1024;
        assert!(matches!(
            run_engine(&cfg, &request("Hi")).await,
            RawRunResult::Exited { exit_code: Some(0), .. }
        ));
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn timeout_kills_engine_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = stub_engine(dir.path(), "sleep 7 &\necho $! > helper.pid\nsleep 7\nprintf x");
        cfg.timeout_ms = 300;
        assert!(matches!(
            run_engine(&cfg, &request("Hi")).await,
            RawRunResult::TimedOut { .. }
        ));
        assert!(helper_is_gone(dir.path()).await);
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn output_cap_kills_engine_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = stub_engine(
            dir.path(),
            "sleep 7 &\necho $! > helper.pid\nhead -c 4096 /dev/zero\nwait",
        );
        cfg.max_output_bytes = 1024;
        assert!(matches!(
            run_engine(&cfg, &request("Hi")).await,
            RawRunResult::OutputTooLarge { .. }
        ));
        assert!(helper_is_gone(dir.path()).await);
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn dropped_run_kills_engine_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = stub_engine(dir.path(), "sleep 7 &\necho $! > helper.pid\nwait");
        let req = request("Hi");
        let run = tokio::time::timeout(Duration::from_millis(300), run_engine(&cfg, &req));
        assert!(run.await.is_err());
        assert!(helper_is_gone(dir.path()).await);
    }

    #[tokio::test]
    #[cfg(target_os = "linux")]
    async fn clean_exit_is_not_held_up_by_background_helper() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = stub_engine(
            dir.path(),
            "sleep 3 &\necho $! > helper.pid\nprintf AUDIO\nexit 0",
        );
        cfg.timeout_ms = 2000;
        let started = std::time::Instant::now();
        assert_eq!(
            run_engine(&cfg, &request("Hi")).await,
            RawRunResult::Exited {
                exit_code: Some(0),
                audio: b"AUDIO".to_vec(),
                diagnostics: String::new(),
            }
        );
        assert!(started.elapsed() < Duration::from_millis(1500));
        assert!(helper_is_gone(dir.path()).await);
    }
}
