//! Conversion Invoker
//!
//! Runs the external rasterizer. Success means exit status 0 AND the
//! destination image exists afterwards; anything else is a failure.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span};

use crate::error::{PipelineError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One converter invocation. Built per job, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// 1-based.
    pub sheet_index: u32,
    pub cell_range: String,
}

#[derive(Debug, Clone)]
pub struct Converter {
    executable: PathBuf,
    script: PathBuf,
    timeout: Option<Duration>,
}

impl Converter {
    pub fn new(
        executable: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            executable: executable.into(),
            script: script.into(),
            timeout,
        }
    }

    /// `<executable> <script> <source> <destination> <sheet> <range>`, one
    /// argv entry each, no shell in between.
    pub fn command(&self, request: &ConversionRequest) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(&self.script)
            .arg(&request.source)
            .arg(&request.destination)
            .arg(request.sheet_index.to_string())
            .arg(&request.cell_range)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    pub fn convert(&self, request: &ConversionRequest) -> Result<()> {
        let _span = info_span!("convert", destination = %request.destination.display()).entered();

        let mut child = self
            .command(request)
            .spawn()
            .map_err(|e| PipelineError::ConversionSpawn {
                executable: self.executable.clone(),
                source: e,
            })?;

        // Drain both pipes while waiting so a chatty converter cannot block.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        // On timeout the readers are left detached; they end once the pipes close.
        let status = self.wait(&mut child)?;
        let stdout = join(stdout);
        let stderr = join(stderr);

        if !stdout.trim().is_empty() {
            debug!(output = %stdout.trim_end(), "converter stdout");
        }

        check_outcome(status, &request.destination, stderr)?;
        info!("conversion finished");
        Ok(())
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus> {
        let wait_err = |e: std::io::Error| PipelineError::io("wait for converter", &self.executable, e);

        let Some(timeout) = self.timeout else {
            return child.wait().map_err(wait_err);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                error!(timeout_secs = timeout.as_secs(), "converter timed out, killing it");
                let _ = child.kill();
                let _ = child.wait();
                return Err(PipelineError::ConversionTimedOut { timeout });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn check_outcome(status: ExitStatus, destination: &Path, stderr: String) -> Result<()> {
    if status.success() && destination.is_file() {
        return Ok(());
    }

    let stderr = if !status.success() || !stderr.trim().is_empty() {
        stderr
    } else {
        format!("converter produced no image at {}", destination.display())
    };
    error!(status = ?status.code(), stderr = %stderr.trim_end(), "conversion failed");
    Err(PipelineError::ConversionFailed {
        status: status.code(),
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn script(&self, body: &str) -> PathBuf {
            let path = self.dir.path().join("convert.sh");
            std::fs::write(&path, body).unwrap();
            path
        }

        fn request(&self) -> ConversionRequest {
            ConversionRequest {
                source: self.dir.path().join("staged doc.xlsx"),
                destination: self.dir.path().join("out.png"),
                sheet_index: 2,
                cell_range: "A1:H20".to_string(),
            }
        }

        fn converter(&self, body: &str, timeout: Option<Duration>) -> Converter {
            Converter::new("/bin/sh", self.script(body), timeout)
        }
    }

    #[test]
    fn test_success_requires_exit_zero_and_file() {
        let fx = Fixture::new();
        let converter = fx.converter("printf png > \"$2\"\necho rendered\n", None);

        converter.convert(&fx.request()).unwrap();

        assert!(fx.request().destination.is_file());
    }

    #[test]
    fn test_exit_zero_without_file_fails() {
        let fx = Fixture::new();
        let converter = fx.converter("exit 0\n", None);

        let err = converter.convert(&fx.request()).unwrap_err();

        match err {
            PipelineError::ConversionFailed { status, stderr } => {
                assert_eq!(status, Some(0));
                assert!(stderr.contains("no image"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nonzero_exit_fails_even_with_stale_file() {
        let fx = Fixture::new();
        std::fs::write(fx.request().destination, b"stale").unwrap();
        let converter = fx.converter("echo 'sheet out of range' >&2\nexit 3\n", None);

        let err = converter.convert(&fx.request()).unwrap_err();

        match err {
            PipelineError::ConversionFailed { status, stderr } => {
                assert_eq!(status, Some(3));
                assert!(stderr.contains("sheet out of range"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_arguments_passed_verbatim() {
        let fx = Fixture::new();
        let args_file = fx.dir.path().join("args.txt");
        let body = format!(
            "for a in \"$@\"; do echo \"$a\" >> '{}'; done\nprintf png > \"$2\"\n",
            args_file.display()
        );
        let converter = fx.converter(&body, None);
        let request = fx.request();

        converter.convert(&request).unwrap();

        let args = std::fs::read_to_string(&args_file).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(
            args,
            vec![
                request.source.to_str().unwrap(),
                request.destination.to_str().unwrap(),
                "2",
                "A1:H20",
            ]
        );
    }

    #[test]
    fn test_large_output_does_not_deadlock() {
        let fx = Fixture::new();
        let body = "i=0\nwhile [ $i -lt 20000 ]; do echo \"line $i\"; echo \"err $i\" >&2; i=$((i+1)); done\nprintf png > \"$2\"\n";
        let converter = fx.converter(body, Some(Duration::from_secs(60)));

        converter.convert(&fx.request()).unwrap();
    }

    #[test]
    fn test_timeout_kills_converter() {
        let fx = Fixture::new();
        let converter = fx.converter("exec sleep 5\n", Some(Duration::from_millis(200)));

        let started = Instant::now();
        let err = converter.convert(&fx.request()).unwrap_err();

        assert!(matches!(err, PipelineError::ConversionTimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let fx = Fixture::new();
        let converter = Converter::new(fx.dir.path().join("no-python"), fx.script(""), None);

        let err = converter.convert(&fx.request()).unwrap_err();

        assert!(matches!(err, PipelineError::ConversionSpawn { .. }));
    }
}
