use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::error::{HardeningError, RuntimeStartError, SessionError};
use crate::core::java::{probe_java, tool_in_home};
use crate::core::launch::classpath::split_module_path;

use super::{ExitInterception, RuntimeHost, StartSpec};

/// Toolkit utility call that turns `System.exit` into a `SecurityException`.
pub const EXIT_GUARD_SNIPPET: &str = "com.xilinx.rapidwright.util.FileTools.blockSystemExitCalls();";

/// Reports whether the guard is active, as one of the two markers below.
pub const EXIT_GUARD_CONFIRMATION: &str = "System.out.println(System.getSecurityManager() != null \
     ? \"__rapidwright_exit_guard__-ok\" : \"__rapidwright_exit_guard__-fail\");";
const GUARD_ACTIVE_MARKER: &str = "__rapidwright_exit_guard__-ok";
const GUARD_INACTIVE_MARKER: &str = "__rapidwright_exit_guard__-fail";

/// The exit guard relies on a security manager, which Java 17 stopped honouring.
const EXIT_GUARD_LAST_MAJOR: u32 = 16;
const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(750);
const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);
const STDERR_TAIL_LINES: usize = 20;

type StderrTail = Arc<StdMutex<VecDeque<String>>>;

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout_lines: UnboundedReceiver<String>,
    java_home: Option<PathBuf>,
    stderr_tail: StderrTail,
}

impl Session {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn write_line(&mut self, snippet: &str) -> Result<(), SessionError> {
        if !self.is_alive() {
            return Err(SessionError::NotRunning);
        }
        let mut line = snippet.trim_end().to_string();
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        debug!("Submitted snippet: {}", snippet.trim_end());
        Ok(())
    }

    fn discard_pending_output(&mut self) {
        while self.stdout_lines.try_recv().is_ok() {}
    }
}

/// Hosts the JVM as a long-lived `jshell` session in local execution mode, so
/// snippets run in the same VM that loaded the module path.
pub struct JshellHost {
    session: Mutex<Option<Session>>,
    startup_grace: Duration,
    confirm_timeout: Duration,
    exit_guard: String,
}

impl Default for JshellHost {
    fn default() -> Self {
        Self::new()
    }
}

impl JshellHost {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
            startup_grace: DEFAULT_STARTUP_GRACE,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            exit_guard: EXIT_GUARD_SNIPPET.to_string(),
        }
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// How long to wait for the runtime to report the exit guard's state.
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn with_exit_guard(mut self, snippet: impl Into<String>) -> Self {
        self.exit_guard = snippet.into();
        self
    }
}

/// Command-line arguments for `jshell`, without the program itself.
pub fn jshell_args(spec: &StartSpec) -> Vec<String> {
    let mut args = vec![
        "--execution".to_string(),
        "local".to_string(),
        "--feedback".to_string(),
        "silent".to_string(),
        "--class-path".to_string(),
        spec.module_path.clone(),
    ];
    args.extend(spec.extra_flags.iter().map(|flag| format!("-J{flag}")));
    args
}

fn check_module_path(module_path: &str) -> Result<(), RuntimeStartError> {
    let entries = split_module_path(module_path);
    if entries.is_empty() {
        return Err(RuntimeStartError::EmptyModulePath);
    }

    for entry in entries {
        // `dir/*` is a JVM wildcard over the jars in `dir`.
        let path = match entry.strip_suffix('*') {
            Some(dir) => PathBuf::from(dir.trim_end_matches(['/', '\\'])),
            None => PathBuf::from(&entry),
        };
        if !path.exists() {
            return Err(RuntimeStartError::MissingModulePathEntry(path));
        }
    }
    Ok(())
}

fn spawn_stderr_forwarder(child: &mut Child) -> StderrTail {
    let tail = Arc::new(StdMutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    if let Some(stderr) = child.stderr.take() {
        let tail = Arc::clone(&tail);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "rapidwright_runtime", "{}", line);
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        });
    }
    tail
}

/// Forward stdout to the log and to the session, which reads confirmations from it.
fn spawn_stdout_forwarder(child: &mut Child) -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "rapidwright_runtime", "{}", line);
                // Keep draining after the session is gone so the child never blocks.
                let _ = tx.send(line);
            }
        });
    }
    rx
}

fn tail_text(tail: &StdMutex<VecDeque<String>>) -> String {
    tail.lock()
        .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
        .unwrap_or_default()
}

async fn await_confirmation(
    lines: &mut UnboundedReceiver<String>,
    timeout: Duration,
) -> Result<(), HardeningError> {
    let wait = async {
        while let Some(line) = lines.recv().await {
            let line = line.trim_end();
            if line.ends_with(GUARD_ACTIVE_MARKER) {
                return Ok(());
            }
            if line.ends_with(GUARD_INACTIVE_MARKER) {
                return Err(HardeningError::Rejected);
            }
        }
        Err(SessionError::NotRunning.into())
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| HardeningError::Unconfirmed { waited: timeout })?
}

#[async_trait]
impl RuntimeHost for JshellHost {
    async fn start(&self, spec: &StartSpec) -> Result<(), RuntimeStartError> {
        let mut guard = self.session.lock().await;
        if let Some(previous) = guard.as_mut() {
            if previous.is_alive() {
                return Err(RuntimeStartError::AlreadyStarted);
            }
            warn!(
                "Replacing exited runtime session: {}",
                tail_text(&previous.stderr_tail)
            );
            *guard = None;
        }
        check_module_path(&spec.module_path)?;

        let program = tool_in_home(spec.java_home.as_deref(), "jshell");
        let mut cmd = Command::new(&program);
        cmd.args(jshell_args(spec))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(home) = &spec.java_home {
            cmd.env("JAVA_HOME", home);
        }

        info!("Starting runtime with {:?}", program);
        debug!("Module path: {}", spec.module_path);
        let mut child = cmd.spawn().map_err(|source| RuntimeStartError::Spawn {
            program: program.clone(),
            source,
        })?;
        let stderr_tail = spawn_stderr_forwarder(&mut child);
        let stdout_lines = spawn_stdout_forwarder(&mut child);

        let stdin = child.stdin.take().ok_or_else(|| RuntimeStartError::Spawn {
            program: program.clone(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin not captured"),
        })?;

        tokio::time::sleep(self.startup_grace).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(RuntimeStartError::ExitedEarly {
                status: status.to_string(),
                stderr: tail_text(&stderr_tail),
            });
        }

        *guard = Some(Session {
            child,
            stdin,
            stdout_lines,
            java_home: spec.java_home.clone(),
            stderr_tail,
        });
        Ok(())
    }

    async fn exit_interception(&self) -> ExitInterception {
        let java_home = {
            let guard = self.session.lock().await;
            match guard.as_ref() {
                Some(session) => session.java_home.clone(),
                None => return ExitInterception::Unknown,
            }
        };

        let java = tool_in_home(java_home.as_deref(), "java");
        match probe_java(&java).await {
            Some(info) if info.major <= EXIT_GUARD_LAST_MAJOR => ExitInterception::Supported,
            Some(info) => {
                debug!("Java {} cannot intercept exit calls", info.major);
                ExitInterception::Unsupported
            }
            None => ExitInterception::Unknown,
        }
    }

    async fn install_exit_interception(&self) -> Result<(), HardeningError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(SessionError::NotRunning)?;

        session.discard_pending_output();
        session.write_line(&self.exit_guard).await?;
        session.write_line(EXIT_GUARD_CONFIRMATION).await?;

        let confirmed = await_confirmation(&mut session.stdout_lines, self.confirm_timeout).await;
        if let Err(err) = &confirmed {
            warn!(
                "Exit guard not confirmed ({}): {}",
                err,
                tail_text(&session.stderr_tail)
            );
        }
        confirmed
    }

    async fn is_alive(&self) -> bool {
        let mut guard = self.session.lock().await;
        guard.as_mut().is_some_and(Session::is_alive)
    }

    async fn submit(&self, snippet: &str) -> Result<(), SessionError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(SessionError::NotRunning)?;
        session.write_line(snippet).await
    }
}

impl std::fmt::Debug for JshellHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JshellHost")
            .field("startup_grace", &self.startup_grace)
            .field("confirm_timeout", &self.confirm_timeout)
            .field("exit_guard", &self.exit_guard)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(module_path: &str) -> StartSpec {
        StartSpec {
            java_home: None,
            module_path: module_path.to_string(),
            extra_flags: vec!["-Xmx4g".into(), "-Dfoo=bar".into()],
        }
    }

    #[test]
    fn args_run_locally_with_flags_forwarded_to_the_vm() {
        let args = jshell_args(&spec("/opt/rw.jar"));
        assert_eq!(
            args,
            vec![
                "--execution",
                "local",
                "--feedback",
                "silent",
                "--class-path",
                "/opt/rw.jar",
                "-J-Xmx4g",
                "-J-Dfoo=bar",
            ]
        );
    }

    #[tokio::test]
    async fn missing_entry_is_rejected_before_spawning() {
        let host = JshellHost::new();
        let err = host.start(&spec("/definitely/not/here.jar")).await.unwrap_err();
        assert!(matches!(err, RuntimeStartError::MissingModulePathEntry(_)));
        assert!(!host.is_alive().await);
    }

    #[tokio::test]
    async fn empty_module_path_is_rejected() {
        let host = JshellHost::new();
        let err = host.start(&spec("  ")).await.unwrap_err();
        assert!(matches!(err, RuntimeStartError::EmptyModulePath));
    }

    #[test]
    fn wildcard_entries_check_their_directory() {
        let temp = tempfile::tempdir().unwrap();
        let jars = temp.path().join("jars");
        std::fs::create_dir_all(&jars).unwrap();
        let wildcard = format!("{}/*", jars.display());
        check_module_path(&wildcard).unwrap();

        let missing = format!("{}/*", temp.path().join("nope").display());
        assert!(check_module_path(&missing).is_err());
    }

    #[tokio::test]
    async fn nothing_to_harden_before_start() {
        let host = JshellHost::new();
        assert_eq!(host.exit_interception().await, ExitInterception::Unknown);
        assert!(matches!(
            host.install_exit_interception().await,
            Err(HardeningError::Session(SessionError::NotRunning))
        ));
        assert!(matches!(
            host.submit("1 + 1;").await,
            Err(SessionError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn confirmation_requires_the_active_marker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send("some unrelated output".to_string()).unwrap();
        tx.send(format!("-> {GUARD_ACTIVE_MARKER}")).unwrap();
        await_confirmation(&mut rx, Duration::from_secs(1)).await.unwrap();

        tx.send(GUARD_INACTIVE_MARKER.to_string()).unwrap();
        assert!(matches!(
            await_confirmation(&mut rx, Duration::from_secs(1)).await,
            Err(HardeningError::Rejected)
        ));

        // An echoed confirmation snippet mentions both markers but is not an answer.
        tx.send(EXIT_GUARD_CONFIRMATION.to_string()).unwrap();
        assert!(matches!(
            await_confirmation(&mut rx, Duration::from_millis(100)).await,
            Err(HardeningError::Unconfirmed { .. })
        ));

        drop(tx);
        assert!(matches!(
            await_confirmation(&mut rx, Duration::from_secs(1)).await,
            Err(HardeningError::Session(SessionError::NotRunning))
        ));
    }

    /// Script-based stand-ins for a JDK's `java` and `jshell`.
    #[cfg(unix)]
    mod fake_jdk {
        use super::*;
        use serial_test::serial;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;

        /// Runs the guard only when the toolkit class would resolve; exit
        /// calls end the session unless the guard ran first.
        const COOPERATIVE: &str = r#"
guarded=0
while IFS= read -r line; do
  case "$line" in
    *getSecurityManager*)
      if [ "$guarded" = 1 ]; then
        echo "__rapidwright_exit_guard__-ok"
      else
        echo "__rapidwright_exit_guard__-fail"
      fi ;;
    *blockSystemExitCalls*) guarded=1 ;;
    *System.exit*)
      if [ "$guarded" = 1 ]; then
        echo "java.lang.SecurityException: exit blocked" >&2
      else
        exit 1
      fi ;;
  esac
done
"#;

        /// Toolkit missing from the class path: every toolkit call fails to compile.
        const MISSING_TOOLKIT: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *getSecurityManager*) echo "__rapidwright_exit_guard__-fail" ;;
    *) echo "|  Error: package com.xilinx.rapidwright.util does not exist" >&2 ;;
  esac
done
"#;

        const SILENT: &str = r#"
while IFS= read -r line; do :; done
"#;

        const EXITS_AT_ONCE: &str = r#"
echo "Error: could not create the Java Virtual Machine" >&2
exit 3
"#;

        fn write_script(path: &Path, body: &str) {
            std::fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        struct FakeJdk {
            _temp: tempfile::TempDir,
            spec: StartSpec,
        }

        fn install(jshell_body: &str, java_version: &str) -> FakeJdk {
            let temp = tempfile::tempdir().unwrap();
            let home = temp.path().join("jdk");
            let bin = home.join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            write_script(&bin.join("jshell"), jshell_body);
            write_script(
                &bin.join("java"),
                &format!("echo 'openjdk version \"{java_version}\" 2019-01-15' >&2\n"),
            );
            let jar = temp.path().join("rapidwright.jar");
            std::fs::write(&jar, b"jar").unwrap();

            FakeJdk {
                spec: StartSpec {
                    java_home: Some(home),
                    module_path: jar.to_string_lossy().into_owned(),
                    extra_flags: Vec::new(),
                },
                _temp: temp,
            }
        }

        fn host() -> JshellHost {
            JshellHost::new()
                .with_startup_grace(Duration::from_millis(300))
                .with_confirm_timeout(Duration::from_secs(5))
        }

        #[tokio::test]
        #[serial]
        async fn guard_is_confirmed_and_exit_calls_are_survived() {
            let jdk = install(COOPERATIVE, "11.0.2");
            let host = host();
            host.start(&jdk.spec).await.unwrap();

            assert_eq!(host.exit_interception().await, ExitInterception::Supported);
            host.install_exit_interception().await.unwrap();

            host.submit("System.exit(1);").await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert!(host.is_alive().await);
        }

        #[tokio::test]
        #[serial]
        async fn guard_that_did_not_run_is_reported() {
            let jdk = install(MISSING_TOOLKIT, "11.0.2");
            let host = host();
            host.start(&jdk.spec).await.unwrap();

            assert_eq!(host.exit_interception().await, ExitInterception::Supported);
            assert!(matches!(
                host.install_exit_interception().await,
                Err(HardeningError::Rejected)
            ));
        }

        #[tokio::test]
        #[serial]
        async fn unanswered_confirmation_times_out() {
            let jdk = install(SILENT, "11.0.2");
            let host = host().with_confirm_timeout(Duration::from_millis(300));
            host.start(&jdk.spec).await.unwrap();

            assert!(matches!(
                host.install_exit_interception().await,
                Err(HardeningError::Unconfirmed { .. })
            ));
        }

        #[tokio::test]
        #[serial]
        async fn modern_jvm_reports_unsupported() {
            let jdk = install(COOPERATIVE, "17.0.9");
            let host = host();
            host.start(&jdk.spec).await.unwrap();
            assert_eq!(
                host.exit_interception().await,
                ExitInterception::Unsupported
            );
        }

        #[tokio::test]
        #[serial]
        async fn exit_during_startup_is_a_start_failure() {
            let jdk = install(EXITS_AT_ONCE, "11.0.2");
            let host = host();
            let err = host.start(&jdk.spec).await.unwrap_err();
            match err {
                RuntimeStartError::ExitedEarly { stderr, .. } => {
                    assert!(stderr.contains("could not create the Java Virtual Machine"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert!(!host.is_alive().await);
        }

        #[tokio::test]
        #[serial]
        async fn unguarded_exit_kills_the_session_and_allows_a_restart() {
            let jdk = install(COOPERATIVE, "11.0.2");
            let host = host();
            host.start(&jdk.spec).await.unwrap();
            assert!(matches!(
                host.start(&jdk.spec).await,
                Err(RuntimeStartError::AlreadyStarted)
            ));

            host.submit("System.exit(1);").await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            assert!(!host.is_alive().await);
            assert!(matches!(
                host.submit("1 + 1;").await,
                Err(SessionError::NotRunning)
            ));

            host.start(&jdk.spec).await.unwrap();
            assert!(host.is_alive().await);
        }
    }
}
