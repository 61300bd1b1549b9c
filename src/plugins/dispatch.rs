//! Plugin dispatch
//!
//! Runs one plugin as an external process. The child inherits the parent
//! environment plus the plugin context variables, reads the parent's stdin,
//! writes stderr straight to the parent's stderr, and has its stdout relayed
//! to a caller-supplied sink.

use std::ffi::OsString;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{PluginSettings, BIN_ENV, PLUGINS_ENV, PLUGIN_DIR_ENV, PLUGIN_NAME_ENV};
use crate::error::{PlugrunError, Result};

use super::types::{InvocationEnv, PluginDescriptor};

/// How long a cancelled plugin may keep running to clean up before it is killed.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(3);

/// How waiting on the child ended.
enum Wait {
    Exited(io::Result<(u64, ExitStatus)>),
    TimedOut(Duration),
    Cancelled,
}

/// Launches plugins and translates their outcome.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    settings: PluginSettings,
    self_exe: PathBuf,
    cancel_grace: Duration,
}

impl Dispatcher {
    /// Create a dispatcher that advertises `self_exe` to its plugins.
    pub fn new(settings: PluginSettings, self_exe: PathBuf) -> Self {
        Self {
            settings,
            self_exe,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// Create a dispatcher for the running executable.
    pub fn for_current_exe(settings: PluginSettings) -> Self {
        let self_exe = std::env::current_exe()
            .ok()
            .or_else(|| std::env::args_os().next().map(PathBuf::from))
            .unwrap_or_default();
        Self::new(settings, self_exe)
    }

    /// Set how long a cancelled plugin gets to exit on its own.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn settings(&self) -> &PluginSettings {
        &self.settings
    }

    /// Variables added to the child environment for one invocation.
    pub fn invocation_env(&self, plugin: &PluginDescriptor) -> Result<InvocationEnv> {
        let search_path = self.settings.search_path_string()?;

        let mut env = InvocationEnv::new();
        env.insert(PLUGIN_NAME_ENV.to_string(), plugin.name().to_string());
        env.insert(
            PLUGIN_DIR_ENV.to_string(),
            plugin.dir.to_string_lossy().into_owned(),
        );
        env.insert(
            BIN_ENV.to_string(),
            self.self_exe.to_string_lossy().into_owned(),
        );
        // Re-exported so nested invocations see the same path, even when defaulted.
        env.insert(
            PLUGINS_ENV.to_string(),
            search_path.to_string_lossy().into_owned(),
        );
        Ok(env)
    }

    /// Run a plugin to completion, cancelling on Ctrl-C.
    pub async fn run<W>(
        &self,
        plugin: &PluginDescriptor,
        user_args: &[OsString],
        out: &mut W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.run_until(plugin, user_args, out, interrupted()).await
    }

    /// Run a plugin to completion.
    ///
    /// The child is killed when the configured timeout elapses. Once `cancel`
    /// resolves, the child gets the cancel grace period to exit by itself
    /// (its exit status is then reported as usual) before it is killed.
    pub async fn run_until<W, C>(
        &self,
        plugin: &PluginDescriptor,
        user_args: &[OsString],
        out: &mut W,
        cancel: C,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
        C: Future<Output = ()>,
    {
        let name = plugin.name().to_string();

        let env = self.invocation_env(plugin)?;
        let invocation = plugin.prepare_invocation(user_args, &env)?;
        debug!(
            plugin = %name,
            program = %invocation.program.display(),
            args = ?invocation.args,
            "Environment prepared"
        );

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .envs(&invocation.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PlugrunError::Spawn {
                plugin: name.clone(),
                program: invocation.program.clone(),
                source,
            })?;
        debug!(plugin = %name, pid = ?child.id(), "Child spawned");

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlugrunError::Io(io::Error::other("child stdout was not captured")))?;

        let waited = {
            let relay = async {
                let copied = tokio::io::copy(&mut stdout, out).await?;
                out.flush().await?;
                Ok::<u64, io::Error>(copied)
            };
            let completion = async { tokio::try_join!(relay, child.wait()) };
            tokio::pin!(completion);

            let finished = tokio::select! {
                waited = bounded(self.settings.timeout, &mut completion) => Some(waited),
                _ = cancel => None,
            };

            match finished {
                Some(waited) => waited,
                None => {
                    // A terminal Ctrl-C reaches the child too; let it finish cleaning up.
                    debug!(plugin = %name, grace = ?self.cancel_grace, "Cancel requested");
                    match tokio::time::timeout(self.cancel_grace, &mut completion).await {
                        Ok(result) => Wait::Exited(result),
                        Err(_) => Wait::Cancelled,
                    }
                }
            }
        };

        match waited {
            Wait::Exited(Ok((copied, status))) if status.success() => {
                debug!(plugin = %name, bytes = copied, "Child succeeded");
                Ok(())
            }
            Wait::Exited(Ok((_, status))) => {
                debug!(plugin = %name, code = ?status.code(), "Child failed");
                Err(PlugrunError::PluginExecution {
                    plugin: name,
                    code: status.code(),
                })
            }
            Wait::Exited(Err(e)) => Err(PlugrunError::Io(e)),
            Wait::TimedOut(timeout) => {
                kill(&mut child, &name).await;
                Err(PlugrunError::Timeout {
                    plugin: name,
                    timeout,
                })
            }
            Wait::Cancelled => {
                kill(&mut child, &name).await;
                Err(PlugrunError::Cancelled { plugin: name })
            }
        }
    }
}

async fn bounded<F>(limit: Option<Duration>, completion: F) -> Wait
where
    F: Future<Output = io::Result<(u64, ExitStatus)>>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, completion).await {
            Ok(result) => Wait::Exited(result),
            Err(_) => Wait::TimedOut(limit),
        },
        None => Wait::Exited(completion.await),
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal handler can't be installed.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Unable to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn kill(child: &mut tokio::process::Child, name: &str) {
    if let Err(e) = child.kill().await {
        warn!(plugin = %name, error = %e, "Failed to kill plugin process");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::plugins::types::PluginMetadata;
    use std::fs;
    use tempfile::TempDir;

    /// Plugin backed by a shell script, run through `/bin/sh` so the script
    /// doesn't need an executable bit.
    fn script_plugin(tmp: &TempDir, name: &str, script: &str) -> PluginDescriptor {
        let dir = tmp.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.sh"), script).unwrap();
        PluginDescriptor::new(
            PluginMetadata {
                name: name.to_string(),
                version: None,
                usage: String::new(),
                description: String::new(),
                command: "/bin/sh $PLUGRUN_PLUGIN_DIR/main.sh".to_string(),
            },
            dir,
        )
    }

    fn dispatcher(tmp: &TempDir, timeout: Option<Duration>) -> Dispatcher {
        Dispatcher::new(
            PluginSettings {
                disabled: false,
                search_path: vec![tmp.path().to_path_buf()],
                timeout,
            },
            PathBuf::from("/usr/local/bin/plugrun"),
        )
    }

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_invocation_env_contents() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "hello", "");
        let env = dispatcher(&tmp, None).invocation_env(&plugin).unwrap();

        assert_eq!(env[PLUGIN_NAME_ENV], "hello");
        assert_eq!(env[PLUGIN_DIR_ENV], plugin.dir.to_string_lossy());
        assert_eq!(env[BIN_ENV], "/usr/local/bin/plugrun");
        assert_eq!(env[PLUGINS_ENV], tmp.path().to_string_lossy());
        assert_eq!(env.len(), 4);
    }

    #[tokio::test]
    async fn test_success_forwards_stdout_unchanged() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "bytes", "printf 'line one\\n\\tline two\\r\\n'\n");

        let mut out = Vec::new();
        dispatcher(&tmp, None)
            .run_until(&plugin, &[], &mut out, std::future::pending())
            .await
            .unwrap();
        assert_eq!(out, b"line one\n\tline two\r\n");
    }

    #[tokio::test]
    async fn test_user_args_reach_child_verbatim() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "echo-args", "for a in \"$@\"; do echo \"[$a]\"; done\n");

        let mut out = Vec::new();
        dispatcher(&tmp, None)
            .run_until(
                &plugin,
                &args(&["a", "-b", "c", "--help", "two words"]),
                &mut out,
                std::future::pending(),
            )
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[a]\n[-b]\n[c]\n[--help]\n[two words]\n"
        );
    }

    #[tokio::test]
    async fn test_child_sees_plugin_context() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(
            &tmp,
            "ctx",
            "echo \"$PLUGRUN_PLUGIN_NAME|$PLUGRUN_BIN|$PLUGRUN_PLUGINS\"\n\
             test -n \"$PATH\" && echo inherited\n",
        );

        let mut out = Vec::new();
        dispatcher(&tmp, None)
            .run_until(&plugin, &[], &mut out, std::future::pending())
            .await
            .unwrap();
        let expected = format!(
            "ctx|/usr/local/bin/plugrun|{}\ninherited\n",
            tmp.path().display()
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_nonzero_exit_names_plugin() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "failing", "echo partial\necho oops >&2\nexit 3\n");

        let mut out = Vec::new();
        let err = dispatcher(&tmp, None)
            .run_until(&plugin, &[], &mut out, std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            PlugrunError::PluginExecution { plugin, code: Some(3) } if plugin == "failing"
        ));
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("\"failing\""));
        assert_eq!(out, b"partial\n");
    }

    #[tokio::test]
    async fn test_missing_executable_is_spawn_error() {
        let tmp = TempDir::new().unwrap();
        let mut plugin = script_plugin(&tmp, "ghost", "");
        plugin.metadata.command = "/nonexistent/plugrun/ghost-binary".to_string();

        let mut out = Vec::new();
        let err = dispatcher(&tmp, None)
            .run_until(&plugin, &[], &mut out, std::future::pending())
            .await
            .unwrap_err();

        match err {
            PlugrunError::Spawn { plugin, source, .. } => {
                assert_eq!(plugin, "ghost");
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "slow", "exec sleep 10\n");

        let mut out = Vec::new();
        let err = dispatcher(&tmp, Some(Duration::from_millis(200)))
            .run_until(&plugin, &[], &mut out, std::future::pending())
            .await
            .unwrap_err();
        assert!(matches!(err, PlugrunError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_cancellation_kills_child() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "slow", "exec sleep 10\n");

        let mut out = Vec::new();
        let cancel = tokio::time::sleep(Duration::from_millis(100));
        let err = dispatcher(&tmp, None)
            .with_cancel_grace(Duration::from_millis(100))
            .run_until(&plugin, &[], &mut out, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PlugrunError::Cancelled { plugin } if plugin == "slow"));
    }

    #[tokio::test]
    async fn test_cancelled_child_may_finish_cleanup() {
        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "tidy", "sleep 1\necho cleaned up\nexit 130\n");

        let mut out = Vec::new();
        let cancel = tokio::time::sleep(Duration::from_millis(100));
        let err = dispatcher(&tmp, None)
            .with_cancel_grace(Duration::from_secs(10))
            .run_until(&plugin, &[], &mut out, cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlugrunError::PluginExecution { code: Some(130), .. }
        ));
        assert_eq!(out, b"cleaned up\n");
    }

    #[tokio::test]
    async fn test_non_utf8_arg_reaches_child() {
        use std::os::unix::ffi::OsStringExt;

        let tmp = TempDir::new().unwrap();
        let plugin = script_plugin(&tmp, "raw", "printf '%s' \"$1\"\n");

        let mut out = Vec::new();
        dispatcher(&tmp, None)
            .run_until(
                &plugin,
                &[OsString::from_vec(vec![0x66, 0xff, 0x6f])],
                &mut out,
                std::future::pending(),
            )
            .await
            .unwrap();
        assert_eq!(out, vec![0x66, 0xff, 0x6f]);
    }
}
