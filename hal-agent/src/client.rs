use crate::error::{AgentError, Result};
use crate::stream::parse_event_stream;
use crate::types::{AgentReply, AgentRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

const STDERR_LOG_CHARS: usize = 300;

/// Capability to run one conversational turn against an external agent.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Model identifier passed to the agent, recorded in audit entries.
    fn model(&self) -> &str;

    async fn invoke(&self, request: AgentRequest<'_>) -> Result<AgentReply>;
}

/// Runs `opencode run <prompt> --format=json` as a child process.
#[derive(Debug, Clone)]
pub struct OpencodeClient {
    program: PathBuf,
    launcher_args: Vec<String>,
    model: String,
    variant: String,
    timeout: Duration,
}

impl OpencodeClient {
    pub fn new(program: impl AsRef<Path>, model: &str, variant: &str) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            launcher_args: Vec::new(),
            model: model.to_string(),
            variant: variant.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Arguments placed before `run`, for launching through a wrapper (e.g. `npx opencode`).
    pub fn with_launcher_args(mut self, args: Vec<String>) -> Self {
        self.launcher_args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_args(&self, request: &AgentRequest<'_>) -> Vec<String> {
        let mut args = self.launcher_args.clone();
        args.push("run".to_string());
        args.push(request.prompt.to_string());
        args.push(format!("--model={}", self.model));
        args.push(format!("--variant={}", self.variant));
        if let Some(session_id) = request.session_id {
            args.push(format!("--session={session_id}"));
        }
        args.push("--format=json".to_string());
        args
    }

    fn command(&self, request: &AgentRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.build_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Plain output, unless the operator already chose otherwise.
        for (key, value) in [("TERM", "dumb"), ("NO_COLOR", "1"), ("CLICOLOR", "0")] {
            if std::env::var_os(key).is_none() {
                cmd.env(key, value);
            }
        }
        cmd
    }
}

#[async_trait]
impl AgentRunner for OpencodeClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(level = "info", skip_all, fields(session = request.session_id.unwrap_or("new")))]
    async fn invoke(&self, request: AgentRequest<'_>) -> Result<AgentReply> {
        tracing::info!(prompt_len = request.prompt.len(), "invoking agent");
        let started = Instant::now();

        let child = self.command(&request).spawn().map_err(|e| AgentError::Spawn {
            program: self.program.display().to_string(),
            message: e.to_string(),
        })?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(STDERR_LOG_CHARS).collect();
            return Err(AgentError::ExitStatus {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            output_len = stdout.len(),
            "agent returned"
        );
        if stdout.is_empty() {
            return Err(AgentError::EmptyOutput);
        }

        let parsed = parse_event_stream(stdout);
        if parsed.text.is_empty() {
            return Err(AgentError::NoText);
        }
        Ok(AgentReply {
            text: parsed.text,
            session_id: parsed.session_id,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_client(script: &str) -> OpencodeClient {
        OpencodeClient::new("/bin/sh", "openai/gpt-5.2", "medium").with_launcher_args(vec![
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ])
    }

    #[test]
    fn args_follow_opencode_run_layout() {
        let client = OpencodeClient::new("opencode", "openai/gpt-5.2", "medium");
        let args = client.build_args(&AgentRequest {
            prompt: "hello",
            session_id: Some("ses_1"),
        });
        assert_eq!(
            args,
            vec![
                "run",
                "hello",
                "--model=openai/gpt-5.2",
                "--variant=medium",
                "--session=ses_1",
                "--format=json",
            ]
        );
        let args = client.build_args(&AgentRequest {
            prompt: "hello",
            session_id: None,
        });
        assert!(!args.iter().any(|a| a.starts_with("--session")));
    }

    #[tokio::test]
    async fn parses_reply_and_session_from_child_output() {
        let client = sh_client(
            r#"echo '{"type":"step_start","sessionID":"ses_new"}'; echo '{"type":"text","part":{"text":"hi there"}}'"#,
        );
        let reply = client
            .invoke(AgentRequest {
                prompt: "hello",
                session_id: None,
            })
            .await
            .expect("invoke");
        assert_eq!(reply.text, "hi there");
        assert_eq!(reply.session_id.as_deref(), Some("ses_new"));
    }

    #[tokio::test]
    async fn passes_existing_session_to_child() {
        let client = sh_client(r#"printf '{"type":"text","part":{"text":"%s"}}\n' "$*""#);
        let reply = client
            .invoke(AgentRequest {
                prompt: "hello",
                session_id: Some("ses_abc"),
            })
            .await
            .expect("invoke");
        assert!(reply.text.contains("--session=ses_abc"), "{}", reply.text);
        assert!(reply.session_id.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let client = sh_client("echo nope >&2; exit 3");
        let err = client
            .invoke(AgentRequest {
                prompt: "hello",
                session_id: None,
            })
            .await
            .unwrap_err();
        match err {
            AgentError::ExitStatus { code, stderr } => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_and_textless_output_are_errors() {
        let empty = sh_client("true");
        let err = empty
            .invoke(AgentRequest {
                prompt: "hello",
                session_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::EmptyOutput));

        let textless = sh_client(r#"echo '{"type":"step_start","sessionID":"ses_x"}'"#);
        let err = textless
            .invoke(AgentRequest {
                prompt: "hello",
                session_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NoText));
    }

    #[tokio::test]
    async fn slow_child_times_out() {
        let client = sh_client("sleep 5").with_timeout(Duration::from_millis(100));
        let err = client
            .invoke(AgentRequest {
                prompt: "hello",
                session_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let client = OpencodeClient::new("/nonexistent/opencode", "m", "v");
        let err = client
            .invoke(AgentRequest {
                prompt: "hello",
                session_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Spawn { .. }));
    }
}
