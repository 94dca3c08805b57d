use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Output, Stdio};

use tokio::process::Command;

use super::{Engine, EngineError, KeygenJob, RecryptJob, DECRYPTION_FAILURE_EXIT_CODE};

/// Name of the engine binary looked up on `PATH` by default
pub const DEFAULT_ENGINE_PROGRAM: &str = "crypt4gh-recryptor";

/// Engine backed by the `crypt4gh-recryptor` command line tool.
///
/// The child is killed if the calling future is dropped, so wrapping a call
/// in a timeout never leaves a stray process behind.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: PathBuf,
    leading_args: Vec<OsString>,
    verbose: bool,
}

impl Default for CommandEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_PROGRAM)
    }
}

impl CommandEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            verbose: false,
        }
    }

    /// Arguments placed before the subcommand, e.g. a script path when
    /// `program` is an interpreter.
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Log the engine's stdout/stderr at debug level
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Output, EngineError> {
        tracing::debug!(program = %self.program.display(), ?args, "invoking engine");
        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(EngineError::Spawn)?;

        if self.verbose {
            tracing::debug!(
                status = ?output.status,
                stdout = %String::from_utf8_lossy(&output.stdout),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "engine finished"
            );
        }
        Ok(output)
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait::async_trait]
impl Engine for CommandEngine {
    async fn recrypt(&self, job: RecryptJob<'_>) -> Result<(), EngineError> {
        let args = vec![
            OsString::from("recrypt"),
            OsString::from("--encryption-key"),
            job.encryption_key.into(),
            OsString::from("-i"),
            job.input.into(),
            OsString::from("-o"),
            job.output.into(),
            OsString::from("--decryption-key"),
            job.decryption_key.into(),
        ];
        let output = self.run(args).await?;

        match output.status.code() {
            Some(0) => Ok(()),
            Some(DECRYPTION_FAILURE_EXIT_CODE) => Err(EngineError::Decryption {
                stderr: stderr_of(&output),
            }),
            code => Err(EngineError::Failed {
                code,
                stderr: stderr_of(&output),
            }),
        }
    }

    async fn generate_keypair(&self, job: KeygenJob<'_>) -> Result<(), EngineError> {
        let mut args = vec![
            OsString::from("generate-keypair"),
            OsString::from("--private"),
            job.private_key.into(),
            OsString::from("--public"),
            job.public_key.into(),
        ];
        if let Some(passphrase) = job.passphrase {
            args.push("--passphrase".into());
            args.push(passphrase.into());
        }
        if let Some(comment) = job.comment {
            args.push("--comment".into());
            args.push(comment.into());
        }
        let output = self.run(args).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed {
                code: output.status.code(),
                stderr: stderr_of(&output),
            })
        }
    }
}
