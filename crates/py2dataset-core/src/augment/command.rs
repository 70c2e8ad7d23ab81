//! Text generator backed by a local inference command.
//!
//! The prompt is written to the command's stdin and the response is read
//! from its stdout. Arguments may reference `{model}`, `{threads}`,
//! `{context_length}` and `{max_new_tokens}`.

use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::augment::{GenerationContext, TextGenerator};
use crate::config::ModelConfig;
use crate::errors::GenerationFailure;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Environment variable set to `1` when the provider should start fresh.
pub const RESET_ENV: &str = "PY2DATASET_RESET";

pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    // One model process at a time.
    lock: Mutex<()>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            lock: Mutex::new(()),
        }
    }

    /// Build from the model configuration's command line. Returns `None` when
    /// no command is configured.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        let model = &config.inference_model;
        let params = &model.model_params;
        let (program, rest) = model.command.split_first()?;
        let args = rest
            .iter()
            .map(|arg| {
                arg.replace("{model}", &model.model_path)
                    .replace("{threads}", &params.threads.to_string())
                    .replace("{context_length}", &params.context_length.to_string())
                    .replace("{max_new_tokens}", &params.max_new_tokens.to_string())
            })
            .collect();
        Some(Self::new(program.clone(), args))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn spawn(&self, reset: bool) -> Result<Child, GenerationFailure> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if reset {
            command.env(RESET_ENV, "1");
        }
        command
            .spawn()
            .map_err(|e| GenerationFailure::Provider(format!("failed to start {}: {e}", self.program)))
    }
}

fn read_to_end(mut stream: impl Read + Send + 'static) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stream.read_to_end(&mut buffer);
        buffer
    })
}

impl TextGenerator for CommandGenerator {
    fn generate(&self, context: &GenerationContext) -> Result<String, GenerationFailure> {
        let _guard = self.lock.lock();
        let started = Instant::now();
        let mut child = self.spawn(context.reset)?;

        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = context.prompt.clone();
            thread::spawn(move || stdin.write_all(prompt.as_bytes()))
        });
        let stdout = child.stdout.take().map(read_to_end);
        let stderr = child.stderr.take().map(read_to_end);

        let deadline = started + context.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!("Killing {} after {:?}", self.program, context.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GenerationFailure::Timeout(context.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(GenerationFailure::Provider(e.to_string())),
            }
        };

        if let Some(Ok(Err(e))) = writer.map(|handle| handle.join()) {
            debug!("Prompt write to {} ended early: {}", self.program, e);
        }
        let out = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let err = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

        if !status.success() {
            return Err(GenerationFailure::Provider(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&err).trim()
            )));
        }
        debug!(
            "{} answered in {}ms",
            self.program,
            started.elapsed().as_millis()
        );
        String::from_utf8(out)
            .map_err(|e| GenerationFailure::MalformedOutput(format!("non UTF-8 output: {e}")))
    }
}
