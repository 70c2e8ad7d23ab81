//! Purpose augmentation: replacing purpose placeholders with generated text.
//!
//! The provider is injected as a [`TextGenerator`]. It is created once per run
//! and shared by reference between worker threads. Calls reach the provider
//! one at a time; each is bounded by an explicit timeout that starts when the
//! call gets its turn, and is never retried.

pub mod command;
pub mod prompt;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::errors::GenerationFailure;
use crate::query::guards::{clamp_context_length, clamp_timeout_secs};
use self::prompt::{build_prompt, clean_response, PromptContext};

/// Everything a provider gets for one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationContext {
    /// Fully rendered prompt.
    pub prompt: String,
    /// The purpose question as asked.
    pub question: String,
    /// Source of the object the question is about.
    pub source: String,
    pub detailed: bool,
    /// Ask the provider to drop any conversation state before answering.
    pub reset: bool,
    pub timeout: Duration,
}

/// Single-method generation capability.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, context: &GenerationContext) -> Result<String, GenerationFailure>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AugmenterSettings {
    pub prompt_template: String,
    pub context_length: usize,
    pub timeout: Duration,
    pub reset: bool,
}

impl From<&ModelConfig> for AugmenterSettings {
    fn from(config: &ModelConfig) -> Self {
        let params = &config.inference_model.model_params;
        Self {
            prompt_template: config.prompt_template.clone(),
            context_length: clamp_context_length(params.context_length),
            timeout: Duration::from_secs(clamp_timeout_secs(params.timeout_secs)),
            reset: params.reset,
        }
    }
}

/// One purpose query about one object.
#[derive(Clone, Copy, Debug)]
pub struct PurposeRequest<'a> {
    pub query: &'a str,
    pub context: PromptContext<'a>,
    pub detailed: bool,
}

pub struct PurposeAugmenter {
    generator: Arc<dyn TextGenerator>,
    settings: AugmenterSettings,
    failures: AtomicUsize,
    // Held for the whole provider call, abandoned ones included.
    turn: Arc<Mutex<()>>,
}

impl PurposeAugmenter {
    pub fn new(generator: Arc<dyn TextGenerator>, settings: AugmenterSettings) -> Self {
        Self {
            generator,
            settings,
            failures: AtomicUsize::new(0),
            turn: Arc::new(Mutex::new(())),
        }
    }

    pub fn settings(&self) -> &AugmenterSettings {
        &self.settings
    }

    /// Generated explanation for `request`. Failures are counted and logged;
    /// the caller keeps its placeholder.
    pub fn explain(&self, request: &PurposeRequest<'_>) -> Result<String, GenerationFailure> {
        let result = build_prompt(
            &self.settings.prompt_template,
            request.query,
            &request.context,
            self.settings.context_length,
        )
        .and_then(|prompt| {
            let context = GenerationContext {
                prompt,
                question: request.query.to_string(),
                source: request.context.object_source.to_string(),
                detailed: request.detailed,
                reset: self.settings.reset,
                timeout: self.settings.timeout,
            };
            self.generate_with_timeout(context)
        })
        .and_then(|raw| clean_response(&raw));

        match &result {
            Ok(text) => debug!("Generated {} chars for {:?}", text.len(), request.query),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Purpose generation failed for {:?}: {}", request.query, e);
            }
        }
        result
    }

    /// Run the provider on its own thread once it holds the turn, and stop
    /// waiting at the deadline. A provider still running after the deadline
    /// keeps the turn until it finishes; its result is discarded.
    fn generate_with_timeout(&self, context: GenerationContext) -> Result<String, GenerationFailure> {
        let timeout = context.timeout;
        let generator = Arc::clone(&self.generator);
        let turn = Arc::clone(&self.turn);
        let (started_tx, started_rx) = mpsc::channel();
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("py2dataset-generate".to_string())
            .spawn(move || {
                let _turn = turn.lock();
                let _ = started_tx.send(());
                let _ = tx.send(generator.generate(&context));
            })
            .map_err(|e| GenerationFailure::Provider(format!("failed to spawn generator: {e}")))?;

        started_rx.recv().map_err(|_| {
            GenerationFailure::Provider("generator exited before starting".to_string())
        })?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(GenerationFailure::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(GenerationFailure::Provider(
                "generator exited without a result".to_string(),
            )),
        }
    }

    /// Number of failed calls so far.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) struct StubGenerator(pub &'static str);

    impl TextGenerator for StubGenerator {
        fn generate(&self, _context: &GenerationContext) -> Result<String, GenerationFailure> {
            Ok(self.0.to_string())
        }
    }

    pub(crate) struct FailingGenerator;

    impl TextGenerator for FailingGenerator {
        fn generate(&self, _context: &GenerationContext) -> Result<String, GenerationFailure> {
            Err(GenerationFailure::Provider("model not loaded".to_string()))
        }
    }

    struct SlowGenerator(Duration);

    impl TextGenerator for SlowGenerator {
        fn generate(&self, _context: &GenerationContext) -> Result<String, GenerationFailure> {
            thread::sleep(self.0);
            Ok("late".to_string())
        }
    }

    /// Sleeps while holding its own lock, like a single local model.
    pub(crate) struct SerializedGenerator {
        pub(crate) delay: Duration,
        pub(crate) lock: Mutex<()>,
    }

    impl TextGenerator for SerializedGenerator {
        fn generate(&self, _context: &GenerationContext) -> Result<String, GenerationFailure> {
            let _guard = self.lock.lock();
            thread::sleep(self.delay);
            Ok("explained".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        seen: Mutex<Vec<GenerationContext>>,
    }

    impl TextGenerator for RecordingGenerator {
        fn generate(&self, context: &GenerationContext) -> Result<String, GenerationFailure> {
            self.seen.lock().push(context.clone());
            Ok("Adds two numbers.\n\n\n\nReturns the sum.".to_string())
        }
    }

    pub(crate) fn settings() -> AugmenterSettings {
        AugmenterSettings {
            prompt_template: "{context}\nQ: {query}\nA:".to_string(),
            context_length: 2048,
            timeout: Duration::from_secs(5),
            reset: false,
        }
    }

    fn request(query: &str) -> PurposeRequest<'_> {
        PurposeRequest {
            query,
            context: PromptContext {
                object_source: "def add(a, b):\n    return a + b",
                simplified_source: "def add(a, b):\n    return a + b",
                file_summary: "functions: add",
                code_qa: "",
            },
            detailed: false,
        }
    }

    #[test]
    fn test_explain_passes_prompt_and_cleans_response() {
        let generator = Arc::new(RecordingGenerator::default());
        let augmenter = PurposeAugmenter::new(generator.clone(), settings());
        let text = augmenter.explain(&request("Purpose of `add`?")).unwrap();
        assert_eq!(text, "Adds two numbers.\n\nReturns the sum.");

        let seen = generator.seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].prompt.starts_with("```python\ndef add(a, b):"));
        assert!(seen[0].prompt.ends_with("Q: Purpose of `add`?\nA:"));
        assert_eq!(seen[0].source, "def add(a, b):\n    return a + b");
        assert_eq!(augmenter.failures(), 0);
    }

    #[test]
    fn test_provider_failure_is_counted() {
        let augmenter = PurposeAugmenter::new(Arc::new(FailingGenerator), settings());
        assert!(matches!(
            augmenter.explain(&request("Purpose?")),
            Err(GenerationFailure::Provider(_))
        ));
        assert!(augmenter.explain(&request("Purpose?")).is_err());
        assert_eq!(augmenter.failures(), 2);
    }

    #[test]
    fn test_timeout_stops_waiting() {
        let mut settings = settings();
        settings.timeout = Duration::from_millis(50);
        let augmenter =
            PurposeAugmenter::new(Arc::new(SlowGenerator(Duration::from_secs(2))), settings);
        assert_eq!(
            augmenter.explain(&request("Purpose?")),
            Err(GenerationFailure::Timeout(Duration::from_millis(50)))
        );
        assert_eq!(augmenter.failures(), 1);
    }

    #[test]
    fn test_queued_calls_do_not_time_out() {
        let mut settings = settings();
        settings.timeout = Duration::from_millis(400);
        let generator = SerializedGenerator {
            delay: Duration::from_millis(150),
            lock: Mutex::new(()),
        };
        let augmenter = PurposeAugmenter::new(Arc::new(generator), settings);
        let results: Vec<Result<String, GenerationFailure>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| augmenter.explain(&request("Purpose?"))))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(results.iter().all(|r| r.as_deref() == Ok("explained")));
        assert_eq!(augmenter.failures(), 0);
    }

    #[test]
    fn test_empty_response_is_malformed() {
        let augmenter = PurposeAugmenter::new(Arc::new(StubGenerator("\n \n")), settings());
        assert!(matches!(
            augmenter.explain(&request("Purpose?")),
            Err(GenerationFailure::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_settings_from_model_config_are_clamped() {
        let mut config = ModelConfig::default();
        config.inference_model.model_params.context_length = 10;
        config.inference_model.model_params.timeout_secs = 0;
        let settings = AugmenterSettings::from(&config);
        assert_eq!(settings.context_length, crate::query::guards::MIN_CONTEXT_LENGTH);
        assert_eq!(settings.timeout, Duration::from_secs(1));
    }
}
