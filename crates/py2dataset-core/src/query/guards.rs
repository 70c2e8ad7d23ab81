//! Shared guardrails for worker counts, prompt budgets and augmentation limits.

// Pipeline guards
pub const MAX_WORKERS: usize = 64;
pub const MIN_WORKERS: usize = 1;

// Augmentation guards
/// Share of the model's context window a prompt context may occupy.
pub const CONTEXT_FILL_RATIO: f64 = 0.70;
pub const DEFAULT_CONTEXT_LENGTH: usize = 2048;
pub const MIN_CONTEXT_LENGTH: usize = 256;
pub const MAX_CONTEXT_LENGTH: usize = 1_048_576;
pub const DEFAULT_MAX_NEW_TOKENS: usize = 512;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;
pub const MAX_GENERATION_TIMEOUT_SECS: u64 = 3600;
/// Children explained per object in detailed mode.
pub const MAX_DETAILED_CHILDREN: usize = 32;

// Question bank guards
pub const MAX_QUESTIONS: usize = 256;
pub const MAX_QUESTION_LENGTH: usize = 512;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

pub fn clamp_workers(value: usize) -> usize {
    value.clamp(MIN_WORKERS, MAX_WORKERS)
}

pub fn clamp_context_length(value: usize) -> usize {
    value.clamp(MIN_CONTEXT_LENGTH, MAX_CONTEXT_LENGTH)
}

pub fn clamp_timeout_secs(value: u64) -> u64 {
    value.clamp(1, MAX_GENERATION_TIMEOUT_SECS)
}

/// Tokens a prompt context may use for a window of `context_length`.
pub fn context_budget(context_length: usize) -> usize {
    (context_length as f64 * CONTEXT_FILL_RATIO) as usize
}
