pub mod answers;
pub mod guards;
pub mod questions;
pub mod tokenizer;
