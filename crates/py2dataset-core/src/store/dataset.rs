//! Instruction records and their assembly into per-file and corpus datasets.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::query::answers::Answer;

/// One instruction-dataset entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstructionRecord {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

impl InstructionRecord {
    pub fn new(
        instruction: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            instruction: instruction.into(),
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Instruction and output only, for fine-tuning.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainRecord {
    pub instruction: String,
    pub output: String,
}

/// Collects the records of one file in question order.
#[derive(Debug, Default)]
pub struct DatasetAssembler {
    records: Vec<InstructionRecord>,
    // Indices of records that may be quoted in later prompts.
    context: Vec<usize>,
}

impl DatasetAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record for `answer`. Inapplicable and empty answers are
    /// dropped; returns whether a record was added.
    pub fn record(
        &mut self,
        instruction: &str,
        input: &str,
        answer: &Answer,
        feeds_context: bool,
    ) -> bool {
        if !answer.is_applicable() {
            return false;
        }
        let Some(output) = answer.output().map(str::trim) else {
            return false;
        };
        if output.is_empty() {
            return false;
        }
        if feeds_context {
            self.context.push(self.records.len());
        }
        self.records
            .push(InstructionRecord::new(instruction, input, output));
        true
    }

    /// Records that later prompts may quote as earlier answers.
    pub fn context_records(&self) -> impl Iterator<Item = &InstructionRecord> {
        self.context.iter().map(|&index| &self.records[index])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn finish(self) -> Vec<InstructionRecord> {
        self.records
    }
}

/// Aggregated output of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusDataset {
    pub instruct: Vec<InstructionRecord>,
    /// Present only when augmentation was enabled.
    pub train: Option<Vec<TrainRecord>>,
}

/// Concatenate per-file records in the given order, keeping the first of
/// any exact duplicate.
pub fn merge_corpus<'a>(
    per_file: impl IntoIterator<Item = &'a [InstructionRecord]>,
    include_train: bool,
) -> CorpusDataset {
    let mut seen: HashSet<&InstructionRecord> = HashSet::new();
    let mut instruct = Vec::new();
    for records in per_file {
        for record in records {
            if seen.insert(record) {
                instruct.push(record.clone());
            }
        }
    }

    let train = include_train.then(|| {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        instruct
            .iter()
            .filter(|r| seen.insert((r.instruction.as_str(), r.output.as_str())))
            .map(|r| TrainRecord {
                instruction: r.instruction.clone(),
                output: r.output.clone(),
            })
            .collect()
    });

    CorpusDataset { instruct, train }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::answers::Inapplicable;

    fn record(instruction: &str, input: &str, output: &str) -> InstructionRecord {
        InstructionRecord::new(instruction, input, output)
    }

    #[test]
    fn test_assembler_filters_inapplicable_and_empty() {
        let mut assembler = DatasetAssembler::new();
        assert!(assembler.record("Classes?", "", &Answer::Text(" A, B ".into()), true));
        assert!(!assembler.record("Docstring?", "f", &Answer::Text("   ".into()), true));
        assert!(!assembler.record(
            "Bases?",
            "f",
            &Answer::Inapplicable(Inapplicable::UnknownQuestion("x".into())),
            true
        ));
        assert!(assembler.record(
            "Purpose?",
            "f",
            &Answer::Purpose {
                placeholder: "no augmentation requested".into()
            },
            true
        ));
        assert!(assembler.record("Graph?", "", &Answer::Text(" {\"nodes\": []} ".into()), false));
        assert_eq!(assembler.len(), 3);
        let quoted: Vec<&str> = assembler
            .context_records()
            .map(|r| r.instruction.as_str())
            .collect();
        assert_eq!(quoted, vec!["Classes?", "Purpose?"]);
        let records = assembler.finish();
        assert_eq!(records[0].output, "A, B");
        assert_eq!(records[2].output, "{\"nodes\": []}");
    }

    #[test]
    fn test_merge_keeps_order_and_first_duplicate() {
        let a = vec![record("q1", "", "x"), record("q2", "f", "y")];
        let b = vec![record("q1", "", "x"), record("q3", "", "z")];
        let corpus = merge_corpus([a.as_slice(), b.as_slice()], false);
        let instructions: Vec<&str> = corpus.instruct.iter().map(|r| r.instruction.as_str()).collect();
        assert_eq!(instructions, vec!["q1", "q2", "q3"]);
        assert!(corpus.train.is_none());
    }

    #[test]
    fn test_train_dedups_on_instruction_and_output() {
        let a = vec![record("Purpose?", "f", "adds"), record("Purpose?", "g", "adds")];
        let corpus = merge_corpus([a.as_slice()], true);
        assert_eq!(corpus.instruct.len(), 2);
        assert_eq!(
            corpus.train.unwrap(),
            vec![TrainRecord {
                instruction: "Purpose?".into(),
                output: "adds".into()
            }]
        );
    }
}
