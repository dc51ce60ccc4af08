//! The outcome of one verification run, in instruction order.

use std::fmt::{Display, Formatter};

use prettytable::{row, Table};

use crate::bytecode::{DecodeError, Instruction, InstructionWord};
use crate::catalog::{OperationTag, Unrecognized};
use crate::error::VerifyError;
use crate::location::LocationDiff;
use crate::oracle::OracleError;
use crate::state::TABLE_DISPLAY_FORMAT;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
  /// Every location this instruction was last to write holds the expected value.
  Pass,
  Mismatch(Vec<LocationDiff>),
  DecodeFailure(DecodeError),
  /// No catalogued meaning or no handler. Needs review.
  Unrecognized(Unrecognized),
  /// The execution unit did not report a state to compare against.
  Unobserved,
}

impl Outcome {
  pub fn is_pass(&self) -> bool {
    matches!(self, Outcome::Pass)
  }
}

impl Display for Outcome {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Outcome::Pass            => write!(f, "pass"),
      Outcome::Mismatch(diffs) => write!(
        f,
        "MISMATCH {}",
        diffs.iter().map(|d| format!("{}", d)).collect::<Vec<String>>().join("; ")
      ),
      Outcome::DecodeFailure(e) => write!(f, "DECODE FAILURE {}", e),
      Outcome::Unrecognized(e)  => write!(f, "REVIEW {}", e),
      Outcome::Unobserved       => write!(f, "not observed"),
    }
  }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
  pub index       : usize,
  pub word        : InstructionWord,
  pub instruction : Option<Instruction>,
  pub operation   : Option<OperationTag>,
  pub outcome     : Outcome,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VerificationResult {
  /// Name of the execution unit that was checked.
  pub unit         : String,
  /// One entry per input word, in input order.
  pub entries      : Vec<Entry>,
  /// Differences that cannot be pinned on a single instruction.
  pub unattributed : Vec<LocationDiff>,
  pub oracle_error : Option<OracleError>,
}

impl VerificationResult {

  /// True only when every entry passed and nothing else differed.
  pub fn passed(&self) -> bool {
    self.oracle_error.is_none()
      && self.unattributed.is_empty()
      && self.entries.iter().all(|entry| entry.outcome.is_pass())
  }

  pub fn pass_count(&self) -> usize {
    self.entries.iter().filter(|entry| entry.outcome.is_pass()).count()
  }

  /// Every finding of the run as an error value, in instruction order.
  pub fn errors(&self) -> Vec<VerifyError> {
    let mut errors: Vec<VerifyError> = self.entries
      .iter()
      .filter_map(|entry| {
        match &entry.outcome {
          Outcome::Pass | Outcome::Unobserved => None,
          Outcome::Mismatch(diffs) => Some(VerifyError::EffectMismatch{
            index : entry.index,
            diffs : diffs.clone()
          }),
          Outcome::DecodeFailure(e) => Some(VerifyError::Decode{ index: entry.index, source: *e }),
          Outcome::Unrecognized(e)  => Some(VerifyError::UnrecognizedOperation{ index: entry.index, source: *e }),
        }
      })
      .collect();

    if !self.unattributed.is_empty() {
      errors.push(VerifyError::UnattributedChange(self.unattributed.clone()));
    }
    if let Some(e) = &self.oracle_error {
      errors.push(VerifyError::from(e.clone()));
    }
    errors
  }
}

impl Display for VerificationResult {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"#", ubl->"Word", ubl->"Decoded", ubl->"Op", ubl->"Outcome"]);

    for entry in self.entries.iter() {
      let decoded = match &entry.instruction {
        Some(instruction) => format!("{}", instruction),
        None              => "-".to_string()
      };
      let operation = match &entry.operation {
        Some(tag) => format!("{}", tag),
        None      => "?".to_string()
      };
      table.add_row(
        row![r->entry.index + 1, entry.word, decoded, operation, entry.outcome]
      );
    }

    writeln!(f, "Execution unit: {}", self.unit)?;
    write!(f, "{}", table)?;

    for diff in self.unattributed.iter() {
      writeln!(f, "Unattributed change: {}", diff)?;
    }
    if let Some(e) = &self.oracle_error {
      writeln!(f, "{}", e)?;
    }

    let verdict = match self.passed() {
      true  => "PASSED",
      false => "FAILED"
    };
    writeln!(f, "{}: {} of {} instructions passed.", verdict, self.pass_count(), self.entries.len())
  }
}
