/*!
  Execution units are the oracles whose behavior is checked. The harness hands a unit the raw
  words and the initial state and gets back the state the unit ended in.

  Two units are provided. `ReferenceUnit` runs the words on the software model built from the
  same catalog and evaluator the harness uses, which is mostly useful for checking vectors and
  handlers. `RecordedUnit` replays a final state captured from a run elsewhere, such as an RTL
  simulation of a core.
*/

use thiserror::Error;
use tracing::debug;

use crate::bytecode::{parse_state, InstructionWord, VectorError};
use crate::catalog::Catalog;
use crate::effect::StateWrite;
use crate::eval::Evaluator;
use crate::state::MachineState;

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum OracleError {
  /// The unit did not produce a final state. Not retried: executing the words again is not
  /// guaranteed to have the same side effects.
  #[error("execution unit `{unit}` is unavailable: {reason}")]
  Unavailable {
    unit   : String,
    reason : String
  },
}

pub trait ExecutionUnit {
  fn name(&self) -> &str;

  /// Executes `words` in order starting from `initial` and reports the resulting state.
  fn execute(&mut self, words: &[InstructionWord], initial: &MachineState) -> Result<MachineState, OracleError>;
}

impl<F> ExecutionUnit for F
  where F: FnMut(&[InstructionWord], &MachineState) -> Result<MachineState, OracleError>
{
  fn name(&self) -> &str {
    "closure"
  }

  fn execute(&mut self, words: &[InstructionWord], initial: &MachineState) -> Result<MachineState, OracleError> {
    self(words, initial)
  }
}

/// The software model. Words without known semantics leave the state untouched.
#[derive(Clone, Default)]
pub struct ReferenceUnit {
  catalog   : Catalog,
  evaluator : Evaluator
}

impl ReferenceUnit {
  pub fn new(catalog: Catalog, evaluator: Evaluator) -> ReferenceUnit {
    ReferenceUnit{ catalog, evaluator }
  }
}

impl ExecutionUnit for ReferenceUnit {
  fn name(&self) -> &str {
    "reference"
  }

  fn execute(&mut self, words: &[InstructionWord], initial: &MachineState) -> Result<MachineState, OracleError> {
    debug!(words = words.len(), "reference unit executing");
    let evaluation = self.evaluator.evaluate_sequence(&self.catalog, words, initial);
    Ok(evaluation.final_state)
  }
}

/**
  Replays a final state captured elsewhere. The recording lists the registers and memory the
  unit reported; anything it does not mention is taken to be unchanged from the initial state.
  The replayed state is unconstrained, so a recorded write to `x0` is kept.
*/
#[derive(Clone, Debug)]
pub struct RecordedUnit {
  name      : String,
  recording : Option<Vec<StateWrite>>
}

impl RecordedUnit {

  pub fn new(name: &str, recording: Vec<StateWrite>) -> RecordedUnit {
    RecordedUnit{ name: name.to_string(), recording: Some(recording) }
  }

  /// A unit that never answers.
  pub fn unavailable(name: &str) -> RecordedUnit {
    RecordedUnit{ name: name.to_string(), recording: None }
  }

  /// Reads a recording in the `.reg`/`.mem` state format.
  pub fn from_text(name: &str, text: &str) -> Result<RecordedUnit, VectorError> {
    Ok(RecordedUnit::new(name, parse_state(text)?))
  }
}

impl ExecutionUnit for RecordedUnit {
  fn name(&self) -> &str {
    &self.name
  }

  fn execute(&mut self, words: &[InstructionWord], initial: &MachineState) -> Result<MachineState, OracleError> {
    match &self.recording {

      Some(recording) => {
        debug!(unit = %self.name, words = words.len(), writes = recording.len(), "replaying recorded state");
        // Whatever the unit reported, including a nonzero `x0`.
        let mut state = initial.clone().unconstrained();
        for write in recording {
          state.write(write);
        }
        Ok(state)
      }

      None => Err(OracleError::Unavailable {
        unit   : self.name.clone(),
        reason : "no recorded state".to_string()
      })

    }
  }
}
