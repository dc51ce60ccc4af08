/*!
  The verification harness drives one run: it evaluates the expected effects of a word
  sequence, has an execution unit run the same words, and compares the two final states.

  A run moves through the phases

    Idle -> Loaded -> Executing -> Compared -> Reported

  and each transition is its own method so a driver can step through a run and inspect it
  between phases. `verify` does all of it in one call.

  Expected evaluation and the unit's execution work on separate copies of the initial state,
  so by default they run at the same time, the evaluation on a scoped thread. `execute` is
  the only place the two meet.
*/

use std::collections::{BTreeSet, HashMap};
use std::thread;

use strum_macros::Display as StrumDisplay;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::bytecode::InstructionWord;
use crate::catalog::Catalog;
use crate::eval::{Evaluator, Gap, SequenceEvaluation};
use crate::location::{Location, LocationDiff};
use crate::oracle::{ExecutionUnit, OracleError};
use crate::register::Register;
use crate::report::{Entry, Outcome, VerificationResult};
use crate::state::MachineState;

#[derive(StrumDisplay, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Phase {
  Idle,
  Loaded,
  Executing,
  Compared,
  Reported,
}

#[derive(Error, Clone, Copy, Debug, Eq, PartialEq)]
pub enum HarnessError {
  #[error("cannot {action} in phase {phase}")]
  InvalidTransition {
    phase  : Phase,
    action : &'static str
  },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HarnessConfig {
  /// Evaluate expected effects on a separate thread while the unit executes. When off, the
  /// evaluation runs after the unit returns.
  pub concurrent_evaluation: bool,
}

impl Default for HarnessConfig {
  fn default() -> Self {
    HarnessConfig{ concurrent_evaluation: true }
  }
}

pub struct Harness<'a> {
  catalog    : &'a Catalog,
  evaluator  : &'a Evaluator,
  config     : HarnessConfig,
  phase      : Phase,

  // Owned by the current run and cleared by `reset`.
  words      : Vec<InstructionWord>,
  initial    : MachineState,
  unit       : String,
  evaluation : Option<SequenceEvaluation>,
  observed   : Option<Result<MachineState, OracleError>>,
  result     : Option<VerificationResult>,
}

impl<'a> Harness<'a> {

  pub fn new(catalog: &'a Catalog, evaluator: &'a Evaluator, config: HarnessConfig) -> Harness<'a> {
    Harness{
      catalog,
      evaluator,
      config,
      phase      : Phase::Idle,
      words      : vec![],
      initial    : MachineState::new(),
      unit       : String::new(),
      evaluation : None,
      observed   : None,
      result     : None,
    }
  }

  pub fn phase(&self) -> Phase {
    self.phase
  }

  fn require(&self, phase: Phase, action: &'static str) -> Result<(), HarnessError> {
    match self.phase == phase {
      true  => Ok(()),
      false => Err(HarnessError::InvalidTransition{ phase: self.phase, action })
    }
  }

  /// Drops everything from the previous run and returns to `Idle`.
  pub fn reset(&mut self) {
    self.phase = Phase::Idle;
    self.words.clear();
    self.initial.reset();
    self.unit.clear();
    self.evaluation = None;
    self.observed = None;
    self.result = None;
  }

  /// `Idle -> Loaded`: takes the test vector and the state it starts from.
  pub fn load(&mut self, words: Vec<InstructionWord>, initial: MachineState) -> Result<(), HarnessError> {
    self.require(Phase::Idle, "load")?;
    debug!(words = words.len(), "loaded");
    self.words = words;
    self.initial = initial;
    self.phase = Phase::Loaded;
    Ok(())
  }

  /**
    `Loaded -> Executing`: evaluates the expected effects and runs the unit on the same words.
    Returns once both are done. A unit failure is recorded, not returned; it shows up in the
    report.
  */
  pub fn execute(&mut self, unit: &mut dyn ExecutionUnit) -> Result<(), HarnessError> {
    self.require(Phase::Loaded, "execute")?;
    self.phase = Phase::Executing;
    self.unit = unit.name().to_string();

    let _span = info_span!("execute", unit = %self.unit).entered();
    let catalog = self.catalog;
    let evaluator = self.evaluator;
    let words = &self.words;
    let initial = &self.initial;

    let (evaluation, observed) = match self.config.concurrent_evaluation {

      true => thread::scope(|scope| {
        let expected = scope.spawn(|| evaluator.evaluate_sequence(catalog, words, initial));
        let observed = unit.execute(words, initial);
        match expected.join() {
          Ok(evaluation) => (evaluation, observed),
          Err(panic)     => std::panic::resume_unwind(panic)
        }
      }),

      false => {
        let observed = unit.execute(words, initial);
        (evaluator.evaluate_sequence(catalog, words, initial), observed)
      }

    };

    if let Err(e) = &observed {
      warn!(%e, "execution unit failed");
    }
    self.evaluation = Some(evaluation);
    self.observed = Some(observed);
    Ok(())
  }

  /// `Executing -> Compared`: diffs the observed state against the expected one.
  pub fn compare(&mut self) -> Result<(), HarnessError> {
    self.require(Phase::Executing, "compare")?;

    let (evaluation, observed) = match (self.evaluation.as_ref(), self.observed.as_ref()) {
      (Some(evaluation), Some(observed)) => (evaluation, observed),
      _ => return Err(HarnessError::InvalidTransition{ phase: self.phase, action: "compare" })
    };

    let result = compare(&self.unit, &self.initial, evaluation, observed);
    info!(
      unit = %self.unit,
      passed = result.pass_count(),
      total = result.entries.len(),
      unattributed = result.unattributed.len(),
      "compared"
    );

    self.result = Some(result);
    self.phase = Phase::Compared;
    Ok(())
  }

  /// `Compared -> Reported`: hands over the result. `Reported` is terminal until `reset`.
  pub fn report(&mut self) -> Result<VerificationResult, HarnessError> {
    self.require(Phase::Compared, "report")?;
    let result = self.result.take()
      .ok_or(HarnessError::InvalidTransition{ phase: self.phase, action: "report" })?;
    self.phase = Phase::Reported;
    Ok(result)
  }

  /// Runs every phase for one sequence, resetting first if a previous run finished.
  pub fn verify(
    &mut self,
    words   : Vec<InstructionWord>,
    initial : MachineState,
    unit    : &mut dyn ExecutionUnit
  ) -> Result<VerificationResult, HarnessError> {
    if self.phase == Phase::Reported {
      self.reset();
    }
    self.load(words, initial)?;
    self.execute(unit)?;
    self.compare()?;
    self.report()
  }

  /// The expected evaluation of the current run, once `execute` has finished.
  pub fn evaluation(&self) -> Option<&SequenceEvaluation> {
    self.evaluation.as_ref()
  }
}

/**
  Builds the result of a run.

  Only final states are available, so a difference is pinned on the last instruction that was
  expected to write the location. If a gap comes after that instruction, the gap may have been
  what changed the location on the unit, and the difference is left unattributed instead.
  Locations no instruction was expected to write are unattributed as well. That includes
  `x0`, which is always checked.
*/
fn compare(
  unit       : &str,
  initial    : &MachineState,
  evaluation : &SequenceEvaluation,
  observed   : &Result<MachineState, OracleError>
) -> VerificationResult {
  let observed_state = observed.as_ref().ok();

  let mut last_writer: HashMap<Location, usize> = HashMap::new();
  for step in evaluation.steps.iter() {
    if let Ok((_, effect)) = &step.outcome {
      for location in effect.locations() {
        last_writer.insert(location, step.index);
      }
    }
  }
  let last_gap = evaluation.steps.iter().rev().find(|step| step.outcome.is_err()).map(|step| step.index);

  let mut attributed: HashMap<usize, Vec<LocationDiff>> = HashMap::new();
  let mut unattributed = vec![];

  if let Some(observed_state) = observed_state {
    let mut locations: BTreeSet<Location> = last_writer.keys().copied().collect();
    locations.extend(initial.changed_locations(observed_state));
    // No effect ever writes `x0`, but a unit may still report it nonzero.
    locations.insert(Location::Register(Register::ZERO));

    for diff in evaluation.final_state.diff(observed_state, locations) {
      match last_writer.get(&diff.location) {
        Some(writer) if last_gap.map_or(true, |gap| gap < *writer) => {
          attributed.entry(*writer).or_default().push(diff);
        }
        _ => unattributed.push(diff),
      }
    }
  }

  let entries = evaluation.steps
    .iter()
    .map(|step| {
      let outcome = match &step.outcome {
        Err(Gap::Decode(e))       => Outcome::DecodeFailure(*e),
        Err(Gap::Unrecognized(e)) => Outcome::Unrecognized(*e),
        Ok(_) if observed_state.is_none() => Outcome::Unobserved,
        Ok(_) => match attributed.remove(&step.index) {
          Some(diffs) => Outcome::Mismatch(diffs),
          None        => Outcome::Pass
        }
      };
      Entry{
        index       : step.index,
        word        : step.word,
        instruction : step.instruction,
        operation   : step.outcome.as_ref().ok().map(|(tag, _)| tag.clone()),
        outcome
      }
    })
    .collect();

  VerificationResult{
    unit         : unit.to_string(),
    entries,
    unattributed,
    oracle_error : observed.as_ref().err().cloned(),
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{CustomFields, CustomKey, DecodeError, OpcodeClass};
  use crate::catalog::{OperandRoles, Unrecognized};
  use crate::effect::{AccessWidth, ExpectedEffect};
  use crate::error::VerifyError;
  use crate::oracle::{RecordedUnit, ReferenceUnit};

  const PROBE: [u32; 10] = [
    0x300007b7, 0x00100713, 0x00e7a023, 0x08000f93, 0x00000f13,
    0x00af2f2f, 0x01af2f2f, 0x03af2f2f, 0x02cf2f2f, 0x000f2f2f,
  ];

  fn words(raw: &[u32]) -> Vec<InstructionWord> {
    raw.iter().map(|w| InstructionWord::new(*w)).collect()
  }

  fn reg(index: u32) -> Register {
    Register::from_field(index)
  }

  #[test]
  fn phases_in_order(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());
    let mut unit = ReferenceUnit::default();

    assert_eq!(
      harness.compare(),
      Err(HarnessError::InvalidTransition{ phase: Phase::Idle, action: "compare" })
    );
    harness.load(words(&PROBE[..3]), MachineState::new()).unwrap();
    assert_eq!(harness.phase(), Phase::Loaded);
    assert!(harness.load(vec![], MachineState::new()).is_err());
    assert!(harness.report().is_err());

    harness.execute(&mut unit).unwrap();
    assert_eq!(harness.phase(), Phase::Executing);
    harness.compare().unwrap();
    assert_eq!(harness.phase(), Phase::Compared);
    let result = harness.report().unwrap();
    assert_eq!(harness.phase(), Phase::Reported);
    assert!(result.passed());

    // Terminal until reset.
    assert!(harness.load(vec![], MachineState::new()).is_err());
    harness.reset();
    assert_eq!(harness.phase(), Phase::Idle);
  }

  #[test]
  fn store_sequence_against_reference(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    let result = harness
      .verify(words(&PROBE[..3]), MachineState::new(), &mut ReferenceUnit::default())
      .unwrap();
    assert!(result.passed());
    assert_eq!(result.pass_count(), 3);

    let expected = &harness.evaluation().unwrap().final_state;
    assert_eq!(expected.load(0x3000_0000, AccessWidth::Word), 1);
  }

  #[test]
  fn probe_custom_words_need_review(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    let result = harness
      .verify(words(&PROBE), MachineState::new(), &mut ReferenceUnit::default())
      .unwrap();

    assert_eq!(result.entries.len(), 10);
    for entry in &result.entries[..5] {
      assert_eq!(entry.outcome, Outcome::Pass, "entry {}", entry.index);
    }
    for entry in &result.entries[5..] {
      match &entry.outcome {
        Outcome::Unrecognized(Unrecognized{ class: OpcodeClass::Custom, .. }) => {}
        other => panic!("entry {}: {:?}", entry.index, other),
      }
      assert!(entry.instruction.is_some());
    }
    assert!(!result.passed());
    assert_eq!(result.errors().len(), 5);
  }

  #[test]
  fn mismatch_is_pinned_on_last_writer(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    // The core forgot the store.
    let mut unit = RecordedUnit::from_text("core", ".reg x15, 0x30000000\n.reg x14, 1\n").unwrap();
    let result = harness.verify(words(&PROBE[..3]), MachineState::new(), &mut unit).unwrap();

    assert_eq!(result.entries[0].outcome, Outcome::Pass);
    assert_eq!(result.entries[1].outcome, Outcome::Pass);
    match &result.entries[2].outcome {
      Outcome::Mismatch(diffs) => {
        assert_eq!(diffs.len(), 1);
        assert_eq!(
          diffs[0],
          LocationDiff{ location: Location::Memory(0x3000_0000), expected: 1, observed: 0 }
        );
      }
      other => panic!("{:?}", other),
    }
    assert!(result.unattributed.is_empty());
    assert!(matches!(result.errors()[0], VerifyError::EffectMismatch{ index: 2, .. }));
  }

  #[test]
  fn stray_write_is_unattributed(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    let mut unit = RecordedUnit::from_text(
      "core", ".reg x15, 0x30000000\n.reg x14, 1\n.mem 0x30000000, 1\n.reg x1, 5\n"
    ).unwrap();
    let result = harness.verify(words(&PROBE[..3]), MachineState::new(), &mut unit).unwrap();

    assert_eq!(result.pass_count(), 3);
    assert_eq!(
      result.unattributed,
      vec![LocationDiff{ location: Location::Register(reg(1)), expected: 0, observed: 5 }]
    );
    assert!(!result.passed());
  }

  #[test]
  fn nonzero_x0_from_the_unit_fails(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    // addi x0, x0, 1 must not change anything, but the core says x0 is now 1.
    let mut unit = RecordedUnit::from_text("core", ".reg x0, 1\n").unwrap();
    let result = harness.verify(words(&[0x00100013]), MachineState::new(), &mut unit).unwrap();

    assert_eq!(result.entries[0].outcome, Outcome::Pass);
    assert_eq!(
      result.unattributed,
      vec![LocationDiff{ location: Location::Register(Register::ZERO), expected: 0, observed: 1 }]
    );
    assert!(!result.passed());
    assert!(matches!(result.errors()[0], VerifyError::UnattributedChange(_)));
  }

  #[test]
  fn closure_unit_reporting_x0_fails(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig{ concurrent_evaluation: false });

    // A unit that hands back an x0 it was never given.
    let mut unit = |_: &[InstructionWord], initial: &MachineState| -> Result<MachineState, OracleError> {
      let mut state = initial.clone().unconstrained();
      state.set_register(Register::ZERO, 7);
      Ok(state)
    };
    let result = harness.verify(words(&PROBE[..3]), MachineState::new(), &mut unit).unwrap();

    assert_eq!(result.pass_count(), 3);
    assert_eq!(
      result.unattributed,
      vec![LocationDiff{ location: Location::Register(Register::ZERO), expected: 0, observed: 7 }]
    );
  }

  #[test]
  fn differences_behind_a_gap_are_unattributed(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    // x30 is written by `addi x30, x0, 0` and then possibly by the custom word after it.
    let mut unit = RecordedUnit::from_text("core", ".reg x31, 128\n.reg x30, 0xabc\n").unwrap();
    let result = harness
      .verify(words(&[0x08000f93, 0x00000f13, 0x00af2f2f]), MachineState::new(), &mut unit)
      .unwrap();

    assert_eq!(result.entries[0].outcome, Outcome::Pass);
    assert_eq!(result.entries[1].outcome, Outcome::Pass);
    assert!(matches!(result.entries[2].outcome, Outcome::Unrecognized(_)));
    assert_eq!(
      result.unattributed,
      vec![LocationDiff{ location: Location::Register(reg(30)), expected: 0, observed: 0xabc }]
    );
  }

  #[test]
  fn registered_custom_handler_is_verified(){
    let mut catalog = Catalog::new();
    let mut evaluator = Evaluator::new();
    let key = CustomKey{ opcode: 0x2F, funct3: 2, funct7: 0 };
    catalog.register_custom(key, "copy", OperandRoles::register_register());
    evaluator.register(key, |fields: &CustomFields, state: &MachineState| {
      ExpectedEffect::none().set_register(fields.rd, state.register(fields.rs2))
    });

    let mut initial = MachineState::new();
    initial.set_register(reg(10), 99);
    let mut unit = RecordedUnit::from_text("core", ".reg x30, 99\n").unwrap();

    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig{ concurrent_evaluation: false });
    let result = harness.verify(words(&[0x00af2f2f]), initial, &mut unit).unwrap();
    assert!(result.passed());
    assert_eq!(result.entries[0].operation.as_ref().map(|tag| tag.to_string()), Some("copy".to_string()));
  }

  #[test]
  fn truncated_word_does_not_disturb_the_rest(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    let mut vector = words(&PROBE[..2]);
    vector.push(InstructionWord::truncated(&[0x23]));
    vector.extend(words(&[0x00e7a023]));

    let result = harness.verify(vector, MachineState::new(), &mut ReferenceUnit::default()).unwrap();
    assert_eq!(result.entries[2].outcome, Outcome::DecodeFailure(DecodeError::Truncated{ width: 1 }));
    assert_eq!(result.entries[3].outcome, Outcome::Pass);
    assert_eq!(
      harness.evaluation().unwrap().final_state.load(0x3000_0000, AccessWidth::Word),
      1
    );
  }

  #[test]
  fn unavailable_unit_is_reported(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());

    let mut unit = RecordedUnit::unavailable("core");
    let result = harness.verify(words(&PROBE[..3]), MachineState::new(), &mut unit).unwrap();

    assert!(result.entries.iter().all(|entry| entry.outcome == Outcome::Unobserved));
    assert!(result.oracle_error.is_some());
    assert!(!result.passed());
    assert!(matches!(result.errors().last(), Some(VerifyError::OracleUnavailable(_))));
  }

  #[test]
  fn independent_runs_do_not_share_state(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();

    let outcomes: Vec<bool> = thread::scope(|scope| {
      let handles: Vec<_> = (0..4)
        .map(|i| {
          let catalog = &catalog;
          let evaluator = &evaluator;
          scope.spawn(move || {
            let mut harness = Harness::new(catalog, evaluator, HarnessConfig::default());
            let mut initial = MachineState::new();
            initial.set_register(reg(1), i);
            let mut unit = ReferenceUnit::default();
            // addi x2, x1, 1
            let result = harness.verify(words(&[0x00108113]), initial, &mut unit).unwrap();
            result.passed()
              && harness.evaluation().unwrap().final_state.register(reg(2)) == i + 1
          })
        })
        .collect();
      handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(outcomes, vec![true; 4]);
  }

  #[test]
  fn report_renders(){
    let catalog = Catalog::new();
    let evaluator = Evaluator::new();
    let mut harness = Harness::new(&catalog, &evaluator, HarnessConfig::default());
    let result = harness
      .verify(words(&PROBE), MachineState::new(), &mut ReferenceUnit::default())
      .unwrap();

    let text = format!("{}", result);
    assert!(text.contains("Execution unit: reference"));
    assert!(text.contains("FAILED: 5 of 10 instructions passed."));
  }
}
