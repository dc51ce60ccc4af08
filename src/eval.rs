/*!
  The effect evaluator computes what an instruction is expected to do to a given machine state.
  It reads the state but never writes it; the result is an `ExpectedEffect` that the caller
  may commit.

  All arithmetic wraps at 32 bits. Nothing here faults on overflow.
*/

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tracing::{trace, warn};

use crate::bytecode::{decode, CustomFields, CustomKey, DecodeError, Instruction, InstructionWord, Word};
use crate::catalog::{Catalog, OperationSemantics, OperationTag, Unrecognized};
use crate::effect::ExpectedEffect;
use crate::state::MachineState;

/**
  Semantics for one custom operation. What a custom instruction does is defined by the
  extension that owns its opcode space, so the evaluator has no built-in handlers.
*/
pub trait CustomHandler: Send + Sync {
  fn apply(&self, fields: &CustomFields, state: &MachineState) -> ExpectedEffect;
}

impl<F> CustomHandler for F
  where F: Fn(&CustomFields, &MachineState) -> ExpectedEffect + Send + Sync
{
  fn apply(&self, fields: &CustomFields, state: &MachineState) -> ExpectedEffect {
    self(fields, state)
  }
}

#[derive(Clone, Default)]
pub struct Evaluator {
  handlers: HashMap<CustomKey, Arc<dyn CustomHandler>>
}

impl Evaluator {

  pub fn new() -> Evaluator {
    Evaluator::default()
  }

  /// Registers the handler for a custom operation, replacing any earlier one.
  pub fn register<H>(&mut self, key: CustomKey, handler: H)
    where H: CustomHandler + 'static
  {
    self.handlers.insert(key, Arc::new(handler));
  }

  pub fn has_handler(&self, key: &CustomKey) -> bool {
    self.handlers.contains_key(key)
  }

  /// The expected effect of `instruction`, an instance of `op`, when executed in `state`.
  pub fn apply(
    &self,
    op          : &OperationSemantics,
    instruction : &Instruction,
    state       : &MachineState
  ) -> Result<ExpectedEffect, Unrecognized> {
    // The value of the `i`th source operand.
    let source = |i: usize| -> Result<Word, Unrecognized> {
      op.roles.sources
        .get(i)
        .and_then(|field| instruction.register(*field))
        .map(|register| state.register(register))
        .ok_or_else(|| Unrecognized::of(instruction))
    };
    let destination = match op.roles.destination {
      Some(field) => instruction.register(field),
      None        => None
    };

    let effect = match (&op.tag, instruction) {

      (OperationTag::LoadUpperImmediate, Instruction::Upper{imm, ..}) => {
        let value = imm << 12;
        match destination {
          Some(rd) => ExpectedEffect::none().set_register(rd, value),
          None     => ExpectedEffect::none()
        }
      }

      (OperationTag::AddImmediate, Instruction::Immediate{imm, ..}) => {
        let value = source(0)?.wrapping_add(*imm as Word);
        match destination {
          Some(rd) => ExpectedEffect::none().set_register(rd, value),
          None     => ExpectedEffect::none()
        }
      }

      (OperationTag::Store(width), Instruction::Store{imm, ..}) => {
        let base    = source(0)?;
        let value   = source(1)?;
        let address = base.wrapping_add(*imm as Word);
        ExpectedEffect::none().set_memory(address, *width, value)
      }

      (OperationTag::Custom(_), Instruction::Custom(fields)) => {
        match self.handlers.get(&fields.key()) {
          Some(handler) => handler.apply(fields, state),
          None          => return Err(Unrecognized::of(instruction))
        }
      }

      // The catalog entry does not describe this instruction's format.
      _ => return Err(Unrecognized::of(instruction))
    };

    trace!(%instruction, %effect, "evaluated");
    Ok(effect)
  }
}


/// Why a step of a sequence has no expected effect.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Gap {
  Decode(DecodeError),
  Unrecognized(Unrecognized),
}

impl Display for Gap {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Gap::Decode(e)       => write!(f, "{}", e),
      Gap::Unrecognized(e) => write!(f, "{}", e),
    }
  }
}

/// One instruction of an evaluated sequence.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Step {
  pub index       : usize,
  pub word        : InstructionWord,
  pub instruction : Option<Instruction>,
  pub outcome     : Result<(OperationTag, ExpectedEffect), Gap>,
}

/// The expected effects of a whole sequence and the state they leave behind.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SequenceEvaluation {
  pub steps       : Vec<Step>,
  pub final_state : MachineState,
}

impl SequenceEvaluation {
  pub fn has_gaps(&self) -> bool {
    self.steps.iter().any(|step| step.outcome.is_err())
  }
}

impl Evaluator {

  /**
    Evaluates `words` in order starting from `initial`. Each instruction sees the state left by
    the ones before it. A word that cannot be decoded or has no known semantics is recorded as
    a gap and contributes no effect; evaluation carries on with the next word.
  */
  pub fn evaluate_sequence(
    &self,
    catalog : &Catalog,
    words   : &[InstructionWord],
    initial : &MachineState
  ) -> SequenceEvaluation {
    let mut state = initial.clone();
    let mut steps = Vec::with_capacity(words.len());

    for (index, word) in words.iter().enumerate() {
      let instruction = decode(*word);
      let outcome = match &instruction {
        Err(e) => Err(Gap::Decode(*e)),
        Ok(instruction) => {
          catalog
            .lookup_instruction(instruction)
            .and_then(|op| {
              self.apply(op, instruction, &state).map(|effect| (op.tag.clone(), effect))
            })
            .map_err(Gap::Unrecognized)
        }
      };

      match &outcome {
        Ok((_, effect)) => state.commit(effect),
        Err(gap)        => warn!(index, %word, %gap, "no expected effect"),
      }

      #[cfg(feature = "trace_computation")]
      trace!("after instruction {} ({}):\n{}", index, word, state);

      steps.push(Step{ index, word: *word, instruction: instruction.ok(), outcome });
    }

    SequenceEvaluation{ steps, final_state: state }
  }
}
