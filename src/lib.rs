/*!
  Checks that an execution unit does what a sequence of 32 bit RISC-V instruction words says
  it should.

  The pipeline is this:
  ```text
  words -> [`bytecode::decode`] -> `Instruction`s -> [`Catalog::lookup`] ->⋯

      ⋯-> [`Evaluator::apply`] -> expected state ─┐
                                                   ├─> [`Harness::compare`] -> `VerificationResult`
      ⋯ words -> [`ExecutionUnit`] -> observed ───┘
  ```
  Base load-upper-immediate, add-immediate and store words are understood directly. Words in
  the custom opcode spaces are decoded field by field and only given meaning by handlers
  registered with the `Catalog` and the `Evaluator`.
*/

pub mod bytecode;
pub mod catalog;
pub mod effect;
pub mod error;
pub mod eval;
pub mod harness;
pub mod location;
pub mod oracle;
pub mod register;
pub mod report;
pub mod state;

pub use bytecode::{decode, encode, Instruction, InstructionWord, Word};
pub use catalog::{Catalog, OperandRoles, OperationSemantics, OperationTag, Unrecognized};
pub use effect::ExpectedEffect;
pub use error::VerifyError;
pub use eval::{CustomHandler, Evaluator};
pub use harness::{Harness, HarnessConfig, HarnessError, Phase};
pub use oracle::{ExecutionUnit, OracleError, RecordedUnit, ReferenceUnit};
pub use report::{Outcome, VerificationResult};
pub use state::MachineState;
