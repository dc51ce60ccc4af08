//! The kinds of finding a verification run can produce, as one error type.

use thiserror::Error;

use crate::bytecode::DecodeError;
use crate::catalog::Unrecognized;
use crate::location::LocationDiff;
use crate::oracle::OracleError;

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum VerifyError {
  #[error("instruction {index}: {source}")]
  Decode {
    index  : usize,
    #[source]
    source : DecodeError
  },

  /// Structurally valid but without defined semantics. Flagged for review.
  #[error("instruction {index}: {source}")]
  UnrecognizedOperation {
    index  : usize,
    #[source]
    source : Unrecognized
  },

  #[error("instruction {index}: effect mismatch at {} location(s)", .diffs.len())]
  EffectMismatch {
    index : usize,
    diffs : Vec<LocationDiff>
  },

  #[error("{} location(s) changed that no evaluated instruction accounts for", .0.len())]
  UnattributedChange(Vec<LocationDiff>),

  #[error(transparent)]
  OracleUnavailable(#[from] OracleError),
}
