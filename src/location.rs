//! An `Either` type that names a piece of architectural state: a register or a byte of memory.

use std::fmt::{Display, Formatter};
use std::ops::Add;

use crate::bytecode::Word;
use crate::register::Register;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Location {
  /// One of the 32 integer registers.
  Register(Register),
  /// A single byte of memory. Memory is byte addressed.
  Memory(Word)
}

impl Display for Location {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self{
      Location::Register(register) => {
        write!(f, "{}", register)
      },
      Location::Memory(address) => {
        write!(f, "MEM[{:#010x}]", address)
      }
    }
  }
}

// Step to the next byte of memory. Registers are left alone.
impl Add<Word> for Location {
  type Output = Location;
  fn add(self, rhs: Word) -> Location {
    match self{
      Location::Memory(address) => {
        Location::Memory(address.wrapping_add(rhs))
      },
      register => register
    }
  }
}

/// An expected-versus-observed difference at one location.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct LocationDiff {
  pub location: Location,
  pub expected: Word,
  pub observed: Word
}

impl Display for LocationDiff {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.location {
      Location::Register(_) => write!(
        f, "{}: expected {:#010x}, observed {:#010x}", self.location, self.expected, self.observed
      ),
      Location::Memory(_) => write!(
        f, "{}: expected {:#04x}, observed {:#04x}", self.location, self.expected, self.observed
      ),
    }
  }
}
