//! The changes an instruction is defined to make to machine state.

use std::fmt::{Display, Formatter};

use strum_macros::Display as StrumDisplay;

use crate::bytecode::Word;
use crate::location::Location;
use crate::register::Register;

/// The size of a memory access.
#[derive(StrumDisplay, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AccessWidth {
  Byte,
  Half,
  Word,
}

impl AccessWidth {
  pub fn bytes(&self) -> Word {
    match self {
      AccessWidth::Byte => 1,
      AccessWidth::Half => 2,
      AccessWidth::Word => 4,
    }
  }

  /// Keeps only the bits that fit in an access of this width.
  pub fn truncate(&self, value: Word) -> Word {
    match self {
      AccessWidth::Byte => value & 0xFF,
      AccessWidth::Half => value & 0xFFFF,
      AccessWidth::Word => value,
    }
  }
}

/// One write to machine state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum StateWrite {
  Register {
    register : Register,
    value    : Word
  },
  /// Little-endian write of the low `width` bytes of `value` starting at `address`.
  Memory {
    address : Word,
    width   : AccessWidth,
    value   : Word
  },
}

impl StateWrite {
  /// The locations this write covers, one per byte for memory.
  pub fn locations(&self) -> Vec<Location> {
    match self {
      StateWrite::Register{register, ..} => vec![Location::Register(*register)],
      StateWrite::Memory{address, width, ..} => {
        (0..width.bytes()).map(|i| Location::Memory(address.wrapping_add(i))).collect()
      }
    }
  }
}

impl Display for StateWrite {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      StateWrite::Register{register, value} => {
        write!(f, "{} <- {:#010x}", register, value)
      }
      StateWrite::Memory{address, width, value} => {
        write!(f, "MEM[{:#010x}].{} <- {:#x}", address, width, width.truncate(*value))
      }
    }
  }
}

/**
  The subset of machine state an instruction is permitted to change, with the new values.
  Building an effect never touches a `MachineState`; it is committed separately.

  Writes to `x0` are discarded as they are added, so an effect never names `x0`.
*/
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExpectedEffect {
  writes: Vec<StateWrite>
}

impl ExpectedEffect {

  /// An effect that changes nothing.
  pub fn none() -> ExpectedEffect {
    ExpectedEffect::default()
  }

  pub fn set_register(mut self, register: Register, value: Word) -> ExpectedEffect {
    if !register.is_zero() {
      self.writes.push(StateWrite::Register{ register, value });
    }
    self
  }

  pub fn set_memory(mut self, address: Word, width: AccessWidth, value: Word) -> ExpectedEffect {
    self.writes.push(StateWrite::Memory{ address, width, value: width.truncate(value) });
    self
  }

  pub fn writes(&self) -> &[StateWrite] {
    &self.writes
  }

  pub fn is_empty(&self) -> bool {
    self.writes.is_empty()
  }

  pub fn changes_registers(&self) -> bool {
    self.writes.iter().any(|write| matches!(write, StateWrite::Register{..}))
  }

  pub fn locations(&self) -> Vec<Location> {
    self.writes.iter().flat_map(StateWrite::locations).collect()
  }
}

impl Display for ExpectedEffect {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.writes.is_empty() {
      true  => write!(f, "(no change)"),
      false => write!(
        f,
        "{}",
        self.writes
          .iter()
          .map(|w| format!("{}", w))
          .collect::<Vec<String>>()
          .join(", ")
      )
    }
  }
}
