//! Integer register indices and their ABI names.

use std::fmt::{Display, Formatter};

use bimap::BiMap;
use lazy_static::lazy_static;

pub const REGISTER_COUNT: usize = 32;

/// An index into the integer register file. Always in `[0, 31]`.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
pub struct Register(u8);

impl Register {
  /// The hardwired zero register `x0`.
  pub const ZERO: Register = Register(0);

  pub fn new(index: u8) -> Option<Register> {
    match (index as usize) < REGISTER_COUNT {
      true  => Some(Register(index)),
      false => None
    }
  }

  /// Builds a register from a 5 bit instruction field. Higher bits are ignored.
  pub fn from_field(field: u32) -> Register {
    Register((field & 0x1F) as u8)
  }

  pub fn index(&self) -> usize {
    self.0 as usize
  }

  pub fn field(&self) -> u32 {
    self.0 as u32
  }

  pub fn is_zero(&self) -> bool {
    self.0 == 0
  }

  pub fn abi_name(&self) -> &'static str {
    ABI_NAMES.get_name(*self)
  }

  /// Accepts either the numeric form `x15` or the ABI name `a5`.
  pub fn from_name(name: &str) -> Option<Register> {
    if let Some(digits) = name.strip_prefix('x') {
      if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.parse::<u8>().ok().and_then(Register::new);
      }
    }
    ABI_NAMES.get_register(name)
  }

  /// All 32 registers in index order.
  pub fn all() -> impl Iterator<Item = Register> {
    (0..REGISTER_COUNT as u8).map(Register)
  }
}

impl Display for Register {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "x{}", self.0)
  }
}

/**
  The ABI names of the integer registers. Just a convenience wrapper around a BiMap so that
  lookups work in both directions.
*/
pub struct AbiNames {
  table: BiMap<Register, &'static str>
}

impl AbiNames {

  fn new() -> AbiNames {
    let names = [
      "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2",
      "s0",   "s1", "a0", "a1", "a2", "a3", "a4", "a5",
      "a6",   "a7", "s2", "s3", "s4", "s5", "s6", "s7",
      "s8",   "s9", "s10", "s11", "t3", "t4", "t5", "t6",
    ];
    let mut table = BiMap::new();
    for (register, name) in Register::all().zip(names.iter()) {
      table.insert(register, *name);
    }
    AbiNames{ table }
  }

  pub fn get_name(&self, register: Register) -> &'static str {
    // Every register is in the table.
    self.table.get_by_left(&register).copied().unwrap_or("?")
  }

  pub fn get_register(&self, name: &str) -> Option<Register> {
    match name {
      // `fp` is an alias of `s0`.
      "fp" => Some(Register(8)),
      _    => self.table.get_by_right(name).copied()
    }
  }
}

lazy_static! {
  pub static ref ABI_NAMES: AbiNames = AbiNames::new();
}
