//! Architectural state: the integer register file and a sparse, byte addressed memory.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use prettytable::{format as TableFormat, row, table, Table};

use crate::bytecode::Word;
use crate::effect::{AccessWidth, ExpectedEffect, StateWrite};
use crate::location::{Location, LocationDiff};
use crate::register::{Register, REGISTER_COUNT};

/**
  Registers and memory as seen by one verification run. Each run owns its own state; nothing
  here is global.

  Memory that has never been written reads as zero. Bytes are stored individually, so
  unaligned accesses are fine.

  `x0` is hardwired to zero in the model. A state reported by an execution unit is
  `unconstrained` instead: it keeps whatever the unit said `x0` holds, so a unit that breaks
  the rule can be caught.
*/
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineState {
  registers      : [Word; REGISTER_COUNT],
  memory         : BTreeMap<Word, u8>,
  hardwired_zero : bool,
}

impl Default for MachineState {
  fn default() -> Self {
    MachineState::new()
  }
}

impl MachineState {

  pub fn new() -> MachineState {
    MachineState {
      registers      : [0; REGISTER_COUNT],
      memory         : BTreeMap::new(),
      hardwired_zero : true,
    }
  }

  /// The same state, but with `x0` stored and read like any other register.
  pub fn unconstrained(mut self) -> MachineState {
    self.hardwired_zero = false;
    self
  }

  pub fn is_hardwired_zero(&self) -> bool {
    self.hardwired_zero
  }

  /// Back to all zero registers and empty memory.
  pub fn reset(&mut self) {
    self.registers = [0; REGISTER_COUNT];
    self.memory.clear();
  }

  pub fn register(&self, register: Register) -> Word {
    match register.is_zero() && self.hardwired_zero {
      true  => 0,
      false => self.registers[register.index()]
    }
  }

  /// Writes to `x0` are discarded unless the state is unconstrained.
  pub fn set_register(&mut self, register: Register, value: Word) {
    if !register.is_zero() || !self.hardwired_zero {
      self.registers[register.index()] = value;
    }
  }

  pub fn byte(&self, address: Word) -> u8 {
    self.memory.get(&address).copied().unwrap_or(0)
  }

  /// Little-endian load.
  pub fn load(&self, address: Word, width: AccessWidth) -> Word {
    (0..width.bytes()).fold(0, |acc, i| {
      acc | ((self.byte(address.wrapping_add(i)) as Word) << (8 * i))
    })
  }

  /// Little-endian store of the low `width` bytes of `value`.
  pub fn store(&mut self, address: Word, width: AccessWidth, value: Word) {
    // Only nonzero bytes are kept, so two states are equal exactly when they read the same.
    for i in 0..width.bytes() {
      let byte = (value >> (8 * i)) as u8;
      match byte {
        0 => self.memory.remove(&address.wrapping_add(i)),
        _ => self.memory.insert(address.wrapping_add(i), byte),
      };
    }
  }

  pub fn write(&mut self, write: &StateWrite) {
    match *write {
      StateWrite::Register{register, value}       => self.set_register(register, value),
      StateWrite::Memory{address, width, value}   => self.store(address, width, value),
    }
  }

  /// Applies every write of the effect, in order.
  pub fn commit(&mut self, effect: &ExpectedEffect) {
    for write in effect.writes() {
      self.write(write);
    }
  }

  /// The value at a location. Memory locations yield a single byte.
  pub fn value_at(&self, location: Location) -> Word {
    match location {
      Location::Register(register) => self.register(register),
      Location::Memory(address)    => self.byte(address) as Word
    }
  }

  /// Every location whose value differs between `self` and `other`.
  pub fn changed_locations(&self, other: &MachineState) -> BTreeSet<Location> {
    let registers = Register::all()
      .filter(|r| self.register(*r) != other.register(*r))
      .map(Location::Register);

    let memory = self.memory.keys()
      .chain(other.memory.keys())
      .filter(|address| self.byte(**address) != other.byte(**address))
      .map(|address| Location::Memory(*address));

    registers.chain(memory).collect()
  }

  /// Compares `self` (expected) against `observed` at the given locations.
  pub fn diff<I>(&self, observed: &MachineState, locations: I) -> Vec<LocationDiff>
    where I: IntoIterator<Item = Location>
  {
    locations
      .into_iter()
      .filter_map(|location| {
        let expected = self.value_at(location);
        let observed = observed.value_at(location);
        match expected == observed {
          true  => None,
          false => Some(LocationDiff{ location, expected, observed })
        }
      })
      .collect()
  }

  // region Display methods

  fn make_register_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Register", ubl->"Contents"]);

    for register in Register::all().filter(|r| self.register(*r) != 0) {
      table.add_row(
        row![
          r->format!("{} ({}) =", register, register.abi_name()),
          format!("{:#010x}", self.register(register))
        ]
      );
    }
    table
  }

  fn make_memory_table(&self) -> Table {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (address, byte) in self.memory.iter() {
      table.add_row(row![r->format!("MEM[{:#010x}] =", address), format!("{:#04x}", byte)]);
    }
    table
  }

  // endregion
}

lazy_static! {
  pub static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator(' ')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for MachineState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let x_table = self.make_register_table();
    let m_table = self.make_memory_table();

    let mut combined_table = table!([x_table, m_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Memory"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(f, "{}", combined_table)
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn reg(index: u32) -> Register {
    Register::from_field(index)
  }

  #[test]
  fn zero_register_is_hardwired(){
    let mut state = MachineState::new();
    state.set_register(Register::ZERO, 0xDEAD_BEEF);
    assert_eq!(state.register(Register::ZERO), 0);
    assert_eq!(state, MachineState::new());
  }

  #[test]
  fn unconstrained_state_keeps_x0(){
    let mut state = MachineState::new().unconstrained();
    state.set_register(Register::ZERO, 1);
    assert_eq!(state.register(Register::ZERO), 1);
    assert!(!state.is_hardwired_zero());

    let changed: Vec<Location> = MachineState::new().changed_locations(&state).into_iter().collect();
    assert_eq!(changed, vec![Location::Register(Register::ZERO)]);
  }

  #[test]
  fn little_endian_memory(){
    let mut state = MachineState::new();
    state.store(0x3000_0000, AccessWidth::Word, 0x1122_3344);
    assert_eq!(state.byte(0x3000_0000), 0x44);
    assert_eq!(state.byte(0x3000_0003), 0x11);
    assert_eq!(state.load(0x3000_0000, AccessWidth::Word), 0x1122_3344);
    assert_eq!(state.load(0x3000_0002, AccessWidth::Half), 0x1122);
    // Never written.
    assert_eq!(state.load(0x4000_0000, AccessWidth::Word), 0);
  }

  #[test]
  fn changed_locations_cover_both_sides(){
    let mut a = MachineState::new();
    let mut b = MachineState::new();
    a.set_register(reg(5), 1);
    b.store(0x100, AccessWidth::Byte, 0xFF);
    // Writing zero over nothing is not a change.
    a.store(0x200, AccessWidth::Byte, 0);

    let changed: Vec<Location> = a.changed_locations(&b).into_iter().collect();
    assert_eq!(changed, vec![Location::Register(reg(5)), Location::Memory(0x100)]);
  }

  #[test]
  fn diff_reports_only_differences(){
    let mut expected = MachineState::new();
    let mut observed = MachineState::new();
    expected.set_register(reg(14), 1);
    observed.set_register(reg(14), 1);
    expected.set_register(reg(15), 0x3000_0000);

    let diffs = expected.diff(
      &observed,
      vec![Location::Register(reg(14)), Location::Register(reg(15))]
    );
    assert_eq!(
      diffs,
      vec![LocationDiff{ location: Location::Register(reg(15)), expected: 0x3000_0000, observed: 0 }]
    );
  }

  #[test]
  fn reset_clears_everything(){
    let mut state = MachineState::new();
    state.set_register(reg(1), 1);
    state.store(0, AccessWidth::Word, 1);
    state.reset();
    assert_eq!(state, MachineState::new());
  }
}
