
use std::fmt::{Display, Formatter};

use strum_macros::Display as StrumDisplay;
use num_enum::{TryFromPrimitive, IntoPrimitive};

use crate::register::Register;

/**
  Major opcodes (the low 7 bits of a word) that the codec knows by name.

  Only the first three have a base-ISA field layout. The rest are custom opcode
  spaces whose words are demultiplexed with the R-type layout and otherwise left
  alone. A selector that is not listed here is still decoded as a custom word;
  the enum only exists to give known selectors a name.
*/
#[derive(
StrumDisplay, TryFromPrimitive, IntoPrimitive,
Clone,        Copy,             Eq, PartialEq, Debug, Hash
)]
#[repr(u8)]
pub enum Opcode {
  // Base opcodes with a defined layout //
  OpImm    = 0x13,  // I-type
  Store    = 0x23,  // S-type
  Lui      = 0x37,  // U-type

  // Custom opcode spaces //
  Custom0  = 0x0B,
  Custom1  = 0x2B,
  Custom2  = 0x5B,
  Custom3  = 0x7B,
  Custom2f = 0x2F,
}

impl Opcode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// The opcode class a selector decodes to.
  pub fn class_of(selector: u8) -> OpcodeClass {
    match Opcode::try_from(selector) {
      Ok(Opcode::Lui)   => OpcodeClass::LoadUpperImmediate,
      Ok(Opcode::OpImm) => OpcodeClass::AddImmediate,
      Ok(Opcode::Store) => OpcodeClass::Store,
      _                 => OpcodeClass::Custom
    }
  }
}

/// The coarse operation family of a decoded word.
#[derive(StrumDisplay, Clone, Copy, Eq, PartialEq, Debug, Hash, Ord, PartialOrd)]
pub enum OpcodeClass {
  LoadUpperImmediate,
  AddImmediate,
  Store,
  Custom,
}

/// The fields of a custom-opcode word, kept verbatim in the R-type layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CustomFields {
  pub opcode : u8,
  pub rd     : Register,
  pub funct3 : u8,
  pub rs1    : Register,
  pub rs2    : Register,
  pub funct7 : u8,
}

impl CustomFields {
  pub fn key(&self) -> CustomKey {
    CustomKey{
      opcode : self.opcode,
      funct3 : self.funct3,
      funct7 : self.funct7
    }
  }
}

/// Identifies an operation within the custom opcode spaces.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CustomKey {
  pub opcode : u8,
  pub funct3 : u8,
  pub funct7 : u8,
}

impl Display for CustomKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "opcode {:#04x}, funct3 {}, funct7 {:#04x}", self.opcode, self.funct3, self.funct7)
  }
}

/// The discriminator that picks an operation within an opcode class.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FunctKey {
  /// The class has a single operation.
  None,
  Funct3(u8),
  Custom(CustomKey),
}

impl Display for FunctKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      FunctKey::None        => write!(f, "-"),
      FunctKey::Funct3(bits) => write!(f, "funct3 {}", bits),
      FunctKey::Custom(key) => write!(f, "{}", key),
    }
  }
}

/// Holds the unencoded components of an instruction word. As such, it enumerates the
/// instruction formats the codec understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
  /// [imm:20][rd:5][opcode:7]
  ///
  /// `imm` is the raw 20 bit field, not yet shifted.
  Upper {
    rd  : Register,
    imm : u32
  },
  /// [imm:12][rs1:5][funct3:3][rd:5][opcode:7]
  Immediate {
    funct3 : u8,
    rd     : Register,
    rs1    : Register,
    imm    : i32
  },
  /// [imm:7][rs2:5][rs1:5][funct3:3][imm:5][opcode:7]
  Store {
    funct3 : u8,
    rs1    : Register,
    rs2    : Register,
    imm    : i32
  },
  /// [funct7:7][rs2:5][rs1:5][funct3:3][rd:5][opcode:7]
  Custom(CustomFields),
}

/// Names a register field of an instruction.
#[derive(StrumDisplay, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Field {
  Rd,
  Rs1,
  Rs2,
}

impl Instruction {

  pub fn class(&self) -> OpcodeClass {
    match self {
      Instruction::Upper{..}     => OpcodeClass::LoadUpperImmediate,
      Instruction::Immediate{..} => OpcodeClass::AddImmediate,
      Instruction::Store{..}     => OpcodeClass::Store,
      Instruction::Custom(_)     => OpcodeClass::Custom,
    }
  }

  pub fn opcode(&self) -> u8 {
    match self {
      Instruction::Upper{..}     => Opcode::Lui.code(),
      Instruction::Immediate{..} => Opcode::OpImm.code(),
      Instruction::Store{..}     => Opcode::Store.code(),
      Instruction::Custom(fields) => fields.opcode,
    }
  }

  pub fn funct(&self) -> FunctKey {
    match self {
      Instruction::Upper{..}                => FunctKey::None,
      Instruction::Immediate{funct3, ..}    => FunctKey::Funct3(*funct3),
      Instruction::Store{funct3, ..}        => FunctKey::Funct3(*funct3),
      Instruction::Custom(fields)           => FunctKey::Custom(fields.key()),
    }
  }

  /// The register held in `field`, if this format has that field.
  pub fn register(&self, field: Field) -> Option<Register> {
    match (self, field) {
      | (Instruction::Upper{rd, ..},     Field::Rd)
      | (Instruction::Immediate{rd, ..}, Field::Rd)  => Some(*rd),
      | (Instruction::Immediate{rs1, ..}, Field::Rs1)
      | (Instruction::Store{rs1, ..},     Field::Rs1) => Some(*rs1),
      (Instruction::Store{rs2, ..}, Field::Rs2)       => Some(*rs2),
      (Instruction::Custom(fields), Field::Rd)        => Some(fields.rd),
      (Instruction::Custom(fields), Field::Rs1)       => Some(fields.rs1),
      (Instruction::Custom(fields), Field::Rs2)       => Some(fields.rs2),
      _                                               => None
    }
  }

  /// The immediate as it participates in arithmetic. For `Upper` this is the 20 bit field
  /// in the upper bits of the word.
  pub fn immediate(&self) -> Option<i32> {
    match self {
      Instruction::Upper{imm, ..}     => Some((imm << 12) as i32),
      Instruction::Immediate{imm, ..} => Some(*imm),
      Instruction::Store{imm, ..}     => Some(*imm),
      Instruction::Custom(_)          => None,
    }
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self{

      Instruction::Upper{rd, imm} => {
        write!(f, "Lui(rd: {}, imm: {:#x})", rd, imm)
      }

      Instruction::Immediate{funct3, rd, rs1, imm} => {
        write!(f, "OpImm/{}(rd: {}, rs1: {}, imm: {})", funct3, rd, rs1, imm)
      }

      Instruction::Store{funct3, rs1, rs2, imm} => {
        write!(f, "Store/{}(rs1: {}, rs2: {}, imm: {})", funct3, rs1, rs2, imm)
      }

      Instruction::Custom(fields) => {
        let name = match Opcode::try_from(fields.opcode) {
          Ok(opcode) => format!("{}", opcode),
          Err(_)     => format!("Opcode{:#04x}", fields.opcode)
        };
        write!(
          f,
          "{}/{}/{:#04x}(rd: {}, rs1: {}, rs2: {})",
          name, fields.funct3, fields.funct7, fields.rd, fields.rs1, fields.rs2
        )
      }

    }
  }
}
