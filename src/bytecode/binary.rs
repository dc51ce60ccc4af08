/*!
  This module is responsible for the encoding and decoding of binary instruction words.

*/
use std::fmt::{Display, Formatter};

use thiserror::Error;

use super::{CustomFields, Instruction, Opcode, OpcodeClass};
use crate::register::Register;

// If you change this you must also change `encode` and `decode_bits`.
pub type Word = u32;
pub const WORD_BYTES: usize = 4;

/**
  A raw word as read from a test vector. Words cut from a byte stream may be truncated,
  in which case only the low `width` bytes of `bits` are meaningful.
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct InstructionWord {
  bits  : Word,
  width : u8
}

impl InstructionWord {

  pub fn new(bits: Word) -> InstructionWord {
    InstructionWord{ bits, width: WORD_BYTES as u8 }
  }

  /// A word with fewer than four bytes. `bytes` are little-endian. Four or more bytes make a
  /// complete word from the first four.
  pub fn truncated(bytes: &[u8]) -> InstructionWord {
    if let Some(full) = bytes.get(..WORD_BYTES) {
      let mut le = [0u8; WORD_BYTES];
      le.copy_from_slice(full);
      return InstructionWord::new(Word::from_le_bytes(le));
    }
    let width = bytes.len();
    let bits = bytes[..width]
      .iter()
      .enumerate()
      .fold(0, |acc, (i, byte)| acc | ((*byte as Word) << (8 * i)));
    InstructionWord{ bits, width: width as u8 }
  }

  /// Splits a little-endian byte stream into words. A trailing partial chunk becomes a
  /// truncated word.
  pub fn from_le_bytes(bytes: &[u8]) -> Vec<InstructionWord> {
    bytes
      .chunks(WORD_BYTES)
      .map(|chunk| {
        match <[u8; WORD_BYTES]>::try_from(chunk) {
          Ok(full) => InstructionWord::new(Word::from_le_bytes(full)),
          Err(_)   => InstructionWord::truncated(chunk)
        }
      })
      .collect()
  }

  pub fn bits(&self) -> Word {
    self.bits
  }

  /// The number of bytes present.
  pub fn width(&self) -> usize {
    self.width as usize
  }

  pub fn is_complete(&self) -> bool {
    self.width() == WORD_BYTES
  }
}

impl From<Word> for InstructionWord {
  fn from(bits: Word) -> Self {
    InstructionWord::new(bits)
  }
}

impl Display for InstructionWord {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.is_complete() {
      true  => write!(f, "{:#010x}", self.bits),
      false => write!(f, "{:#0w$x} ({} of 4 bytes)", self.bits, self.width, w = 2 + 2 * self.width())
    }
  }
}

#[derive(Error, Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DecodeError {
  #[error("word is truncated: {width} of 4 bytes present")]
  Truncated { width: usize },
}

/// Field extraction from a raw word.
pub trait WordFields {
  fn opcode(&self) -> u8;
  fn rd(&self) -> Register;
  fn funct3(&self) -> u8;
  fn rs1(&self) -> Register;
  fn rs2(&self) -> Register;
  fn funct7(&self) -> u8;
  /// The sign-extended I-type immediate, bits [31:20].
  fn i_imm(&self) -> i32;
  /// The sign-extended S-type immediate, bits [31:25] and [11:7].
  fn s_imm(&self) -> i32;
  /// The raw U-type immediate, bits [31:12].
  fn u_imm(&self) -> u32;
}

impl WordFields for Word {
  fn opcode(&self) -> u8 {
    (self & 0x7F) as u8
  }

  fn rd(&self) -> Register {
    Register::from_field(self >> 7)
  }

  fn funct3(&self) -> u8 {
    ((self >> 12) & 0x7) as u8
  }

  fn rs1(&self) -> Register {
    Register::from_field(self >> 15)
  }

  fn rs2(&self) -> Register {
    Register::from_field(self >> 20)
  }

  fn funct7(&self) -> u8 {
    (self >> 25) as u8
  }

  fn i_imm(&self) -> i32 {
    (*self as i32) >> 20
  }

  fn s_imm(&self) -> i32 {
    ((*self & 0xFE00_0000) as i32 >> 20) | ((self >> 7) & 0x1F) as i32
  }

  fn u_imm(&self) -> u32 {
    self >> 12
  }
}

/// Decodes a full 32 bit word. Every word has a structural form, so this cannot fail.
pub fn decode_bits(word: Word) -> Instruction {
  match Opcode::class_of(word.opcode()) {

    OpcodeClass::LoadUpperImmediate => {
      Instruction::Upper {
        rd  : word.rd(),
        imm : word.u_imm()
      }
    }

    OpcodeClass::AddImmediate => {
      Instruction::Immediate {
        funct3 : word.funct3(),
        rd     : word.rd(),
        rs1    : word.rs1(),
        imm    : word.i_imm()
      }
    }

    OpcodeClass::Store => {
      Instruction::Store {
        funct3 : word.funct3(),
        rs1    : word.rs1(),
        rs2    : word.rs2(),
        imm    : word.s_imm()
      }
    }

    OpcodeClass::Custom => {
      Instruction::Custom(CustomFields {
        opcode : word.opcode(),
        rd     : word.rd(),
        funct3 : word.funct3(),
        rs1    : word.rs1(),
        rs2    : word.rs2(),
        funct7 : word.funct7()
      })
    }

  }
}

/// Decodes an instruction word, failing only if the word is truncated.
pub fn decode(word: InstructionWord) -> Result<Instruction, DecodeError> {
  match word.is_complete() {
    true  => Ok(decode_bits(word.bits())),
    false => Err(DecodeError::Truncated { width: word.width() })
  }
}

/**
  Encodes the instruction into a word. Fields wider than their slot are masked, so encoding
  a decoded instruction always reproduces the original word.
*/
pub fn encode(instruction: &Instruction) -> Word {
  let opcode = instruction.opcode() as Word & 0x7F;
  match *instruction {

    Instruction::Upper{rd, imm} => {
      // [imm:20][rd:5][opcode:7]
      ((imm & 0xF_FFFF) << 12)
        | (rd.field() << 7)
        | opcode
    }

    Instruction::Immediate{funct3, rd, rs1, imm} => {
      // [imm:12][rs1:5][funct3:3][rd:5][opcode:7]
      (((imm as Word) & 0xFFF) << 20)
        | (rs1.field() << 15)
        | ((funct3 as Word & 0x7) << 12)
        | (rd.field() << 7)
        | opcode
    }

    Instruction::Store{funct3, rs1, rs2, imm} => {
      // [imm:7][rs2:5][rs1:5][funct3:3][imm:5][opcode:7]
      let imm = imm as Word;
      (((imm >> 5) & 0x7F) << 25)
        | (rs2.field() << 20)
        | (rs1.field() << 15)
        | ((funct3 as Word & 0x7) << 12)
        | ((imm & 0x1F) << 7)
        | opcode
    }

    Instruction::Custom(fields) => {
      // [funct7:7][rs2:5][rs1:5][funct3:3][rd:5][opcode:7]
      ((fields.funct7 as Word & 0x7F) << 25)
        | (fields.rs2.field() << 20)
        | (fields.rs1.field() << 15)
        | ((fields.funct3 as Word & 0x7) << 12)
        | (fields.rd.field() << 7)
        | opcode
    }

  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn reg(index: u32) -> Register {
    Register::from_field(index)
  }

  #[test]
  fn decode_lui(){
    // lui x15, 0x30000
    assert_eq!(
      decode_bits(0x300007b7),
      Instruction::Upper{ rd: reg(15), imm: 0x30000 }
    );
  }

  #[test]
  fn decode_addi(){
    // addi x14, x0, 1
    assert_eq!(
      decode_bits(0x00100713),
      Instruction::Immediate{ funct3: 0, rd: reg(14), rs1: reg(0), imm: 1 }
    );
    // addi x31, x0, 128
    assert_eq!(
      decode_bits(0x08000f93),
      Instruction::Immediate{ funct3: 0, rd: reg(31), rs1: reg(0), imm: 128 }
    );
    // addi x1, x1, -1
    assert_eq!(
      decode_bits(0xfff08093),
      Instruction::Immediate{ funct3: 0, rd: reg(1), rs1: reg(1), imm: -1 }
    );
  }

  #[test]
  fn decode_sw(){
    // sw x14, 0(x15)
    assert_eq!(
      decode_bits(0x00e7a023),
      Instruction::Store{ funct3: 2, rs1: reg(15), rs2: reg(14), imm: 0 }
    );
    // sw x2, -4(x8)
    assert_eq!(
      decode_bits(0xfe242e23),
      Instruction::Store{ funct3: 2, rs1: reg(8), rs2: reg(2), imm: -4 }
    );
  }

  #[test]
  fn decode_custom_family(){
    let expected = [
      (0x00af2f2f, 10, 0x00),
      (0x01af2f2f, 26, 0x00),
      (0x03af2f2f, 26, 0x01),
      (0x02cf2f2f, 12, 0x01),
      (0x000f2f2f,  0, 0x00),
    ];
    for (word, rs2, funct7) in expected.iter() {
      let decoded = decode_bits(*word);
      assert_eq!(
        decoded,
        Instruction::Custom(CustomFields{
          opcode : 0x2F,
          rd     : reg(30),
          funct3 : 2,
          rs1    : reg(30),
          rs2    : reg(*rs2),
          funct7 : *funct7
        }),
        "word {:#010x}", word
      );
      assert_eq!(encode(&decoded), *word);
    }
  }

  #[test]
  fn truncated_word_fails(){
    let word = InstructionWord::truncated(&[0xb7, 0x07]);
    assert_eq!(word.bits(), 0x07b7);
    assert_eq!(decode(word), Err(DecodeError::Truncated{ width: 2 }));
    assert_eq!(format!("{}", word), "0x07b7 (2 of 4 bytes)");
  }

  #[test]
  fn four_bytes_are_never_truncated(){
    let word = InstructionWord::truncated(&[0xb7, 0x07, 0x00, 0x30]);
    assert!(word.is_complete());
    assert_eq!(word, InstructionWord::new(0x300007b7));
    assert!(decode(word).is_ok());
    assert_eq!(InstructionWord::truncated(&[0x13, 0, 0, 0, 0xFF]).bits(), 0x13);
  }

  #[test]
  fn byte_stream_chunks(){
    let words = InstructionWord::from_le_bytes(&[0xb7, 0x07, 0x00, 0x30, 0x13, 0x07]);
    assert_eq!(words.len(), 2);
    assert_eq!(words[0], InstructionWord::new(0x300007b7));
    assert!(!words[1].is_complete());
    assert_eq!(words[1].width(), 2);
  }

  proptest! {
    #[test]
    fn lui_round_trip(rd in 0u32..32, imm in 0u32..0x10_0000) {
      let word = (imm << 12) | (rd << 7) | 0x37;
      let decoded = decode_bits(word);
      prop_assert_eq!(decoded, Instruction::Upper{ rd: reg(rd), imm });
      prop_assert_eq!(encode(&decoded), word);
    }

    #[test]
    fn any_word_round_trips(word in any::<u32>()) {
      prop_assert_eq!(encode(&decode_bits(word)), word);
    }

    #[test]
    fn decoding_is_idempotent(word in any::<u32>()) {
      let word = InstructionWord::new(word);
      prop_assert_eq!(decode(word), decode(word));
    }

    #[test]
    fn store_immediate_sign_extends(imm in -2048i32..2048) {
      let store = Instruction::Store{ funct3: 2, rs1: reg(2), rs2: reg(3), imm };
      prop_assert_eq!(decode_bits(encode(&store)), store);
    }
  }
}
