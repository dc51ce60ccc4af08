/*!
  Test vectors and state dumps are written as a short list of data directives, one per line.
  This is not an assembler: the only thing that can be written is raw data.

  ```text
  .word 0x300007b7, 0x00100713   # full instruction words
  .half 0x07b7                   # a truncated word of 2 bytes
  .byte 0xb7                     # a truncated word of 1 byte
  .reg  a5, 0x30000000           # register value, by number (x15) or ABI name
  .mem  0x30000000, 1            # 32 bit memory word, little-endian
  ```

  `#` and `//` start a comment. Numbers are decimal or `0x` hexadecimal.
*/

use nom::{
  branch::alt,
  bytes::complete::{tag, tag_no_case},
  character::complete::{alphanumeric1, char as one_char, digit1, hex_digit1, space0, space1},
  combinator::{all_consuming, map, map_res},
  multi::separated_list1,
  sequence::{delimited, preceded, separated_pair, terminated},
  IResult,
};
use thiserror::Error;

use super::{InstructionWord, Word};
use crate::effect::{AccessWidth, StateWrite};
use crate::register::Register;
use crate::state::MachineState;

#[derive(Error, Clone, Debug, Eq, PartialEq)]
pub enum VectorError {
  #[error("line {line}: cannot parse `{text}`")]
  Syntax {
    line : usize,
    text : String
  },
  #[error("line {line}: `{name}` is not a register")]
  NotARegister {
    line : usize,
    name : String
  },
  #[error("line {line}: {value:#x} does not fit in {directive}")]
  OutOfRange {
    line      : usize,
    directive : &'static str,
    value     : u64
  },
  #[error("line {line}: instruction words are not allowed in a state dump")]
  UnexpectedWord {
    line : usize
  },
}

/// A sequence of words and the state it starts from.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestVector {
  pub words   : Vec<InstructionWord>,
  pub initial : MachineState,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Directive<'a> {
  Words(Vec<u64>),
  Half(u64),
  Byte(u64),
  Reg(&'a str, u64),
  Mem(u64, u64),
}

// region Parsers

fn number(input: &str) -> IResult<&str, u64> {
  alt((
    map_res(preceded(tag_no_case("0x"), hex_digit1), |digits: &str| u64::from_str_radix(digits, 16)),
    map_res(digit1, |digits: &str| digits.parse::<u64>()),
  ))(input)
}

fn comma(input: &str) -> IResult<&str, char> {
  delimited(space0, one_char(','), space0)(input)
}

fn directive(input: &str) -> IResult<&str, Directive<'_>> {
  alt((
    map(
      preceded(terminated(tag(".word"), space1), separated_list1(comma, number)),
      Directive::Words
    ),
    map(preceded(terminated(tag(".half"), space1), number), Directive::Half),
    map(preceded(terminated(tag(".byte"), space1), number), Directive::Byte),
    map(
      preceded(terminated(tag(".reg"), space1), separated_pair(alphanumeric1, comma, number)),
      |(name, value)| Directive::Reg(name, value)
    ),
    map(
      preceded(terminated(tag(".mem"), space1), separated_pair(number, comma, number)),
      |(address, value)| Directive::Mem(address, value)
    ),
  ))(input)
}

// endregion

fn strip_comment(line: &str) -> &str {
  let end = [line.find('#'), line.find("//")]
    .iter()
    .flatten()
    .copied()
    .min()
    .unwrap_or(line.len());
  line[..end].trim()
}

fn to_word(line: usize, directive: &'static str, value: u64, max: u64) -> Result<Word, VectorError> {
  match value <= max {
    true  => Ok(value as Word),
    false => Err(VectorError::OutOfRange{ line, directive, value })
  }
}

/// Parses every non-empty line, numbering lines from 1.
fn directives(text: &str) -> Result<Vec<(usize, Directive<'_>)>, VectorError> {
  text
    .lines()
    .enumerate()
    .map(|(i, line)| (i + 1, strip_comment(line)))
    .filter(|(_, line)| !line.is_empty())
    .map(|(line, content)| {
      match all_consuming(terminated(directive, space0))(content) {
        Ok((_, parsed)) => Ok((line, parsed)),
        Err(_)          => Err(VectorError::Syntax{ line, text: content.to_string() })
      }
    })
    .collect()
}

fn state_write(line: usize, directive: &Directive<'_>) -> Result<Option<StateWrite>, VectorError> {
  match directive {

    Directive::Reg(name, value) => {
      let register = Register::from_name(name)
        .ok_or_else(|| VectorError::NotARegister{ line, name: name.to_string() })?;
      let value = to_word(line, ".reg", *value, Word::MAX as u64)?;
      Ok(Some(StateWrite::Register{ register, value }))
    }

    Directive::Mem(address, value) => {
      let address = to_word(line, ".mem", *address, Word::MAX as u64)?;
      let value = to_word(line, ".mem", *value, Word::MAX as u64)?;
      Ok(Some(StateWrite::Memory{ address, width: AccessWidth::Word, value }))
    }

    _ => Ok(None)
  }
}

/// Reads a test vector: words in order, plus the initial register and memory values.
pub fn parse_vector(text: &str) -> Result<TestVector, VectorError> {
  let mut vector = TestVector::default();

  for (line, directive) in directives(text)? {
    match &directive {

      Directive::Words(values) => {
        for value in values {
          let bits = to_word(line, ".word", *value, Word::MAX as u64)?;
          vector.words.push(InstructionWord::new(bits));
        }
      }

      Directive::Half(value) => {
        let bits = to_word(line, ".half", *value, 0xFFFF)?;
        vector.words.push(InstructionWord::truncated(&bits.to_le_bytes()[..2]));
      }

      Directive::Byte(value) => {
        let bits = to_word(line, ".byte", *value, 0xFF)?;
        vector.words.push(InstructionWord::truncated(&bits.to_le_bytes()[..1]));
      }

      _ => {
        if let Some(write) = state_write(line, &directive)? {
          vector.initial.write(&write);
        }
      }

    }
  }

  Ok(vector)
}

/// Reads a state dump. Only `.reg` and `.mem` directives are accepted.
pub fn parse_state(text: &str) -> Result<Vec<StateWrite>, VectorError> {
  directives(text)?
    .iter()
    .map(|(line, directive)| {
      state_write(*line, directive)?.ok_or(VectorError::UnexpectedWord{ line: *line })
    })
    .collect()
}
