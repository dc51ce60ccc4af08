/*!

  Instruction words are 32 bits, little-endian in memory. The low 7 bits of a word select
  the major opcode, and the opcode fixes where the remaining fields live:

    U-type (lui):    [imm:20][rd:5][opcode:7]
    I-type (op-imm): [imm:12][rs1:5][funct3:3][rd:5][opcode:7]
    S-type (store):  [imm:7][rs2:5][rs1:5][funct3:3][imm:5][opcode:7]
    R-type (custom): [funct7:7][rs2:5][rs1:5][funct3:3][rd:5][opcode:7]

  Only the load-upper-immediate, op-immediate and store opcodes are given their base-ISA
  layout. Every other word is demultiplexed with the R-type layout and its fields are kept
  verbatim. The codec never assigns meaning to those fields; that is up to whatever handlers
  are registered with the catalog and the evaluator.

  Unlike the other fields, immediates are split across the word for S-type and must be
  reassembled and sign-extended. The U-type immediate is kept as the raw 20 bit field.

*/

mod assembly;
mod binary;
mod instruction;

pub use assembly::{parse_state, parse_vector, TestVector, VectorError};
pub use binary::{decode, decode_bits, encode, DecodeError, InstructionWord, Word, WordFields, WORD_BYTES};
pub use instruction::{CustomFields, CustomKey, Field, FunctKey, Instruction, Opcode, OpcodeClass};
