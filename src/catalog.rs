/*!
  The instruction catalog maps an opcode class and funct discriminator to what the
  operation is and which decoded fields it reads and writes.

  The base operations live in a static table. Custom operations are not known ahead of time
  and are registered on a `Catalog` value by whoever knows the extension that defines them.
*/

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use lazy_static::lazy_static;
use string_cache::DefaultAtom;
use thiserror::Error;
use tracing::debug;

use crate::bytecode::{CustomKey, Field, FunctKey, Instruction, OpcodeClass};
use crate::effect::AccessWidth;

/// What an operation does.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum OperationTag {
  LoadUpperImmediate,
  AddImmediate,
  Store(AccessWidth),
  /// A custom operation, named by the extension that defines it.
  Custom(DefaultAtom),
}

impl Display for OperationTag {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      OperationTag::LoadUpperImmediate       => write!(f, "lui"),
      OperationTag::AddImmediate             => write!(f, "addi"),
      OperationTag::Store(AccessWidth::Byte) => write!(f, "sb"),
      OperationTag::Store(AccessWidth::Half) => write!(f, "sh"),
      OperationTag::Store(AccessWidth::Word) => write!(f, "sw"),
      OperationTag::Custom(name)             => write!(f, "{}", name),
    }
  }
}

/// How the immediate of an instruction participates, if at all.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ImmediateShape {
  None,
  /// 20 bits placed in the upper bits of the result.
  Upper20,
  /// 12 bits, sign-extended.
  Signed12,
}

/// Which decoded fields an operation writes and reads.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct OperandRoles {
  pub destination : Option<Field>,
  /// In operand order. For stores, the base address register comes first.
  pub sources     : Vec<Field>,
  pub immediate   : ImmediateShape,
}

impl OperandRoles {
  /// `rd <- f(rs1, rs2)`, the usual roles of an R-type custom instruction.
  pub fn register_register() -> OperandRoles {
    OperandRoles{
      destination : Some(Field::Rd),
      sources     : vec![Field::Rs1, Field::Rs2],
      immediate   : ImmediateShape::None
    }
  }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct OperationSemantics {
  pub tag   : OperationTag,
  pub roles : OperandRoles,
}

/// A structurally valid word with no catalogued meaning. Flagged for review, never fatal.
#[derive(Error, Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[error("unrecognized operation: {class} with {funct}")]
pub struct Unrecognized {
  pub class : OpcodeClass,
  pub funct : FunctKey,
}

impl Unrecognized {
  pub fn of(instruction: &Instruction) -> Unrecognized {
    Unrecognized{ class: instruction.class(), funct: instruction.funct() }
  }
}

lazy_static! {
  static ref BASE_TABLE: HashMap<(OpcodeClass, FunctKey), OperationSemantics> = {
    let store_roles = OperandRoles{
      destination : None,
      sources     : vec![Field::Rs1, Field::Rs2],
      immediate   : ImmediateShape::Signed12
    };

    let mut table = HashMap::new();
    table.insert(
      (OpcodeClass::LoadUpperImmediate, FunctKey::None),
      OperationSemantics{
        tag   : OperationTag::LoadUpperImmediate,
        roles : OperandRoles{
          destination : Some(Field::Rd),
          sources     : vec![],
          immediate   : ImmediateShape::Upper20
        }
      }
    );
    table.insert(
      (OpcodeClass::AddImmediate, FunctKey::Funct3(0)),
      OperationSemantics{
        tag   : OperationTag::AddImmediate,
        roles : OperandRoles{
          destination : Some(Field::Rd),
          sources     : vec![Field::Rs1],
          immediate   : ImmediateShape::Signed12
        }
      }
    );
    for (funct3, width) in [(0, AccessWidth::Byte), (1, AccessWidth::Half), (2, AccessWidth::Word)] {
      table.insert(
        (OpcodeClass::Store, FunctKey::Funct3(funct3)),
        OperationSemantics{ tag: OperationTag::Store(width), roles: store_roles.clone() }
      );
    }
    table
  };
}

/// The base table plus any registered custom operations.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
  custom: HashMap<CustomKey, OperationSemantics>
}

impl Catalog {

  pub fn new() -> Catalog {
    Catalog::default()
  }

  /// Registers (or replaces) a custom operation. Returns the previous entry, if any.
  pub fn register_custom(
    &mut self,
    key   : CustomKey,
    name  : &str,
    roles : OperandRoles
  ) -> Option<OperationSemantics> {
    debug!(%key, name, "registering custom operation");
    self.custom.insert(
      key,
      OperationSemantics{ tag: OperationTag::Custom(DefaultAtom::from(name)), roles }
    )
  }

  pub fn lookup(&self, class: OpcodeClass, funct: FunctKey) -> Result<&OperationSemantics, Unrecognized> {
    let found = match funct {
      FunctKey::Custom(key) if class == OpcodeClass::Custom => self.custom.get(&key),
      _ => BASE_TABLE.get(&(class, funct))
    };
    found.ok_or(Unrecognized{ class, funct })
  }

  /// Looks up the operation of a decoded instruction.
  pub fn lookup_instruction(&self, instruction: &Instruction) -> Result<&OperationSemantics, Unrecognized> {
    self.lookup(instruction.class(), instruction.funct())
  }
}
