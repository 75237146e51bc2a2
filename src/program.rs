// The internal, already-validated program representation the Loader
// builds and the Engine executes. Nothing here touches XML; that is
// the Loader's job.

use crate::error::Error;
use crate::frame_table::FrameTag;
use crate::value::{Kind, Value};
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Move,
    CreateFrame,
    PushFrame,
    PopFrame,
    DefVar,
    Call,
    Return,
    Pushs,
    Pops,
    Add,
    Sub,
    Mul,
    Idiv,
    Lt,
    Gt,
    Eq,
    And,
    Or,
    Not,
    Int2Char,
    Stri2Int,
    Read,
    Write,
    Concat,
    Strlen,
    GetChar,
    SetChar,
    Type,
    Label,
    Jump,
    JumpIfEq,
    JumpIfNeq,
    Exit,
    DPrint,
    Break,
    Clears,
    Adds,
    Subs,
    Muls,
    Idivs,
    Lts,
    Gts,
    Eqs,
    Ands,
    Ors,
    Nots,
    Int2Chars,
    Stri2Ints,
    GetChars,
    JumpIfEqs,
    JumpIfNeqs,
}

impl Opcode {
    /// Parse from the XML `opcode` attribute, case-insensitively.
    /// Order here doubles as the canonical tie-break order for
    /// `--frequent` (lexical order of first occurrence in this
    /// schema, per spec).
    pub const ALL: &'static [(&'static str, Opcode)] = &[
        ("MOVE", Opcode::Move),
        ("CREATEFRAME", Opcode::CreateFrame),
        ("PUSHFRAME", Opcode::PushFrame),
        ("POPFRAME", Opcode::PopFrame),
        ("DEFVAR", Opcode::DefVar),
        ("CALL", Opcode::Call),
        ("RETURN", Opcode::Return),
        ("PUSHS", Opcode::Pushs),
        ("POPS", Opcode::Pops),
        ("ADD", Opcode::Add),
        ("SUB", Opcode::Sub),
        ("MUL", Opcode::Mul),
        ("IDIV", Opcode::Idiv),
        ("LT", Opcode::Lt),
        ("GT", Opcode::Gt),
        ("EQ", Opcode::Eq),
        ("AND", Opcode::And),
        ("OR", Opcode::Or),
        ("NOT", Opcode::Not),
        ("INT2CHAR", Opcode::Int2Char),
        ("STRI2INT", Opcode::Stri2Int),
        ("READ", Opcode::Read),
        ("WRITE", Opcode::Write),
        ("CONCAT", Opcode::Concat),
        ("STRLEN", Opcode::Strlen),
        ("GETCHAR", Opcode::GetChar),
        ("SETCHAR", Opcode::SetChar),
        ("TYPE", Opcode::Type),
        ("LABEL", Opcode::Label),
        ("JUMP", Opcode::Jump),
        ("JUMPIFEQ", Opcode::JumpIfEq),
        ("JUMPIFNEQ", Opcode::JumpIfNeq),
        ("EXIT", Opcode::Exit),
        ("DPRINT", Opcode::DPrint),
        ("BREAK", Opcode::Break),
        ("CLEARS", Opcode::Clears),
        ("ADDS", Opcode::Adds),
        ("SUBS", Opcode::Subs),
        ("MULS", Opcode::Muls),
        ("IDIVS", Opcode::Idivs),
        ("LTS", Opcode::Lts),
        ("GTS", Opcode::Gts),
        ("EQS", Opcode::Eqs),
        ("ANDS", Opcode::Ands),
        ("ORS", Opcode::Ors),
        ("NOTS", Opcode::Nots),
        ("INT2CHARS", Opcode::Int2Chars),
        ("STRI2INTS", Opcode::Stri2Ints),
        ("GETCHARS", Opcode::GetChars),
        ("JUMPIFEQS", Opcode::JumpIfEqs),
        ("JUMPIFNEQS", Opcode::JumpIfNeqs),
    ];

    pub fn parse(name: &str) -> Option<Opcode> {
        let upper = name.to_ascii_uppercase();
        Self::ALL.iter().find(|(n, _)| *n == upper).map(|(_, op)| *op)
    }

    pub fn name(self) -> &'static str {
        Self::ALL.iter().find(|(_, op)| *op == self).map(|(n, _)| *n).unwrap()
    }
}

/// One operand slot of an instruction, already resolved from its XML
/// `type`/text pair into a typed form the engine can act on directly.
#[derive(Clone, Debug, PartialEq)]
pub enum Argument {
    Var(FrameTag, String),
    Literal(Value),
    Label(String),
    TypeKeyword(Kind),
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub order: u32,
    pub args: Vec<Argument>,
}

#[derive(Debug)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// Build from an already order-sorted instruction list. Rejects
    /// duplicate `LABEL` names; unknown label *references* are
    /// reported lazily, at the jump site, per the design notes.
    pub fn new(instructions: Vec<Instruction>) -> Result<Program, Error> {
        let mut labels = HashMap::new();
        for (index, insn) in instructions.iter().enumerate() {
            if insn.opcode == Opcode::Label {
                let name = match &insn.args[0] {
                    Argument::Label(name) => name.clone(),
                    _ => return Err(Error::Internal("LABEL without a label argument".into())),
                };
                if labels.insert(name.clone(), index).is_some() {
                    return Err(Error::Semantic(format!("duplicate label: {}", name)));
                }
            }
        }
        Ok(Program { instructions, labels })
    }

    pub fn resolve_label(&self, name: &str) -> Result<usize, Error> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| Error::Semantic(format!("unknown label: {}", name)))
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
