// Validates the XML shape and opcode schema, then lowers the
// surviving instruction stream into a Program. Structured as a
// two-phase pass, in the spirit of the teacher's `decode_word` /
// `lower` split in vm.rs: first collect a raw, order-preserving
// external representation (`RawInstruction`), then fold it into the
// typed internal one (`Instruction`). Keeping the phases separate
// means the XML-specific code (quick-xml event handling) never has to
// know about frame tags or value parsing, and vice versa.

use crate::error::Error;
use crate::frame_table::FrameTag;
use crate::program::{Argument, Instruction, Opcode, Program};
use crate::value::{Kind, Value};
use log::debug;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::BufRead;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ArgKind {
    Var,
    Symb,
    Label,
    TypeKw,
}

lazy_static::lazy_static! {
    static ref SCHEMA: HashMap<Opcode, &'static [ArgKind]> = {
        use ArgKind::*;
        let mut m = HashMap::new();
        m.insert(Opcode::Move, &[Var, Symb][..]);
        m.insert(Opcode::CreateFrame, &[][..]);
        m.insert(Opcode::PushFrame, &[][..]);
        m.insert(Opcode::PopFrame, &[][..]);
        m.insert(Opcode::DefVar, &[Var][..]);
        m.insert(Opcode::Call, &[Label][..]);
        m.insert(Opcode::Return, &[][..]);
        m.insert(Opcode::Pushs, &[Symb][..]);
        m.insert(Opcode::Pops, &[Var][..]);
        m.insert(Opcode::Add, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Sub, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Mul, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Idiv, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Lt, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Gt, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Eq, &[Var, Symb, Symb][..]);
        m.insert(Opcode::And, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Or, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Not, &[Var, Symb][..]);
        m.insert(Opcode::Int2Char, &[Var, Symb][..]);
        m.insert(Opcode::Stri2Int, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Read, &[Var, TypeKw][..]);
        m.insert(Opcode::Write, &[Symb][..]);
        m.insert(Opcode::Concat, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Strlen, &[Var, Symb][..]);
        m.insert(Opcode::GetChar, &[Var, Symb, Symb][..]);
        m.insert(Opcode::SetChar, &[Var, Symb, Symb][..]);
        m.insert(Opcode::Type, &[Var, Symb][..]);
        m.insert(Opcode::Label, &[Label][..]);
        m.insert(Opcode::Jump, &[Label][..]);
        m.insert(Opcode::JumpIfEq, &[Label, Symb, Symb][..]);
        m.insert(Opcode::JumpIfNeq, &[Label, Symb, Symb][..]);
        m.insert(Opcode::Exit, &[Symb][..]);
        m.insert(Opcode::DPrint, &[Symb][..]);
        m.insert(Opcode::Break, &[][..]);
        m.insert(Opcode::Clears, &[][..]);
        m.insert(Opcode::Adds, &[][..]);
        m.insert(Opcode::Subs, &[][..]);
        m.insert(Opcode::Muls, &[][..]);
        m.insert(Opcode::Idivs, &[][..]);
        m.insert(Opcode::Lts, &[][..]);
        m.insert(Opcode::Gts, &[][..]);
        m.insert(Opcode::Eqs, &[][..]);
        m.insert(Opcode::Ands, &[][..]);
        m.insert(Opcode::Ors, &[][..]);
        m.insert(Opcode::Nots, &[][..]);
        m.insert(Opcode::Int2Chars, &[][..]);
        m.insert(Opcode::Stri2Ints, &[][..]);
        m.insert(Opcode::GetChars, &[][..]);
        m.insert(Opcode::JumpIfEqs, &[Label][..]);
        m.insert(Opcode::JumpIfNeqs, &[Label][..]);
        m
    };
}

#[derive(Debug, Default)]
struct RawArg {
    tag: String,
    type_attr: String,
    text: String,
}

#[derive(Debug, Default)]
struct RawInstruction {
    opcode: String,
    order: String,
    args: Vec<RawArg>,
}

/// Parse and validate the XML document, returning the lowered,
/// order-sorted Program.
pub fn load<R: BufRead>(source: R) -> Result<Program, Error> {
    let raw = parse_xml(source)?;
    let mut instructions = lower(raw)?;
    instructions.sort_by_key(|i| i.order);
    Program::new(instructions)
}

fn attr_value(
    e: &quick_xml::events::BytesStart,
    name: &str,
) -> Result<Option<String>, Error> {
    for a in e.attributes() {
        let a = a.map_err(|err| Error::MalformedXml(err.to_string()))?;
        if a.key.as_ref() == name.as_bytes() {
            let v = a
                .unescape_value()
                .map_err(|err| Error::MalformedXml(err.to_string()))?;
            return Ok(Some(v.into_owned()));
        }
    }
    Ok(None)
}

fn attr_names(e: &quick_xml::events::BytesStart) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    for a in e.attributes() {
        let a = a.map_err(|err| Error::MalformedXml(err.to_string()))?;
        names.push(String::from_utf8_lossy(a.key.as_ref()).into_owned());
    }
    Ok(names)
}

fn parse_xml<R: BufRead>(source: R) -> Result<Vec<RawInstruction>, Error> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(true);
    let mut buf = Vec::new();

    let mut seen_root = false;
    let mut instructions: Vec<RawInstruction> = Vec::new();
    let mut current: Option<RawInstruction> = None;
    let mut current_arg: Option<RawArg> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::MalformedXml(e.to_string()))?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "program" {
                    if seen_root {
                        return Err(Error::UnexpectedStructure("multiple root elements".into()));
                    }
                    seen_root = true;
                    validate_header(&e)?;
                } else if name == "instruction" {
                    let opcode = attr_value(&e, "opcode")?
                        .ok_or_else(|| Error::UnexpectedStructure("instruction missing opcode".into()))?;
                    let order = attr_value(&e, "order")?
                        .ok_or_else(|| Error::UnexpectedStructure("instruction missing order".into()))?;
                    current = Some(RawInstruction { opcode, order, args: Vec::new() });
                } else if name.starts_with("arg") {
                    let type_attr = attr_value(&e, "type")?
                        .ok_or_else(|| Error::UnexpectedStructure(format!("{} missing type", name)))?;
                    current_arg = Some(RawArg { tag: name, type_attr, text: String::new() });
                } else {
                    return Err(Error::UnexpectedStructure(format!("unexpected element: {}", name)));
                }
                buf.clear();
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "program" {
                    if seen_root {
                        return Err(Error::UnexpectedStructure("multiple root elements".into()));
                    }
                    seen_root = true;
                    validate_header(&e)?;
                } else if name == "instruction" {
                    let opcode = attr_value(&e, "opcode")?
                        .ok_or_else(|| Error::UnexpectedStructure("instruction missing opcode".into()))?;
                    let order = attr_value(&e, "order")?
                        .ok_or_else(|| Error::UnexpectedStructure("instruction missing order".into()))?;
                    instructions.push(RawInstruction { opcode, order, args: Vec::new() });
                } else if name.starts_with("arg") {
                    let type_attr = attr_value(&e, "type")?
                        .ok_or_else(|| Error::UnexpectedStructure(format!("{} missing type", name)))?;
                    let arg = RawArg { tag: name, type_attr, text: String::new() };
                    if let Some(insn) = current.as_mut() {
                        insn.args.push(arg);
                    }
                } else {
                    return Err(Error::UnexpectedStructure(format!("unexpected element: {}", name)));
                }
                buf.clear();
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name.starts_with("arg") {
                    if let Some(arg) = current_arg.take() {
                        if let Some(insn) = current.as_mut() {
                            insn.args.push(arg);
                        }
                    }
                } else if name == "instruction" {
                    if let Some(insn) = current.take() {
                        instructions.push(insn);
                    }
                }
                buf.clear();
            }
            Event::Text(e) => {
                if let Some(arg) = current_arg.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| Error::MalformedXml(err.to_string()))?
                        .into_owned();
                    arg.text.push_str(text.trim());
                }
                buf.clear();
            }
            _ => {
                buf.clear();
            }
        }
    }

    if !seen_root {
        return Err(Error::MalformedXml("missing program root element".into()));
    }

    debug!("parsed {} raw instructions", instructions.len());
    Ok(instructions)
}

fn validate_header(e: &quick_xml::events::BytesStart) -> Result<(), Error> {
    if e.name().as_ref() != b"program" {
        return Err(Error::UnexpectedStructure("root element is not <program>".into()));
    }
    let names = attr_names(e)?;
    for n in &names {
        if !["language", "name", "description"].contains(&n.as_str()) {
            return Err(Error::UnexpectedStructure(format!("unexpected program attribute: {}", n)));
        }
    }
    let language = attr_value(e, "language")?
        .ok_or_else(|| Error::MalformedXml("missing language attribute".into()))?;
    if language != "IPPcode23" {
        return Err(Error::UnexpectedStructure(format!("unsupported language: {}", language)));
    }
    Ok(())
}

fn lower(raw: Vec<RawInstruction>) -> Result<Vec<Instruction>, Error> {
    let mut seen_orders: HashMap<u32, ()> = HashMap::new();
    let mut out = Vec::with_capacity(raw.len());

    for mut ri in raw {
        let opcode = Opcode::parse(&ri.opcode)
            .ok_or_else(|| Error::UnexpectedStructure(format!("unknown opcode: {}", ri.opcode)))?;

        let order: u32 = ri
            .order
            .parse()
            .ok()
            .filter(|n| *n >= 1)
            .ok_or_else(|| Error::UnexpectedStructure(format!("invalid order: {}", ri.order)))?;
        if seen_orders.insert(order, ()).is_some() {
            return Err(Error::UnexpectedStructure(format!("duplicate order: {}", order)));
        }

        // arg1/arg2/arg3 may arrive in any document order; sort by
        // tag name before positional validation (see SPEC_FULL §3).
        ri.args.sort_by(|a, b| a.tag.cmp(&b.tag));
        let expected_tags: Vec<String> = (1..=ri.args.len()).map(|i| format!("arg{}", i)).collect();
        let actual_tags: Vec<String> = ri.args.iter().map(|a| a.tag.clone()).collect();
        if actual_tags != expected_tags {
            return Err(Error::UnexpectedStructure(format!(
                "instruction {} has malformed argument tags: {:?}",
                ri.opcode, actual_tags
            )));
        }

        let schema = SCHEMA
            .get(&opcode)
            .ok_or_else(|| Error::Internal(format!("no schema for opcode {:?}", opcode)))?;
        if schema.len() != ri.args.len() {
            return Err(Error::UnexpectedStructure(format!(
                "{} expects {} argument(s), got {}",
                ri.opcode,
                schema.len(),
                ri.args.len()
            )));
        }

        let mut args = Vec::with_capacity(ri.args.len());
        for (kind, raw_arg) in schema.iter().zip(ri.args.into_iter()) {
            args.push(lower_arg(*kind, raw_arg)?);
        }

        out.push(Instruction { opcode, order, args });
    }

    Ok(out)
}

fn lower_arg(kind: ArgKind, raw: RawArg) -> Result<Argument, Error> {
    match kind {
        ArgKind::Var => {
            if raw.type_attr != "var" {
                return Err(Error::UnexpectedStructure(format!(
                    "expected var argument, got type={}",
                    raw.type_attr
                )));
            }
            let (frame, name) = raw
                .text
                .split_once('@')
                .ok_or_else(|| Error::UnexpectedStructure(format!("malformed var reference: {}", raw.text)))?;
            let tag = FrameTag::parse(frame)
                .ok_or_else(|| Error::UnexpectedStructure(format!("unknown frame: {}", frame)))?;
            Ok(Argument::Var(tag, name.to_string()))
        }
        ArgKind::Label => {
            if raw.type_attr != "label" {
                return Err(Error::UnexpectedStructure(format!(
                    "expected label argument, got type={}",
                    raw.type_attr
                )));
            }
            Ok(Argument::Label(raw.text))
        }
        ArgKind::TypeKw => {
            if raw.type_attr != "type" {
                return Err(Error::UnexpectedStructure(format!(
                    "expected type argument, got type={}",
                    raw.type_attr
                )));
            }
            Ok(Argument::TypeKeyword(parse_kind(&raw.text)?))
        }
        ArgKind::Symb => match raw.type_attr.as_str() {
            "var" => {
                let (frame, name) = raw
                    .text
                    .split_once('@')
                    .ok_or_else(|| Error::UnexpectedStructure(format!("malformed var reference: {}", raw.text)))?;
                let tag = FrameTag::parse(frame)
                    .ok_or_else(|| Error::UnexpectedStructure(format!("unknown frame: {}", frame)))?;
                Ok(Argument::Var(tag, name.to_string()))
            }
            "int" => {
                let v: i64 = raw
                    .text
                    .parse()
                    .map_err(|_| Error::UnexpectedStructure(format!("invalid int literal: {}", raw.text)))?;
                Ok(Argument::Literal(Value::Int(v)))
            }
            "bool" => match raw.text.as_str() {
                "true" => Ok(Argument::Literal(Value::Bool(true))),
                "false" => Ok(Argument::Literal(Value::Bool(false))),
                other => Err(Error::UnexpectedStructure(format!("invalid bool literal: {}", other))),
            },
            "string" => Ok(Argument::Literal(Value::Str(raw.text))),
            "nil" => Ok(Argument::Literal(Value::Nil)),
            other => Err(Error::UnexpectedStructure(format!("invalid symb type: {}", other))),
        },
    }
}

fn parse_kind(text: &str) -> Result<Kind, Error> {
    match text {
        "int" => Ok(Kind::Int),
        "bool" => Ok(Kind::Bool),
        "string" => Ok(Kind::Str),
        "nil" => Ok(Kind::Nil),
        other => Err(Error::UnexpectedStructure(format!("invalid type keyword: {}", other))),
    }
}
