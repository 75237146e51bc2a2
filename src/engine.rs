// (transformed from the dashboard VM's fetch-decode-execute loop)
//
// The Engine owns the program counter and the FrameTable, and drives
// a straightforward fetch-decode-execute loop. As in the VM this was
// adapted from, each step produces a ControlFlow value telling the
// loop how to update the PC rather than mutating it directly from
// deep inside opcode handlers; that keeps CALL/RETURN/JUMP and the
// ordinary fall-through case expressed the same way.
//
// Stackful opcode variants share their arithmetic/relational/string
// logic with the register-addressed siblings (see `arith`,
// `relational`, `values_equal`, `int2char`, `stri2int`, `getchar`):
// only the operand source (named variable vs. data stack) and the
// result sink differ.

use std::convert::TryFrom;

use crate::error::Error;
use crate::frame::Frame;
use crate::frame_table::{FrameTable, FrameTag};
use crate::program::{Argument, Instruction, Opcode, Program};
use crate::stats::StatsCollector;
use crate::value::{decode_escapes, Kind, Value};
use log::trace;
use std::cmp::Ordering;
use std::io::{BufRead, Write};

enum ControlFlow {
    Advance,
    Jump(usize),
    Terminate(i32),
}

pub struct Engine<'p> {
    program: &'p Program,
    frames: FrameTable,
    pc: usize,
    stats: Option<StatsCollector>,
}

impl<'p> Engine<'p> {
    pub fn new(program: &'p Program, collect_stats: bool) -> Engine<'p> {
        Engine {
            program,
            frames: FrameTable::new(),
            pc: 0,
            stats: if collect_stats { Some(StatsCollector::new()) } else { None },
        }
    }

    pub fn into_stats(self) -> Option<StatsCollector> {
        self.stats
    }

    /// Run to completion: either a `EXIT` terminates with its code,
    /// or the PC runs past the last instruction (code 0).
    pub fn run(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> Result<i32, Error> {
        loop {
            if self.pc >= self.program.len() {
                return Ok(0);
            }
            let insn = self.program.instructions[self.pc].clone();
            trace!("pc={} order={} opcode={:?}", self.pc, insn.order, insn.opcode);
            if insn.opcode != Opcode::Label {
                if let Some(stats) = self.stats.as_mut() {
                    stats.record(insn.opcode, insn.order);
                }
            }
            match self.execute(&insn, input, output, diag)? {
                ControlFlow::Advance => self.pc += 1,
                ControlFlow::Jump(target) => self.pc = target,
                ControlFlow::Terminate(code) => return Ok(code),
            }
        }
    }

    fn execute(
        &mut self,
        insn: &Instruction,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
        diag: &mut dyn Write,
    ) -> Result<ControlFlow, Error> {
        use Opcode::*;
        match insn.opcode {
            Move => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let v = self.resolve(&insn.args[1])?;
                self.set_var(tag, name, v)?;
                Ok(ControlFlow::Advance)
            }
            CreateFrame => {
                self.frames.create_frame();
                Ok(ControlFlow::Advance)
            }
            PushFrame => {
                self.frames.push_frame()?;
                Ok(ControlFlow::Advance)
            }
            PopFrame => {
                self.frames.pop_frame()?;
                Ok(ControlFlow::Advance)
            }
            DefVar => {
                let (tag, name) = var_ref(&insn.args[0])?;
                self.frames.frame_mut(tag)?.define(name)?;
                let live = self.frames.live_var_count();
                if let Some(stats) = self.stats.as_mut() {
                    stats.observe_live_vars(live);
                }
                Ok(ControlFlow::Advance)
            }
            Call => {
                let label = label_ref(&insn.args[0])?;
                let target = self.program.resolve_label(label)?;
                self.frames.call_stack.push(self.pc + 1);
                Ok(ControlFlow::Jump(target))
            }
            Return => {
                let target = self
                    .frames
                    .call_stack
                    .pop()
                    .ok_or_else(|| Error::MissingValue("call stack is empty".into()))?;
                Ok(ControlFlow::Jump(target))
            }
            Pushs => {
                let v = self.resolve(&insn.args[0])?;
                self.frames.data_stack.push(v);
                Ok(ControlFlow::Advance)
            }
            Pops => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let v = self.pop_operand()?;
                self.set_var(tag, name, v)?;
                Ok(ControlFlow::Advance)
            }
            Add | Sub | Mul | Idiv => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let a = self.resolve(&insn.args[1])?.as_int()?;
                let b = self.resolve(&insn.args[2])?.as_int()?;
                let r = arith(insn.opcode, a, b)?;
                self.set_var(tag, name, Value::Int(r))?;
                Ok(ControlFlow::Advance)
            }
            Adds | Subs | Muls | Idivs => {
                let (a, b) = self.pop_pair()?;
                let r = arith(insn.opcode, a.as_int()?, b.as_int()?)?;
                self.frames.data_stack.push(Value::Int(r));
                Ok(ControlFlow::Advance)
            }
            Lt | Gt | Eq => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let a = self.resolve(&insn.args[1])?;
                let b = self.resolve(&insn.args[2])?;
                let r = relational(insn.opcode, &a, &b)?;
                self.set_var(tag, name, Value::Bool(r))?;
                Ok(ControlFlow::Advance)
            }
            Lts | Gts | Eqs => {
                let (a, b) = self.pop_pair()?;
                let r = relational(insn.opcode, &a, &b)?;
                self.frames.data_stack.push(Value::Bool(r));
                Ok(ControlFlow::Advance)
            }
            And | Or => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let a = self.resolve(&insn.args[1])?.as_bool()?;
                let b = self.resolve(&insn.args[2])?.as_bool()?;
                let r = if insn.opcode == And { a && b } else { a || b };
                self.set_var(tag, name, Value::Bool(r))?;
                Ok(ControlFlow::Advance)
            }
            Ands | Ors => {
                let (a, b) = self.pop_pair()?;
                let (a, b) = (a.as_bool()?, b.as_bool()?);
                let r = if insn.opcode == Ands { a && b } else { a || b };
                self.frames.data_stack.push(Value::Bool(r));
                Ok(ControlFlow::Advance)
            }
            Not => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let a = self.resolve(&insn.args[1])?.as_bool()?;
                self.set_var(tag, name, Value::Bool(!a))?;
                Ok(ControlFlow::Advance)
            }
            Nots => {
                let a = self.pop_operand()?.as_bool()?;
                self.frames.data_stack.push(Value::Bool(!a));
                Ok(ControlFlow::Advance)
            }
            Int2Char => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let v = self.resolve(&insn.args[1])?;
                self.set_var(tag, name, int2char(&v)?)?;
                Ok(ControlFlow::Advance)
            }
            Int2Chars => {
                let v = self.pop_operand()?;
                self.frames.data_stack.push(int2char(&v)?);
                Ok(ControlFlow::Advance)
            }
            Stri2Int => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let s = self.resolve(&insn.args[1])?;
                let i = self.resolve(&insn.args[2])?;
                self.set_var(tag, name, stri2int(&s, &i)?)?;
                Ok(ControlFlow::Advance)
            }
            Stri2Ints => {
                let (s, i) = self.pop_pair()?;
                self.frames.data_stack.push(stri2int(&s, &i)?);
                Ok(ControlFlow::Advance)
            }
            GetChar => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let s = self.resolve(&insn.args[1])?;
                let i = self.resolve(&insn.args[2])?;
                self.set_var(tag, name, getchar(&s, &i)?)?;
                Ok(ControlFlow::Advance)
            }
            GetChars => {
                let (s, i) = self.pop_pair()?;
                self.frames.data_stack.push(getchar(&s, &i)?);
                Ok(ControlFlow::Advance)
            }
            SetChar => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let idx = self.resolve(&insn.args[1])?;
                let repl = self.resolve(&insn.args[2])?;
                self.setchar(tag, name, &idx, &repl)?;
                Ok(ControlFlow::Advance)
            }
            Concat => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let a = self.resolve(&insn.args[1])?;
                let b = self.resolve(&insn.args[2])?;
                self.set_var(tag, name, concat(&a, &b)?)?;
                Ok(ControlFlow::Advance)
            }
            Strlen => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let a = self.resolve(&insn.args[1])?;
                self.set_var(tag, name, strlen(&a)?)?;
                Ok(ControlFlow::Advance)
            }
            Type => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let text = self.type_name(&insn.args[1])?;
                self.set_var(tag, name, Value::Str(text))?;
                Ok(ControlFlow::Advance)
            }
            Read => {
                let (tag, name) = var_ref(&insn.args[0])?;
                let kind = match &insn.args[1] {
                    Argument::TypeKeyword(k) => *k,
                    _ => return Err(Error::Internal("READ expects a type keyword".into())),
                };
                let mut buf = String::new();
                let n = input
                    .read_line(&mut buf)
                    .map_err(|e| Error::Internal(format!("read failed: {}", e)))?;
                let line = if n == 0 { None } else { Some(strip_newline(buf)) };
                self.set_var(tag, name, read_value(kind, line))?;
                Ok(ControlFlow::Advance)
            }
            Write => {
                let v = self.resolve(&insn.args[0])?;
                write!(output, "{}", v.text())
                    .map_err(|e| Error::Internal(format!("write failed: {}", e)))?;
                Ok(ControlFlow::Advance)
            }
            DPrint => {
                let v = self.resolve(&insn.args[0])?;
                write!(diag, "{}", v.text())
                    .map_err(|e| Error::Internal(format!("write failed: {}", e)))?;
                Ok(ControlFlow::Advance)
            }
            Break => {
                write!(diag, "{}", self.format_break())
                    .map_err(|e| Error::Internal(format!("write failed: {}", e)))?;
                Ok(ControlFlow::Advance)
            }
            Clears => {
                self.frames.data_stack.clear();
                Ok(ControlFlow::Advance)
            }
            Label => Ok(ControlFlow::Advance),
            Jump => {
                let target = self.program.resolve_label(label_ref(&insn.args[0])?)?;
                Ok(ControlFlow::Jump(target))
            }
            JumpIfEq | JumpIfNeq => {
                let label = label_ref(&insn.args[0])?;
                let a = self.resolve(&insn.args[1])?;
                let b = self.resolve(&insn.args[2])?;
                let eq = values_equal(&a, &b)?;
                let take = if insn.opcode == JumpIfEq { eq } else { !eq };
                if take {
                    Ok(ControlFlow::Jump(self.program.resolve_label(label)?))
                } else {
                    Ok(ControlFlow::Advance)
                }
            }
            JumpIfEqs | JumpIfNeqs => {
                let label = label_ref(&insn.args[0])?;
                let (a, b) = self.pop_pair()?;
                let eq = values_equal(&a, &b)?;
                let take = if insn.opcode == JumpIfEqs { eq } else { !eq };
                if take {
                    Ok(ControlFlow::Jump(self.program.resolve_label(label)?))
                } else {
                    Ok(ControlFlow::Advance)
                }
            }
            Exit => {
                let v = self.resolve(&insn.args[0])?;
                let code = v.as_int()?;
                if !(0..=49).contains(&code) {
                    return Err(Error::BadOperandValue(format!("exit code out of range: {}", code)));
                }
                Ok(ControlFlow::Terminate(code as i32))
            }
        }
    }

    fn resolve(&self, arg: &Argument) -> Result<Value, Error> {
        match arg {
            Argument::Literal(v) => Ok(v.clone()),
            Argument::Var(tag, name) => {
                let var = self.frames.frame(*tag)?.get(name)?;
                var.value.clone().ok_or_else(|| Error::MissingValue(name.clone()))
            }
            _ => Err(Error::Internal("expected a symb operand".into())),
        }
    }

    fn type_name(&self, arg: &Argument) -> Result<String, Error> {
        match arg {
            Argument::Literal(v) => Ok(v.kind().to_string()),
            Argument::Var(tag, name) => {
                let var = self.frames.frame(*tag)?.get(name)?;
                Ok(var.value.as_ref().map(|v| v.kind().to_string()).unwrap_or_default())
            }
            _ => Err(Error::Internal("expected a symb operand".into())),
        }
    }

    fn set_var(&mut self, tag: FrameTag, name: &str, value: Value) -> Result<(), Error> {
        self.frames.frame_mut(tag)?.get_mut(name)?.value = Some(value);
        Ok(())
    }

    fn setchar(&mut self, tag: FrameTag, name: &str, idx: &Value, repl: &Value) -> Result<(), Error> {
        let var = self.frames.frame_mut(tag)?.get_mut(name)?;
        let current_value = var.value.clone().ok_or_else(|| Error::MissingValue(name.to_string()))?;
        if current_value.text().is_empty() {
            return Err(Error::BadStringOp("empty destination string".into()));
        }
        let current = match &current_value {
            Value::Str(s) => decode_escapes(s),
            v => return Err(Error::TypeError(format!("SETCHAR destination must be a string, got {}", v.kind()))),
        };

        let idx = idx.as_int()?;
        let repl_text = repl.as_decoded_str()?;
        let repl_ch = repl_text
            .chars()
            .next()
            .ok_or_else(|| Error::BadStringOp("empty replacement string".into()))?;

        if idx < 0 {
            return Err(Error::BadStringOp(format!("negative index: {}", idx)));
        }
        let mut chars: Vec<char> = current.chars().collect();
        if (idx as usize) >= chars.len() {
            return Err(Error::BadStringOp(format!("index out of range: {}", idx)));
        }
        chars[idx as usize] = repl_ch;
        var.value = Some(Value::Str(chars.into_iter().collect()));
        Ok(())
    }

    fn pop_operand(&mut self) -> Result<Value, Error> {
        self.frames
            .data_stack
            .pop()
            .ok_or_else(|| Error::MissingValue("data stack is empty".into()))
    }

    /// Pop two operands: `(left, right)`, where `right` was the
    /// top-of-stack and `left` was second-from-top.
    fn pop_pair(&mut self) -> Result<(Value, Value), Error> {
        let right = self.pop_operand()?;
        let left = self.pop_operand()?;
        Ok((left, right))
    }

    fn format_break(&self) -> String {
        let mut out = format!("-- BREAK at instruction {} --\n", self.pc);
        format_frame(&mut out, "GF", self.frames.gf());
        if let Some(lf) = self.frames.top_lf() {
            format_frame(&mut out, "LF", lf);
        }
        if let Some(tf) = self.frames.tf() {
            format_frame(&mut out, "TF", tf);
        }
        out
    }
}

fn format_frame(out: &mut String, label: &str, frame: &Frame) {
    out.push_str(&format!("-- {} FRAME --\n", label));
    for v in frame.iter() {
        match &v.value {
            Some(value) => out.push_str(&format!("{}|{}|{}\n", v.name, value.kind(), value.text())),
            None => out.push_str(&format!("{}||\n", v.name)),
        }
    }
}

fn var_ref(arg: &Argument) -> Result<(FrameTag, &str), Error> {
    match arg {
        Argument::Var(tag, name) => Ok((*tag, name.as_str())),
        _ => Err(Error::Internal("expected a var operand".into())),
    }
}

fn label_ref(arg: &Argument) -> Result<&str, Error> {
    match arg {
        Argument::Label(name) => Ok(name.as_str()),
        _ => Err(Error::Internal("expected a label operand".into())),
    }
}

fn strip_newline(mut s: String) -> String {
    if s.ends_with('\n') {
        s.pop();
        if s.ends_with('\r') {
            s.pop();
        }
    }
    s
}

fn read_value(kind: Kind, line: Option<String>) -> Value {
    let Some(text) = line else { return Value::Nil };
    match kind {
        Kind::Int => text.trim().parse::<i64>().map(Value::Int).unwrap_or(Value::Nil),
        Kind::Bool => Value::Bool(text.trim().eq_ignore_ascii_case("true")),
        Kind::Str => Value::Str(decode_escapes(&text)),
        Kind::Nil => Value::Nil,
    }
}

fn overflow() -> Error {
    Error::BadOperandValue("integer overflow".into())
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    let r = a.checked_rem(b)?;
    if r != 0 && (r < 0) != (b < 0) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

fn arith(opcode: Opcode, a: i64, b: i64) -> Result<i64, Error> {
    use Opcode::*;
    match opcode {
        Add | Adds => a.checked_add(b).ok_or_else(overflow),
        Sub | Subs => a.checked_sub(b).ok_or_else(overflow),
        Mul | Muls => a.checked_mul(b).ok_or_else(overflow),
        Idiv | Idivs => {
            if b == 0 {
                return Err(Error::BadOperandValue("division by zero".into()));
            }
            floor_div(a, b).ok_or_else(overflow)
        }
        _ => Err(Error::Internal(format!("{:?} is not an arithmetic opcode", opcode))),
    }
}

/// Value equality honoring the `Nil`-is-comparable-to-anything rule
/// used by `EQ`/`EQS` and both `JUMPIFEQ` families.
fn values_equal(a: &Value, b: &Value) -> Result<bool, Error> {
    if matches!(a, Value::Nil) || matches!(b, Value::Nil) {
        return Ok(matches!(a, Value::Nil) && matches!(b, Value::Nil));
    }
    if a.kind() != b.kind() {
        return Err(Error::TypeError(format!("mismatched operand tags: {} vs {}", a.kind(), b.kind())));
    }
    Ok(match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => decode_escapes(x) == decode_escapes(y),
        _ => unreachable!("kinds already matched above"),
    })
}

fn relational(opcode: Opcode, a: &Value, b: &Value) -> Result<bool, Error> {
    use Opcode::*;
    if matches!(opcode, Eq | Eqs) {
        return values_equal(a, b);
    }
    if matches!(a, Value::Nil) || matches!(b, Value::Nil) {
        return Err(Error::TypeError("LT/GT do not accept Nil operands".into()));
    }
    if a.kind() != b.kind() {
        return Err(Error::TypeError(format!("mismatched operand tags: {} vs {}", a.kind(), b.kind())));
    }
    let ord = match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => decode_escapes(x).cmp(&decode_escapes(y)),
        _ => unreachable!("kinds already matched above"),
    };
    Ok(match opcode {
        Lt | Lts => ord == Ordering::Less,
        Gt | Gts => ord == Ordering::Greater,
        _ => unreachable!("non-relational opcode reached relational()"),
    })
}

fn int2char(v: &Value) -> Result<Value, Error> {
    let code = v.as_int()?;
    let scalar = u32::try_from(code).ok().and_then(char::from_u32);
    scalar
        .map(|c| Value::Str(c.to_string()))
        .ok_or_else(|| Error::BadStringOp(format!("int out of unicode range: {}", code)))
}

fn code_points(v: &Value) -> Result<Vec<char>, Error> {
    Ok(v.as_decoded_str()?.chars().collect())
}

fn index_into(chars: &[char], idx: &Value) -> Result<usize, Error> {
    if idx.text().starts_with('-') {
        return Err(Error::BadStringOp(format!("negative index: {}", idx.text())));
    }
    let i = idx.as_int()?;
    if (i as usize) >= chars.len() {
        return Err(Error::BadStringOp(format!("index out of range: {}", i)));
    }
    Ok(i as usize)
}

fn stri2int(s: &Value, idx: &Value) -> Result<Value, Error> {
    let chars = code_points(s)?;
    let i = index_into(&chars, idx)?;
    Ok(Value::Int(chars[i] as i64))
}

fn getchar(s: &Value, idx: &Value) -> Result<Value, Error> {
    let chars = code_points(s)?;
    let i = index_into(&chars, idx)?;
    Ok(Value::Str(chars[i].to_string()))
}

fn concat(a: &Value, b: &Value) -> Result<Value, Error> {
    Ok(Value::Str(format!("{}{}", a.as_decoded_str()?, b.as_decoded_str()?)))
}

fn strlen(a: &Value) -> Result<Value, Error> {
    Ok(Value::Int(a.as_decoded_str()?.chars().count() as i64))
}
