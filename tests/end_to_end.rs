// End-to-end scenarios driving the public `run` entry point over real
// XML documents, the way a user would invoke the binary. Complements
// the hand-built-Instruction tests colocated with engine.rs, which
// exercise opcode semantics without going through the loader.

use ippcode23_vm::cli::RunConfig;
use std::io::Write;

fn run_program(xml: &str, stdin: &str) -> (i32, String, String) {
    let mut source = tempfile::NamedTempFile::new().unwrap();
    write!(source, "{}", xml).unwrap();

    let mut input = tempfile::NamedTempFile::new().unwrap();
    write!(input, "{}", stdin).unwrap();

    let config = RunConfig {
        source: Some(source.path().to_str().unwrap().to_string()),
        input: Some(input.path().to_str().unwrap().to_string()),
        stats_path: None,
        stats_schedule: Vec::new(),
    };

    let mut out = Vec::new();
    let mut err = Vec::new();
    let code = match ippcode23_vm::run(&config, &mut out, &mut err) {
        Ok(code) => code,
        Err(e) => e.exit_code(),
    };
    (code, String::from_utf8(out).unwrap(), String::from_utf8(err).unwrap())
}

#[test]
fn move_and_write_a_literal() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@a</arg1></instruction>
  <instruction order="2" opcode="MOVE">
    <arg1 type="var">GF@a</arg1>
    <arg2 type="int">42</arg2>
  </instruction>
  <instruction order="3" opcode="WRITE"><arg1 type="var">GF@a</arg1></instruction>
</program>"#;
    let (code, out, _) = run_program(xml, "");
    assert_eq!(code, 0);
    assert_eq!(out, "42");
}

#[test]
fn uninitialized_local_frame_variable_is_missing_value() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="CREATEFRAME"></instruction>
  <instruction order="2" opcode="DEFVAR"><arg1 type="var">TF@x</arg1></instruction>
  <instruction order="3" opcode="PUSHFRAME"></instruction>
  <instruction order="4" opcode="DEFVAR"><arg1 type="var">LF@x</arg1></instruction>
  <instruction order="5" opcode="WRITE"><arg1 type="var">LF@x</arg1></instruction>
</program>"#;
    let (code, _, _) = run_program(xml, "");
    assert_eq!(code, 56);
}

#[test]
fn read_non_numeric_line_stores_nil_not_an_error() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@n</arg1></instruction>
  <instruction order="2" opcode="READ">
    <arg1 type="var">GF@n</arg1>
    <arg2 type="type">int</arg2>
  </instruction>
  <instruction order="3" opcode="WRITE"><arg1 type="var">GF@n</arg1></instruction>
</program>"#;
    let (code, out, _) = run_program(xml, "abc\n");
    assert_eq!(code, 0);
    assert_eq!(out, "");
}

#[test]
fn forward_label_reference_terminates_normally() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="JUMP"><arg1 type="label">done</arg1></instruction>
  <instruction order="2" opcode="EXIT"><arg1 type="int">5</arg1></instruction>
  <instruction order="3" opcode="LABEL"><arg1 type="label">done</arg1></instruction>
</program>"#;
    let (code, _, _) = run_program(xml, "");
    assert_eq!(code, 0);
}

#[test]
fn call_return_pair_then_second_return_is_missing_value() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="CALL"><arg1 type="label">f</arg1></instruction>
  <instruction order="2" opcode="RETURN"></instruction>
  <instruction order="3" opcode="LABEL"><arg1 type="label">f</arg1></instruction>
  <instruction order="4" opcode="RETURN"></instruction>
</program>"#;
    let (code, _, _) = run_program(xml, "");
    assert_eq!(code, 56);
}

#[test]
fn stackful_subs_treats_second_from_top_as_left_operand() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="PUSHS"><arg1 type="int">2</arg1></instruction>
  <instruction order="2" opcode="PUSHS"><arg1 type="int">3</arg1></instruction>
  <instruction order="3" opcode="SUBS"></instruction>
  <instruction order="4" opcode="DEFVAR"><arg1 type="var">GF@r</arg1></instruction>
  <instruction order="5" opcode="POPS"><arg1 type="var">GF@r</arg1></instruction>
  <instruction order="6" opcode="WRITE"><arg1 type="var">GF@r</arg1></instruction>
</program>"#;
    let (code, out, _) = run_program(xml, "");
    assert_eq!(code, 0);
    assert_eq!(out, "-1");
}

#[test]
fn args_out_of_document_order_are_still_positional() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="DEFVAR"><arg1 type="var">GF@x</arg1></instruction>
  <instruction order="2" opcode="MOVE">
    <arg2 type="int">7</arg2>
    <arg1 type="var">GF@x</arg1>
  </instruction>
  <instruction order="3" opcode="WRITE"><arg1 type="var">GF@x</arg1></instruction>
</program>"#;
    let (code, out, _) = run_program(xml, "");
    assert_eq!(code, 0);
    assert_eq!(out, "7");
}

#[test]
fn malformed_xml_is_exit_code_31() {
    let xml = r#"<program language="IPPcode23"><instruction order="1" opcode="BREAK">"#;
    let (code, _, _) = run_program(xml, "");
    assert_eq!(code, 31);
}

#[test]
fn unknown_opcode_is_exit_code_32() {
    let xml = r#"<program language="IPPcode23">
  <instruction order="1" opcode="FROBNICATE"></instruction>
</program>"#;
    let (code, _, _) = run_program(xml, "");
    assert_eq!(code, 32);
}
