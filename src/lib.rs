//! Crate root: wires together the translation pipeline.
//!
//! The stages are small and strictly forward-flowing:
//! - `normalizer` strips comments and insignificant whitespace.
//! - `parser` splits normalized text into the ordered command sequence.
//! - `translator` lowers each command to its assembly block and checks
//!   that every jump target was defined somewhere.
//! - `segments` is the static register map consulted by the translator.
//! - `error` centralises the failure taxonomy shared by the stages.

pub mod ast;
pub mod error;
pub mod normalizer;
pub mod parser;
pub mod segments;
pub mod translator;

pub use error::{TranslateError, TranslateResult};
pub use translator::Translator;

use ast::Command;

/// Translate a sequence of (unit name, VM source) pairs into one
/// assembly program.
///
/// A `newfile` marker is spliced ahead of each unit so static variables
/// scope per unit. With `bootstrap` set, stack-pointer initialization
/// and a call into `Sys.init` precede everything; multi-unit programs
/// want this, single-file snippets usually do not.
pub fn translate_program(units: &[(&str, &str)], bootstrap: bool) -> TranslateResult<String> {
    let mut commands = Vec::new();
    for (name, source) in units {
        commands.push(Command::NewFile((*name).to_string()));
        commands.extend(parser::parse(name, &normalizer::normalize(source))?);
    }

    let mut translator = Translator::new("Sys");
    let mut lines = if bootstrap {
        translator.bootstrap()
    } else {
        Vec::new()
    };
    lines.extend(translator.translate(&commands));
    translator.check_references()?;

    let mut output = lines.join("\n");
    output.push('\n');
    Ok(output)
}

/// Translate a single source unit without bootstrap code.
pub fn translate_unit(name: &str, source: &str) -> TranslateResult<String> {
    translate_program(&[(name, source)], false)
}

#[test]
fn test_single_unit_round_trip() {
    let output = translate_unit("Test", "push constant 7\npush constant 8\nadd\n").unwrap();
    assert!(output.starts_with("// newfile Test\n// push constant 7\n@7\n"));
    assert!(output.ends_with("M=M+D\n"));
}

#[test]
fn test_parse_failure_aborts_before_generation() {
    let units = [("Good", "push constant 1"), ("Bad", "pop constant 1")];
    let err = translate_program(&units, false).unwrap_err();
    assert!(err.to_string().starts_with("Bad: line 1"));
}

#[test]
fn test_bootstrap_requires_an_entry_function() {
    let err = translate_program(&[("Main", "function Main.main 0\nreturn")], true).unwrap_err();
    assert!(err.to_string().contains("SYS.INIT"));
}

#[test]
fn test_identical_input_yields_identical_output() {
    let units = [("A", "push constant 1\neq\nlabel X\ngoto X")];
    assert_eq!(
        translate_program(&units, false).unwrap(),
        translate_program(&units, false).unwrap()
    );
}
