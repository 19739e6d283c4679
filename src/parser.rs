use nom::{
    branch::alt,
    bytes::complete::{is_a, tag},
    character::{
        complete::{digit1, space1},
        is_digit,
    },
    combinator::{map, map_res, verify},
    sequence::tuple,
    IResult,
};

use crate::ast::{Command::*, Segment::*, *};
use crate::error::{IndexOutOfRangeSnafu, MalformedSnafu, TranslateResult};

const SEGMENT_NAMES: [&str; 8] = [
    "constant", "local", "static", "argument", "this", "that", "pointer", "temp",
];

fn integer(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |c: &str| c.parse())(input)
}

fn segment(input: &str) -> IResult<&str, Segment> {
    map(
        alt((
            tag("constant"),
            tag("local"),
            tag("static"),
            tag("argument"),
            tag("this"),
            tag("that"),
            tag("pointer"),
            tag("temp"),
        )),
        |seg| match seg {
            "constant" => Constant,
            "local" => Local,
            "static" => Static,
            "argument" => Argument,
            "this" => This,
            "that" => That,
            "pointer" => Pointer,
            "temp" => Temp,
            _ => unreachable!("segment tag {seg} has no variant"),
        },
    )(input)
}

fn push(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("push"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Push(segment, arg),
    )(input)
}

#[test]
fn test_push() {
    assert_eq!(push("push  pointer  1"), Ok(("", Push(Pointer, 1))));
}

fn pop(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("pop"), space1, segment, space1, integer)),
        |(_, _, segment, _, arg)| Pop(segment, arg),
    )(input)
}

fn prim(input: &str) -> IResult<&str, Command> {
    map(
        alt((
            tag("add"),
            tag("sub"),
            tag("neg"),
            tag("eq"),
            // "gte" must come ahead of its prefix "gt"
            tag("gte"),
            tag("gt"),
            tag("lt"),
            tag("and"),
            tag("or"),
            tag("not"),
        )),
        |prim| match prim {
            "add" => Add,
            "sub" => Sub,
            "neg" => Neg,
            "eq" => Eq,
            "gte" => Gte,
            "gt" => Gt,
            "lt" => Lt,
            "and" => And,
            "or" => Or,
            "not" => Not,
            _ => unreachable!("primitive tag {prim} has no variant"),
        },
    )(input)
}

#[test]
fn test_prim() {
    assert_eq!(prim("neg"), Ok(("", Neg)));
    assert_eq!(prim("gte"), Ok(("", Gte)));
    assert_eq!(prim("gt"), Ok(("", Gt)));
}

fn symbol(input: &str) -> IResult<&str, String> {
    map(
        verify(
            is_a("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_.$:0123456789"),
            |c: &str| !is_digit(c.as_bytes()[0]),
        ),
        |sym: &str| sym.to_string(),
    )(input)
}

fn branching(input: &str) -> IResult<&str, Command> {
    map(
        tuple((
            alt((tag("label"), tag("goto"), tag("if-goto"))),
            space1,
            symbol,
        )),
        |(op, _, sym)| match op {
            "label" => Label(sym),
            "goto" => Goto(sym),
            "if-goto" => IfGoto(sym),
            _ => unreachable!("branch tag {op} has no variant"),
        },
    )(input)
}

fn function(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("function"), space1, symbol, space1, integer)),
        |(_, _, name, _, n_locals)| Function(name, n_locals),
    )(input)
}

fn call(input: &str) -> IResult<&str, Command> {
    map(
        tuple((tag("call"), space1, symbol, space1, integer)),
        |(_, _, name, _, n_args)| Call(name, n_args),
    )(input)
}

fn func_return(input: &str) -> IResult<&str, Command> {
    map(tag("return"), |_| Return)(input)
}

fn newfile(input: &str) -> IResult<&str, Command> {
    map(tuple((tag("newfile"), space1, symbol)), |(_, _, name)| {
        NewFile(name)
    })(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    alt((
        push,
        pop,
        function,
        call,
        func_return,
        newfile,
        prim,
        branching,
    ))(input)
}

/// Explain why a line refused to parse as a command.
fn diagnose(line: &str) -> String {
    let mut tokens = line.split(' ');
    let mnemonic = tokens.next().unwrap_or("");
    let operands: Vec<&str> = tokens.collect();

    match mnemonic {
        "push" | "pop" => {
            if operands.len() != 2 {
                format!("expected \"{mnemonic} <segment> <index>\"")
            } else if !SEGMENT_NAMES.contains(&operands[0]) {
                format!("unknown segment \"{}\"", operands[0])
            } else {
                format!("malformed index \"{}\"", operands[1])
            }
        }
        "add" | "sub" | "neg" | "eq" | "gte" | "gt" | "lt" | "and" | "or" | "not" | "return" => {
            format!("{mnemonic} takes no operands")
        }
        "label" | "goto" | "if-goto" => format!("expected \"{mnemonic} <name>\""),
        "function" => "expected \"function <name> <locals>\"".to_string(),
        "call" => "expected \"call <name> <arguments>\"".to_string(),
        "newfile" => "expected \"newfile <unit>\"".to_string(),
        other => format!("unknown command \"{other}\""),
    }
}

/// Range checks the grammar cannot express.
fn check_operands(unit: &str, line: usize, text: &str, command: &Command) -> TranslateResult<()> {
    match command {
        Pop(Constant, _) => MalformedSnafu {
            unit,
            line,
            text,
            message: "cannot pop into the constant segment",
        }
        .fail(),
        Push(Temp, index) | Pop(Temp, index) if *index > 7 => IndexOutOfRangeSnafu {
            unit,
            line,
            segment: "temp",
            index: *index,
            max: 7u16,
        }
        .fail(),
        Push(Pointer, index) | Pop(Pointer, index) if *index > 1 => IndexOutOfRangeSnafu {
            unit,
            line,
            segment: "pointer",
            index: *index,
            max: 1u16,
        }
        .fail(),
        Push(Constant, value) if *value > 32767 => IndexOutOfRangeSnafu {
            unit,
            line,
            segment: "constant",
            index: *value,
            max: 32767u16,
        }
        .fail(),
        _ => Ok(()),
    }
}

/// Split normalized text into the ordered command sequence.
///
/// Any line that is not a well-formed command aborts the whole parse.
pub fn parse(unit: &str, input: &str) -> TranslateResult<Vec<Command>> {
    let mut commands = vec![];

    for (number, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let number = number + 1;

        match command(line) {
            Ok(("", parsed)) => {
                check_operands(unit, number, line, &parsed)?;
                commands.push(parsed);
            }
            _ => {
                return MalformedSnafu {
                    unit,
                    line: number,
                    text: line,
                    message: diagnose(line),
                }
                .fail()
            }
        }
    }

    Ok(commands)
}

#[test]
fn test_parses_linkage_commands() {
    let commands = parse(
        "Test",
        "function Main.fib 2\npush argument 0\ncall Main.fib 1\nreturn\n",
    )
    .unwrap();
    assert_eq!(
        commands,
        vec![
            Function("Main.fib".to_string(), 2),
            Push(Argument, 0),
            Call("Main.fib".to_string(), 1),
            Return,
        ]
    );
}

#[test]
fn test_parses_newfile_marker() {
    let commands = parse("Test", "newfile Other\npush static 3\n").unwrap();
    assert_eq!(commands, vec![NewFile("Other".to_string()), Push(Static, 3)]);
}

#[test]
fn test_rejects_unknown_mnemonic() {
    let err = parse("Test", "frobnicate local 1\n").unwrap_err();
    assert!(err.to_string().contains("unknown command \"frobnicate\""));
}

#[test]
fn test_rejects_wrong_arity() {
    let err = parse("Test", "push local\n").unwrap_err();
    assert!(err.to_string().contains("push <segment> <index>"));

    let err = parse("Test", "add 5\n").unwrap_err();
    assert!(err.to_string().contains("add takes no operands"));
}

#[test]
fn test_rejects_pop_constant() {
    let err = parse("Test", "pop constant 2\n").unwrap_err();
    assert!(err
        .to_string()
        .contains("cannot pop into the constant segment"));
}

#[test]
fn test_rejects_out_of_range_indices() {
    use crate::error::TranslateError;

    let err = parse("Test", "push temp 8\n").unwrap_err();
    assert!(matches!(
        err,
        TranslateError::IndexOutOfRange {
            segment: "temp",
            index: 8,
            max: 7,
            ..
        }
    ));

    let err = parse("Test", "pop pointer 2\n").unwrap_err();
    assert!(matches!(
        err,
        TranslateError::IndexOutOfRange {
            segment: "pointer",
            ..
        }
    ));

    let err = parse("Test", "push constant 40000\n").unwrap_err();
    assert!(matches!(
        err,
        TranslateError::IndexOutOfRange {
            segment: "constant",
            ..
        }
    ));
}

#[test]
fn test_reports_line_position() {
    let err = parse("Test", "push constant 1\nadd\nbogus\n").unwrap_err();
    assert!(err.to_string().contains("line 3"));
}
