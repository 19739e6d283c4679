/// Strip comments and insignificant whitespace from raw VM source.
///
/// The result has one instruction per line with single spaces between
/// tokens; blank lines and comment-only lines vanish. Token content is
/// never altered.
pub fn normalize(input: &str) -> String {
    let mut output = String::new();

    for line in input.lines() {
        let line = line.split_once("//").map(|(code, _)| code).unwrap_or(line);
        let mut tokens = line.split_whitespace();

        if let Some(first) = tokens.next() {
            output.push_str(first);
            for token in tokens {
                output.push(' ');
                output.push_str(token);
            }
            output.push('\n');
        }
    }

    output
}

#[test]
fn test_strips_comment_lines() {
    assert_eq!(normalize("// a header\npush constant 1\n"), "push constant 1\n");
}

#[test]
fn test_keeps_command_before_trailing_comment() {
    assert_eq!(
        normalize("push constant 1 // the operand\nadd//tight comment"),
        "push constant 1\nadd\n"
    );
}

#[test]
fn test_collapses_blank_lines_and_spacing() {
    assert_eq!(
        normalize("\n\n  push\t local   2  \n\n\nneg\n"),
        "push local 2\nneg\n"
    );
}

#[test]
fn test_empty_input_stays_empty() {
    assert_eq!(normalize("// nothing but comments\n\n"), "");
}
