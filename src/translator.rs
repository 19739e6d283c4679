use std::collections::HashSet;

use snafu::ensure;

use crate::ast::{Command::*, Segment::*, *};
use crate::error::{TranslateResult, UnresolvedSnafu};
use crate::segments;

macro_rules! svec {
    ($($x:expr),*) => (vec![$($x.to_string()),*]);
}

fn at_c(arg: &u16) -> String {
    format!("@{arg}")
}

fn at_s(arg: &str) -> String {
    format!("@{arg}")
}

/// Push microcode for the four base-pointer segments
fn seg_push(seg_name: &str, base: u16, arg: &u16) -> Vec<String> {
    svec![
        format!("// push {seg_name} {arg}"),
        at_c(&base),
        "D=M",
        at_c(arg),
        "A=A+D", // A = base+arg
        "D=M",   // D = value to push
        at_c(&segments::SP),
        "M=M+1",
        "A=M-1", // Don't need to refetch SP; this is safe
        "M=D"
    ]
}

fn seg_push_direct(seg_name: &str, arg: &u16, address: String) -> Vec<String> {
    svec![
        format!("// push {seg_name} {arg}"),
        at_s(&address),
        "D=M",
        at_c(&segments::SP),
        "M=M+1",
        "A=M-1",
        "M=D"
    ]
}

fn seg_pop(seg_name: &str, base: u16, arg: &u16) -> Vec<String> {
    svec![
        format!("// pop {seg_name} {arg}"),
        at_c(&base),
        "D=M",
        at_c(arg),
        "D=A+D", // D = base+arg
        "@R13",
        "M=D", // Park the target address in R13 before the stack read clobbers D
        at_c(&segments::SP),
        "AM=M-1", // SP--, A <- new SP (val to be popped)
        "D=M",
        "@R13",
        "A=M", // At the target address...
        "M=D"  // ... store the popped val
    ]
}

fn seg_pop_direct(seg_name: &str, arg: &u16, address: String) -> Vec<String> {
    svec![
        format!("// pop {seg_name} {arg}"),
        at_c(&segments::SP),
        "AM=M-1",
        "D=M",
        at_s(&address),
        "M=D"
    ]
}

fn simple_un_op(name: &str, op: char) -> Vec<String> {
    svec![
        format!("// {name}"),
        at_c(&segments::SP),
        "A=M-1",
        format!("M={op}M")
    ]
}

// i.e. no conditions or jumps, just pop and run
fn simple_bin_op(name: &str, op: char) -> Vec<String> {
    svec![
        format!("// {name}"),
        at_c(&segments::SP),
        "AM=M-1",             // SP--, looking at top of stack now
        "D=M",                // Right arg in D
        "A=A-1",              // Looking at second arg of stack, will overwrite
        format!("M=M{op}D")   // Op and overwrite second element
    ]
}

struct Reference {
    symbol: String,
    origin: String,
}

pub struct Translator {
    file_name: String,
    func_name: String,
    gen_sym: usize,
    defined: HashSet<String>,
    referenced: Vec<Reference>,
}

impl Translator {
    pub fn new(file_name: &str) -> Self {
        Translator {
            file_name: file_name.to_string(),
            func_name: String::new(),
            gen_sym: 0,
            defined: HashSet::new(),
            referenced: Vec::new(),
        }
    }

    fn next_gen_sym(&mut self) -> usize {
        let tmp = self.gen_sym;
        self.gen_sym += 1;
        tmp
    }

    fn push(&self, segment: &Segment, arg: &u16) -> Vec<String> {
        match segment {
            Constant => svec![
                format!("// push constant {arg}"),
                at_c(arg),
                "D=A",
                at_c(&segments::SP),
                "A=M",
                "M=D",
                at_c(&segments::SP),
                "M=M+1"
            ],
            Local => seg_push("local", segments::LCL, arg),
            Argument => seg_push("argument", segments::ARG, arg),
            This => seg_push("this", segments::THIS, arg),
            That => seg_push("that", segments::THAT, arg),
            Static => seg_push_direct("static", arg, format!("{}.{}", self.file_name, arg)),
            Temp => seg_push_direct("temp", arg, (segments::TEMP_BASE + arg).to_string()),
            Pointer => seg_push_direct("pointer", arg, (segments::THIS + arg).to_string()),
        }
    }

    fn pop(&self, segment: &Segment, arg: &u16) -> Vec<String> {
        match segment {
            Constant => unreachable!("the parser rejects pop constant"),
            Local => seg_pop("local", segments::LCL, arg),
            Argument => seg_pop("argument", segments::ARG, arg),
            This => seg_pop("this", segments::THIS, arg),
            That => seg_pop("that", segments::THAT, arg),
            Static => seg_pop_direct("static", arg, format!("{}.{}", self.file_name, arg)),
            Temp => seg_pop_direct("temp", arg, (segments::TEMP_BASE + arg).to_string()),
            Pointer => seg_pop_direct("pointer", arg, (segments::THIS + arg).to_string()),
        }
    }

    fn compare(&mut self, cmp_name: &str, jump: &str) -> Vec<String> {
        let sym = self.next_gen_sym();
        let cmp_sym = format!("{}:CMP_{}", self.file_name, sym);
        let end_sym = format!("{}:ENDCMP_{}", self.file_name, sym);
        svec![
            format!("// {cmp_name}"),
            at_c(&segments::SP),
            "AM=M-1", // SP--, looking at top of stack now
            "D=M",    // Right arg in D
            "A=A-1",  // Looking at second arg of stack, will overwrite
            "D=M-D",
            at_s(&cmp_sym),
            format!("D;J{jump}"),
            "D=0",
            at_s(&end_sym),
            "0;JMP",
            format!("({cmp_sym})"),
            "D=-1",
            format!("({end_sym})"),
            at_c(&segments::SP),
            "A=M-1",
            "M=D"
        ]
    }

    /// Qualify a user label with the unit and function that own it, so
    /// same-named labels in different functions never collide.
    fn scoped_label(&self, label: &str) -> String {
        format!("{}.{}${}", self.file_name, self.func_name, label).to_uppercase()
    }

    fn location(&self) -> &str {
        if self.func_name.is_empty() {
            &self.file_name
        } else {
            &self.func_name
        }
    }

    fn label(&mut self, label: &str) -> Vec<String> {
        let scoped = self.scoped_label(label);
        self.defined.insert(scoped.clone());
        svec![format!("// label {label}"), format!("({scoped})")]
    }

    fn goto(&mut self, label: &str) -> Vec<String> {
        let scoped = self.scoped_label(label);
        let origin = format!("goto {} in {}", label, self.location());
        self.referenced.push(Reference {
            symbol: scoped.clone(),
            origin,
        });
        svec![
            format!("// goto {label}"),
            at_s(&scoped),
            "0;JMP" // Unconditional jump
        ]
    }

    fn if_goto(&mut self, label: &str) -> Vec<String> {
        let scoped = self.scoped_label(label);
        let origin = format!("if-goto {} in {}", label, self.location());
        self.referenced.push(Reference {
            symbol: scoped.clone(),
            origin,
        });
        svec![
            format!("// if-goto {label}"),
            at_c(&segments::SP),
            "AM=M-1",
            "D=M", // Stack popped into D
            at_s(&scoped),
            "D;JNE" // False is 0
        ]
    }

    /// Function entry: a globally scoped label (the name carries its unit
    /// prefix by convention) plus one zeroed stack slot per local.
    fn function(&mut self, name: &str, n_locals: &u16) -> Vec<String> {
        self.func_name = name.to_string();
        let entry = name.to_uppercase();
        self.defined.insert(entry.clone());

        let mut block = svec![format!("// function {name} {n_locals}"), format!("({entry})")];
        for _ in 0..*n_locals {
            block.extend(self.push(&Constant, &0));
        }
        block
    }

    /// Call protocol: push the return address and the caller's four base
    /// pointers, relocate ARG below the pushed arguments, start the
    /// callee's local window at the current SP, then jump.
    fn call(&mut self, name: &str, n_args: &u16) -> Vec<String> {
        let entry = name.to_uppercase();
        self.referenced.push(Reference {
            symbol: entry.clone(),
            origin: format!("call {name}"),
        });
        let gen = self.next_gen_sym();
        let ret_sym = format!("{}:RET_{}", self.file_name, gen);

        let mut block = svec![
            format!("// call {name} {n_args}"),
            at_s(&ret_sym), // Return address as a symbol; the assembler resolves it
            "D=A",
            at_c(&segments::SP),
            "M=M+1",
            "A=M-1",
            "M=D"
        ];
        for base in [segments::LCL, segments::ARG, segments::THIS, segments::THAT] {
            block.extend(svec![
                at_c(&base),
                "D=M",
                at_c(&segments::SP),
                "M=M+1",
                "A=M-1",
                "M=D"
            ]);
        }
        block.extend(svec![
            at_c(&(n_args + 5)), // Arguments sit below the five frame words
            "D=A",
            at_c(&segments::SP),
            "D=M-D",
            at_c(&segments::ARG),
            "M=D",
            at_c(&segments::SP),
            "D=M",
            at_c(&segments::LCL),
            "M=D",
            at_s(&entry),
            "0;JMP",
            format!("({ret_sym})")
        ]);
        block
    }

    /// Frame teardown. R13 holds the return value, R14 the caller ARG
    /// base (the final SP), R15 the return address. ARG is both restored
    /// and needed as the SP target, hence the R14 capture up front.
    fn func_return(&self) -> Vec<String> {
        let mut block = svec![
            "// return",
            at_c(&segments::SP),
            "A=M-1",
            "D=M", // Return value...
            "@R13",
            "M=D", // ...parked in R13
            at_c(&segments::ARG),
            "D=M",
            "@R14",
            "M=D", // Caller ARG base in R14; SP lands here after teardown
            at_c(&segments::LCL),
            "D=M",
            at_c(&segments::SP),
            "M=D" // SP = LCL, dropping all callee locals at once
        ];
        for base in [segments::THAT, segments::THIS, segments::ARG, segments::LCL] {
            block.extend(svec![
                at_c(&segments::SP),
                "AM=M-1",
                "D=M",
                at_c(&base),
                "M=D"
            ]);
        }
        block.extend(svec![
            at_c(&segments::SP),
            "AM=M-1",
            "D=M",
            "@R15",
            "M=D", // Return address in R15
            "@R14",
            "D=M",
            at_c(&segments::SP),
            "M=D", // SP collapses over the caller's arguments
            "@R13",
            "D=M",
            at_c(&segments::SP),
            "A=M",
            "M=D", // Return value where the first argument was
            at_c(&segments::SP),
            "M=M+1",
            "@R15",
            "A=M",
            "0;JMP"
        ]);
        block
    }

    fn new_file(&mut self, name: &str) -> Vec<String> {
        self.file_name = name.to_string();
        svec![format!("// newfile {name}")]
    }

    /// Program startup: point SP at the bottom of the stack region and
    /// transfer control to the entry function.
    pub fn bootstrap(&mut self) -> Vec<String> {
        self.file_name = "Sys".to_string();
        let mut block = svec![
            "// bootstrap",
            at_c(&segments::STACK_BASE),
            "D=A",
            at_c(&segments::SP),
            "M=D"
        ];
        block.extend(self.call("Sys.init", &0));
        block
    }

    pub fn translate(&mut self, commands: &[Command]) -> Vec<String> {
        let mut instructions: Vec<String> = vec![];

        for command in commands {
            let translated = match command {
                Push(seg, arg) => self.push(seg, arg),
                Pop(seg, arg) => self.pop(seg, arg),
                Not => simple_un_op("not", '!'),
                Neg => simple_un_op("neg", '-'),
                Add => simple_bin_op("add", '+'),
                Sub => simple_bin_op("sub", '-'),
                And => simple_bin_op("and", '&'),
                Or => simple_bin_op("or", '|'),
                Eq => self.compare("eq", "EQ"),
                Gte => self.compare("gte", "GE"),
                Gt => self.compare("gt", "GT"),
                Lt => self.compare("lt", "LT"),
                Label(sym) => self.label(sym),
                Goto(sym) => self.goto(sym),
                IfGoto(sym) => self.if_goto(sym),
                Function(name, n_locals) => self.function(name, n_locals),
                Call(name, n_args) => self.call(name, n_args),
                Return => self.func_return(),
                NewFile(name) => self.new_file(name),
            };

            instructions.extend(translated);
        }

        instructions
    }

    /// Forward references are legal, so dangling jump targets are only
    /// detectable once every command has been translated.
    pub fn check_references(&self) -> TranslateResult<()> {
        for reference in &self.referenced {
            ensure!(
                self.defined.contains(&reference.symbol),
                UnresolvedSnafu {
                    symbol: reference.symbol.clone(),
                    origin: reference.origin.clone(),
                }
            );
        }
        Ok(())
    }
}

#[test]
fn test_push_constant_block() {
    let mut translator = Translator::new("Test");
    assert_eq!(
        translator.translate(&[Push(Constant, 7)]),
        svec![
            "// push constant 7",
            "@7",
            "D=A",
            "@0",
            "A=M",
            "M=D",
            "@0",
            "M=M+1"
        ]
    );
}

#[test]
fn test_pop_parks_target_address_before_reading_stack() {
    let mut translator = Translator::new("Test");
    assert_eq!(
        translator.translate(&[Pop(Local, 2)]),
        svec![
            "// pop local 2",
            "@1",
            "D=M",
            "@2",
            "D=A+D",
            "@R13",
            "M=D",
            "@0",
            "AM=M-1",
            "D=M",
            "@R13",
            "A=M",
            "M=D"
        ]
    );
}

#[test]
fn test_comparison_labels_are_fresh_per_instruction() {
    let mut translator = Translator::new("Test");
    let output = translator.translate(&[Eq, Eq]);
    let labels: Vec<&String> = output.iter().filter(|line| line.starts_with('(')).collect();
    assert_eq!(
        labels,
        ["(Test:CMP_0)", "(Test:ENDCMP_0)", "(Test:CMP_1)", "(Test:ENDCMP_1)"]
    );
}

#[test]
fn test_function_entry_materializes_locals() {
    let mut translator = Translator::new("Test");
    let output = translator.translate(&[Function("Main.fib".to_string(), 2)]);
    assert_eq!(output[0], "// function Main.fib 2");
    assert_eq!(output[1], "(MAIN.FIB)");
    assert_eq!(
        output.iter().filter(|line| **line == "// push constant 0").count(),
        2
    );
}

#[test]
fn test_call_relocates_argument_window() {
    let mut translator = Translator::new("Test");
    let output = translator.translate(&[Call("Main.fib".to_string(), 1)]);
    // ARG = SP - (1 + 5), then LCL = SP, then the jump
    let window = output.iter().position(|line| line == "@6").unwrap();
    assert_eq!(
        &output[window..window + 6],
        &["@6", "D=A", "@0", "D=M-D", "@2", "M=D"]
    );
    assert_eq!(output.last().unwrap(), "(Test:RET_0)");
    assert!(output.contains(&"@MAIN.FIB".to_string()));
}

#[test]
fn test_return_scratch_discipline() {
    let translator = Translator::new("Test");
    let output = translator.func_return();
    let r13 = output.iter().position(|line| line == "@R13").unwrap();
    let r14 = output.iter().position(|line| line == "@R14").unwrap();
    let r15 = output.iter().position(|line| line == "@R15").unwrap();
    // Return value first, caller ARG second, return address last
    assert!(r13 < r14 && r14 < r15);
    assert_eq!(output.last().unwrap(), "0;JMP");
}

#[test]
fn test_scoped_labels_differ_between_functions() {
    let mut translator = Translator::new("Main");
    let output = translator.translate(&[
        Function("Main.a".to_string(), 0),
        Label("LOOP".to_string()),
        Goto("LOOP".to_string()),
        Function("Main.b".to_string(), 0),
        Label("LOOP".to_string()),
        Goto("LOOP".to_string()),
    ]);
    assert!(output.contains(&"(MAIN.MAIN.A$LOOP)".to_string()));
    assert!(output.contains(&"(MAIN.MAIN.B$LOOP)".to_string()));
    assert!(output.contains(&"@MAIN.MAIN.A$LOOP".to_string()));
    assert!(output.contains(&"@MAIN.MAIN.B$LOOP".to_string()));
    assert!(translator.check_references().is_ok());
}

#[test]
fn test_unresolved_goto_is_reported() {
    let mut translator = Translator::new("Test");
    translator.translate(&[Goto("NOWHERE".to_string())]);
    let err = translator.check_references().unwrap_err();
    assert!(err.to_string().contains("NOWHERE"));
}
