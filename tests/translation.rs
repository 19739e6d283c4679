//! End-to-end checks: translate small programs and execute the result
//! on a miniature model of the target machine, so the observable
//! behavior is what gets asserted, not just the emitted text.

use std::collections::HashMap;

use vm_translator::{translate_program, translate_unit, TranslateError};

#[derive(Clone)]
enum Instruction {
    Address(i16),
    Compute {
        dest: String,
        comp: String,
        jump: String,
    },
}

/// Two-pass loader: first collect label addresses, then resolve every
/// `@symbol` against labels, `Rn` registers, or a fresh variable slot
/// starting at 16 (which is where `static` cells land).
fn assemble(asm: &str) -> Vec<Instruction> {
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut count = 0;
    for line in asm.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if let Some(name) = line.strip_prefix('(') {
            labels.insert(name.trim_end_matches(')').to_string(), count);
        } else {
            count += 1;
        }
    }

    let mut variables: HashMap<String, i16> = HashMap::new();
    let mut next_variable = 16;
    let mut rom = Vec::new();
    for line in asm.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('(') {
            continue;
        }
        if let Some(symbol) = line.strip_prefix('@') {
            let value = if let Ok(number) = symbol.parse::<i16>() {
                number
            } else if let Some(&address) = labels.get(symbol) {
                address as i16
            } else if let Some(register) =
                symbol.strip_prefix('R').and_then(|r| r.parse::<i16>().ok())
            {
                register
            } else {
                *variables.entry(symbol.to_string()).or_insert_with(|| {
                    let slot = next_variable;
                    next_variable += 1;
                    slot
                })
            };
            rom.push(Instruction::Address(value));
        } else {
            let (dest, rest) = match line.split_once('=') {
                Some((dest, rest)) => (dest, rest),
                None => ("", line),
            };
            let (comp, jump) = match rest.split_once(';') {
                Some((comp, jump)) => (comp, jump),
                None => (rest, ""),
            };
            rom.push(Instruction::Compute {
                dest: dest.to_string(),
                comp: comp.to_string(),
                jump: jump.to_string(),
            });
        }
    }
    rom
}

fn eval(comp: &str, a: i16, d: i16, m: i16) -> i16 {
    match comp {
        "0" => 0,
        "1" => 1,
        "-1" => -1,
        "D" => d,
        "A" => a,
        "M" => m,
        "!D" => !d,
        "!A" => !a,
        "!M" => !m,
        "-D" => d.wrapping_neg(),
        "-A" => a.wrapping_neg(),
        "-M" => m.wrapping_neg(),
        "D+1" => d.wrapping_add(1),
        "A+1" => a.wrapping_add(1),
        "M+1" => m.wrapping_add(1),
        "D-1" => d.wrapping_sub(1),
        "A-1" => a.wrapping_sub(1),
        "M-1" => m.wrapping_sub(1),
        "D+A" | "A+D" => d.wrapping_add(a),
        "D+M" | "M+D" => d.wrapping_add(m),
        "D-A" => d.wrapping_sub(a),
        "A-D" => a.wrapping_sub(d),
        "D-M" => d.wrapping_sub(m),
        "M-D" => m.wrapping_sub(d),
        "D&A" | "A&D" => d & a,
        "D&M" | "M&D" => d & m,
        "D|A" | "A|D" => d | a,
        "D|M" | "M|D" => d | m,
        other => panic!("unsupported computation {other}"),
    }
}

struct Machine {
    ram: Vec<i16>,
    rom: Vec<Instruction>,
    a: i16,
    d: i16,
    pc: usize,
}

impl Machine {
    fn load(asm: &str) -> Self {
        Machine {
            ram: vec![0; 65536],
            rom: assemble(asm),
            a: 0,
            d: 0,
            pc: 0,
        }
    }

    fn step(&mut self) {
        match self.rom[self.pc].clone() {
            Instruction::Address(value) => {
                self.a = value;
                self.pc += 1;
            }
            Instruction::Compute { dest, comp, jump } => {
                let address = self.a as u16 as usize;
                let value = eval(&comp, self.a, self.d, self.ram[address]);
                // The M write targets the address A held before this
                // instruction, even when A is also a destination.
                if dest.contains('M') {
                    self.ram[address] = value;
                }
                if dest.contains('A') {
                    self.a = value;
                }
                if dest.contains('D') {
                    self.d = value;
                }
                let jumped = match jump.as_str() {
                    "" => false,
                    "JMP" => true,
                    "JEQ" => value == 0,
                    "JNE" => value != 0,
                    "JGT" => value > 0,
                    "JGE" => value >= 0,
                    "JLT" => value < 0,
                    "JLE" => value <= 0,
                    other => panic!("unsupported jump {other}"),
                };
                if jumped {
                    self.pc = self.a as u16 as usize;
                } else {
                    self.pc += 1;
                }
            }
        }
    }

    fn run(&mut self, max_steps: usize) {
        let mut steps = 0;
        while self.pc < self.rom.len() && steps < max_steps {
            self.step();
            steps += 1;
        }
    }
}

/// Translate a single unit and run it with the stack pointer at 256.
fn run_unit(source: &str, setup: &[(usize, i16)]) -> Machine {
    let asm = translate_unit("Test", source).unwrap();
    let mut machine = Machine::load(&asm);
    machine.ram[0] = 256;
    for &(address, value) in setup {
        machine.ram[address] = value;
    }
    machine.run(10_000);
    machine
}

fn push_int(value: i16) -> String {
    if value < 0 {
        format!("push constant {}\nneg\n", -(value as i32))
    } else {
        format!("push constant {value}\n")
    }
}

#[test]
fn add_leaves_sum_at_old_stack_top() {
    let machine = run_unit("push constant 7\npush constant 8\nadd", &[]);
    assert_eq!(machine.ram[256], 15);
    assert_eq!(machine.ram[0], 257);
}

#[test]
fn push_then_pop_same_cell_is_a_no_op() {
    let machine = run_unit("push local 2\npop local 2", &[(1, 1000), (1002, 4321)]);
    assert_eq!(machine.ram[1002], 4321);
    assert_eq!(machine.ram[0], 256);
}

#[test]
fn pop_targets_resolve_to_segment_cells() {
    let machine = run_unit(
        "push constant 9\npop temp 3\n\
         push constant 5\npop pointer 1\n\
         push constant 7\npop static 0",
        &[],
    );
    assert_eq!(machine.ram[8], 9, "temp 3 lives at RAM[5+3]");
    assert_eq!(machine.ram[4], 5, "pointer 1 is the that base register");
    assert_eq!(machine.ram[16], 7, "first static cell lands at RAM[16]");
    assert_eq!(machine.ram[0], 256);
}

fn compare_result(op: &str, x: i16, y: i16) -> i16 {
    let source = format!("{}{}{op}", push_int(x), push_int(y));
    let machine = run_unit(&source, &[]);
    assert_eq!(machine.ram[0], 257, "comparison must leave one word");
    machine.ram[256]
}

#[test]
fn comparisons_are_mutually_consistent() {
    let pairs = [
        (3, 5),
        (5, 3),
        (4, 4),
        (0, 0),
        (-2, 7),
        (7, -2),
        (-3, -3),
        (123, -123),
    ];
    for &(x, y) in &pairs {
        let eq = compare_result("eq", x, y);
        let gt = compare_result("gt", x, y);
        let lt = compare_result("lt", x, y);
        let gte = compare_result("gte", x, y);

        assert_eq!(eq == -1, x == y, "eq {x} {y}");
        assert_eq!(gt == -1, x > y, "gt {x} {y}");
        assert_eq!(lt == -1, x < y, "lt {x} {y}");
        assert_eq!(
            [eq, gt, lt].iter().filter(|&&word| word == -1).count(),
            1,
            "exactly one of eq/gt/lt holds for {x} {y}"
        );
        assert_eq!(gte == -1, gt == -1 || eq == -1, "gte {x} {y}");
        for word in [eq, gt, lt, gte] {
            assert!(word == 0 || word == -1, "booleans are all-ones or zero");
        }
    }
}

#[test]
fn not_of_zero_is_the_true_word() {
    let machine = run_unit("push constant 0\nnot", &[]);
    assert_eq!(machine.ram[256], -1);
}

#[test]
fn double_not_is_identity() {
    let machine = run_unit("push constant 1234\nnot\nnot", &[]);
    assert_eq!(machine.ram[256], 1234);
}

#[test]
fn if_goto_takes_the_branch_on_true() {
    let machine = run_unit(
        "push constant 0\nnot\nif-goto SKIP\npush constant 111\nlabel SKIP\npush constant 222",
        &[],
    );
    assert_eq!(machine.ram[0], 257);
    assert_eq!(machine.ram[256], 222);
}

#[test]
fn if_goto_falls_through_on_false() {
    let machine = run_unit(
        "push constant 0\nif-goto SKIP\npush constant 111\nlabel SKIP",
        &[],
    );
    assert_eq!(machine.ram[0], 257);
    assert_eq!(machine.ram[256], 111);
}

#[test]
fn call_preserves_caller_state_below_the_arguments() {
    let sys = "function Sys.init 0\n\
               push constant 11\n\
               push constant 22\n\
               call Main.sum 2\n\
               label HALT\n\
               goto HALT";
    let main = "function Main.sum 0\n\
                push argument 0\n\
                push argument 1\n\
                add\n\
                return";
    let asm = translate_program(&[("Sys", sys), ("Main", main)], true).unwrap();
    let mut machine = Machine::load(&asm);
    machine.run(10_000);

    // The two arguments collapsed into one return value...
    assert_eq!(machine.ram[0], 262);
    assert_eq!(machine.ram[261], 33);
    // ...and Sys.init's own window pointers came back intact.
    assert_eq!(machine.ram[1], 261, "local base restored");
    assert_eq!(machine.ram[2], 256, "argument base restored");
    assert_eq!(machine.ram[3], 0, "this base restored");
    assert_eq!(machine.ram[4], 0, "that base restored");
}

#[test]
fn recursive_fibonacci_returns_through_saved_frames() {
    let sys = "function Sys.init 0\n\
               push constant 6\n\
               call Main.fib 1\n\
               label HALT\n\
               goto HALT";
    let main = "function Main.fib 0\n\
                push argument 0\n\
                push constant 2\n\
                lt\n\
                if-goto BASE\n\
                push argument 0\n\
                push constant 1\n\
                sub\n\
                call Main.fib 1\n\
                push argument 0\n\
                push constant 2\n\
                sub\n\
                call Main.fib 1\n\
                add\n\
                return\n\
                label BASE\n\
                push argument 0\n\
                return";
    let asm = translate_program(&[("Sys", sys), ("Main", main)], true).unwrap();
    let mut machine = Machine::load(&asm);
    machine.run(400_000);

    assert_eq!(machine.ram[261], 8, "fib(6) == 8");
    assert_eq!(machine.ram[0], 262, "one return value above the caller's stack");
}

#[test]
fn same_label_name_in_two_functions_stays_scoped() {
    // Each function loops to its own LOOP label; the counters in static
    // cells show both loops ran to their own bound.
    let sys = "function Sys.init 0\n\
               call Main.a 0\n\
               pop temp 0\n\
               call Main.b 0\n\
               pop temp 1\n\
               label HALT\n\
               goto HALT";
    let main = "function Main.a 0\n\
                push constant 0\n\
                pop static 0\n\
                label LOOP\n\
                push static 0\n\
                push constant 1\n\
                add\n\
                pop static 0\n\
                push static 0\n\
                push constant 3\n\
                lt\n\
                if-goto LOOP\n\
                push static 0\n\
                return\n\
                function Main.b 0\n\
                push constant 0\n\
                pop static 1\n\
                label LOOP\n\
                push static 1\n\
                push constant 5\n\
                add\n\
                pop static 1\n\
                push static 1\n\
                push constant 20\n\
                lt\n\
                if-goto LOOP\n\
                push static 1\n\
                return";
    let asm = translate_program(&[("Sys", sys), ("Main", main)], true).unwrap();
    assert!(asm.contains("(MAIN.MAIN.A$LOOP)"));
    assert!(asm.contains("(MAIN.MAIN.B$LOOP)"));

    let mut machine = Machine::load(&asm);
    machine.run(100_000);
    assert_eq!(machine.ram[5], 3, "Main.a looped to its own bound");
    assert_eq!(machine.ram[6], 20, "Main.b looped to its own bound");
}

#[test]
fn statics_are_namespaced_per_unit() {
    let asm = translate_program(
        &[
            ("UnitA", "push constant 1\npop static 0"),
            ("UnitB", "push constant 2\npop static 0"),
        ],
        false,
    )
    .unwrap();
    assert!(asm.contains("@UnitA.0"));
    assert!(asm.contains("@UnitB.0"));
}

#[test]
fn forward_references_are_legal() {
    assert!(translate_unit("Test", "goto END\npush constant 1\nlabel END").is_ok());
}

#[test]
fn unresolved_goto_target_is_an_error() {
    let err = translate_unit("Test", "goto NOWHERE").unwrap_err();
    assert!(matches!(err, TranslateError::Unresolved { .. }));
    assert!(err.to_string().contains("NOWHERE"));
}

#[test]
fn undefined_call_target_is_an_error() {
    let err =
        translate_unit("Test", "function Main.main 0\ncall Main.missing 0\nreturn").unwrap_err();
    assert!(matches!(err, TranslateError::Unresolved { .. }));
    assert!(err.to_string().contains("MAIN.MISSING"));
}

#[test]
fn bootstrap_sets_the_stack_pointer_and_calls_the_entry() {
    let sys = "function Sys.init 0\nlabel HALT\ngoto HALT";
    let asm = translate_program(&[("Sys", sys)], true).unwrap();
    assert!(asm.starts_with("// bootstrap\n@256\nD=A\n@0\nM=D\n// call Sys.init 0\n"));

    let mut machine = Machine::load(&asm);
    machine.run(1_000);
    assert_eq!(machine.ram[0], 261, "SP sits above the bootstrap frame");
}
