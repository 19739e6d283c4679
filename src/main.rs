use std::{env, ffi::OsStr, fs, path::Path, process};

use vm_translator::translate_program;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        let program = args.first().map(String::as_str).unwrap_or("vm-translator");
        eprintln!("usage: {program} <codefile.vm>...");
        process::exit(1);
    }

    let mut units: Vec<(String, String)> = Vec::new();
    for filename in &args[1..] {
        let source = match fs::read_to_string(filename) {
            Ok(source) => source,
            Err(err) => {
                eprintln!("{filename}: {err}");
                process::exit(1);
            }
        };
        let name = Path::new(filename)
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or(filename)
            .to_string();
        units.push((name, source));
    }
    let unit_refs: Vec<(&str, &str)> = units
        .iter()
        .map(|(name, source)| (name.as_str(), source.as_str()))
        .collect();

    // A single file is a self-contained snippet; several files form a
    // whole program and get the Sys.init bootstrap.
    let assembly = match translate_program(&unit_refs, unit_refs.len() > 1) {
        Ok(assembly) => assembly,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let outfilename = args[1]
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&args[1])
        .to_string()
        + ".asm";
    if let Err(err) = fs::write(&outfilename, assembly) {
        eprintln!("{outfilename}: {err}");
        process::exit(1);
    }
}
