use std::{env, fs, process::ExitCode};

use quill::{QuillError, Runner, StdEcho};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let Some(file_path) = args.get(1) else {
        eprintln!("usage: quill <script>");
        return ExitCode::FAILURE;
    };

    let source = match fs::read_to_string(file_path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read '{file_path}': {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut runner = Runner::new();
    match runner.run(&source, &mut StdEcho) {
        Ok(_) => ExitCode::SUCCESS,
        Err(QuillError::Compile(err)) => {
            eprintln!("Compile error: {err}");
            ExitCode::FAILURE
        }
        Err(QuillError::Runtime(err)) => {
            eprintln!("Runtime error: {err}");
            ExitCode::FAILURE
        }
    }
}
