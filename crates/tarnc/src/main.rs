use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs;

use tarn_frontend::parse_source;
use tarn_sema::Analyzer;

/// The built-in smoke program compiled by `tarnc test`.
static SMOKE: &str = r#"
extern def print_int(val: int)

def fib(n: int) -> int
    if n < 2
        return n
    end
    return fib(n-1) + fib(n-2)
end

def main()
    print_int(fib(10))
end
"#;

#[derive(Parser, Debug)]
#[command(name = "tarnc")]
#[command(about = "Tarn compiler", long_about = None)]
struct Cli {
    /// Source file to compile, or the literal `test` to compile the
    /// built-in smoke program.
    #[arg(value_name = "INPUT")]
    input: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let src = if cli.input == "test" {
        println!("Compiling built-in test program:\n{SMOKE}");
        SMOKE.to_string()
    } else {
        fs::read_to_string(&cli.input)
            .with_context(|| format!("could not open file: {}", cli.input))?
    };

    let mut stmts = parse_source(&src)?;

    let mut analyzer = Analyzer::new();
    analyzer.analyze(&mut stmts);
    for diag in analyzer.diagnostics() {
        eprintln!("type error: {diag}");
    }

    let module = tarn_codegen::lower(&stmts);
    info!(
        "lowered {} functions, {} externs",
        module.funcs.len(),
        module.externs.len()
    );
    println!("{module}");
    Ok(())
}
