//! forthbc CLI
//!
//! Compiles a Forth source file to a code object and optionally prints its
//! disassembly, runs it on the reference VM, or writes it out for a host VM.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use forthbc::bytecode::disasm::print_code;
use forthbc::bytecode::{CodeObject, Compiler, CompilerConfig};
use forthbc::lang::value::{LiteralError, Value};
use forthbc::runtime::Vm;

#[derive(ClapParser)]
#[command(name = "forthbc")]
#[command(about = "Compile Forth words to stack-VM wordcode", long_about = None)]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Number of parameters (defaults to the number of --run arguments)
    #[arg(long = "args")]
    argcount: Option<usize>,

    /// Code object name when the source has no `: name`
    #[arg(long)]
    name: Option<String>,

    /// Print the disassembly
    #[arg(long)]
    dis: bool,

    /// Run on the reference VM with these literal arguments
    #[arg(long, num_args = 0.., allow_hyphen_values = true)]
    run: Option<Vec<String>>,

    /// Write the serialized code object to this path
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(message) = run(&cli) {
        eprintln!("{}", message);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let source = fs::read_to_string(&cli.input)
        .map_err(|e| format!("Failed to read '{}': {}", cli.input.display(), e))?;

    let args = match &cli.run {
        Some(words) => parse_args(words)?,
        None => Vec::new(),
    };

    let name = cli.name.clone().unwrap_or_else(|| {
        cli.input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| CompilerConfig::default().name)
    });
    let config = CompilerConfig::default()
        .with_argcount(cli.argcount.unwrap_or(args.len()))
        .with_name(name)
        .with_filename(cli.input.display().to_string());

    let code = Compiler::with_config(config)
        .compile(&source)
        .map_err(|e| format!("{}: {}", cli.input.display(), e))?;

    if cli.dis {
        print_code(&code);
    }

    if let Some(path) = &cli.output {
        write_code(&code, path)?;
    }

    if cli.run.is_some() {
        let value = Vm::new().run(&code, &args).map_err(|e| e.to_string())?;
        println!("{}", value);
    } else if !cli.dis && cli.output.is_none() {
        println!(
            "Compiled {}: {} bytes, {} constants, {} locals, stack {}",
            code.name,
            code.code.len(),
            code.consts.len(),
            code.nlocals,
            code.stacksize
        );
    }

    Ok(())
}

fn parse_args(words: &[String]) -> Result<Vec<Value>, String> {
    words
        .iter()
        .map(|word| {
            Value::parse_literal(word).map_err(|e| match e {
                LiteralError::NotALiteral => format!("Argument '{}' is not a literal", word),
                LiteralError::OutOfRange => format!("Argument '{}' does not fit in 64 bits", word),
            })
        })
        .collect()
}

fn write_code(code: &CodeObject, path: &Path) -> Result<(), String> {
    let bytes = code
        .to_bytes()
        .map_err(|e| format!("Failed to serialize code object: {}", e))?;
    fs::write(path, &bytes).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    println!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
