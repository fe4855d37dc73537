//! Sovereign CLI — parse, check, format, and execute sovereign assembly.
//!
//! Exit codes:
//! - 0: success
//! - 1: runtime or input error
//! - 2: parse error
//! - 64: configuration error

mod commands;

use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "run" => commands::run(&args[2..]),
        "check" => commands::check(&args[2..]),
        "fmt" => commands::fmt(&args[2..]),
        "opcodes" => commands::opcodes(&args[2..]),
        "patterns" => commands::patterns(&args[2..]),
        "--help" | "-h" | "help" => {
            print_usage();
            process::exit(0);
        }
        other => {
            eprintln!("error: unknown command '{other}'");
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if let Err(code) = result {
        process::exit(code);
    }
}

/// Tracing to stderr; `SOVEREIGN_DEBUG` (non-empty) raises the default
/// level to debug, `RUST_LOG` still wins when set.
fn init_tracing() {
    let default = if std::env::var("SOVEREIGN_DEBUG").map_or(false, |v| !v.is_empty()) {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn print_usage() {
    eprintln!("Usage: sovereign <command> [args]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  run <input.sov> [--evolve]      Parse and execute a program");
    eprintln!("  check <input.sov>               Validate syntax");
    eprintln!("  fmt <input.sov>                 Print canonical source form");
    eprintln!("  opcodes [category]              List registered opcodes");
    eprintln!("  patterns export <out.ndjson>    Export learned error patterns");
    eprintln!("  patterns import <in.ndjson>     Import error patterns");
    eprintln!();
    eprintln!("Environment: OLLAMA_HOST, OLLAMA_MODEL, OLLAMA_TIMEOUT,");
    eprintln!("             OLLAMA_MAX_RETRIES, SOVEREIGN_DEBUG");
}
