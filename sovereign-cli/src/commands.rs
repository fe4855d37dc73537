//! CLI command implementations.

use sovereign_common::OpCategory;
use sovereign_evolve::Evolution;
use sovereign_vm::{Registry, Vm, VmConfig};
use std::fs;
use std::sync::Arc;

/// Parse and execute a `.sov` file; `--evolve` wires up the LLM adapter.
pub fn run(args: &[String]) -> Result<(), i32> {
    let Some(input) = args.first() else {
        eprintln!("error: run requires an input file");
        eprintln!("Usage: sovereign run <input.sov> [--evolve]");
        return Err(1);
    };
    let evolve = args.iter().any(|a| a == "--evolve");

    let source = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{input}': {e}");
        1
    })?;

    let program = sovereign_assembler::parse(&source).map_err(|e| {
        eprintln!("parse error: {e}");
        2
    })?;

    let config = vm_config_from_env()?;
    let mut vm = Vm::new(config).map_err(|e| {
        eprintln!("error: {e}");
        64
    })?;
    vm.load(program);

    if evolve {
        let mut evolution = Evolution::from_env().map_err(|e| {
            eprintln!("error: {e}");
            64
        })?;
        evolution.initialize().map_err(|e| {
            eprintln!("error: {e}");
            1
        })?;
        vm.set_adapter(Arc::new(evolution));
    }

    match vm.run() {
        Ok(()) => {
            let snapshot = vm.dump_state();
            for value in &snapshot.data_stack {
                println!("{value}");
            }
            eprintln!("ok ({} steps)", snapshot.steps);
            Ok(())
        }
        Err(e) => {
            eprintln!("runtime error: {e}");
            Err(1)
        }
    }
}

/// Validate a `.sov` file without executing it.
pub fn check(args: &[String]) -> Result<(), i32> {
    let Some(input) = args.first() else {
        eprintln!("error: check requires an input file");
        eprintln!("Usage: sovereign check <input.sov>");
        return Err(1);
    };
    let source = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{input}': {e}");
        1
    })?;
    match sovereign_assembler::parse(&source) {
        Ok(program) => {
            println!("OK: {input} ({} instructions)", program.len());
            Ok(())
        }
        Err(e) => {
            eprintln!("parse error: {e}");
            Err(2)
        }
    }
}

/// Print the canonical source form of a `.sov` file.
pub fn fmt(args: &[String]) -> Result<(), i32> {
    let Some(input) = args.first() else {
        eprintln!("error: fmt requires an input file");
        eprintln!("Usage: sovereign fmt <input.sov>");
        return Err(1);
    };
    let source = fs::read_to_string(input).map_err(|e| {
        eprintln!("error: cannot read '{input}': {e}");
        1
    })?;
    let program = sovereign_assembler::parse(&source).map_err(|e| {
        eprintln!("parse error: {e}");
        2
    })?;
    print!("{}", sovereign_assembler::canonicalize(&program));
    Ok(())
}

/// List registered opcodes, optionally filtered by category.
pub fn opcodes(args: &[String]) -> Result<(), i32> {
    let category = match args.first().map(String::as_str) {
        None => None,
        Some("stack") => Some(OpCategory::Stack),
        Some("arithmetic") => Some(OpCategory::Arithmetic),
        Some("control") => Some(OpCategory::Control),
        Some("memory") => Some(OpCategory::Memory),
        Some(other) => {
            eprintln!("error: unknown category '{other}' (stack, arithmetic, control, memory)");
            return Err(1);
        }
    };
    let registry = Registry::with_builtins();
    for descriptor in registry.list(category) {
        println!("{:<8} {}", descriptor.name, descriptor.category.name());
    }
    Ok(())
}

/// Export or import learned error patterns as NDJSON.
pub fn patterns(args: &[String]) -> Result<(), i32> {
    let usage = || {
        eprintln!("Usage: sovereign patterns export <out.ndjson>");
        eprintln!("       sovereign patterns import <in.ndjson>");
    };
    let (Some(action), Some(path)) = (args.first(), args.get(1)) else {
        usage();
        return Err(1);
    };

    let evolution = Evolution::from_env().map_err(|e| {
        eprintln!("error: {e}");
        64
    })?;

    match action.as_str() {
        "export" => {
            fs::write(path, evolution.export_patterns()).map_err(|e| {
                eprintln!("error: cannot write '{path}': {e}");
                1
            })?;
            eprintln!("exported patterns -> {path}");
            Ok(())
        }
        "import" => {
            let stream = fs::read_to_string(path).map_err(|e| {
                eprintln!("error: cannot read '{path}': {e}");
                1
            })?;
            let count = evolution.import_patterns(&stream).map_err(|e| {
                eprintln!("error: {e}");
                1
            })?;
            println!("imported {count} pattern(s)");
            Ok(())
        }
        other => {
            eprintln!("error: unknown patterns action '{other}'");
            usage();
            Err(1)
        }
    }
}

/// VM configuration from the environment: the LLM knobs plus an optional
/// step-budget override. Unparsable values are configuration errors.
fn vm_config_from_env() -> Result<VmConfig, i32> {
    let mut config = VmConfig::default();
    if let Ok(host) = std::env::var("OLLAMA_HOST") {
        if !host.is_empty() {
            config.llm_endpoint = host;
        }
    }
    if let Ok(model) = std::env::var("OLLAMA_MODEL") {
        if !model.is_empty() {
            config.default_model = model;
        }
    }
    if let Ok(steps) = std::env::var("SOVEREIGN_MAX_STEPS") {
        config.max_execution_steps = steps.parse().map_err(|_| {
            eprintln!("error: SOVEREIGN_MAX_STEPS '{steps}' is not an integer");
            64
        })?;
    }
    config.validate().map_err(|e| {
        eprintln!("error: {e}");
        64
    })?;
    Ok(config)
}
