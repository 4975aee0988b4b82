/// Model Runner — checks a persisted model, runs bootstrap iterations,
/// and writes the output log.
///
/// Usage: model_runner <model file> [--iters N] [--initial X] [--eps E]
///                     [--seed S] [--html] [--out <file>] [--compile <file>]
///
/// With --compile, a RON-authored model is written back out in the
/// binary model format instead of being run.

use dispersal_engine::core::engine::{CancelFlag, SimulationEngine};
use dispersal_engine::core::model::{Model, RunParams};
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: model_runner <model file> [--iters N] [--initial X] [--eps E]");
        println!("                    [--seed S] [--html] [--out <file>] [--compile <file>]");
        process::exit(0);
    }

    let path = Path::new(&args[1]);
    let mut params = RunParams::default();
    let mut seed = None;
    let mut html = false;
    let mut out = None;
    let mut compile = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--iters" => params.iterations = parse_next(&args, &mut i),
            "--initial" => params.initial = parse_next(&args, &mut i),
            "--eps" => params.epsilon = parse_next(&args, &mut i),
            "--seed" => seed = Some(parse_next::<u64>(&args, &mut i)),
            "--html" => html = true,
            "--out" => {
                i += 1;
                out = args.get(i).cloned();
            }
            "--compile" => {
                i += 1;
                compile = args.get(i).cloned();
            }
            other => {
                eprintln!("ERROR: Unknown option '{}'", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let mut model = match load(path) {
        Ok(model) => model,
        Err(message) => {
            eprintln!("ERROR: Failed to load model: {}", message);
            process::exit(1);
        }
    };

    match model.validate() {
        Ok(report) => {
            for warning in &report.warnings {
                eprintln!("WARNING: {}", warning);
            }
        }
        Err(err) => {
            eprintln!("ERROR: {}", err);
            process::exit(1);
        }
    }

    if let Some(target) = compile {
        if let Err(err) = model.save_to_file(Path::new(&target)) {
            eprintln!("ERROR: Couldn't write model to {}: {}", target, err);
            process::exit(1);
        }
        println!("Model written to {}", target);
        return;
    }

    let mut engine = match seed {
        Some(seed) => SimulationEngine::with_seed(seed),
        None => SimulationEngine::new(),
    };
    let log = match engine.run(&model, &params, &CancelFlag::new()) {
        Ok(log) => log,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            process::exit(1);
        }
    };

    let text = if html { log.to_html() } else { log.to_tsv() };
    match out {
        Some(file) => {
            if let Err(err) = std::fs::write(&file, text) {
                eprintln!("ERROR: Couldn't save output to {}: {}", file, err);
                process::exit(1);
            }
            println!("Model output saved to {}", file);
        }
        None => print!("{}", text),
    }
}

fn parse_next<T: std::str::FromStr>(args: &[String], i: &mut usize) -> T {
    *i += 1;
    let Some(value) = args.get(*i) else {
        eprintln!("ERROR: Option '{}' needs a value", args[*i - 1]);
        process::exit(1);
    };
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            eprintln!("ERROR: Invalid value '{}' for '{}'", value, args[*i - 1]);
            process::exit(1);
        }
    }
}

fn load(path: &Path) -> Result<Model, String> {
    if path.extension().is_some_and(|e| e == "ron") {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        Model::from_ron_str(&text).map_err(|e| e.to_string())
    } else {
        Model::load_from_file(path).map_err(|e| e.to_string())
    }
}
