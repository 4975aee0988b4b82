/// Model Linter — checks a persisted model for structural and
/// probabilistic consistency.
///
/// Usage: model_linter <model file> [--ron]

use dispersal_engine::core::model::Model;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: model_linter <model file> [--ron]");
        process::exit(0);
    }

    let path = Path::new(&args[1]);
    let as_ron = args.iter().any(|a| a == "--ron");

    let mut model = match load(path, as_ron) {
        Ok(model) => model,
        Err(message) => {
            eprintln!("ERROR: {}", message);
            process::exit(1);
        }
    };

    println!(
        "Loaded model: {} stages, {} castings",
        model.tree().len(),
        model.table_names().len()
    );

    match model.validate() {
        Ok(report) => {
            for warning in &report.warnings {
                println!("WARNING: {}", warning);
            }
            if report.warnings.is_empty() {
                println!("Model checked and found consistent.");
            } else {
                println!(
                    "Model checked and found workable (with {} warning{}).",
                    report.warnings.len(),
                    if report.warnings.len() == 1 { "" } else { "s" }
                );
            }
        }
        Err(err) => {
            eprintln!("ERROR: {}", err);
            process::exit(1);
        }
    }
}

fn load(path: &Path, as_ron: bool) -> Result<Model, String> {
    if as_ron || path.extension().is_some_and(|e| e == "ron") {
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        Model::from_ron_str(&text).map_err(|e| e.to_string())
    } else {
        Model::load_from_file(path).map_err(|e| e.to_string())
    }
}
