/// Seed Dispersal example — a small recruitment model built in code.
///
/// A fleshy-fruited plant's crop is taken by three disperser guilds;
/// each guild drops seeds into microhabitats where they establish or
/// are lost. Runs 20 bootstrap iterations and prints the trajectories.
///
/// Run with: cargo run --example seed_dispersal

use dispersal_engine::core::engine::{CancelFlag, SimulationEngine};
use dispersal_engine::core::model::{Model, RunParams};
use dispersal_engine::schema::stage::Casting;

fn main() {
    let mut model = Model::new();

    // --- Casting tables: one row per field season observed ---
    // How the crop splits across disperser guilds
    model
        .import_table_from_text(
            "0.45\t0.35\t0.20\n\
             0.50\t0.30\t0.20\n\
             0.40\t0.40\t0.20\n",
            "Guilds",
        )
        .expect("Guilds table");

    // Where birds drop seeds: shrub / open ground
    model
        .import_table_from_text("0.70\t0.30\n0.60\t0.40\n", "Birds")
        .expect("Birds table");

    // Establishment under shrub: established / lost
    model.create_table("Shrub", 1, 2).expect("Shrub table");
    model.write_cell("Shrub", 0, 0, 0.15).expect("cell");
    model.write_cell("Shrub", 0, 1, 0.85).expect("cell");

    // --- Stage tree ---
    let root = model.tree().root();
    model.set_casting(root, Casting::Direct).expect("root kind");
    let crop = model.add_child(root, "Crop", Casting::Table("Guilds".into())).expect("stage");

    let birds = model
        .add_child(crop, "Birds", Casting::Table("Birds".into()))
        .expect("stage");
    let shrub = model
        .add_child(birds, "Shrub", Casting::Table("Shrub".into()))
        .expect("stage");
    model.add_child(shrub, "Established", Casting::Success).expect("stage");
    model.add_child(shrub, "Lost", Casting::Sink).expect("stage");
    model.add_child(birds, "Open ground", Casting::Sink).expect("stage");

    model.add_child(crop, "Mammals", Casting::Sink).expect("stage");
    model.add_child(crop, "Gravity", Casting::Sink).expect("stage");

    model.report_success_only();
    model.set_report(crop, true).expect("report");

    // --- Check, then run ---
    let report = model.validate().expect("model is consistent");
    for warning in &report.warnings {
        eprintln!("WARNING: {}", warning);
    }

    let params = RunParams {
        initial: 10_000.0,
        iterations: 20,
        epsilon: 0.0001,
    };
    let mut engine = SimulationEngine::with_seed(2026);
    let log = engine
        .run(&model, &params, &CancelFlag::new())
        .expect("run");

    print!("{}", log.to_tsv());
}
