/// Model integration tests — editing operations, consistency
/// checking, and the checked/saved status discipline.

use dispersal_engine::core::model::{Model, ModelError};
use dispersal_engine::core::validate::StructuralError;
use dispersal_engine::schema::stage::Casting;
use dispersal_engine::schema::tree::StageId;

/// Start -> Crop (Direct) -> Dispersal (table "Dispersers")
///   -> { Established (Success), Predated (Sink) }
fn dispersal_model() -> Model {
    let mut model = Model::new();
    model.create_table("Dispersers", 2, 2).unwrap();
    model.write_cell("Dispersers", 0, 0, 0.4).unwrap();
    model.write_cell("Dispersers", 0, 1, 0.6).unwrap();
    model.write_cell("Dispersers", 1, 0, 0.5).unwrap();
    model.write_cell("Dispersers", 1, 1, 0.5).unwrap();

    let root = model.tree().root();
    model.set_casting(root, Casting::Direct).unwrap();
    let crop = model.add_child(root, "Crop", Casting::Direct).unwrap();
    let dispersal = model
        .add_child(crop, "Dispersal", Casting::Table("Dispersers".into()))
        .unwrap();
    model
        .add_child(dispersal, "Established", Casting::Success)
        .unwrap();
    model
        .add_child(dispersal, "Predated", Casting::Sink)
        .unwrap();
    model
}

fn stage_named(model: &Model, name: &str) -> StageId {
    model
        .tree()
        .preorder()
        .into_iter()
        .find(|&id| model.tree().get(id).unwrap().name == name)
        .unwrap_or_else(|| panic!("no stage named {}", name))
}

#[test]
fn well_formed_tree_validates_without_diagnostics() {
    let mut model = dispersal_model();
    let report = model.validate().unwrap();
    assert!(report.completed);
    assert!(report.warnings.is_empty());
    assert!(model.is_checked());
}

#[test]
fn validation_assigns_dot_separated_ids() {
    let mut model = dispersal_model();
    model.validate().unwrap();
    let established = stage_named(&model, "Established");
    assert_eq!(
        model.tree().get(established).unwrap().hierarchical_id,
        "1.1.1.1"
    );
    let predated = stage_named(&model, "Predated");
    assert_eq!(
        model.tree().get(predated).unwrap().hierarchical_id,
        "1.1.1.2"
    );
}

#[test]
fn leaf_with_direct_kind_names_the_exact_stage() {
    let mut model = dispersal_model();
    let predated = stage_named(&model, "Predated");
    model.set_casting(predated, Casting::Direct).unwrap();
    match model.validate().unwrap_err() {
        StructuralError::MissingTerminalKind { stage, id } => {
            assert_eq!(stage, "Predated");
            assert_eq!(id, "1.1.1.2");
        }
        other => panic!("expected MissingTerminalKind, got {:?}", other),
    }
}

#[test]
fn any_edit_after_validation_invalidates_the_check() {
    // Structural edit
    let mut model = dispersal_model();
    model.validate().unwrap();
    let dispersal = stage_named(&model, "Dispersal");
    model.add_child(dispersal, "Cached", Casting::Sink).unwrap();
    assert!(!model.is_checked());

    // Casting re-assignment
    let mut model = dispersal_model();
    model.validate().unwrap();
    let crop = stage_named(&model, "Crop");
    model.set_casting(crop, Casting::Direct).unwrap();
    assert!(!model.is_checked());

    // Table cell write
    let mut model = dispersal_model();
    model.validate().unwrap();
    model.write_cell("Dispersers", 0, 0, 0.3).unwrap();
    assert!(!model.is_checked());
}

#[test]
fn removing_a_branch_changes_validation_requirements() {
    let mut model = dispersal_model();
    let predated = stage_named(&model, "Predated");
    model.remove_stage(predated).unwrap();
    // Dispersal now has a single child but still a table casting
    assert!(matches!(
        model.validate().unwrap_err(),
        StructuralError::WrongKindForSingleChild { .. }
    ));
    let dispersal = stage_named(&model, "Dispersal");
    model.set_casting(dispersal, Casting::Direct).unwrap();
    assert!(model.validate().is_ok());
}

#[test]
fn cloned_subtree_validates_with_fresh_ids() {
    let mut model = dispersal_model();
    // Grow a second branch that replicates the dispersal subtree
    let crop = stage_named(&model, "Crop");
    let dispersal = stage_named(&model, "Dispersal");
    let second = model
        .add_sibling(dispersal, "Second season", Casting::Direct)
        .unwrap();
    model.clone_stage(dispersal, second).unwrap();
    // Crop now branches two ways and needs a casting of its own
    model.create_table("Seasons", 1, 2).unwrap();
    model.write_cell("Seasons", 0, 0, 0.5).unwrap();
    model.write_cell("Seasons", 0, 1, 0.5).unwrap();
    model
        .set_casting(crop, Casting::Table("Seasons".into()))
        .unwrap();

    let report = model.validate().unwrap();
    assert!(report.completed);
    // The copy got its own ids under the new branch
    let copy_root = model.tree().get(second).unwrap().children()[0];
    assert_eq!(model.tree().get(copy_root).unwrap().hierarchical_id, "1.1.2.1");
}

#[test]
fn deleting_a_used_table_leaves_the_stage_unassignable() {
    let mut model = dispersal_model();
    assert_eq!(model.table_usage("Dispersers"), 1);
    assert_eq!(model.delete_table("Dispersers").unwrap(), 1);
    assert!(matches!(
        model.validate().unwrap_err(),
        StructuralError::MissingCastingForBranch { .. }
    ));
}

#[test]
fn duplicate_table_is_independent_of_its_source() {
    let mut model = dispersal_model();
    model.duplicate_table("Dispersers", "Winter").unwrap();
    model.write_cell("Winter", 0, 0, 0.1).unwrap();
    let original = model.table("Dispersers").unwrap().read_cell(0, 0).unwrap();
    assert!((original - 0.4).abs() < 1e-6);
}

#[test]
fn name_conflicts_reject_before_mutating() {
    let mut model = dispersal_model();
    let before = model.table_names();
    assert!(matches!(
        model.duplicate_table("Dispersers", "Sink"),
        Err(ModelError::ReservedName(_))
    ));
    assert!(matches!(
        model.import_table_from_text("0.5\t0.5\n", "Dispersers"),
        Err(ModelError::DuplicateName(_))
    ));
    assert_eq!(model.table_names(), before);
}
