/// Model consistency checking — one atomic pre-order pass assigning
/// hierarchical ids and verifying every stage against its casting.

use thiserror::Error;

use crate::core::model::Model;
use crate::schema::stage::Casting;

/// Structural inconsistencies. Fatal: the first one found aborts the
/// whole pass, identified by the offending stage's name and
/// hierarchical id.
#[derive(Debug, Error, PartialEq)]
pub enum StructuralError {
    #[error("stage '{stage}' ({id}) has no following stages, it should be kind 'Success' or 'Sink'")]
    MissingTerminalKind { stage: String, id: String },
    #[error("stage '{stage}' ({id}) has only one following stage, it should be kind 'Direct'")]
    WrongKindForSingleChild { stage: String, id: String },
    #[error("stage '{stage}' ({id}) has more than one following stage but no casting assigned")]
    MissingCastingForBranch { stage: String, id: String },
    #[error("stage '{stage}' ({id}) references casting '{name}', which does not exist")]
    UnknownCasting {
        stage: String,
        id: String,
        name: String,
    },
    #[error("stage '{stage}' ({id}) has {expected} following stages but its casting '{name}' has {actual} columns")]
    CastingShapeMismatch {
        stage: String,
        id: String,
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// A non-fatal consistency warning: a casting row whose sum strays
/// from 1.0 beyond tolerance, leaking (or conjuring) population.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSumWarning {
    pub table: String,
    /// 1-based row index, as presented to a person.
    pub row: usize,
    pub sum: f32,
}

impl std::fmt::Display for RowSumWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "the sum of row {} of casting '{}' is {}, which is not equal to 1",
            self.row, self.table, self.sum
        )
    }
}

/// Caller's answer to a row-sum warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningResponse {
    Continue,
    Abort,
}

/// Outcome of a validation pass that found no structural errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// Row-sum warnings encountered, in sorted-table-then-row order.
    pub warnings: Vec<RowSumWarning>,
    /// False if the caller aborted on a warning before the scan
    /// finished; the model stays unchecked in that case.
    pub completed: bool,
}

impl Model {
    /// Check the whole model, collecting every row-sum warning.
    /// Succeeding (with or without warnings) marks the model checked.
    pub fn validate(&mut self) -> Result<ValidationReport, StructuralError> {
        self.validate_with(|_| WarningResponse::Continue)
    }

    /// Check the whole model. Structural errors abort immediately; each
    /// row-sum warning is handed to `on_warning`, which may abort the
    /// rest of the pass. Only a completed pass sets the checked flag.
    ///
    /// The pass writes nothing but the hierarchical ids, which are
    /// recomputed from scratch each time.
    pub fn validate_with(
        &mut self,
        mut on_warning: impl FnMut(&RowSumWarning) -> WarningResponse,
    ) -> Result<ValidationReport, StructuralError> {
        self.checked = false;
        self.assign_hierarchical_ids();

        for id in self.tree.preorder() {
            let Some(stage) = self.tree.get(id) else {
                continue;
            };
            let n = stage.children().len();
            let at = || (stage.name.clone(), stage.hierarchical_id.clone());
            match (&stage.casting, n) {
                (Casting::Success | Casting::Sink, 0) => {}
                (_, 0) => {
                    let (stage, id) = at();
                    return Err(StructuralError::MissingTerminalKind { stage, id });
                }
                (Casting::Direct, 1) => {}
                (_, 1) => {
                    let (stage, id) = at();
                    return Err(StructuralError::WrongKindForSingleChild { stage, id });
                }
                (Casting::Table(name), _) => {
                    let Some(table) = self.tables.get(name) else {
                        let (stage, id) = at();
                        return Err(StructuralError::UnknownCasting {
                            stage,
                            id,
                            name: name.clone(),
                        });
                    };
                    if table.cols() != n {
                        let (stage, id) = at();
                        return Err(StructuralError::CastingShapeMismatch {
                            stage,
                            id,
                            name: name.clone(),
                            expected: n,
                            actual: table.cols(),
                        });
                    }
                }
                (_, _) => {
                    let (stage, id) = at();
                    return Err(StructuralError::MissingCastingForBranch { stage, id });
                }
            }
        }

        // Structure is sound; scan every casting for rows that do not
        // sum to 1.0, reported one by one in table-then-row order.
        let mut warnings = Vec::new();
        for name in self.table_names() {
            let table = &self.tables[&name];
            for (row, sum) in table.leaking_rows() {
                let warning = RowSumWarning {
                    table: name.clone(),
                    row: row + 1,
                    sum,
                };
                let response = on_warning(&warning);
                warnings.push(warning);
                if response == WarningResponse::Abort {
                    return Ok(ValidationReport {
                        warnings,
                        completed: false,
                    });
                }
            }
        }

        self.checked = true;
        Ok(ValidationReport {
            warnings,
            completed: true,
        })
    }

    fn assign_hierarchical_ids(&mut self) {
        let root = self.tree.root();
        if let Some(stage) = self.tree.get_mut(root) {
            stage.hierarchical_id = "1".to_string();
        }
        for id in self.tree.preorder() {
            let Some(stage) = self.tree.get(id) else {
                continue;
            };
            let prefix = stage.hierarchical_id.clone();
            let children = stage.children().to_vec();
            for (index, child) in children.into_iter().enumerate() {
                if let Some(node) = self.tree.get_mut(child) {
                    node.hierarchical_id = format!("{}.{}", prefix, index + 1);
                }
            }
        }
    }
}
