/// The model aggregate — one stage tree plus the casting tables it
/// references, with the checked/saved status flags.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::core::codec::{self, CodecError};
use crate::schema::stage::{is_reserved_name, Casting};
use crate::schema::table::{CastingTable, TableError};
use crate::schema::tree::{StageId, StageTree, TreeError};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("a casting named '{0}' already exists")]
    DuplicateName(String),
    #[error("'{0}' is a reserved stage kind and cannot name a casting")]
    ReservedName(String),
    #[error("casting names cannot be empty")]
    EmptyName,
    #[error("there is no casting named '{0}'")]
    UnknownTable(String),
    #[error("casting tables need at least one row and one column (got {rows}x{cols})")]
    InvalidShape { rows: usize, cols: usize },
    #[error("tabular text not usable as a casting: {0}")]
    TabularFormat(String),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("RON serialization error: {0}")]
    RonSer(#[from] ron::Error),
    #[error("RON deserialization error: {0}")]
    RonDe(#[from] ron::error::SpannedError),
}

/// Global simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// Initial population released at the root.
    pub initial: f32,
    /// Number of bootstrap iterations to run.
    pub iterations: u32,
    /// Quasi-zero floor substituted for vanishing transition
    /// probabilities so no branch ever receives exactly zero
    /// population.
    pub epsilon: f32,
}

impl Default for RunParams {
    fn default() -> Self {
        RunParams {
            initial: 1000.0,
            iterations: 100,
            epsilon: 0.0001,
        }
    }
}

/// A recruitment model: the stage tree, its casting tables (names
/// unique, reserved kind-names forbidden), and run parameters.
///
/// Every mutation of the tree or the tables resets both status flags:
/// the model must be re-checked before it can run again, and re-saved
/// before it matches its file again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub(crate) tree: StageTree,
    pub(crate) tables: FxHashMap<String, CastingTable>,
    pub(crate) params: RunParams,
    #[serde(skip)]
    pub(crate) checked: bool,
    #[serde(skip)]
    pub(crate) saved: bool,
}

impl Model {
    /// A fresh model: a lone root stage named "Start" and no castings.
    pub fn new() -> Model {
        Model {
            tree: StageTree::new("Start"),
            tables: FxHashMap::default(),
            params: RunParams::default(),
            checked: false,
            saved: false,
        }
    }

    pub(crate) fn from_parts(tree: StageTree, tables: FxHashMap<String, CastingTable>) -> Model {
        Model {
            tree,
            tables,
            params: RunParams::default(),
            checked: false,
            saved: true,
        }
    }

    /// True iff validation has succeeded since the last mutation.
    pub fn is_checked(&self) -> bool {
        self.checked
    }

    /// True iff the model matches its last-persisted byte stream.
    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn params(&self) -> RunParams {
        self.params
    }

    /// Run parameters are not part of the persisted model file, so
    /// changing them leaves both status flags alone.
    pub fn set_params(&mut self, params: RunParams) {
        self.params = params;
    }

    pub fn tree(&self) -> &StageTree {
        &self.tree
    }

    // ---- casting tables -------------------------------------------------

    /// Create a zero-filled casting table.
    pub fn create_table(&mut self, name: &str, rows: usize, cols: usize) -> Result<(), ModelError> {
        self.check_new_name(name)?;
        if rows == 0 || cols == 0 {
            return Err(ModelError::InvalidShape { rows, cols });
        }
        self.tables
            .insert(name.to_string(), CastingTable::zeroed(name, rows, cols));
        self.touch();
        Ok(())
    }

    /// Create a copy of an existing casting under a new name.
    pub fn duplicate_table(&mut self, source: &str, new_name: &str) -> Result<(), ModelError> {
        self.check_new_name(new_name)?;
        let src = self
            .tables
            .get(source)
            .ok_or_else(|| ModelError::UnknownTable(source.to_string()))?;
        let copy = CastingTable::from_copy(src, new_name);
        self.tables.insert(new_name.to_string(), copy);
        self.touch();
        Ok(())
    }

    /// Rename a casting and rewrite every stage that references it.
    pub fn rename_table(&mut self, old: &str, new: &str) -> Result<(), ModelError> {
        if new.is_empty() {
            return Err(ModelError::EmptyName);
        }
        if is_reserved_name(new) {
            return Err(ModelError::ReservedName(new.to_string()));
        }
        if new == old {
            return Ok(());
        }
        if self.tables.contains_key(new) {
            return Err(ModelError::DuplicateName(new.to_string()));
        }
        let mut table = self
            .tables
            .remove(old)
            .ok_or_else(|| ModelError::UnknownTable(old.to_string()))?;
        table.set_name(new);
        self.tables.insert(new.to_string(), table);
        for id in self.tree.preorder() {
            if let Some(stage) = self.tree.get_mut(id) {
                if stage.casting == Casting::Table(old.to_string()) {
                    stage.casting = Casting::Table(new.to_string());
                }
            }
        }
        self.touch();
        Ok(())
    }

    /// Delete a casting; stages that referenced it are left without an
    /// assignment. Returns how many stages were affected.
    pub fn delete_table(&mut self, name: &str) -> Result<usize, ModelError> {
        if self.tables.remove(name).is_none() {
            return Err(ModelError::UnknownTable(name.to_string()));
        }
        let mut cleared = 0;
        for id in self.tree.preorder() {
            if let Some(stage) = self.tree.get_mut(id) {
                if stage.casting == Casting::Table(name.to_string()) {
                    stage.casting = Casting::Unassigned;
                    cleared += 1;
                }
            }
        }
        self.touch();
        Ok(cleared)
    }

    /// How many stages currently reference the named casting. Lets a
    /// caller confirm a deletion before committing to it.
    pub fn table_usage(&self, name: &str) -> usize {
        self.tree
            .preorder()
            .into_iter()
            .filter_map(|id| self.tree.get(id))
            .filter(|stage| stage.casting == Casting::Table(name.to_string()))
            .count()
    }

    /// Build a casting from tabular text: rows separated by newlines,
    /// columns by tabs (the format spreadsheets put on the clipboard).
    /// A casting splits population across at least two stages, so
    /// fewer than two columns is rejected.
    pub fn import_table_from_text(&mut self, text: &str, name: &str) -> Result<(), ModelError> {
        self.check_new_name(name)?;
        let mut values = Vec::new();
        let mut cols = 0;
        let mut rows = 0;
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
            if rows == 0 {
                cols = fields.len();
            } else if fields.len() != cols {
                return Err(ModelError::TabularFormat(format!(
                    "row {} has {} columns, expected {}",
                    rows + 1,
                    fields.len(),
                    cols
                )));
            }
            for field in fields {
                let value: f32 = field.trim().parse().map_err(|_| {
                    ModelError::TabularFormat(format!("'{}' is not a number", field.trim()))
                })?;
                // "NaN" and "inf" parse, but are not probabilities
                if !value.is_finite() {
                    return Err(ModelError::TabularFormat(format!(
                        "'{}' is not a finite probability",
                        field.trim()
                    )));
                }
                values.push(value);
            }
            rows += 1;
        }
        if rows == 0 || cols < 2 {
            return Err(ModelError::TabularFormat(
                "need at least one row of at least two tab-separated columns".to_string(),
            ));
        }
        let table = CastingTable::from_raw(name, rows, cols, &values)?;
        self.tables.insert(name.to_string(), table);
        self.touch();
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&CastingTable> {
        self.tables.get(name)
    }

    /// Casting names in alphabetical order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Write a single cell of a casting, with the clamping described
    /// on [`CastingTable::write_cell`]. Returns the value stored.
    pub fn write_cell(
        &mut self,
        table: &str,
        row: usize,
        col: usize,
        value: f32,
    ) -> Result<f32, ModelError> {
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| ModelError::UnknownTable(table.to_string()))?;
        let stored = t.write_cell(row, col, value)?;
        self.touch();
        Ok(stored)
    }

    // ---- stages ---------------------------------------------------------

    /// Add a stage under `parent`.
    pub fn add_child(
        &mut self,
        parent: StageId,
        name: &str,
        casting: Casting,
    ) -> Result<StageId, ModelError> {
        let id = self.tree.add_child(parent, name, casting)?;
        self.touch();
        Ok(id)
    }

    /// Add a stage beside `reference` (same parent).
    pub fn add_sibling(
        &mut self,
        reference: StageId,
        name: &str,
        casting: Casting,
    ) -> Result<StageId, ModelError> {
        let id = self.tree.add_sibling(reference, name, casting)?;
        self.touch();
        Ok(id)
    }

    pub fn rename_stage(&mut self, stage: StageId, name: &str) -> Result<(), ModelError> {
        let node = self
            .tree
            .get_mut(stage)
            .ok_or(TreeError::UnknownStage(stage))?;
        node.name = name.to_string();
        self.touch();
        Ok(())
    }

    pub fn set_casting(&mut self, stage: StageId, casting: Casting) -> Result<(), ModelError> {
        let node = self
            .tree
            .get_mut(stage)
            .ok_or(TreeError::UnknownStage(stage))?;
        node.casting = casting;
        self.touch();
        Ok(())
    }

    /// Include or exclude a stage from the simulation output. This is
    /// an output-selection change, not a structural one, but it still
    /// invalidates the flags: the output column layout is fixed at
    /// check time.
    pub fn set_report(&mut self, stage: StageId, report: bool) -> Result<(), ModelError> {
        let node = self
            .tree
            .get_mut(stage)
            .ok_or(TreeError::UnknownStage(stage))?;
        node.report = report;
        self.touch();
        Ok(())
    }

    /// Report every stage except the root.
    pub fn report_all(&mut self) {
        self.set_report_where(|_| true);
    }

    /// Report no stage.
    pub fn report_none(&mut self) {
        self.set_report_where(|_| false);
    }

    /// Report exactly the `Success` terminal stages.
    pub fn report_success_only(&mut self) {
        self.set_report_where(|casting| *casting == Casting::Success);
    }

    fn set_report_where(&mut self, predicate: impl Fn(&Casting) -> bool) {
        let root = self.tree.root();
        for id in self.tree.preorder() {
            if id == root {
                continue;
            }
            if let Some(stage) = self.tree.get_mut(id) {
                stage.report = predicate(&stage.casting);
            }
        }
        self.touch();
    }

    /// Remove a stage and its whole subtree.
    pub fn remove_stage(&mut self, stage: StageId) -> Result<(), ModelError> {
        self.tree.remove(stage)?;
        self.touch();
        Ok(())
    }

    /// Replicate the subtree rooted at `source` under `destination`.
    pub fn clone_stage(
        &mut self,
        source: StageId,
        destination: StageId,
    ) -> Result<StageId, ModelError> {
        let copy = self.tree.clone_subtree(source, destination)?;
        self.touch();
        Ok(copy)
    }

    // ---- persistence ----------------------------------------------------

    /// Serialize to the binary model format and mark the model saved.
    pub fn save_to_bytes(&mut self) -> Vec<u8> {
        let bytes = codec::encode_model(self);
        self.saved = true;
        bytes
    }

    /// Reconstruct a model from its binary form. The loaded model is
    /// saved (it matches the stream it came from) but unchecked.
    pub fn load_from_bytes(bytes: &[u8]) -> Result<Model, CodecError> {
        codec::decode_model(bytes)
    }

    pub fn save_to_file(&mut self, path: &Path) -> Result<(), CodecError> {
        let bytes = codec::encode_model(self);
        std::fs::write(path, bytes)?;
        self.saved = true;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Model, CodecError> {
        let bytes = std::fs::read(path)?;
        codec::decode_model(&bytes)
    }

    /// Human-readable RON rendition, for authoring models as text.
    pub fn to_ron_string(&self) -> Result<String, ModelError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Parse a RON rendition. Like any non-binary source, the result
    /// is neither checked nor saved.
    pub fn from_ron_str(text: &str) -> Result<Model, ModelError> {
        Ok(ron::from_str(text)?)
    }

    pub(crate) fn touch(&mut self) {
        self.checked = false;
        self.saved = false;
    }

    fn check_new_name(&self, name: &str) -> Result<(), ModelError> {
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        if is_reserved_name(name) {
            return Err(ModelError::ReservedName(name.to_string()));
        }
        if self.tables.contains_key(name) {
            return Err(ModelError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

impl Default for Model {
    fn default() -> Self {
        Model::new()
    }
}
