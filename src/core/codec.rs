/// The persisted model format — a flat, level-tagged pre-order dump of
/// the stage tree followed by the casting tables.
///
/// All fields are little-endian: `i32` counts and levels, `f32` cell
/// values, strings as an `i32` byte length followed by UTF-8 bytes,
/// bools as a single byte. Layout:
///
/// ```text
/// i32 stage_count
/// repeat stage_count times:
///   i32 level                      // depth below the root (root = 0)
///   string name
///   string casting_ref             // kind label or table name
///   bool report
///   string hierarchical_id
/// i32 table_count
/// repeat table_count times:
///   string name
///   i32 rows
///   i32 cols
///   f32[rows*cols] values          // row-major
/// ```
///
/// The level tags are necessary and sufficient to rebuild the tree:
/// reconstruction is a forward single pass over the records keeping a
/// stack of open ancestors, so a sequence that does not describe a
/// pre-order tree is rejected instead of silently producing a
/// malformed one.

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::model::Model;
use crate::schema::stage::{is_reserved_name, Casting};
use crate::schema::table::CastingTable;
use crate::schema::tree::{StageId, StageTree};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed model file: {0}")]
    MalformedModelFile(String),
    #[error("model file ends early")]
    UnexpectedEof,
}

/// Serialize a model to its binary form.
pub fn encode_model(model: &Model) -> Vec<u8> {
    let tree = model.tree();
    let order = tree.preorder();

    let mut out = Vec::new();
    write_i32(&mut out, order.len() as i32);
    for &id in &order {
        let stage = tree.get(id).expect("pre-order yields live stages");
        let level = tree.depth(id).expect("pre-order yields live stages");
        write_i32(&mut out, level as i32);
        write_string(&mut out, &stage.name);
        write_string(&mut out, stage.casting.label());
        write_bool(&mut out, stage.report);
        write_string(&mut out, &stage.hierarchical_id);
    }

    let names = model.table_names();
    write_i32(&mut out, names.len() as i32);
    for name in &names {
        let table = model.table(name).expect("table_names yields live tables");
        write_string(&mut out, name);
        write_i32(&mut out, table.rows() as i32);
        write_i32(&mut out, table.cols() as i32);
        for &value in table.values() {
            write_f32(&mut out, value);
        }
    }
    out
}

/// Reconstruct a model from its binary form. The result is saved (it
/// matches the stream it came from) but not checked.
pub fn decode_model(bytes: &[u8]) -> Result<Model, CodecError> {
    let mut reader = Reader::new(bytes);

    let stage_count = read_count(&mut reader, "stage count")?;
    if stage_count == 0 {
        return Err(CodecError::MalformedModelFile(
            "a model has at least its root stage".to_string(),
        ));
    }

    let mut tree = None;
    // Open ancestors: (level, id), innermost last.
    let mut stack: Vec<(usize, StageId)> = Vec::new();
    for index in 0..stage_count {
        let level = reader.read_i32()?;
        let name = reader.read_string()?;
        let casting = Casting::from_label(&reader.read_string()?);
        let report = reader.read_bool()?;
        let hierarchical_id = reader.read_string()?;

        if level < 0 {
            return Err(CodecError::MalformedModelFile(format!(
                "stage {} has negative level {}",
                index, level
            )));
        }
        let level = level as usize;

        let id = if level == 0 {
            if tree.is_some() {
                return Err(CodecError::MalformedModelFile(
                    "more than one root stage".to_string(),
                ));
            }
            let t = tree.insert(StageTree::new(name));
            t.root()
        } else {
            let Some(t) = tree.as_mut() else {
                return Err(CodecError::MalformedModelFile(
                    "first stage record is not at level 0".to_string(),
                ));
            };
            // Close subtrees until the parent level is on top.
            while stack.last().is_some_and(|&(l, _)| l >= level) {
                stack.pop();
            }
            match stack.last() {
                Some(&(l, parent)) if l == level - 1 => t
                    .add_child(parent, name, casting.clone())
                    .map_err(|e| CodecError::MalformedModelFile(e.to_string()))?,
                _ => {
                    return Err(CodecError::MalformedModelFile(format!(
                        "stage {} at level {} has no parent at level {}",
                        index,
                        level,
                        level - 1
                    )));
                }
            }
        };
        let t = tree.as_mut().expect("tree created on first record");
        if let Some(stage) = t.get_mut(id) {
            stage.casting = casting;
            stage.report = report;
            stage.hierarchical_id = hierarchical_id;
        }
        stack.push((level, id));
    }
    let tree = tree.ok_or(CodecError::UnexpectedEof)?;

    let table_count = read_count(&mut reader, "table count")?;
    let mut tables = FxHashMap::default();
    for _ in 0..table_count {
        let name = reader.read_string()?;
        if name.is_empty() || is_reserved_name(&name) {
            return Err(CodecError::MalformedModelFile(format!(
                "'{}' is not a valid casting name",
                name
            )));
        }
        let rows = read_count(&mut reader, "table rows")?;
        let cols = read_count(&mut reader, "table columns")?;
        if rows == 0 || cols == 0 {
            return Err(CodecError::MalformedModelFile(format!(
                "casting '{}' has an empty {}x{} shape",
                name, rows, cols
            )));
        }
        let cell_count = rows.checked_mul(cols).ok_or_else(|| {
            CodecError::MalformedModelFile(format!(
                "casting '{}' claims an impossible {}x{} shape",
                name, rows, cols
            ))
        })?;
        // The claimed payload cannot exceed what the stream still
        // holds; check before allocating for it.
        if cell_count
            .checked_mul(4)
            .map_or(true, |bytes| bytes > reader.remaining())
        {
            return Err(CodecError::UnexpectedEof);
        }
        let mut values = Vec::with_capacity(cell_count);
        for _ in 0..cell_count {
            values.push(reader.read_f32()?);
        }
        let table = CastingTable::from_raw(&name, rows, cols, &values)
            .map_err(|e| CodecError::MalformedModelFile(e.to_string()))?;
        if tables.insert(name.clone(), table).is_some() {
            return Err(CodecError::MalformedModelFile(format!(
                "duplicate casting name '{}'",
                name
            )));
        }
    }

    Ok(Model::from_parts(tree, tables))
}

fn read_count(reader: &mut Reader<'_>, what: &str) -> Result<usize, CodecError> {
    let value = reader.read_i32()?;
    usize::try_from(value)
        .map_err(|_| CodecError::MalformedModelFile(format!("negative {}: {}", what, value)))
}

// ---- field-level primitives, shared with the session-settings file ----

pub(crate) fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(value as u8);
}

pub(crate) fn write_string(out: &mut Vec<u8>, value: &str) {
    write_i32(out, value.len() as i32);
    out.extend_from_slice(value.as_bytes());
}

pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + len > self.bytes.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, CodecError> {
        let bytes = self.take(4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, CodecError> {
        let bytes = self.take(4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.take(1)?[0] != 0)
    }

    pub(crate) fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_i32()?;
        let len = usize::try_from(len).map_err(|_| {
            CodecError::MalformedModelFile(format!("negative string length {}", len))
        })?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::MalformedModelFile("string is not UTF-8".to_string()))
    }
}
