//! Schema unification for frame groups.
//!
//! Frames that share a `ref_id` become one view. Before they are written they
//! are reconciled so every frame of the group exposes the same ordered columns
//! with the same types:
//! 1. display names replace field names,
//! 2. labels become constant string pseudo-columns,
//! 3. the union of column names (first-seen order) is padded into every frame
//!    with all-null columns, and every union column is made nullable.
//!
//! Unification is column-wise only; row counts stay per frame.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::frame::{Field, FieldType, Frame};
use crate::types;

/// Group frames by `ref_id`, preserving first-seen group order and frame order within a group.
pub fn frames_by_ref(frames: Vec<Frame>) -> Vec<(String, Vec<Frame>)> {
    let mut order: Vec<(String, Vec<Frame>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for f in frames {
        match index.get(&f.ref_id) {
            Some(&i) => order[i].1.push(f),
            None => {
                index.insert(f.ref_id.clone(), order.len());
                order.push((f.ref_id.clone(), vec![f]));
            }
        }
    }
    order
}

/// Rename fields whose config carries a non-empty display name.
pub fn apply_display_names(frame: &mut Frame) {
    for fld in frame.fields.iter_mut() {
        if let Some(dn) = fld.config.as_ref().and_then(|c| c.display_name.as_deref()) {
            if !dn.is_empty() && dn != fld.name {
                debug!(target: "duckframe::unify", from = %fld.name, to = %dn, "display name override");
                fld.name = dn.to_string();
            }
        }
    }
}

/// Append one constant string column per label key of every labelled field.
///
/// A label key that collides with a column already present in the frame is
/// skipped; the existing column wins.
pub fn labels_to_fields(frame: &mut Frame) {
    let rows = frame.rows();
    let mut present: HashSet<String> = frame.fields.iter().map(|f| f.name.clone()).collect();
    let mut extra: Vec<Field> = Vec::new();
    for fld in &frame.fields {
        for (key, val) in &fld.labels {
            if present.contains(key) {
                warn!(target: "duckframe::unify", frame = %frame.name, label = %key, "label key collides with an existing column; skipped");
                continue;
            }
            present.insert(key.clone());
            extra.push(Field::constant_string(key.clone(), val, rows));
        }
    }
    frame.fields.extend(extra);
}

/// Pad every frame of one group to the union of the group's columns.
///
/// Same column name with a different kind in two frames is a `SchemaConflict`;
/// nullable and non-nullable variants of one kind unify to nullable.
pub fn merge_frames(group: &str, frames: &mut [Frame]) -> AppResult<()> {
    let mut union: Vec<(String, FieldType)> = Vec::new();
    let mut pos: HashMap<String, usize> = HashMap::new();
    for f in frames.iter() {
        let mut seen: HashSet<&str> = HashSet::with_capacity(f.fields.len());
        for fld in &f.fields {
            if !seen.insert(fld.name.as_str()) {
                let first = f.fields.iter().find(|x| x.name == fld.name).map(|x| x.field_type.to_string()).unwrap_or_default();
                return Err(AppError::SchemaConflict {
                    group: group.to_string(),
                    column: fld.name.clone(),
                    left: first,
                    right: fld.field_type.to_string(),
                });
            }
            match pos.get(&fld.name) {
                Some(&i) => {
                    let known = &union[i].1;
                    if known.kind != fld.field_type.kind {
                        return Err(AppError::SchemaConflict {
                            group: group.to_string(),
                            column: fld.name.clone(),
                            left: known.to_string(),
                            right: fld.field_type.to_string(),
                        });
                    }
                }
                None => {
                    pos.insert(fld.name.clone(), union.len());
                    union.push((fld.name.clone(), fld.field_type.clone()));
                }
            }
        }
    }

    // single frame with nothing to pad keeps its declared nullability
    let needs_padding = frames.iter().any(|f| f.fields.len() != union.len());
    if frames.len() < 2 && !needs_padding {
        return Ok(());
    }

    for f in frames.iter_mut() {
        let rows = f.rows();
        let mut by_name: HashMap<String, Field> = f.fields.drain(..).map(|fld| (fld.name.clone(), fld)).collect();
        let mut out: Vec<Field> = Vec::with_capacity(union.len());
        for (name, ft) in &union {
            match by_name.remove(name) {
                Some(mut fld) => {
                    fld.field_type = fld.field_type.as_nullable();
                    out.push(fld);
                }
                None => {
                    debug!(target: "duckframe::unify", group = %group, frame = %f.name, column = %name, rows, "padding missing column with nulls");
                    out.push(types::null_field(name, ft, rows)?);
                }
            }
        }
        f.fields = out;
    }
    Ok(())
}

/// Full unification of one group: display names, labels, then merge.
pub fn unify_group(group: &str, frames: &mut [Frame]) -> AppResult<()> {
    for f in frames.iter_mut() {
        apply_display_names(f);
        labels_to_fields(f);
    }
    merge_frames(group, frames)
}

#[cfg(test)]
#[path = "unify_tests.rs"]
mod unify_tests;
