//! Resolution of a [`ReadOption`] into an index scan.

use crate::error::{CoreError, CoreResult};
use crate::index::{IndexDef, IndexManager, KeyRange};
use crate::query::option::ReadOption;
use std::collections::BTreeSet;
use std::ops::Bound;
use tabula_codec::{encode_key_component, Schema, Value};
use tracing::debug;

/// A resolved index scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPlan {
    /// Position of the index in the table's declaration order.
    pub index: usize,
    /// Name of the chosen index.
    pub index_name: String,
    /// Key bytes to walk.
    pub range: KeyRange,
    /// True when every index field is bound by equality.
    pub point: bool,
}

/// Picks an index for `option` and encodes its bindings.
///
/// Fails with [`CoreError::IndexNotFound`] when no index fits, and with
/// [`CoreError::InvalidReadOption`] when a named index does not have the
/// bound fields as its leading fields.
pub fn plan(
    table: &str,
    schema: &Schema,
    indexes: &IndexManager,
    option: &ReadOption,
) -> CoreResult<ScanPlan> {
    for field in option
        .bindings
        .keys()
        .chain(option.range.iter().map(|r| &r.field))
    {
        if schema.position(field).is_none() {
            return Err(CoreError::UnknownField {
                table: table.to_string(),
                field: field.clone(),
            });
        }
    }

    let bound: BTreeSet<&str> = option.bindings.keys().map(String::as_str).collect();
    let range_field = option.range.as_ref().map(|r| r.field.as_str());
    if range_field.is_some_and(|f| bound.contains(f)) {
        return Err(CoreError::InvalidReadOption {
            table: table.to_string(),
            index: option.index.clone().unwrap_or_default(),
            message: "a field is bound by both equality and range".to_string(),
        });
    }

    let idx = match &option.index {
        Some(name) => {
            let idx = indexes.find(name).ok_or_else(|| CoreError::IndexNotFound {
                table: table.to_string(),
                index: name.clone(),
            })?;
            let def = &indexes.defs()[idx];
            if !fits(def, &bound, range_field) {
                return Err(CoreError::InvalidReadOption {
                    table: table.to_string(),
                    index: name.clone(),
                    message: format!(
                        "bindings {bound:?} (range {range_field:?}) are not a prefix of {:?}",
                        def.fields
                    ),
                });
            }
            idx
        }
        None => indexes
            .defs()
            .iter()
            .position(|def| fits(def, &bound, range_field))
            .ok_or_else(|| CoreError::IndexNotFound {
                table: table.to_string(),
                index: describe(&bound, range_field),
            })?,
    };

    let def = &indexes.defs()[idx];
    let k = bound.len();
    let mut prefix = Vec::new();
    for field in &def.fields[..k] {
        // Present: `fits` checked the leading fields equal the bound set.
        let value = option.bindings.get(field).unwrap_or(&Value::Null);
        let (_, coerced) = schema
            .coerce_field(field, value)
            .map_err(|e| CoreError::from_codec(table, e))?;
        encode_key_component(&coerced, &mut prefix);
    }

    let (lower, upper) = match &option.range {
        Some(range) => {
            let bound_key = |b: &Bound<Value>| -> CoreResult<Bound<Vec<u8>>> {
                let encode = |v: &Value| -> CoreResult<Vec<u8>> {
                    let (_, coerced) = schema
                        .coerce_field(&range.field, v)
                        .map_err(|e| CoreError::from_codec(table, e))?;
                    let mut key = prefix.clone();
                    encode_key_component(&coerced, &mut key);
                    Ok(key)
                };
                Ok(match b {
                    Bound::Included(v) => Bound::Included(encode(v)?),
                    Bound::Excluded(v) => Bound::Excluded(encode(v)?),
                    Bound::Unbounded => Bound::Unbounded,
                })
            };
            (bound_key(&range.lower)?, bound_key(&range.upper)?)
        }
        None => (Bound::Unbounded, Bound::Unbounded),
    };

    let point = option.range.is_none() && k == def.fields.len();
    debug!(
        table,
        index = %def.name,
        bound = k,
        point,
        ranged = option.range.is_some(),
        "planned index scan"
    );
    Ok(ScanPlan {
        index: idx,
        index_name: def.name.clone(),
        range: KeyRange {
            prefix,
            lower,
            upper,
        },
        point,
    })
}

/// Whether `def`'s leading fields are exactly `bound`, followed by the
/// range field if there is one.
fn fits(def: &IndexDef, bound: &BTreeSet<&str>, range_field: Option<&str>) -> bool {
    let k = bound.len();
    let needed = k + usize::from(range_field.is_some());
    if def.fields.len() < needed {
        return false;
    }
    let leading: BTreeSet<&str> = def.fields[..k].iter().map(String::as_str).collect();
    if leading != *bound {
        return false;
    }
    range_field.map_or(true, |f| def.fields[k] == f)
}

fn describe(bound: &BTreeSet<&str>, range_field: Option<&str>) -> String {
    let mut text = format!(
        "no index leads with [{}]",
        bound.iter().copied().collect::<Vec<_>>().join(", ")
    );
    if let Some(f) = range_field {
        text.push_str(&format!(" then `{f}`"));
    }
    text
}
