//! Header reconciliation for the concatenation path.
//!
//! Concatenation copies encoded record bodies verbatim, so it can only accept
//! inputs whose records share one layout. Read-group attributes are
//! reconciled softly: a value that is missing from or differs in an incoming
//! file is patched to empty in the running canonical header, and keys only the
//! incoming file knows are added without a value. Any difference in the
//! auxiliary field descriptors is a hard error.

use std::fmt;

use crate::{AuxField, Header, Result, S5Error};

/// Recoverable difference found by [`check_and_merge`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderWarning {
    /// The canonical value of `key` was patched to empty.
    Patched {
        source: String,
        group: usize,
        key: String,
        canonical: String,
        incoming: Option<String>,
    },
    /// `key` was added to the canonical read group without a value.
    Added {
        source: String,
        group: usize,
        key: String,
    },
}
impl fmt::Display for HeaderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patched {
                source,
                group,
                key,
                canonical,
                incoming: Some(incoming),
            } => write!(
                f,
                "{source}: attribute {key} of read group {group} is '{incoming}' \
                 instead of '{canonical}'; setting it to empty"
            ),
            Self::Patched {
                source, group, key, ..
            } => write!(
                f,
                "{source}: attribute {key} is missing from read group {group}; setting it to empty"
            ),
            Self::Added { source, group, key } => write!(
                f,
                "{source}: new attribute {key} in read group {group}; adding it without a value"
            ),
        }
    }
}

fn aux_mismatch(canonical: &[AuxField], incoming: &[AuxField]) -> Option<String> {
    if canonical.len() != incoming.len() {
        return Some(format!(
            "{} auxiliary fields instead of {}",
            incoming.len(),
            canonical.len()
        ));
    }
    canonical
        .iter()
        .zip(incoming)
        .enumerate()
        .find(|(_, (a, b))| a != b)
        .map(|(i, (a, b))| {
            format!(
                "auxiliary field {i} is {} {} instead of {} {}",
                b.type_string(),
                b.name,
                a.type_string(),
                a.name
            )
        })
}

/// Reconciles `incoming` into the running `canonical` header.
///
/// Read groups are compared pairwise by index. The auxiliary field lists must
/// be identical in name, type, enum labels and order; otherwise
/// [`S5Error::AuxSchemaMismatch`] is returned and `canonical` is left
/// untouched.
///
/// # Examples
///
/// ```rust
/// use s5tools::{check_and_merge, Header, ReadGroup};
///
/// # fn main() -> s5tools::Result<()> {
/// let mut canonical = Header::new();
/// let mut rg = ReadGroup::with_run_id("r1");
/// rg.set("asic_temp", "29.2");
/// canonical.add_read_group(rg);
///
/// let mut incoming = canonical.clone();
/// incoming.read_groups[0].set("asic_temp", "31.0");
///
/// let warnings = check_and_merge(&mut canonical, &incoming, "b.blow5")?;
/// assert_eq!(warnings.len(), 1);
/// assert_eq!(canonical.get("asic_temp", 0), Some(""));
/// # Ok(())
/// # }
/// ```
pub fn check_and_merge(
    canonical: &mut Header,
    incoming: &Header,
    source: &str,
) -> Result<Vec<HeaderWarning>> {
    if let Some(reason) = aux_mismatch(&canonical.aux_fields, &incoming.aux_fields) {
        return Err(S5Error::AuxSchemaMismatch {
            path: source.to_string(),
            reason,
        });
    }

    let mut warnings = Vec::new();
    for (group, rg) in canonical.read_groups.iter_mut().enumerate() {
        let other = incoming.read_groups.get(group);

        for (key, value) in rg.attrs.iter_mut() {
            let theirs = other.and_then(|o| o.get(key));
            if theirs == Some(value.as_str()) {
                continue;
            }
            warnings.push(HeaderWarning::Patched {
                source: source.to_string(),
                group,
                key: key.clone(),
                canonical: std::mem::take(value),
                incoming: theirs.map(str::to_string),
            });
        }

        if let Some(other) = other {
            for key in other.attrs.keys() {
                if rg.attrs.contains_key(key) {
                    continue;
                }
                rg.set(key, "");
                warnings.push(HeaderWarning::Added {
                    source: source.to_string(),
                    group,
                    key: key.clone(),
                });
            }
        }
    }
    Ok(warnings)
}
