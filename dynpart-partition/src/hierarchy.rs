//! Partition hierarchies.
//!
//! A hierarchy is a tree of levels. Each level partitions its parent's rows
//! on one key column through an ordered list of rules; every rule either
//! owns a child level or names a leaf relation holding rows. All leaves sit
//! at the same depth.

use std::fmt;

use dynpart_result::{Error, Result};
use dynpart_types::{AttrNumber, DataType, RelationId, Value};

use crate::rule::{PartitionBound, RangeBound};

/// Columns a level partitions on. Exactly one is supported.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionKey {
    pub columns: Vec<AttrNumber>,
    pub data_type: DataType,
}

impl PartitionKey {
    pub fn column(attno: AttrNumber, data_type: DataType) -> Self {
        Self {
            columns: vec![attno],
            data_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionRule {
    pub name: String,
    /// Relation backing this rule: an intermediate table for rules with a
    /// child level, a leaf otherwise.
    pub relation: RelationId,
    pub bound: PartitionBound,
    pub children: Option<Box<PartitionLevel>>,
}

impl PartitionRule {
    pub fn leaf(name: impl Into<String>, relation: RelationId, bound: PartitionBound) -> Self {
        Self {
            name: name.into(),
            relation,
            bound,
            children: None,
        }
    }

    pub fn node(
        name: impl Into<String>,
        relation: RelationId,
        bound: PartitionBound,
        children: PartitionLevel,
    ) -> Self {
        Self {
            name: name.into(),
            relation,
            bound,
            children: Some(Box::new(children)),
        }
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        matches!(self.bound, PartitionBound::Default)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartitionLevel {
    pub key: PartitionKey,
    pub rules: Vec<PartitionRule>,
}

impl PartitionLevel {
    pub fn new(key: PartitionKey, rules: Vec<PartitionRule>) -> Self {
        Self { key, rules }
    }

    /// The level's default rule, if any.
    pub fn default_rule(&self) -> Option<&PartitionRule> {
        self.rules.iter().find(|r| r.is_default())
    }

    /// True when some non-default rule of this level accepts `value`.
    pub fn explicit_contains(&self, value: &Value) -> Result<bool> {
        for rule in self.rules.iter().filter(|r| !r.is_default()) {
            if rule.bound.contains(value)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Equality routing: the rule a row with key `value` belongs to. Falls
    /// back to the default rule when no explicit rule accepts the value.
    pub fn route(&self, value: &Value) -> Result<Option<&PartitionRule>> {
        let mut found: Option<&PartitionRule> = None;
        for rule in self.rules.iter().filter(|r| !r.is_default()) {
            if rule.bound.contains(value)? {
                if let Some(prev) = found {
                    return Err(Error::MalformedHierarchy(format!(
                        "rules '{}' and '{}' both accept {}",
                        prev.name, rule.name, value
                    )));
                }
                found = Some(rule);
            }
        }
        Ok(found.or_else(|| self.default_rule()))
    }
}

/// Partition tree of one partitioned root relation.
#[derive(Clone, PartialEq)]
pub struct PartitionHierarchy {
    root: RelationId,
    levels: usize,
    top: PartitionLevel,
}

impl fmt::Debug for PartitionHierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionHierarchy")
            .field("root", &self.root)
            .field("levels", &self.levels)
            .field("leaves", &self.leaves())
            .finish()
    }
}

impl PartitionHierarchy {
    /// Build and validate a hierarchy. Bound values are coerced to their
    /// level's key type. The depth is taken from the first path through the
    /// tree; every other path must match it.
    pub fn new(root: RelationId, mut top: PartitionLevel) -> Result<Self> {
        coerce_bounds(&mut top)?;
        let mut levels = 1;
        let mut cursor = &top;
        while let Some(child) = cursor.rules.first().and_then(|r| r.children.as_deref()) {
            levels += 1;
            cursor = child;
        }
        let hierarchy = Self { root, levels, top };
        hierarchy.validate()?;
        Ok(hierarchy)
    }

    /// Assemble a hierarchy without validating it. The selection engine
    /// still rejects malformed shapes when it reaches them.
    pub fn from_parts_unchecked(root: RelationId, levels: usize, top: PartitionLevel) -> Self {
        Self { root, levels, top }
    }

    pub fn root_relation(&self) -> RelationId {
        self.root
    }

    pub fn levels(&self) -> usize {
        self.levels
    }

    pub fn top_level(&self) -> &PartitionLevel {
        &self.top
    }

    /// Every leaf relation in rule order.
    pub fn leaves(&self) -> Vec<RelationId> {
        let mut out = Vec::new();
        collect_leaves(&self.top, &mut out);
        out
    }

    /// Check the shape assumptions the selection engine relies on.
    pub fn validate(&self) -> Result<()> {
        validate_level(&self.top, 0, self.levels)
    }
}

fn collect_leaves(level: &PartitionLevel, out: &mut Vec<RelationId>) {
    for rule in &level.rules {
        match &rule.children {
            Some(child) => collect_leaves(child, out),
            None => out.push(rule.relation),
        }
    }
}

fn validate_level(level: &PartitionLevel, depth: usize, levels: usize) -> Result<()> {
    if level.key.columns.len() != 1 {
        return Err(Error::UnsupportedPartitionKey {
            level: depth,
            columns: level.key.columns.len(),
        });
    }
    if level.rules.iter().filter(|r| r.is_default()).count() > 1 {
        return Err(Error::MalformedHierarchy(format!(
            "level {depth} has more than one default rule"
        )));
    }
    let last = depth + 1 == levels;
    for rule in &level.rules {
        check_bound_types(rule, &level.key)?;
        match (&rule.children, last) {
            (Some(child), false) => validate_level(child, depth + 1, levels)?,
            (None, true) => {}
            (None, false) => {
                return Err(Error::MalformedHierarchy(format!(
                    "non-leaf rule '{}' at level {depth} has no child level",
                    rule.name
                )));
            }
            (Some(_), true) => {
                return Err(Error::MalformedHierarchy(format!(
                    "rule '{}' has children below the last level {depth}",
                    rule.name
                )));
            }
        }
    }
    Ok(())
}

fn coerce_bounds(level: &mut PartitionLevel) -> Result<()> {
    let key_type = level.key.data_type;
    for rule in &mut level.rules {
        let name = &rule.name;
        let coerce = |v: &mut Value| -> Result<()> {
            *v = v.coerce_to(key_type).map_err(|_| {
                Error::MalformedHierarchy(format!(
                    "rule '{name}' bound {v} does not fit key type {key_type}"
                ))
            })?;
            Ok(())
        };
        match &mut rule.bound {
            PartitionBound::Range { lower, upper } => {
                for side in [lower, upper] {
                    if let RangeBound::Inclusive(v) | RangeBound::Exclusive(v) = side {
                        coerce(v)?;
                    }
                }
            }
            PartitionBound::List(values) => values.iter_mut().try_for_each(coerce)?,
            PartitionBound::Default => {}
        }
        if let Some(child) = rule.children.as_deref_mut() {
            coerce_bounds(child)?;
        }
    }
    Ok(())
}

/// Bounds must already carry the key's type; routing compares them with the
/// coerced key as they are.
fn check_bound_types(rule: &PartitionRule, key: &PartitionKey) -> Result<()> {
    let check = |v: &Value| -> Result<()> {
        if v.is_null() || v.data_type() == Some(key.data_type) {
            Ok(())
        } else {
            Err(Error::MalformedHierarchy(format!(
                "rule '{}' bound {} does not fit key type {}",
                rule.name, v, key.data_type
            )))
        }
    };
    match &rule.bound {
        PartitionBound::Range { lower, upper } => {
            for side in [lower, upper] {
                if let RangeBound::Inclusive(v) | RangeBound::Exclusive(v) = side {
                    check(v)?;
                }
            }
            Ok(())
        }
        PartitionBound::List(values) => values.iter().try_for_each(check),
        PartitionBound::Default => Ok(()),
    }
}
