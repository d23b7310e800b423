//! Multi-valued attribute maps and the minimal diff between them.
//!
//! An [`AttributeMap`] maps attribute names to sets of values. A key with no values is never
//! stored, so an absent key and an empty set are the same thing. [`diff`] computes the
//! add/remove operations that turn one map into another; it is the only way directory updates
//! are built.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Ordered attribute map with set-valued attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AttributeMap(BTreeMap<String, BTreeSet<String>>);

impl AttributeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`AttributeMap::set`].
    #[must_use]
    pub fn with<I, V>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.set(attribute, values);
        self
    }

    /// Replaces all values of an attribute. An empty value list removes the attribute.
    pub fn set<I, V>(&mut self, attribute: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let attribute = attribute.into();
        let values = values.into_iter().map(Into::into).collect::<BTreeSet<_>>();
        if values.is_empty() {
            self.0.remove(&attribute);
        } else {
            self.0.insert(attribute, values);
        }
    }

    /// Adds one value. Returns false if it was already present.
    pub fn insert_value(&mut self, attribute: impl Into<String>, value: impl Into<String>) -> bool {
        self.0
            .entry(attribute.into())
            .or_default()
            .insert(value.into())
    }

    /// Removes one value. Returns false if it was not present.
    pub fn remove_value(&mut self, attribute: &str, value: &str) -> bool {
        let Some(values) = self.0.get_mut(attribute) else {
            return false;
        };
        let removed = values.remove(value);
        if values.is_empty() {
            self.0.remove(attribute);
        }
        removed
    }

    /// Removes an attribute entirely.
    pub fn remove(&mut self, attribute: &str) -> Option<BTreeSet<String>> {
        self.0.remove(attribute)
    }

    /// Returns the values of an attribute.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&BTreeSet<String>> {
        self.0.get(attribute)
    }

    /// Returns the smallest value of an attribute (the only one for single-valued attributes).
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.0
            .get(attribute)
            .and_then(|values| values.iter().next().map(String::as_str))
    }

    /// Returns true if the attribute holds the given value.
    #[must_use]
    pub fn contains_value(&self, attribute: &str, value: &str) -> bool {
        self.0
            .get(attribute)
            .is_some_and(|values| values.contains(value))
    }

    /// Returns true if the attribute has at least one value.
    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }

    /// Number of attributes with at least one value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no attribute has a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Applies diff operations in order.
    pub fn apply(&mut self, modifications: &[Modification]) {
        for modification in modifications {
            match modification {
                Modification::Add { attribute, values } => {
                    self.0
                        .entry(attribute.clone())
                        .or_default()
                        .extend(values.iter().cloned());
                }
                Modification::Remove { attribute, values } => {
                    if let Some(current) = self.0.get_mut(attribute) {
                        current.retain(|value| !values.contains(value));
                        if current.is_empty() {
                            self.0.remove(attribute);
                        }
                    }
                }
            }
        }
    }
}

impl From<HashMap<String, Vec<String>>> for AttributeMap {
    fn from(attributes: HashMap<String, Vec<String>>) -> Self {
        let mut map = Self::new();
        for (attribute, values) in attributes {
            map.set(attribute, values);
        }
        map
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AttributeMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (attribute, value) in iter {
            map.insert_value(attribute, value);
        }
        map
    }
}

/// One step of a directory update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Modification {
    /// Remove the listed values.
    Remove {
        /// Attribute to modify.
        attribute: String,
        /// Values to remove (never empty).
        values: BTreeSet<String>,
    },
    /// Add the listed values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add (never empty).
        values: BTreeSet<String>,
    },
}

impl Modification {
    /// Attribute touched by this operation.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Remove { attribute, .. } | Self::Add { attribute, .. } => attribute,
        }
    }

    /// Values carried by this operation.
    #[must_use]
    pub fn values(&self) -> &BTreeSet<String> {
        match self {
            Self::Remove { values, .. } | Self::Add { values, .. } => values,
        }
    }
}

/// Computes the operations that turn `old` into `new`.
///
/// Operations are ordered by attribute name, removals before additions, and never carry an
/// empty value set. `diff(a, a)` is empty.
#[must_use]
pub fn diff(old: &AttributeMap, new: &AttributeMap) -> Vec<Modification> {
    let empty = BTreeSet::new();
    let keys = old.0.keys().chain(new.0.keys()).collect::<BTreeSet<_>>();

    let mut modifications = Vec::new();
    for key in keys {
        let before = old.0.get(key).unwrap_or(&empty);
        let after = new.0.get(key).unwrap_or(&empty);

        let removed = before.difference(after).cloned().collect::<BTreeSet<_>>();
        if !removed.is_empty() {
            modifications.push(Modification::Remove {
                attribute: key.clone(),
                values: removed,
            });
        }

        let added = after.difference(before).cloned().collect::<BTreeSet<_>>();
        if !added.is_empty() {
            modifications.push(Modification::Add {
                attribute: key.clone(),
                values: added,
            });
        }
    }
    modifications
}

/// Narrows `modifications` to what still changes `current`.
///
/// Added values already present and removed values already absent are dropped, as are
/// operations left without values. Applying the result to `current` gives the same map as
/// applying `modifications`.
#[must_use]
pub fn outstanding(modifications: &[Modification], current: &AttributeMap) -> Vec<Modification> {
    modifications
        .iter()
        .filter_map(|modification| {
            let attribute = modification.attribute();
            let values = modification
                .values()
                .iter()
                .filter(|value| {
                    let present = current.contains_value(attribute, value);
                    match modification {
                        Modification::Add { .. } => !present,
                        Modification::Remove { .. } => present,
                    }
                })
                .cloned()
                .collect::<BTreeSet<_>>();
            if values.is_empty() {
                return None;
            }
            let attribute = attribute.to_string();
            Some(match modification {
                Modification::Add { .. } => Modification::Add { attribute, values },
                Modification::Remove { .. } => Modification::Remove { attribute, values },
            })
        })
        .collect()
}
