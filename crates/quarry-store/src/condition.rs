//! Structured write conditions and scan filters.
//!
//! A [`Condition`] is a conjunction of clauses over attribute values. The
//! DynamoDB backend compiles it into an expression with every attribute name
//! and value bound through placeholders; the in-memory backend evaluates it
//! directly.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::Item;

/// Test applied to a single attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The attribute is present and equal to the value.
    Equals(AttributeValue),
    /// The attribute is present.
    Exists,
    /// The attribute is absent (or the whole item is).
    NotExists,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub attribute: String,
    pub predicate: Predicate,
}

/// All clauses must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    clauses: Vec<Clause>,
}

/// A condition rendered into the store's expression syntax.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledCondition {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl Condition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-only guard: no item with this key exists yet.
    pub fn item_absent(key_attribute: impl Into<String>) -> Self {
        Self::new().not_exists(key_attribute)
    }

    pub fn equals(mut self, attribute: impl Into<String>, value: AttributeValue) -> Self {
        self.clauses.push(Clause {
            attribute: attribute.into(),
            predicate: Predicate::Equals(value),
        });
        self
    }

    pub fn exists(mut self, attribute: impl Into<String>) -> Self {
        self.clauses.push(Clause {
            attribute: attribute.into(),
            predicate: Predicate::Exists,
        });
        self
    }

    pub fn not_exists(mut self, attribute: impl Into<String>) -> Self {
        self.clauses.push(Clause {
            attribute: attribute.into(),
            predicate: Predicate::NotExists,
        });
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Evaluate against the current item (`None` when no item exists).
    pub fn evaluate(&self, item: Option<&Item>) -> bool {
        self.clauses.iter().all(|clause| {
            let current = item.and_then(|i| i.get(&clause.attribute));
            match &clause.predicate {
                Predicate::Equals(expected) => current == Some(expected),
                Predicate::Exists => current.is_some(),
                Predicate::NotExists => current.is_none(),
            }
        })
    }

    /// Render as a DynamoDB condition/filter expression.
    ///
    /// Every attribute name is aliased, so reserved words like `Name` and
    /// `Group` are safe. An attribute referenced twice shares one alias.
    pub fn compile(&self) -> CompiledCondition {
        let mut compiled = CompiledCondition::default();
        let mut aliases: HashMap<&str, String> = HashMap::new();
        let mut parts = Vec::with_capacity(self.clauses.len());

        for clause in &self.clauses {
            let next = aliases.len();
            let alias = aliases
                .entry(clause.attribute.as_str())
                .or_insert_with(|| format!("#a{}", next))
                .clone();
            compiled
                .names
                .insert(alias.clone(), clause.attribute.clone());

            let part = match &clause.predicate {
                Predicate::Equals(value) => {
                    let placeholder = format!(":v{}", compiled.values.len());
                    compiled.values.insert(placeholder.clone(), value.clone());
                    format!("{} = {}", alias, placeholder)
                }
                Predicate::Exists => format!("attribute_exists({})", alias),
                Predicate::NotExists => format!("attribute_not_exists({})", alias),
            };
            parts.push(part);
        }

        compiled.expression = parts.join(" AND ");
        compiled
    }
}
