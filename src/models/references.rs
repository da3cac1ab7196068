use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::embeddings::Embedding;
use crate::error::{AppError, Result};

/// Label of a reference image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodClass {
    /// Known-good example.
    Fresh,
    /// Known-spoiled example.
    Rotten,
}

impl FoodClass {
    /// Lowercase name used in paths and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Rotten => "rotten",
        }
    }
}

impl fmt::Display for FoodClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FoodClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" => Ok(Self::Fresh),
            "rotten" => Ok(Self::Rotten),
            other => Err(AppError::InvalidInput(format!(
                "unknown reference class '{}', expected 'fresh' or 'rotten'",
                other
            ))),
        }
    }
}

/// Which reference classes currently have at least one embedding.
///
/// This is also the branch the scorer takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceState {
    /// No references at all.
    Empty,
    /// Only fresh references.
    FreshOnly,
    /// Only rotten references.
    RottenOnly,
    /// Both classes populated.
    Full,
}

/// Append-only store of reference embeddings per class.
///
/// All stored embeddings share one dimensionality. Insertion order is kept and
/// duplicates are allowed; the only removal is [`ReferenceSet::clear`].
#[derive(Debug, Default, PartialEq)]
pub struct ReferenceSet {
    fresh: Vec<Embedding>,
    rotten: Vec<Embedding>,
}

impl ReferenceSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one embedding to the given class.
    pub fn add(&mut self, class: FoodClass, embedding: Embedding) -> Result<()> {
        self.ensure_compatible(&embedding)?;
        self.class_mut(class).push(embedding);
        Ok(())
    }

    /// Append a batch to one class. Either every embedding is stored or none is.
    pub fn extend(&mut self, class: FoodClass, embeddings: Vec<Embedding>) -> Result<usize> {
        let mut expected = self.dimension();
        for embedding in &embeddings {
            match expected {
                Some(dim) if dim != embedding.dim() => {
                    return Err(AppError::DimensionMismatch {
                        expected: dim,
                        actual: embedding.dim(),
                    })
                }
                _ => expected = Some(embedding.dim()),
            }
        }

        let added = embeddings.len();
        self.class_mut(class).extend(embeddings);
        Ok(added)
    }

    /// Drop every stored embedding.
    pub fn clear(&mut self) {
        self.fresh.clear();
        self.rotten.clear();
    }

    /// Fresh references in insertion order.
    pub fn fresh(&self) -> &[Embedding] {
        &self.fresh
    }

    /// Rotten references in insertion order.
    pub fn rotten(&self) -> &[Embedding] {
        &self.rotten
    }

    /// References of one class.
    pub fn get(&self, class: FoodClass) -> &[Embedding] {
        match class {
            FoodClass::Fresh => &self.fresh,
            FoodClass::Rotten => &self.rotten,
        }
    }

    /// Number of references of one class.
    pub fn len(&self, class: FoodClass) -> usize {
        self.get(class).len()
    }

    /// True when neither class holds anything.
    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty() && self.rotten.is_empty()
    }

    /// Dimensionality shared by the stored embeddings, if any are stored.
    pub fn dimension(&self) -> Option<usize> {
        self.fresh
            .first()
            .or_else(|| self.rotten.first())
            .map(Embedding::dim)
    }

    /// Current population state.
    pub fn state(&self) -> ReferenceState {
        match (self.fresh.is_empty(), self.rotten.is_empty()) {
            (true, true) => ReferenceState::Empty,
            (false, true) => ReferenceState::FreshOnly,
            (true, false) => ReferenceState::RottenOnly,
            (false, false) => ReferenceState::Full,
        }
    }

    fn ensure_compatible(&self, embedding: &Embedding) -> Result<()> {
        match self.dimension() {
            Some(dim) if dim != embedding.dim() => Err(AppError::DimensionMismatch {
                expected: dim,
                actual: embedding.dim(),
            }),
            _ => Ok(()),
        }
    }

    fn class_mut(&mut self, class: FoodClass) -> &mut Vec<Embedding> {
        match class {
            FoodClass::Fresh => &mut self.fresh,
            FoodClass::Rotten => &mut self.rotten,
        }
    }
}
