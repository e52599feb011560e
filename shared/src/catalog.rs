//! The gesture categories and the symbols an operator can record for each of them.

use crate::error::CaptureError;
use crate::types::Selection;

pub struct Category {
    /// Key sent to the backend as the sample's `category`.
    pub key: &'static str,
    pub name: &'static str,
    pub symbols: &'static [&'static str],
}

pub const CATEGORIES: &[Category] = &[
    Category {
        key: "vocales",
        name: "Vowels",
        symbols: &["A", "E", "I", "O", "U"],
    },
    Category {
        key: "abecedario",
        name: "Alphabet",
        symbols: &[
            "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q",
            "R", "S", "T", "U", "V", "W", "X", "Y", "Z",
        ],
    },
    Category {
        key: "numeros",
        name: "Numbers",
        symbols: &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"],
    },
    Category {
        key: "operaciones",
        name: "Operations",
        symbols: &["+", "-", "×", "÷", "=", "%"],
    },
];

pub fn find(key: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|category| category.key == key)
}

impl Category {
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains(&symbol)
    }

    pub fn first_symbol(&self) -> &'static str {
        self.symbols[0]
    }
}

impl Selection {
    /// Validates a configured selection, falling back to the category's first symbol when the
    /// label does not belong to it.
    pub fn new(category: &str, label: &str) -> Result<Self, CaptureError> {
        let found = find(category)
            .ok_or_else(|| CaptureError::Validation(format!("unknown category '{}'", category)))?;
        let label = if found.contains(label) {
            label
        } else {
            found.first_symbol()
        };
        Ok(Self {
            category: found.key.to_string(),
            label: label.to_string(),
        })
    }

    /// Switches category. The label resets to the category's first symbol.
    pub fn select_category(&mut self, key: &str) -> Result<(), CaptureError> {
        let found = find(key)
            .ok_or_else(|| CaptureError::Validation(format!("unknown category '{}'", key)))?;
        self.category = found.key.to_string();
        self.label = found.first_symbol().to_string();
        Ok(())
    }

    pub fn select_label(&mut self, label: &str) -> Result<(), CaptureError> {
        let category = find(&self.category)
            .ok_or_else(|| CaptureError::Validation(format!("unknown category '{}'", self.category)))?;
        if !category.contains(label) {
            return Err(CaptureError::Validation(format!(
                "'{}' is not a symbol of category '{}'",
                label, category.key
            )));
        }
        self.label = label.to_string();
        Ok(())
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            category: "vocales".to_string(),
            label: "A".to_string(),
        }
    }
}
