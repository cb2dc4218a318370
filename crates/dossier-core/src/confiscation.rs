//! Drug confiscation records and aggregation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::text;

pub const LOCATION_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 120;
pub const NOTES_MAX_CHARS: usize = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrugType {
    Cannabis,
    Cocaine,
    Heroin,
    Amphetamine,
    Methamphetamine,
    Mdma,
    Lsd,
    Other,
}

text_enum!(DrugType {
    Cannabis => "cannabis",
    Cocaine => "cocaine",
    Heroin => "heroin",
    Amphetamine => "amphetamine",
    Methamphetamine => "methamphetamine",
    Mdma => "mdma",
    Lsd => "lsd",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityUnit {
    Gram,
    Kilogram,
    Piece,
    Milliliter,
}

text_enum!(QuantityUnit {
    Gram => "gram",
    Kilogram => "kilogram",
    Piece => "piece",
    Milliliter => "milliliter",
});

/// What a quantity measures; amounts are only summed within one class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    /// grams
    Mass,
    /// pills, blotters, plants
    Count,
    /// milliliters
    Volume,
}

impl QuantityUnit {
    pub fn class(&self) -> UnitClass {
        match self {
            QuantityUnit::Gram | QuantityUnit::Kilogram => UnitClass::Mass,
            QuantityUnit::Piece => UnitClass::Count,
            QuantityUnit::Milliliter => UnitClass::Volume,
        }
    }

    /// Factor to the base unit of the class
    fn base_factor(&self) -> f64 {
        match self {
            QuantityUnit::Kilogram => 1000.0,
            _ => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    pub unit: QuantityUnit,
}

impl Quantity {
    pub fn new(amount: f64, unit: QuantityUnit) -> DomainResult<Self> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(DomainError::validation("Quantity must be a positive number"));
        }
        if unit == QuantityUnit::Piece && amount.fract() != 0.0 {
            return Err(DomainError::validation("Piece counts must be whole numbers"));
        }
        Ok(Self { amount, unit })
    }

    /// Amount in grams, pieces or milliliters
    pub fn in_base_unit(&self) -> f64 {
        self.amount * self.unit.base_factor()
    }
}

/// Validated fields of a confiscation record
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiscationInput {
    pub drug_type: DrugType,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub location: Option<String>,
    pub notes: Option<String>,
}

impl ConfiscationInput {
    pub fn new(
        drug_type: DrugType,
        description: Option<&str>,
        quantity: Quantity,
        location: Option<&str>,
        notes: Option<&str>,
    ) -> DomainResult<Self> {
        let description = text::optional_line("Description", description, DESCRIPTION_MAX_CHARS)?;
        if drug_type == DrugType::Other && description.is_none() {
            return Err(DomainError::validation(
                "A description is required for drug type 'other'",
            ));
        }
        let location = text::optional_line("Location", location, LOCATION_MAX_CHARS)?;
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        if let Some(n) = notes {
            if n.chars().count() > NOTES_MAX_CHARS {
                return Err(DomainError::validation(format!(
                    "Notes must be at most {NOTES_MAX_CHARS} characters"
                )));
            }
        }
        Ok(Self {
            drug_type,
            description,
            quantity,
            location,
            notes: notes.map(str::to_string),
        })
    }
}

/// One line of the seizure statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryLine {
    pub drug_type: DrugType,
    pub unit_class: UnitClass,
    pub total: f64,
    pub records: u32,
}

/// Totals per drug type and unit class, ordered by drug type
pub fn summarize<'a>(
    items: impl IntoIterator<Item = (DrugType, &'a Quantity)>,
) -> Vec<SummaryLine> {
    let mut totals: BTreeMap<(DrugType, UnitClass), (f64, u32)> = BTreeMap::new();
    for (drug, qty) in items {
        let entry = totals.entry((drug, qty.unit.class())).or_insert((0.0, 0));
        entry.0 += qty.in_base_unit();
        entry.1 += 1;
    }
    totals
        .into_iter()
        .map(|((drug_type, unit_class), (total, records))| SummaryLine {
            drug_type,
            unit_class,
            total,
            records,
        })
        .collect()
}
