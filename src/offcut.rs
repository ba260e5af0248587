use crate::error::{Error, Result};

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// Whether an offcut can still be cut from.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OffcutStatus {
    /// The offcut is in stock.
    #[default]
    Available,
    /// The offcut was consumed by an earlier job.
    Used,
}

/// A leftover piece of bar from an earlier cutting run.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct OffcutPiece {
    /// ID reported back when this offcut is consumed.
    pub id: String,

    /// Usable length.
    pub length: f64,

    /// ID of the job or bar that produced this offcut.
    pub source_id: Option<String>,

    /// Diameter of the offcut. `None` offers the offcut to every diameter.
    pub diameter: Option<u32>,

    /// Inventory status. Only available offcuts are offered to solvers.
    pub status: OffcutStatus,
}

impl OffcutPiece {
    /// Creates an available offcut with no source and no diameter.
    pub fn new(id: impl Into<String>, length: f64) -> Self {
        Self {
            id: id.into(),
            length,
            source_id: None,
            diameter: None,
            status: OffcutStatus::Available,
        }
    }

    /// Sets the producing job or bar.
    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Restricts the offcut to one diameter.
    pub fn with_diameter(mut self, diameter: u32) -> Self {
        self.diameter = Some(diameter);
        self
    }

    /// Whether the offcut can be offered to a solve for `diameter`.
    pub fn is_available_for(&self, diameter: u32) -> bool {
        self.status == OffcutStatus::Available && self.diameter.map_or(true, |d| d == diameter)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.length.is_finite() || self.length <= 0.0 {
            return Err(Error::InvalidOffcut {
                offcut_id: self.id.clone(),
                length: self.length,
            });
        }
        Ok(())
    }
}

/// Validates `offcuts` and keeps those available for `diameter`, in input order.
pub(crate) fn available_offcuts(
    offcuts: &[OffcutPiece],
    diameter: u32,
) -> Result<Vec<&OffcutPiece>> {
    offcuts.iter().try_for_each(OffcutPiece::validate)?;
    Ok(offcuts
        .iter()
        .filter(|offcut| offcut.is_available_for(diameter))
        .collect())
}
