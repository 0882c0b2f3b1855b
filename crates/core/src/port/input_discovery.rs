// Input Discovery Port
// Finds candidate input products below the shared input folder

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Processing level of the products to look for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    #[default]
    L1c,
    L2a,
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::L1c => write!(f, "L1C"),
            ProductType::L2a => write!(f, "L2A"),
        }
    }
}

/// Search criteria
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDescriptor {
    #[serde(default)]
    pub product_type: ProductType,
    /// Tile ids such as `T34TFQ`; empty accepts every tile
    #[serde(default)]
    pub tiles: Vec<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Treat product folders themselves as inputs instead of their metadata file
    #[serde(default)]
    pub look_for_folders: bool,
}

impl SearchDescriptor {
    pub fn accepts_tile(&self, tile: Option<&str>) -> bool {
        match tile {
            _ if self.tiles.is_empty() => true,
            Some(tile) => self
                .tiles
                .iter()
                .any(|t| t.trim_start_matches('T').eq_ignore_ascii_case(tile.trim_start_matches('T'))),
            None => true,
        }
    }

    /// Inclusive range check. Products without a sensing date are accepted.
    pub fn accepts_date(&self, date: Option<NaiveDate>) -> bool {
        let Some(date) = date else {
            return true;
        };
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }
}

/// Input discovery port
pub trait InputDiscovery: Send + Sync {
    /// Candidate inputs below `root`, as `/`-separated paths relative to it
    fn discover(&self, root: &Path, search: &SearchDescriptor) -> Result<Vec<String>>;
}

/// Inputs supplied up front instead of scanned
#[derive(Debug, Clone, Default)]
pub struct FixedInputs {
    inputs: Vec<String>,
}

impl FixedInputs {
    pub fn new(inputs: Vec<String>) -> Self {
        Self { inputs }
    }
}

impl InputDiscovery for FixedInputs {
    fn discover(&self, _root: &Path, _search: &SearchDescriptor) -> Result<Vec<String>> {
        Ok(self.inputs.clone())
    }
}
