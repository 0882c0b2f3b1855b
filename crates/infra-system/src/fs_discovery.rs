// File-system input discovery
// reason: walkdir for the bounded scan, regex for Sentinel-2 product naming
use chrono::NaiveDate;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use fanout_core::port::{InputDiscovery, ProductType, SearchDescriptor};
use fanout_core::{AppError, Result};

const L1C_PRODUCT_PATTERNS: &[&str] = &[
    r"^S2[AB]_OPER_PRD_MSIL1C_PDMC_\d{8}T\d{6}_R\d{3}_V(?P<date>\d{8})T\d{6}_\d{8}T\d{6}(?:\.SAFE)?$",
    r"^S2[AB]_MSIL1C_(?P<date>\d{8})T\d{6}_N\d{4}_R\d{3}_(?P<tile>T\d{2}\w{3})_\d{8}T\d{6}(?:\.SAFE)?$",
    r"^S2[AB]_OPER_MSI_L1C_TL_\w{3}__(?P<date>\d{8})T\d{6}_A\d{6}_(?P<tile>T\d{2}\w{3})_N\d{2}\.\d{2}$",
];

const L2A_PRODUCT_PATTERNS: &[&str] = &[
    r"^S2[AB]_(?:OPER|USER)_PRD_MSIL2A_PDMC_\d{8}T\d{6}_R\d{3}_V(?P<date>\d{8})T\d{6}_\d{8}T\d{6}(?:\.SAFE)?$",
    r"^S2[AB]_MSIL2A_(?P<date>\d{8})T\d{6}_N\d{4}_R\d{3}_(?P<tile>T\d{2}\w{3})_\d{8}T\d{6}(?:\.SAFE)?$",
];

const L1C_METADATA_PATTERNS: &[&str] = &[
    r"^.*S2[AB]_[A-Z0-9]{4}_[A-Z0-9_]{4}[A-Z0-9]{3}L1C_[A-Z0-9_]{4}_\d{8}T\d{6}[A-Z0-9_]+\.(?:xml|XML)$",
    r"^MTD_MSIL1C\.xml$",
];

const L2A_METADATA_PATTERNS: &[&str] = &[
    r"^.*(?:S2A|S2B|S2_)_[A-Z0-9]{4}_[A-Z0-9_]{4}[A-Z0-9]{3}L2A_[A-Z0-9_]{4}_\d{8}T\d{6}[A-Z0-9_]+\.(?:xml|XML)$",
    r"^MTD_MSIL2A\.xml$",
];

/// Tile and sensing date carried by a product name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductInfo {
    pub tile: Option<String>,
    pub sensing_date: Option<NaiveDate>,
}

struct NamingRules {
    products: Vec<Regex>,
    metadata: Vec<Regex>,
}

impl NamingRules {
    fn compile(products: &[&str], metadata: &[&str]) -> Result<Self> {
        let compile_all = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| AppError::Config(format!("invalid product pattern: {e}")))
        };
        Ok(Self {
            products: compile_all(products)?,
            metadata: compile_all(metadata)?,
        })
    }

    fn product_info(&self, name: &str) -> Option<ProductInfo> {
        let captures = self.products.iter().find_map(|re| re.captures(name))?;
        Some(ProductInfo {
            tile: captures.name("tile").map(|m| m.as_str().to_string()),
            sensing_date: captures
                .name("date")
                .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y%m%d").ok()),
        })
    }

    fn is_metadata(&self, name: &str) -> bool {
        self.metadata.iter().any(|re| re.is_match(name))
    }
}

/// Scans the first level of the input folder for Sentinel-2 products
pub struct FsInputDiscovery {
    l1c: NamingRules,
    l2a: NamingRules,
}

impl FsInputDiscovery {
    pub fn new() -> Result<Self> {
        Ok(Self {
            l1c: NamingRules::compile(L1C_PRODUCT_PATTERNS, L1C_METADATA_PATTERNS)?,
            l2a: NamingRules::compile(L2A_PRODUCT_PATTERNS, L2A_METADATA_PATTERNS)?,
        })
    }

    fn rules(&self, product_type: ProductType) -> &NamingRules {
        match product_type {
            ProductType::L1c => &self.l1c,
            ProductType::L2a => &self.l2a,
        }
    }

    /// Tile and date of a product name of the given level, when it follows a known naming
    pub fn product_info(&self, product_type: ProductType, name: &str) -> Option<ProductInfo> {
        self.rules(product_type).product_info(name)
    }

    /// First metadata file directly inside `folder`, in file-name order
    fn find_metadata(&self, rules: &NamingRules, folder: &Path) -> Option<PathBuf> {
        WalkDir::new(folder)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| rules.is_metadata(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.into_path())
    }
}

/// `path` relative to `root`, `/`-separated
fn relative_input(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

impl InputDiscovery for FsInputDiscovery {
    fn discover(&self, root: &Path, search: &SearchDescriptor) -> Result<Vec<String>> {
        if !root.is_dir() {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input folder {} does not exist", root.display()),
            )));
        }
        let rules = self.rules(search.product_type);
        let mut inputs = Vec::new();

        for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let info = rules.product_info(&name);

            if let Some(info) = &info {
                if !search.accepts_tile(info.tile.as_deref())
                    || !search.accepts_date(info.sensing_date)
                {
                    debug!(product = %name, "Outside the requested tiles or dates");
                    continue;
                }
            }

            let candidate = if search.look_for_folders {
                (entry.file_type().is_dir() && info.is_some()).then(|| entry.path().to_path_buf())
            } else if entry.file_type().is_dir() {
                self.find_metadata(rules, entry.path())
            } else {
                rules.is_metadata(&name).then(|| entry.path().to_path_buf())
            };

            match candidate.as_deref().and_then(|path| relative_input(root, path)) {
                Some(input) => inputs.push(input),
                None => debug!(entry = %name, "No {} input found", search.product_type),
            }
        }
        Ok(inputs)
    }
}
