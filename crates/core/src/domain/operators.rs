// Operators the orchestrator treats specially

/// Reads a single product from a file argument
pub const READ: &str = "Read";
/// Writes the graph result to a file
pub const WRITE: &str = "Write";
/// Aggregation operator run on the coordinator over every worker output
pub const AGGREGATION: &str = "Mosaic";
/// Atmospheric correction, takes a product folder directly
pub const ATMOSPHERIC_CORRECTION: &str = "Sen2Cor";

/// Operators that consume a whole folder and write their own outputs
pub const FOLDER_OPERATORS: &[&str] = &[ATMOSPHERIC_CORRECTION, "Sen2Three"];

pub const ARG_FILE: &str = "file";
pub const ARG_SOURCE_FOLDER: &str = "sourceFolder";
pub const ARG_FORMAT_NAME: &str = "formatName";

pub const DEFAULT_OUTPUT_FORMAT: &str = "GeoTIFF-BigTIFF";

pub fn is_folder_operator(operator: &str) -> bool {
    FOLDER_OPERATORS.contains(&operator)
}

pub fn is_aggregation(operator: &str) -> bool {
    operator == AGGREGATION
}

/// True when the operator can be pointed at an input without a dedicated read step
pub fn takes_direct_input(operator: &str) -> bool {
    operator == READ || operator == ATMOSPHERIC_CORRECTION
}

/// Argument that receives the job input for an operator taking direct input
pub fn input_argument(operator: &str) -> &'static str {
    if operator == ATMOSPHERIC_CORRECTION {
        ARG_SOURCE_FOLDER
    } else {
        ARG_FILE
    }
}
