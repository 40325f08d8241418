//! Databricks type name -> short display code
//!
//! The codes are what the host shows next to a column in the results grid
//! and the catalog tree.

/// Code shown for types this table does not know
pub const UNKNOWN_TYPE_CODE: &str = "?";

/// Map a vendor type name to its short display code.
///
/// Case-insensitive. Parameterized names are reduced to their base type
/// first, so `decimal(10,2)`, `ARRAY<INT>` and `INTERVAL DAY TO SECOND` map
/// like `DECIMAL`, `ARRAY` and `INTERVAL`.
pub fn short_type_code(type_name: &str) -> &'static str {
    let upper = type_name.trim().to_uppercase();

    match base_type(&upper) {
        "ARRAY" => "[]",
        "BIGINT" | "LONG" => "###",
        "BINARY" => "010",
        "BOOLEAN" => "t/f",
        "DATE" => "d",
        "DECIMAL" | "DOUBLE" | "FLOAT" => "#.#",
        "INT" => "##",
        "INTERVAL" => "|-|",
        "MAP" => "m",
        "NULL" | "VOID" => "nul",
        "SHORT" | "SMALLINT" | "TINYINT" => "#",
        "STRING" => "s",
        "STRUCT" => "{}",
        "TIMESTAMP" => "ts",
        "TIMESTAMP_NTZ" => "ntz",
        _ => UNKNOWN_TYPE_CODE,
    }
}

fn base_type(type_name: &str) -> &str {
    type_name
        .split(|c: char| c == '(' || c == '<' || c.is_whitespace())
        .next()
        .unwrap_or(type_name)
}
