use crate::models::document_schema;
use crate::Result;

/// Print the JSON Schema of the state document
pub fn run() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&document_schema())?);
    Ok(())
}
