//! Schema command - print expected input formats

use crate::engine::RawInput;
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output format: json-schema or price-header
    #[arg(value_enum, default_value = "json-schema")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for the exported activity document
    JsonSchema,
    /// CSV header row of the price table
    PriceHeader,
    /// Price table column descriptions
    PriceFields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::JsonSchema => {
                let schema = schema_for!(RawInput);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::PriceHeader => {
                let names: Vec<&str> = PRICE_FIELDS.iter().map(|(name, _)| *name).collect();
                println!("{}", names.join(","));
            }
            SchemaFormat::PriceFields => {
                println!("Price Table Format");
                println!("==================");
                println!();
                for (name, description) in PRICE_FIELDS {
                    println!("{:8}  {}", name, description);
                }
                println!();
                println!("One row per asset and calendar day; conflicting rows are rejected.");
            }
        }
        Ok(())
    }
}

const PRICE_FIELDS: &[(&str, &str)] = &[
    ("asset", "Asset identifier (XTZ, or SYMBOL:contract:tokenId:standard for tokens)"),
    ("date", "Calendar day (YYYY-MM-DD, UTC)"),
    ("price", "Unit price on that day in the reporting currency"),
];
