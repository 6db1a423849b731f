//! Manifest schema generator
//!
//! Prints the JSON schema of the manifest format as YAML.
//! Usage: `cargo run -p resources --bin schemagen > manifest.schema.yaml`

use resources::Manifest;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let schema = schemars::schema_for!(Manifest);
    print!("{}", serde_yaml::to_string(&schema)?);
    Ok(())
}
