use std::env;
use std::fs;
use std::path::PathBuf;

// Records the cargo features this build was compiled with for `nexus_search::compiled_features()`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=build.rs");
    let out = PathBuf::from(env::var("OUT_DIR")?);
    let mut features: Vec<String> = env::vars()
        .filter_map(|(k, _)| k.strip_prefix("CARGO_FEATURE_").map(|n| n.to_ascii_lowercase().replace('_', "-")))
        .filter(|f| f != "default")
        .collect();
    features.sort();
    let list = features.iter().map(|s| format!("{s:?}")).collect::<Vec<_>>().join(", ");
    fs::write(out.join("compiled_features.rs"), format!("pub static COMPILED_FEATURES: &[&str] = &[{list}];\n"))?;
    Ok(())
}
