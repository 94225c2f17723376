//! Build script for generating Rust code from protobuf definitions.

use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Tell Cargo to rerun if proto files change
    println!("cargo:rerun-if-changed=proto/");

    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);

    tonic_build::configure()
        .build_server(true)
        // Client code is used by the transport tests
        .build_client(true)
        .file_descriptor_set_path(out_dir.join("checklist_descriptor.bin"))
        .compile(&["proto/ova/checklist/v1/checklist.proto"], &["proto/"])?;

    Ok(())
}
