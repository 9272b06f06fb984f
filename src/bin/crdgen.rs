//! # CRD Generator
//!
//! Prints the Backend, Product and Application CustomResourceDefinitions as a
//! multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use capabilities_controller::crd::{Application, Backend, Product};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let backend = serde_yaml::to_string(&Backend::crd()).context("Failed to serialize Backend CRD")?;
    let product = serde_yaml::to_string(&Product::crd()).context("Failed to serialize Product CRD")?;
    let application = serde_yaml::to_string(&Application::crd())
        .context("Failed to serialize Application CRD")?;
    print!("---\n{backend}---\n{product}---\n{application}");
    Ok(())
}
