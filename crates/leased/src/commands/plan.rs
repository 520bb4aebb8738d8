use std::path::Path;

use anyhow::Context;
use lease_bootstrap::{ReferenceParams, reference_plan};
use lease_core::LeaseDescriptor;

pub fn describe(bucket: &str) -> anyhow::Result<()> {
    let descriptor = LeaseDescriptor::reference(bucket);
    descriptor.validate()?;
    println!("# fingerprint: {}", descriptor.fingerprint());
    print!("{}", descriptor.to_toml_string()?);
    Ok(())
}

pub fn plan(descriptor_path: &Path, json: bool) -> anyhow::Result<()> {
    let descriptor = LeaseDescriptor::from_file(descriptor_path)
        .with_context(|| format!("loading {}", descriptor_path.display()))?;
    let plan = reference_plan(&descriptor, &ReferenceParams::default())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "{} ({} steps, fingerprint {})",
        descriptor.security_group_name(),
        plan.len(),
        descriptor.fingerprint()
    );
    for (i, step) in plan.steps().iter().enumerate() {
        let marker = if step.idempotent { "" } else { " [once]" };
        println!("{:>3}. {}{}", i + 1, step.name, marker);
        println!("       {}", step.action);
        if let Some(check) = &step.check {
            println!("       skip if: {check}");
        }
    }
    Ok(())
}
