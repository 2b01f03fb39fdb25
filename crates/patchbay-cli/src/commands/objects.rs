//! Object class listing command.

use clap::Args;
use patchbay_engine::{ObjectCategory, ObjectRegistry};

#[derive(Args)]
pub struct ObjectsArgs {
    /// Show details for a specific class
    #[arg(value_name = "CLASS")]
    class: Option<String>,
}

pub fn run(args: ObjectsArgs) -> anyhow::Result<()> {
    let registry = ObjectRegistry::with_builtins();

    if let Some(name) = &args.class {
        let descriptor = registry
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown object class: {}", name))?;
        let object = registry.create(name, &[])?;

        println!("{}", descriptor.name);
        println!("{}", "=".repeat(descriptor.name.len()));
        println!();
        println!("{}", descriptor.description);
        println!();
        println!("  Category: {}", descriptor.category.name());
        println!("  Inlets:   {}", pin_list(object.inlets()));
        println!("  Outlets:  {}", pin_list(object.outlets()));
        return Ok(());
    }

    println!("Object Classes");
    println!("==============");
    for category in [
        ObjectCategory::Control,
        ObjectCategory::Signal,
        ObjectCategory::Placeholder,
    ] {
        println!();
        println!("{}:", category.name());
        for descriptor in registry.in_category(category) {
            println!("  {:10} - {}", descriptor.name, descriptor.description);
        }
    }
    println!();
    println!("Use 'patchbay objects <class>' for pin details.");
    Ok(())
}

fn pin_list(pins: &[patchbay_engine::PinKind]) -> String {
    if pins.is_empty() {
        return "none".to_string();
    }
    pins.iter()
        .map(|p| if p.is_signal() { "signal" } else { "control" })
        .collect::<Vec<_>>()
        .join(", ")
}
