// ports.rs — `tb ports`: list registered node types and their ports.

use tb_action::EventDispatcher;
use tb_tree::{NodeManifest, NodeRegistry};

use crate::run_file::RunFile;
use crate::sleep::demo_registry;

pub fn execute(json: bool) -> anyhow::Result<()> {
    let defaults = RunFile::from_toml_str("")?;
    let registry = demo_registry(&defaults.sleep_action, EventDispatcher::new())?;

    if json {
        let manifests: Vec<&NodeManifest> = registry.manifests().collect();
        println!("{}", serde_json::to_string_pretty(&manifests)?);
    } else {
        print!("{}", render(&registry));
    }
    Ok(())
}

fn render(registry: &NodeRegistry) -> String {
    let mut out = String::new();
    for manifest in registry.manifests() {
        out.push_str(&format!(
            "{} ({}, {})\n",
            manifest.registration_id, manifest.kind, manifest.type_name
        ));
        for (name, info) in manifest.ports.iter() {
            let default = info
                .default
                .as_ref()
                .map(|v| format!(" = {}", v))
                .unwrap_or_default();
            out.push_str(&format!(
                "  {:<7} {:<18}{:<8} {}\n",
                format!("{:?}", info.direction).to_lowercase(),
                name,
                default,
                info.description
            ));
        }
        out.push('\n');
    }
    out
}
