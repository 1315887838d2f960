//! Rendering of `terraform.tfvars.json` from a platform template.

use std::fs::{read_to_string, write};
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Error;
use crate::Result;

pub const TFVARS_FILE: &str = "terraform.tfvars.json";

const UPSTREAM_MIRROR: &str = "download.suse.de";

/// Reads a template, as JSON when its name says so and as HCL otherwise.
pub fn load_template(path: &Path) -> Result<Value> {
    let content = read_to_string(path).map_err(Error::io(path))?;
    let is_json = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase().contains(".json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&content).map_err(Error::json(path))
    } else {
        hcl::from_str(&content).map_err(|source| Error::Hcl {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Merges `overrides` into the keys `tfvars` already defines.
///
/// Lists are appended to, objects are merged key-wise and anything else is
/// replaced. Keys missing (or null) in the template are left alone.
pub fn merge(tfvars: &mut Map<String, Value>, overrides: Map<String, Value>) {
    for (key, new) in overrides {
        let current = match tfvars.get_mut(&key) {
            Some(current) if !current.is_null() => current,
            _ => continue,
        };

        match (current, new) {
            (Value::Array(current), Value::Array(mut new)) => current.append(&mut new),
            (Value::Object(current), Value::Object(new)) => current.extend(new),
            (current, new) => *current = new,
        }
    }
}

/// Points every `repositories` url at `mirror` instead of the upstream host.
pub fn substitute_mirror(tfvars: &mut Map<String, Value>, mirror: &str) {
    if let Some(Value::Object(repos)) = tfvars.get_mut("repositories") {
        for url in repos.values_mut() {
            if let Value::String(url) = url {
                *url = url.replace(UPSTREAM_MIRROR, mirror);
            }
        }
    }
}

/// Loads `template`, applies overrides and mirror, and writes the result
/// to `<tfdir>/terraform.tfvars.json`.
pub fn render(
    template: &Path,
    tfdir: &Path,
    overrides: Map<String, Value>,
    mirror: Option<&str>,
) -> Result<()> {
    let mut tfvars = match load_template(template)? {
        Value::Object(tfvars) => tfvars,
        _ => {
            return Err(Error::Io {
                path: template.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "tfvars template is not a key-value document",
                ),
            })
        }
    };

    merge(&mut tfvars, overrides);
    if let Some(mirror) = mirror {
        substitute_mirror(&mut tfvars, mirror);
    }

    let target = tfdir.join(TFVARS_FILE);
    let json = serde_json::to_string(&tfvars).map_err(Error::json(&target))?;
    write(&target, json).map_err(Error::io(&target))?;
    Ok(())
}
