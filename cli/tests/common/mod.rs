use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

pub const STATE: &str = r#"{
    "modules": [{
        "outputs": {
            "ip_load_balancer": {"value": "10.0.0.2"},
            "ip_masters": {"value": ["10.0.0.10"]},
            "ip_workers": {"value": ["10.0.0.20", "10.0.0.21"]}
        }
    }]
}"#;

/// A workspace plus `vars.toml` pointing into it.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("couldn't create tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("workspace")).unwrap();
        fs::create_dir_all(root.join("infra").join("openstack")).unwrap();
        fs::write(
            root.join("vars.toml"),
            format!(
                "platform = \"openstack\"\nworkspace = \"{}\"\n\n[terraform]\ntfdir = \"{}\"\ntfvars = \"terraform.tfvars.json\"\n",
                root.join("workspace").display(),
                root.join("infra").display(),
            ),
        )
        .unwrap();
        Fixture { dir }
    }

    pub fn vars(&self) -> PathBuf {
        self.dir.path().join("vars.toml")
    }

    pub fn workspace(&self) -> PathBuf {
        self.dir.path().join("workspace")
    }

    pub fn with_state(self) -> Self {
        fs::write(
            self.dir
                .path()
                .join("infra")
                .join("openstack")
                .join("terraform.tfstate"),
            STATE,
        )
        .unwrap();
        self
    }

    pub fn deployed(self) -> Self {
        fs::write(self.workspace().join("tfout.json"), "{}").unwrap();
        self
    }
}
