use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Master,
    Worker,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Master, Role::Worker];

    /// Key of the node address list in the terraform outputs.
    pub fn output_key(self) -> &'static str {
        match self {
            Role::Master => "ip_masters",
            Role::Worker => "ip_workers",
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(role: &str) -> Result<Self, Self::Err> {
        match role {
            "master" => Ok(Role::Master),
            "worker" => Ok(Role::Worker),
            other => Err(Error::InvalidRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerraformState {
    pub modules: Vec<TerraformModule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerraformModule {
    #[serde(default)]
    pub outputs: TerraformModuleOutputs,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerraformModuleOutputs {
    pub ip_load_balancer: Option<StateValue<String>>,
    pub ip_masters: Option<StateValue<Vec<String>>>,
    pub ip_workers: Option<StateValue<Vec<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateValue<T> {
    pub value: T,
}

impl TerraformState {
    fn root_outputs(&self) -> Option<&TerraformModuleOutputs> {
        self.modules.first().map(|module| &module.outputs)
    }

    pub fn lb_address(&self) -> Result<&str, Error> {
        self.root_outputs()
            .and_then(|outputs| outputs.ip_load_balancer.as_ref())
            .map(|output| output.value.as_str())
            .ok_or(Error::MissingOutput("ip_load_balancer"))
    }

    pub fn node_addresses(&self, role: Role) -> Result<&[String], Error> {
        self.root_outputs()
            .and_then(|outputs| match role {
                Role::Master => outputs.ip_masters.as_ref(),
                Role::Worker => outputs.ip_workers.as_ref(),
            })
            .map(|output| output.value.as_slice())
            .ok_or_else(|| Error::MissingOutput(role.output_key()))
    }
}

/// One entry of `terraform output -json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValue {
    #[serde(default)]
    pub sensitive: bool,
    #[serde(rename = "type", default)]
    pub kind: serde_json::Value,
    pub value: serde_json::Value,
}

pub type OutputMapping = HashMap<String, OutputValue>;
