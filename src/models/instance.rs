//! EC2 instances and launch requests.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{fmt, str::FromStr};

/// One EC2 instance as returned by DescribeInstances.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Instance {
    pub id: String,

    /// Value of the `Name` tag.
    pub name: Option<String>,

    pub state: InstanceState,

    pub instance_type: String,

    pub public_ip: Option<String>,

    pub private_ip: Option<String>,

    pub launch_time: Option<DateTime<Utc>>,

    /// Value of the `CreatedBy` tag.
    pub created_by: Option<String>,
}

impl Instance {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("N/A")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Other(String),
}

impl InstanceState {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::ShuttingDown => "shutting-down",
            InstanceState::Terminated => "terminated",
            InstanceState::Stopping => "stopping",
            InstanceState::Stopped => "stopped",
            InstanceState::Other(s) => s,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "shutting-down" => InstanceState::ShuttingDown,
            "terminated" => InstanceState::Terminated,
            "stopping" => InstanceState::Stopping,
            "stopped" => InstanceState::Stopped,
            other => InstanceState::Other(other.to_string()),
        }
    }

    /// Terminated or on its way there; such instances are hidden from listings.
    pub fn is_gone(&self) -> bool {
        matches!(self, InstanceState::ShuttingDown | InstanceState::Terminated)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InstanceState {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceAction {
    Start,
    Stop,
}

impl InstanceAction {
    /// State the instance must be in for the action to apply.
    pub fn required_state(self) -> InstanceState {
        match self {
            InstanceAction::Start => InstanceState::Stopped,
            InstanceAction::Stop => InstanceState::Running,
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            InstanceAction::Start => "start",
            InstanceAction::Stop => "stop",
        }
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            InstanceAction::Start => "started",
            InstanceAction::Stop => "stopped",
        }
    }
}

/// CPU architecture an AMI must be built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
    Arm64,
}

impl Architecture {
    /// Derive the architecture from an instance type such as `t4g.nano`.
    ///
    /// Graviton families carry a `g` attribute right after the generation
    /// digit (`t4g`, `m6gd`, `c7gn`); GPU families such as `g5` do not.
    pub fn of_instance_type(instance_type: &str) -> Self {
        let family = instance_type.split('.').next().unwrap_or_default();
        let attributes = family
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .trim_start_matches(|c: char| c.is_ascii_digit());
        if attributes.starts_with('g') {
            Architecture::Arm64
        } else {
            Architecture::X86_64
        }
    }
}

/// Images offered by name; resolved through the public AWS SSM parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmiPreset {
    Ubuntu,
    AmazonLinux,
}

impl AmiPreset {
    pub const ALL: [AmiPreset; 2] = [AmiPreset::Ubuntu, AmiPreset::AmazonLinux];

    pub fn label(self) -> &'static str {
        match self {
            AmiPreset::Ubuntu => "Ubuntu 24.04 LTS",
            AmiPreset::AmazonLinux => "Amazon Linux 2023",
        }
    }

    fn ssm_parameter(self, arch: Architecture) -> &'static str {
        match (self, arch) {
            (AmiPreset::Ubuntu, Architecture::X86_64) => {
                "/aws/service/canonical/ubuntu/server/24.04/stable/current/amd64/hvm/ebs-gp3/ami-id"
            }
            (AmiPreset::Ubuntu, Architecture::Arm64) => {
                "/aws/service/canonical/ubuntu/server/24.04/stable/current/arm64/hvm/ebs-gp3/ami-id"
            }
            (AmiPreset::AmazonLinux, Architecture::X86_64) => {
                "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-x86_64"
            }
            (AmiPreset::AmazonLinux, Architecture::Arm64) => {
                "/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-arm64"
            }
        }
    }
}

/// Image requested for a new instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageRef {
    Preset(AmiPreset),
    /// An `ami-…` id or any value RunInstances accepts, e.g. `resolve:ssm:…`.
    Id(String),
}

impl ImageRef {
    /// Value for the RunInstances `ImageId` field.
    pub fn image_id(&self, arch: Architecture) -> String {
        match self {
            ImageRef::Preset(preset) => format!("resolve:ssm:{}", preset.ssm_parameter(arch)),
            ImageRef::Id(id) => id.clone(),
        }
    }
}

impl FromStr for ImageRef {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "ubuntu" | "u" => Ok(ImageRef::Preset(AmiPreset::Ubuntu)),
            "amazon-linux" | "amazonlinux" | "al2023" | "a" => {
                Ok(ImageRef::Preset(AmiPreset::AmazonLinux))
            }
            lower if lower.starts_with("ami-") || lower.starts_with("resolve:ssm:") => {
                Ok(ImageRef::Id(value.to_string()))
            }
            _ => Err(format!(
                "unknown image `{value}`: use `ubuntu`, `amazon-linux`, an ami-… id or resolve:ssm:…"
            )),
        }
    }
}

/// Everything RunInstances needs for a single instance.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchRequest {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub subnet_id: Option<String>,
    pub tags: Vec<(String, String)>,
}
