use anyhow::{Context, Result};
use clap::Args;
use std::env;

pub const DEFAULT_OWNER: &str = "aws-manager";
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.nano";
pub const DEFAULT_MAX_RUNNING: usize = 2;
pub const DEFAULT_TTL: i64 = 300;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Region override; `None` lets the SDK pick it from the profile/environment.
    pub region: Option<String>,
    /// Named AWS profile override.
    pub profile: Option<String>,
    /// Value written to the `CreatedBy` tag of every resource this tool creates.
    pub owner: String,
    /// Running-instance ceiling for create/start; 0 disables the check.
    pub max_running_instances: usize,
    pub subnet_id: Option<String>,
    pub key_name: Option<String>,
    pub instance_type: String,
    pub default_ttl: i64,
    pub json: bool,
}

/// Global options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// AWS region (overrides AWS_MANAGER_REGION and the profile region)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// AWS CLI profile to load credentials from (overrides AWS_MANAGER_PROFILE)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Owner written to the CreatedBy tag (overrides AWS_MANAGER_OWNER)
    #[arg(long, global = true)]
    pub owner: Option<String>,

    /// Maximum running instances before create/start is refused, 0 = unlimited
    /// (overrides AWS_MANAGER_MAX_RUNNING)
    #[arg(long, global = true)]
    pub max_running: Option<usize>,

    /// Subnet for new instances (overrides AWS_MANAGER_SUBNET_ID)
    #[arg(long, global = true)]
    pub subnet_id: Option<String>,

    /// Print list output as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl AppConfig {
    /// Merge CLI args over environment variables over defaults.
    pub fn from_env_and_args(args: &GlobalArgs) -> Result<Self> {
        Self::from_lookup(args, |name| env::var(name).ok())
    }

    /// Same as [`AppConfig::from_env_and_args`] with a custom variable source.
    pub fn from_lookup<F>(args: &GlobalArgs, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let env_max_running = match env_or("AWS_MANAGER_MAX_RUNNING") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("parsing AWS_MANAGER_MAX_RUNNING value `{}`", value))?,
            None => DEFAULT_MAX_RUNNING,
        };
        let default_ttl = match env_or("AWS_MANAGER_DEFAULT_TTL") {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .with_context(|| format!("parsing AWS_MANAGER_DEFAULT_TTL value `{}`", value))?,
            None => DEFAULT_TTL,
        };

        Ok(Self {
            region: args.region.clone().or_else(|| env_or("AWS_MANAGER_REGION")),
            profile: args.profile.clone().or_else(|| env_or("AWS_MANAGER_PROFILE")),
            owner: args
                .owner
                .clone()
                .or_else(|| env_or("AWS_MANAGER_OWNER"))
                .unwrap_or_else(|| DEFAULT_OWNER.into()),
            max_running_instances: args.max_running.unwrap_or(env_max_running),
            subnet_id: args
                .subnet_id
                .clone()
                .or_else(|| env_or("AWS_MANAGER_SUBNET_ID")),
            key_name: env_or("AWS_MANAGER_KEY_NAME"),
            instance_type: env_or("AWS_MANAGER_INSTANCE_TYPE")
                .unwrap_or_else(|| DEFAULT_INSTANCE_TYPE.into()),
            default_ttl,
            json: args.json,
        })
    }

    /// Load the shared AWS SDK configuration for this run.
    ///
    /// Credentials always come from the SDK default chain (profile files,
    /// environment, SSO, instance metadata); only the profile and region can
    /// be overridden.
    pub async fn sdk_config(&self) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(profile) = &self.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = &self.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        loader.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_without_args_or_env() {
        let cfg = AppConfig::from_lookup(&GlobalArgs::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.owner, DEFAULT_OWNER);
        assert_eq!(cfg.max_running_instances, 2);
        assert_eq!(cfg.default_ttl, 300);
        assert_eq!(cfg.instance_type, "t3.nano");
        assert!(cfg.region.is_none());
        assert!(cfg.profile.is_none());
    }

    #[test]
    fn args_override_environment() {
        let args = GlobalArgs {
            region: Some("eu-west-1".into()),
            owner: Some("cli-team".into()),
            max_running: Some(5),
            ..GlobalArgs::default()
        };
        let env = lookup(&[
            ("AWS_MANAGER_REGION", "us-east-2"),
            ("AWS_MANAGER_OWNER", "someone-else"),
            ("AWS_MANAGER_MAX_RUNNING", "1"),
            ("AWS_MANAGER_PROFILE", "sandbox"),
            ("AWS_MANAGER_KEY_NAME", "ops-key"),
        ]);
        let cfg = AppConfig::from_lookup(&args, env).unwrap();
        assert_eq!(cfg.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cfg.owner, "cli-team");
        assert_eq!(cfg.max_running_instances, 5);
        assert_eq!(cfg.profile.as_deref(), Some("sandbox"));
        assert_eq!(cfg.key_name.as_deref(), Some("ops-key"));
    }

    #[test]
    fn bad_numbers_name_the_variable() {
        let err = AppConfig::from_lookup(
            &GlobalArgs::default(),
            lookup(&[("AWS_MANAGER_DEFAULT_TTL", "five minutes")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("AWS_MANAGER_DEFAULT_TTL"));
    }
}
