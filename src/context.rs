use crate::{
    config::AppConfig,
    prompt::{Prompter, TerminalPrompter},
    services::{
        dns_service::{AwsRoute53Backend, DnsService},
        ec2_service::{AwsEc2Backend, Ec2Service},
        identity_service::{AwsIdentityBackend, IdentityBackend},
        s3_service::{AwsS3Backend, S3Service},
    },
};
use std::sync::Arc;
use tracing::debug;

/// Everything a command handler needs: configuration, services and the prompter.
pub struct AppContext {
    pub config: AppConfig,
    /// Region the SDK resolved, from `--region` or the profile/environment.
    pub region: Option<String>,
    pub ec2: Ec2Service,
    pub s3: S3Service,
    pub dns: DnsService,
    pub identity: Arc<dyn IdentityBackend>,
    pub prompter: Arc<dyn Prompter>,
}

impl AppContext {
    /// Load the AWS SDK configuration and build one client per service.
    pub async fn connect(config: AppConfig) -> Self {
        let sdk = config.sdk_config().await;
        let region = sdk.region().map(|r| r.to_string());
        debug!(region = ?region, profile = ?config.profile, "loaded AWS configuration");

        let ec2 = Ec2Service::new(
            Arc::new(AwsEc2Backend::new(aws_sdk_ec2::Client::new(&sdk))),
            config.owner.clone(),
            config.max_running_instances,
        );
        let s3 = S3Service::new(
            Arc::new(AwsS3Backend::new(aws_sdk_s3::Client::new(&sdk))),
            config.owner.clone(),
            region.clone(),
        );
        let dns = DnsService::new(
            Arc::new(AwsRoute53Backend::new(aws_sdk_route53::Client::new(&sdk))),
            config.owner.clone(),
            config.default_ttl,
        );
        let identity = Arc::new(AwsIdentityBackend::new(aws_sdk_sts::Client::new(&sdk)));

        Self {
            config,
            region,
            ec2,
            s3,
            dns,
            identity,
            prompter: Arc::new(TerminalPrompter::new()),
        }
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }
}
