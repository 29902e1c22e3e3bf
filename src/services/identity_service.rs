//! Caller identity lookup, used to check which credentials are active.

use crate::errors::{AppResult, aws_error};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn caller_identity(&self) -> AppResult<CallerIdentity>;
}

pub struct AwsIdentityBackend {
    client: aws_sdk_sts::Client,
}

impl AwsIdentityBackend {
    pub fn new(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityBackend for AwsIdentityBackend {
    async fn caller_identity(&self) -> AppResult<CallerIdentity> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|err| aws_error("sts:GetCallerIdentity", err))?;
        Ok(CallerIdentity {
            account: output.account().unwrap_or_default().to_string(),
            arn: output.arn().unwrap_or_default().to_string(),
            user_id: output.user_id().unwrap_or_default().to_string(),
        })
    }
}
