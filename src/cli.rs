use crate::{
    config::GlobalArgs,
    context::AppContext,
    errors::AppResult,
    handlers::{
        doctor_handlers,
        ec2_handlers::{self, Ec2Command},
        menu,
        route53_handlers::{self, Route53Command},
        s3_handlers::{self, S3Command},
    },
};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "aws-manager")]
#[command(
    version,
    about = "Create and manage EC2 instances, S3 buckets and Route 53 DNS",
    long_about = "Create and manage EC2 instances, S3 buckets and Route 53 DNS.\n\n\
Credentials come from the AWS CLI profile or the AWS_* environment variables.\n\
Run without a subcommand for the interactive menu."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// EC2 instances
    #[command(subcommand)]
    Ec2(Ec2Command),

    /// S3 buckets
    #[command(subcommand)]
    S3(S3Command),

    /// Route 53 hosted zones and records
    #[command(subcommand)]
    Route53(Route53Command),

    /// Check which AWS account, identity and region are in use
    Doctor,

    /// Interactive menu (the default)
    Menu,
}

pub async fn dispatch(ctx: &AppContext, command: Option<Command>) -> AppResult<()> {
    match command {
        Some(Command::Ec2(command)) => ec2_handlers::run(ctx, command).await,
        Some(Command::S3(command)) => s3_handlers::run(ctx, command).await,
        Some(Command::Route53(command)) => route53_handlers::run(ctx, command).await,
        Some(Command::Doctor) => doctor_handlers::run(ctx).await,
        Some(Command::Menu) | None => menu::run(ctx).await,
    }
}
