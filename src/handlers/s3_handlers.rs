//! S3 commands: create, upload, list and delete buckets.

use crate::{
    context::AppContext,
    errors::AppResult,
    handlers::{cancelled, flag_or_prompt, pick, tables},
    models::bucket::{Access, Bucket, BucketAccess, PublicApproval, validate_bucket_name},
    prompt::required_input,
};
use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum S3Command {
    /// Create a bucket
    Create(CreateArgs),
    /// Upload a file to a bucket created by this tool
    Upload(UploadArgs),
    /// List buckets
    List,
    /// Delete a bucket created by this tool
    Delete(DeleteArgs),
}

#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Bucket name
    #[arg(long)]
    pub name: Option<String>,

    /// Public buckets always ask for confirmation
    #[arg(long, value_enum)]
    pub access: Option<BucketAccess>,
}

#[derive(Args, Debug, Default)]
pub struct UploadArgs {
    #[arg(long)]
    pub bucket_name: Option<String>,

    /// Local file to upload
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Object key, defaults to the file name
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct DeleteArgs {
    #[arg(long)]
    pub bucket_name: Option<String>,
}

pub async fn run(ctx: &AppContext, command: S3Command) -> AppResult<()> {
    match command {
        S3Command::Create(args) => create(ctx, args).await,
        S3Command::Upload(args) => upload(ctx, args).await,
        S3Command::List => list(ctx).await,
        S3Command::Delete(args) => delete(ctx, args).await,
    }
}

/// Bucket from the flag, or picked among the buckets this tool created.
async fn choose_bucket(ctx: &AppContext, flag: Option<String>) -> AppResult<Option<String>> {
    if let Some(bucket) = flag.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()) {
        return Ok(Some(bucket));
    }
    let buckets = ctx.s3.managed_buckets().await?;
    if buckets.is_empty() {
        println!("No buckets created by this tool were found.");
        return Ok(None);
    }
    Ok(pick(ctx.prompter(), "Bucket", &buckets, |b: &Bucket| b.name.clone())?.map(|b| b.name.clone()))
}

async fn create(ctx: &AppContext, args: CreateArgs) -> AppResult<()> {
    let prompter = ctx.prompter();
    let Some(name) = flag_or_prompt(prompter, args.name, "Bucket name")? else {
        cancelled("Bucket creation");
        return Ok(());
    };
    validate_bucket_name(&name)?;

    let access = match args.access {
        Some(access) => access,
        None => {
            let options = ["Private".to_string(), "Public".to_string()];
            match prompter.select("Bucket access", &options)? {
                Some(0) => BucketAccess::Private,
                Some(_) => BucketAccess::Public,
                None => {
                    cancelled("Bucket creation");
                    return Ok(());
                }
            }
        }
    };

    let access = match access {
        BucketAccess::Private => Access::Private,
        BucketAccess::Public => match PublicApproval::request(prompter, &name)? {
            Some(approval) => Access::Public(approval),
            None => {
                println!("Bucket creation cancelled; nothing was created.");
                return Ok(());
            }
        },
    };
    let public = matches!(access, Access::Public(_));

    ctx.s3.create_bucket(&name, access).await?;
    println!(
        "Bucket '{name}' created as {}.",
        if public { "public (read-only for everyone)" } else { "private" }
    );
    Ok(())
}

async fn upload(ctx: &AppContext, args: UploadArgs) -> AppResult<()> {
    let prompter = ctx.prompter();
    let Some(bucket) = choose_bucket(ctx, args.bucket_name).await? else {
        return Ok(());
    };

    let (file, key) = match args.file {
        Some(file) => (file, args.key),
        None => {
            let Some(path) = required_input(prompter, "Path of the file to upload")? else {
                cancelled("Upload");
                return Ok(());
            };
            let path = PathBuf::from(path);
            let key = match args.key {
                Some(key) => Some(key),
                None => {
                    let default = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    Some(prompter.input("Object key", Some(&default))?)
                }
            };
            (path, key)
        }
    };

    let uploaded = ctx.s3.upload(&bucket, &file, key.as_deref()).await?;
    println!(
        "Uploaded {} to s3://{}/{} ({} bytes, ETag {}).",
        file.display(),
        uploaded.bucket,
        uploaded.key,
        uploaded.size_bytes,
        uploaded.etag.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

async fn list(ctx: &AppContext) -> AppResult<()> {
    let buckets = ctx.s3.list_buckets().await?;
    if buckets.is_empty() && !ctx.config.json {
        println!("No buckets found.");
        return Ok(());
    }
    tables::print_list(ctx.config.json, &buckets, tables::bucket_table)
}

async fn delete(ctx: &AppContext, args: DeleteArgs) -> AppResult<()> {
    let prompter = ctx.prompter();
    let Some(bucket) = choose_bucket(ctx, args.bucket_name).await? else {
        return Ok(());
    };
    ctx.s3.ensure_managed(&bucket).await?;

    // Ask everything up front so a "no" leaves the bucket untouched.
    let objects = ctx.s3.stored_objects(&bucket).await?.len();
    if objects > 0 {
        println!("Bucket '{bucket}' holds {objects} object(s), older versions included.");
        if !prompter.confirm(&format!("Delete all {objects} object(s) in '{bucket}'?"))? {
            cancelled("Bucket deletion");
            return Ok(());
        }
    }
    if !prompter.confirm(&format!("Are you sure you want to delete bucket '{bucket}'?"))? {
        cancelled("Bucket deletion");
        return Ok(());
    }

    if objects > 0 {
        let removed = ctx.s3.empty_bucket(&bucket).await?;
        println!("Deleted {removed} object(s).");
    }
    ctx.s3.delete_bucket(&bucket).await?;
    println!("Bucket '{bucket}' has been deleted.");
    Ok(())
}
