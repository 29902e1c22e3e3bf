//! EC2 commands: create, start, stop, delete and list instances.

use crate::{
    context::AppContext,
    errors::{AppError, AppResult},
    handlers::{cancelled, flag_or_prompt, pick, tables},
    models::instance::{AmiPreset, ImageRef, Instance, InstanceAction, InstanceState},
    services::ec2_service::LaunchParams,
};
use clap::{Args, Subcommand};

#[derive(Subcommand, Debug)]
pub enum Ec2Command {
    /// Launch a new instance
    Create(CreateArgs),
    /// Start a stopped instance
    Start(InstanceArgs),
    /// Stop a running instance
    Stop(InstanceArgs),
    /// Terminate an instance
    Delete(InstanceArgs),
    /// List instances created by this tool
    List,
}

#[derive(Args, Debug, Default)]
pub struct CreateArgs {
    /// Value of the Name tag
    #[arg(long)]
    pub name: Option<String>,

    /// Instance type, e.g. t3.nano or t4g.nano
    #[arg(long)]
    pub instance_type: Option<String>,

    /// `ubuntu`, `amazon-linux`, an ami-… id or resolve:ssm:…
    #[arg(long)]
    pub ami: Option<String>,

    /// EC2 key pair for SSH access
    #[arg(long)]
    pub key_name: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct InstanceArgs {
    /// Instance id or Name tag
    #[arg(long)]
    pub instance_id: Option<String>,
}

pub async fn run(ctx: &AppContext, command: Ec2Command) -> AppResult<()> {
    match command {
        Ec2Command::Create(args) => create(ctx, args).await,
        Ec2Command::Start(args) => change_state(ctx, args, InstanceAction::Start).await,
        Ec2Command::Stop(args) => change_state(ctx, args, InstanceAction::Stop).await,
        Ec2Command::Delete(args) => delete(ctx, args).await,
        Ec2Command::List => list(ctx).await,
    }
}

fn instance_label(instance: &Instance) -> String {
    format!(
        "{:<20} {:<16} {:<14} {:<15} {}",
        instance.id,
        instance.display_name(),
        instance.state.as_str(),
        instance.public_ip.as_deref().unwrap_or("N/A"),
        instance.private_ip.as_deref().unwrap_or("N/A"),
    )
}

/// Resolve `identifier`, or let the user pick among `candidates` when it is absent.
async fn choose_instance(
    ctx: &AppContext,
    identifier: Option<String>,
    candidates: &[InstanceState],
    verb: &str,
) -> AppResult<Option<Instance>> {
    let prompter = ctx.prompter();
    let matches = match identifier.map(|i| i.trim().to_string()).filter(|i| !i.is_empty()) {
        Some(identifier) => {
            let mut found = ctx.ec2.find(&identifier, candidates).await?;
            if found.is_empty() {
                // Nothing in a usable state: hand one back so the service reports its state.
                found = ctx.ec2.find(&identifier, &[]).await?;
                found.truncate(1);
            }
            if found.is_empty() {
                return Err(AppError::NotFound(format!("instance `{identifier}`")));
            }
            if found.len() > 1 {
                println!("Several instances are named `{identifier}`.");
            }
            found
        }
        None => {
            let found = ctx.ec2.list_in_states(candidates).await?;
            if found.is_empty() {
                println!("No instances available to {verb}.");
                return Ok(None);
            }
            found
        }
    };

    if let [only] = matches.as_slice() {
        return Ok(Some(only.clone()));
    }
    Ok(pick(prompter, &format!("Instance to {verb}"), &matches, instance_label)?.cloned())
}

async fn create(ctx: &AppContext, args: CreateArgs) -> AppResult<()> {
    let prompter = ctx.prompter();
    let interactive = args.ami.is_none();

    let Some(name) = flag_or_prompt(prompter, args.name, "Instance name")? else {
        cancelled("Instance creation");
        return Ok(());
    };

    let image = match args.ami {
        Some(ami) => ami.parse::<ImageRef>().map_err(AppError::invalid)?,
        None => match pick(prompter, "Image", &AmiPreset::ALL, |p| p.label().to_string())? {
            Some(preset) => ImageRef::Preset(*preset),
            None => {
                cancelled("Instance creation");
                return Ok(());
            }
        },
    };

    let instance_type = match args.instance_type {
        Some(instance_type) => instance_type,
        None if interactive => prompter.input("Instance type", Some(&ctx.config.instance_type))?,
        None => ctx.config.instance_type.clone(),
    };

    let params = LaunchParams {
        name: name.clone(),
        image,
        instance_type,
        key_name: args.key_name.or_else(|| ctx.config.key_name.clone()),
        subnet_id: ctx.config.subnet_id.clone(),
    };
    match ctx.ec2.launch(params).await {
        Ok(id) => {
            println!("Instance {id} created with name '{name}'.");
            Ok(())
        }
        Err(err @ AppError::LimitReached { .. }) => {
            show_running(ctx).await;
            Err(err)
        }
        Err(err) => Err(err),
    }
}

/// Print the instances that count against the running limit.
async fn show_running(ctx: &AppContext) {
    if let Ok(running) = ctx.ec2.list_in_states(&[InstanceState::Running]).await {
        println!("Running instances:");
        println!("{}", tables::instance_table(&running));
    }
}

async fn change_state(ctx: &AppContext, args: InstanceArgs, action: InstanceAction) -> AppResult<()> {
    let required = action.required_state();
    let Some(instance) = choose_instance(ctx, args.instance_id, &[required], action.verb()).await? else {
        return Ok(());
    };

    println!("{} instance {}...", capitalize(action.verb()), instance.id);
    match ctx.ec2.change_state(&instance, action).await {
        Ok(()) => {
            println!("Instance {} has been {}.", instance.id, action.past_tense());
            Ok(())
        }
        Err(err @ AppError::LimitReached { .. }) => {
            show_running(ctx).await;
            Err(err)
        }
        Err(err) => Err(err),
    }
}

async fn delete(ctx: &AppContext, args: InstanceArgs) -> AppResult<()> {
    let candidates = [
        InstanceState::Pending,
        InstanceState::Running,
        InstanceState::Stopping,
        InstanceState::Stopped,
    ];
    let Some(instance) = choose_instance(ctx, args.instance_id, &candidates, "terminate").await? else {
        return Ok(());
    };

    let question = format!(
        "Are you sure you want to terminate instance {} ({})?",
        instance.id,
        instance.display_name()
    );
    if !ctx.prompter().confirm(&question)? {
        cancelled("Termination");
        return Ok(());
    }
    ctx.ec2.terminate(&instance).await?;
    println!("Instance {} is terminating.", instance.id);
    Ok(())
}

async fn list(ctx: &AppContext) -> AppResult<()> {
    let instances = ctx.ec2.list_managed().await?;
    if instances.is_empty() && !ctx.config.json {
        println!("No instances created by this tool were found.");
        return Ok(());
    }
    tables::print_list(ctx.config.json, &instances, tables::instance_table)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
