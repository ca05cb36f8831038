use clap::Parser;
use lazy_lotto_cli::cli::{Cli, Commands};
use lazy_lotto_cli::context::CommandContext;
use lazy_lotto_cli::{commands, output};
use lazykit::error::KitResult;
use log::debug;

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json = cli.json;
    let code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            debug!("command failed: {err:?}");
            output::failure(json, &err);
            1
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> KitResult<()> {
    let ctx = CommandContext::resolve(cli.json, cli.yes)?;
    let payload = match cli.command {
        Commands::Info => commands::info::run(&ctx).await?,
        Commands::Pools => commands::pools::list(&ctx).await?,
        Commands::Pool { pool_id } => commands::pools::detail(&ctx, pool_id).await?,
        Commands::User { account } => commands::user::run(&ctx, account).await?,
        Commands::Buy { pool_id, count } => commands::buy::run(&ctx, pool_id, count).await?,
        Commands::Roll { pool_id, count } => commands::roll::run(&ctx, pool_id, count).await?,
        Commands::Claim => commands::claim::run(&ctx).await?,
        Commands::Health => commands::health::run(&ctx).await?,
        Commands::Events { contract } => commands::events::run(&ctx, &contract).await?,
        Commands::Admin { action, multisig } => commands::admin::run(&ctx, &action, &multisig).await?,
        Commands::SignArtifact { file, label, keyfile } => {
            commands::multisig::run_sign(&ctx, &file, &label, keyfile.as_deref())?
        }
        Commands::SubmitArtifact { file, signatures } => {
            let submitter = ctx.submitter()?;
            commands::multisig::run_submit(&ctx, &submitter, &file, &signatures).await?
        }
    };
    ctx.out.finish(payload);
    Ok(())
}
