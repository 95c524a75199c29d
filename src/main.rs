mod app;
mod config;
mod insights;
mod queries;
mod session;

use crate::session::WarehouseSession;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "belladash")]
#[command(about = "AI analytics dashboard for the Bella Napoli pizzeria warehouse")]
struct Args {
    /// Path to the JSON connection profile
    #[arg(long, default_value = "profile.json")]
    profile: PathBuf,
    /// Account URL, overriding the profile (e.g. https://acct.snowflakecomputing.com)
    #[arg(long)]
    account_url: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let profile = if args.profile.exists() {
        config::Profile::load(&args.profile, args.account_url)?
    } else if let Some(url) = args.account_url {
        config::Profile::from_account_url(url)
    } else {
        anyhow::bail!(
            "No connection profile at {} and no --account-url given",
            args.profile.display()
        );
    };

    let namespace = profile.namespace();
    let session = Arc::new(session::RestSession::connect(&profile)?);

    // Smoke query so a dead warehouse fails here, not in the first view
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(session.query("SELECT CURRENT_TIMESTAMP() AS CONNECTED_AT"))?;
    drop(rt);
    println!("Connected to {} ({})", profile.account_url, namespace);

    let options = eframe::NativeOptions::default();

    eframe::run_native(
        "Bella Napoli - AI Analytics",
        options,
        Box::new(move |_cc| {
            Box::new(app::DashboardApp::new(session, namespace)) as Box<dyn eframe::App>
        }),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {}", e))?;
    Ok(())
}
