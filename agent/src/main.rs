//! Managed-device agent - Entry Point
//!
//! Pulls the device configuration from the management server and keeps the
//! device reconciled against it.

use std::collections::HashMap;
use std::env;

use anyhow::{bail, Context};
use colored::Colorize;
use sysinfo::{Disks, System};
use tracing::{error, info};

use mdmagent::app::options::AppOptions;
use mdmagent::app::run::run;
use mdmagent::config::ConfigStore;
use mdmagent::logs::{init_logging, LogOptions};
use mdmagent::storage::device::{assert_activated, DeviceIdentity};
use mdmagent::storage::layout::StorageLayout;
use mdmagent::storage::prefs::PrefsStore;
use mdmagent::storage::settings::Settings;
use mdmagent::utils::version_info;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
        return;
    }

    let layout = match cli_args.get("base-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(&layout).await;
        return;
    }

    // Enroll the device
    if cli_args.contains_key("setup") {
        if let Err(e) = setup(&layout, &cli_args).await {
            eprintln!("\n{} {:#}", "[ERROR]".red().bold(), e);
            std::process::exit(1);
        }
        return;
    }

    // Print the persisted state
    if cli_args.contains_key("status") {
        if let Err(e) = print_status(&layout).await {
            eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
            std::process::exit(1);
        }
        return;
    }

    // Run the agent starting here

    // Retrieve the settings file
    let settings = match layout.settings_file().read_json_opt::<Settings>().await {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return;
        }
    };

    // Initialize logging, the guard flushes the file sink on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(layout, &settings);

    info!("Running device agent {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Failed to run the agent: {e}");
    }
}

async fn setup(layout: &StorageLayout, cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    println!("{}", "Device Agent Setup".bold());
    println!("==================");
    println!();

    let device_id = cli_args
        .get("device-id")
        .cloned()
        .or_else(|| env::var("MDM_DEVICE_ID").ok())
        .context("Missing device id. Provide via --device-id=<id> or MDM_DEVICE_ID")?;
    let base_url = cli_args
        .get("server")
        .cloned()
        .context("Missing server URL. Provide via --server=<url>")?;

    let identity = DeviceIdentity {
        device_id,
        project: cli_args.get("project").cloned().unwrap_or_default(),
        base_url,
        secondary_base_url: cli_args.get("secondary-server").cloned(),
    };
    if let Err(e) = assert_activated(&identity) {
        bail!("Invalid identity: {}", e);
    }

    println!("Setting up storage at: {:?}", layout.base_dir);
    layout.setup().await.context("Unable to create the storage layout")?;

    let prefs = PrefsStore::load(layout.prefs_file())
        .await
        .context("Unable to read preferences")?;
    prefs
        .set_identity(identity.clone())
        .await
        .context("Unable to save the device identity")?;

    let settings_file = layout.settings_file();
    if !settings_file.exists().await {
        settings_file
            .write_json(&Settings::default())
            .await
            .context("Unable to write the default settings")?;
        println!("Settings saved to: {:?}", settings_file.path());
    }

    println!();
    println!("  Device ID: {}", identity.device_id.cyan());
    println!("  Server:    {}", identity.base_url);
    if let Some(secondary) = &identity.secondary_base_url {
        println!("  Fallback:  {}", secondary);
    }
    if !identity.project.is_empty() {
        println!("  Project:   {}", identity.project);
    }
    println!();
    println!("{} Device enrolled, start the agent to reconcile.", "[SUCCESS]".green().bold());
    Ok(())
}

async fn print_status(layout: &StorageLayout) -> anyhow::Result<()> {
    let prefs = PrefsStore::load(layout.prefs_file())
        .await
        .context("Unable to read preferences")?;
    let store = ConfigStore::load(layout.config_file())
        .await
        .context("Unable to read the configuration snapshot")?;

    let identity = prefs.identity().await;
    match assert_activated(&identity) {
        Ok(()) => println!("Device:  {} @ {}", identity.device_id.cyan(), identity.base_url),
        Err(e) => println!("Device:  {}", e.to_string().yellow()),
    }

    match store.current().await {
        Some(stored) => {
            let config = &stored.config;
            println!(
                "Config:  fetched {} ({}s ago), {} apps, {} files",
                stored.fetched_at.to_rfc3339(),
                stored.age().as_secs(),
                config.applications.len(),
                config.files.len()
            );
        }
        None => println!("Config:  {}", "none".yellow()),
    }

    println!("Gates:");
    for (gate, state) in prefs.gate_states().await {
        println!("  {:<18} {:?}", gate.as_str(), state);
    }
    Ok(())
}

async fn run_diagnostic(layout: &StorageLayout) {
    let version = version_info();
    println!("{}", "Device Agent Diagnostic".bold());
    println!("=======================");
    println!("Version:    {} ({}, built {})", version.version, version.git_hash, version.build_time);

    let mut sys = System::new_all();
    sys.refresh_all();
    println!(
        "Host:       {} ({} {})",
        System::host_name().unwrap_or_else(|| "unknown".to_string()),
        System::name().unwrap_or_default(),
        System::os_version().unwrap_or_default()
    );
    println!("Uptime:     {}s", System::uptime());
    println!("CPUs:       {}", sys.cpus().len());
    println!(
        "Memory:     {} / {} MiB",
        sys.used_memory() / 1024 / 1024,
        sys.total_memory() / 1024 / 1024
    );

    let disks = Disks::new_with_refreshed_list();
    for disk in disks.iter() {
        println!(
            "Disk:       {:?} {} MiB free",
            disk.mount_point(),
            disk.available_space() / 1024 / 1024
        );
    }

    let check = |ok: bool| if ok { "ok".green() } else { "missing".red() };
    println!();
    println!("Storage:    {:?}", layout.base_dir);
    println!("  settings  {}", check(layout.settings_file().exists().await));
    println!("  prefs     {}", check(layout.prefs_file().exists().await));
    println!("  config    {}", check(layout.config_file().exists().await));
    println!("  files     {}", check(layout.files_dir().exists().await));

    match PrefsStore::load(layout.prefs_file()).await {
        Ok(prefs) => match assert_activated(&prefs.identity().await) {
            Ok(()) => println!("Identity:   {}", "ok".green()),
            Err(e) => println!("Identity:   {}", e.to_string().red()),
        },
        Err(e) => println!("Identity:   {}", e.to_string().red()),
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, falling back to Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
