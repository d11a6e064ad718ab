use std::{path::Path, process::ExitCode, time::Duration};

use anyhow::{Context, Error};
use clap::Parser;
use log::{error, info, warn, LevelFilter};

use bootctl_api::{
    catalog::TargetCatalog,
    error::{BootctlError, BootctlResultExt, ControllerError, InternalError, ReportError},
};
use iscsi_bootctl::{
    apply::SettingsTarget,
    cli::{Cli, Commands},
    config::ControllerConfig,
    orchestrate::{render_nic_table, ConfigureRequest, DisableOutcome},
    reboot::ThreadSleeper,
    redfish::HttpTransport,
    Orchestrator, BOOTCTL_VERSION,
};

fn run(args: &Cli) -> Result<(), BootctlError> {
    // Log version ASAP
    info!("iscsi-bootctl version: {BOOTCTL_VERSION}");

    // Read the catalog before talking to the controller so a bad target name
    // fails without side effects
    let catalog = match args.command {
        Commands::ConfigureTarget { .. } => Some(
            TargetCatalog::load(&args.catalog).message("Failed to load target catalog")?,
        ),
        _ => None,
    };

    let controller = args.command.controller();
    let config = ControllerConfig::new(&controller.server, &controller.user, &controller.password)?
        .with_verify_tls(controller.verify_tls);
    let transport = HttpTransport::new(&config).structured(ControllerError::CreateClient)?;
    let sleeper = ThreadSleeper;
    let orchestrator = Orchestrator::new(&transport, &config.layout, &sleeper);

    match &args.command {
        Commands::ConfigureTarget {
            nic,
            target,
            secondary_target,
            initiator_name,
            gateway,
            no_reboot,
            direct_api,
            wait,
            wait_timeout,
            ..
        } => {
            let catalog = catalog.ok_or_else(|| BootctlError::internal("Catalog not loaded"))?;
            let orchestrator = orchestrator.with_settings_target(if *direct_api {
                SettingsTarget::Direct
            } else {
                SettingsTarget::Staged
            });
            let outcome = orchestrator.configure_target(
                &catalog,
                &ConfigureRequest {
                    nic_id: nic.clone(),
                    target: target.clone(),
                    secondary_target: secondary_target.clone(),
                    initiator_name: initiator_name.clone(),
                    gateway: gateway.clone(),
                    reboot: !no_reboot,
                    wait_timeout: wait.then(|| Duration::from_secs(*wait_timeout)),
                },
            )?;
            info!(
                "Configured NIC '{nic}': {} group(s) accepted, {} rejected",
                outcome.apply.writes.accepted_count(),
                outcome.apply.writes.rejected_count()
            );
        }

        Commands::SetBootOrder {
            first_boot_class,
            no_reboot,
            ..
        } => {
            let outcome = orchestrator.set_boot_order(*first_boot_class, !no_reboot)?;
            info!("Boot order set, {} boots first", outcome.slot);
        }

        Commands::DisableRedundant {
            primary_nic,
            list_only,
            force,
            no_reboot,
            ..
        } => {
            let primary_nic = primary_nic.as_deref().unwrap_or_default();
            match orchestrator.disable_redundant(primary_nic, *list_only, !no_reboot, *force)? {
                DisableOutcome::Listed(states) => print!("{}", render_nic_table(&states)),
                DisableOutcome::Reconciled(summary) => {
                    info!(
                        "Kept {:?}, disabled {:?}, failed to disable {:?}",
                        summary.kept, summary.disabled_ok, summary.disabled_failed
                    );
                    if !summary.disabled_failed.is_empty() {
                        warn!(
                            "{} NIC(s) still have iSCSI boot configured",
                            summary.disabled_failed.len()
                        );
                    }
                }
            }
        }

        Commands::Validate {
            nic, expected_iqn, ..
        } => {
            orchestrator.validate(nic, expected_iqn.as_deref())?;
        }

        Commands::ResetToDefaults { no_reboot, .. } => {
            orchestrator.reset_to_defaults(!no_reboot)?;
        }
    }

    Ok(())
}

fn write_error_report(path: &Path, error: &BootctlError) -> Result<(), BootctlError> {
    let report = serde_yaml::to_string(error).structured(InternalError::WriteErrorReport)?;
    std::fs::write(path, report).structured(InternalError::WriteErrorReport)
}

fn setup_logging(args: &Cli) -> Result<(), Error> {
    env_logger::builder()
        .format_timestamp(None)
        .filter_level(args.verbosity)
        .filter_module("reqwest", args.verbosity.min(LevelFilter::Info))
        .try_init()
        .context("Logger already registered")?;

    Ok(())
}

fn setup_tracing(args: &Cli) -> Result<(), Error> {
    use tracing_subscriber::{filter, layer::SubscriberExt, Layer};

    if !args.trace {
        return Ok(());
    }

    let layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_filter(filter::LevelFilter::INFO);

    tracing::subscriber::set_global_default(tracing_subscriber::Registry::default().with(layer))
        .context("Failed to set global default subscriber")?;

    Ok(())
}

fn main() -> ExitCode {
    // Parse args
    let args = Cli::parse();

    // Initialize the logger
    if let Err(e) = setup_logging(&args) {
        eprintln!("Failed to initialize logging: {e:?}");
        return ExitCode::from(1);
    }

    // Initialize the telemetry flow
    if let Err(e) = setup_tracing(&args) {
        error!("Failed to initialize tracing: {e:?}");
        return ExitCode::from(1);
    }

    match run(&args).message(format!("Failed to execute '{}' command", args.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(path) = &args.error {
                if let Err(e2) = write_error_report(path, &e) {
                    error!("Failed to write error to file: {e2:?}");
                }
            }
            error!("iscsi-bootctl failed: {e:?}");
            ExitCode::from(e.exit_code())
        }
    }
}
