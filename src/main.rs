mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use modelstage::config::Config;
use modelstage::model::HfRegistryClient;
use modelstage::provision::{Orchestrator, Outcome};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.init();

	match run(Cli::parse()).await {
		Ok(code) => code,
		Err(e) => {
			eprintln!("✗ {:#}", e);
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
	let mut config = Config::from_env(cli.config.as_deref()).context("Failed to load configuration")?;
	if let Some(store_root) = cli.store_root {
		config.store_root = store_root;
	}

	let client = HfRegistryClient::new(&config);
	let orchestrator = Orchestrator::new(config, client)?;
	let report = orchestrator
		.run(cli.force)
		.await
		.context("Provisioning run failed")?;

	for component in &report.components {
		tracing::info!("{}: {:?}", component.name, component.status);
	}

	match &report.outcome {
		Outcome::Ready { descriptor, path } => {
			println!("✓ Models ready in {:?}", descriptor.models_dir);
			println!("  Descriptor: {:?}", path);
			println!("  Formula recognition: {}", descriptor.formula_config.enable);
			println!("  Table recognition: {}", descriptor.table_config.enable);
			if report.bytes_transferred > 0 {
				println!("  Downloaded: {} MB", report.bytes_transferred / 1_000_000);
			}
			Ok(ExitCode::SUCCESS)
		}
		Outcome::Degraded { reason } => {
			eprintln!("✗ Model provisioning degraded: {}", reason);
			eprintln!("  No descriptor written; parsing must use its fallback path.");
			Ok(ExitCode::FAILURE)
		}
	}
}
