use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "modelstage")]
#[command(
	version,
	about = "Provision the model store and magic-pdf.json used by document parsing",
	long_about = None
)]
pub struct Cli {
	/// Re-fetch every wanted component even if the store looks complete
	#[arg(long)]
	pub force: bool,

	/// TOML configuration file
	#[arg(long, env = "MODELSTAGE_CONFIG")]
	pub config: Option<PathBuf>,

	/// Model store root (overrides the config file)
	#[arg(long, env = "MINERU_MODELS_DIR")]
	pub store_root: Option<PathBuf>,
}
