use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "knugget")]
#[command(about = "Knugget session host - keeps one login session in sync across tabs")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Config file (defaults to the user config directory)
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Session storage file
	#[arg(long, global = true, value_name = "FILE")]
	pub storage: Option<PathBuf>,

	/// Address of the session host
	#[arg(long, global = true, value_name = "ADDR")]
	pub host: Option<String>,

	/// Output format
	#[arg(short, long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the background process and serve page agents
	Serve {
		/// Storage-state file holding the website's cookies
		#[arg(long, value_name = "FILE")]
		cookies: Option<PathBuf>,
	},

	/// Show the stored session
	Status,

	/// Sign in with email and password
	Login { email: String, password: String },

	/// Create an account and sign in
	Signup { email: String, password: String, name: String },

	/// Drop the stored session
	Logout,

	/// Resolve the session from store, cookies and the backend
	#[command(alias = "check")]
	Reconcile,

	/// Call the backend through the authenticated request wrapper
	#[command(alias = "req")]
	Request {
		/// Path relative to the API base, e.g. /summary?page=1&limit=10
		endpoint: String,
		/// HTTP method
		#[arg(short = 'X', long, default_value = "GET")]
		method: String,
		/// JSON request body
		#[arg(short, long)]
		body: Option<String>,
		/// Send without a session credential
		#[arg(long)]
		no_auth: bool,
	},

	/// Deliver a website message to the external login bridge
	Bridge {
		/// `{"type": ..., "payload": ...}` envelope
		message: String,
		/// Origin the message claims to come from (defaults to the website)
		#[arg(long)]
		origin: Option<String>,
	},
}

impl Commands {
	pub fn name(&self) -> &'static str {
		match self {
			Commands::Serve { .. } => "serve",
			Commands::Status => "status",
			Commands::Login { .. } => "login",
			Commands::Signup { .. } => "signup",
			Commands::Logout => "logout",
			Commands::Reconcile => "reconcile",
			Commands::Request { .. } => "request",
			Commands::Bridge { .. } => "bridge",
		}
	}
}
