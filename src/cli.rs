//! CLI surface for the fulfillment service.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::config::Config;
use crate::runner;

#[derive(Parser, Debug)]
#[command(
    name = "shelfpod",
    version,
    about = "Temperature-controlled shelf fulfillment service",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Increase log verbosity (repeatable).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Daemon config (TOML). Built-in defaults apply when omitted.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Feed an orders JSON file through the pod with couriers attached.
    Run {
        /// Orders file: [{"name", "temp", "shelfLife", "decayRate"}, ...]
        #[arg(value_name = "ORDERS")]
        orders: PathBuf,
    },
    /// Validate the config and print the resolved shelf set.
    CheckConfig,
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> crate::Result<()> {
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Run { orders } => {
            let report = runner::run(&config, &orders)?;
            println!("submitted:           {}", report.submitted);
            println!("delivered:           {}", report.delivered);
            println!("expired in regular:  {}", report.expired_in_regular);
            println!("expired in overflow: {}", report.expired_in_overflow);
            println!("expired on no space: {}", report.expired_on_no_space);
            println!("came expired:        {}", report.came_expired);
            println!("still shelved:       {}", report.still_shelved);
        }
        Command::CheckConfig => {
            config.validate()?;
            println!(
                "intake: poisson mean {}/s; pickup delay {}..={}s",
                config.intake.poisson_mean_per_second,
                config.pickup.min_delay_secs,
                config.pickup.max_delay_secs
            );
            for shelf in config.build_shelves() {
                println!("{shelf}");
            }
        }
    }
    Ok(())
}
