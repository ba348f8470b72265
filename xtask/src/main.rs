//! Development tasks for natscout
//!
//! Run with: cargo xtask <command>

use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "natscout development tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run unit, integration and property tests
    Test,

    /// Run clippy lints
    Lint,

    /// Check formatting
    Fmt,

    /// Run all CI checks
    Ci,

    /// Run the STUN codec benchmarks
    Bench,

    /// Fuzz a target with cargo-fuzz (nightly toolchain)
    Fuzz {
        /// Target name (fuzz_stun_message, fuzz_config_parse)
        #[arg(default_value = "fuzz_stun_message")]
        target: String,

        /// Run time in seconds
        #[arg(long, default_value_t = 60)]
        seconds: u64,
    },

    /// Generate documentation
    Doc,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test => test()?,
        Commands::Lint => lint()?,
        Commands::Fmt => fmt()?,
        Commands::Ci => {
            println!("Running CI checks...");
            fmt()?;
            lint()?;
            test()?;
            println!("All CI checks passed!");
        }
        Commands::Bench => {
            run_command("cargo", &["bench", "-p", "natscout-discovery", "--bench", "codec_bench"])?;
        }
        Commands::Fuzz { target, seconds } => {
            let max_time = format!("-max_total_time={seconds}");
            run_command(
                "cargo",
                &["+nightly", "fuzz", "run", &target, "--fuzz-dir", "fuzz", "--", &max_time],
            )?;
        }
        Commands::Doc => {
            run_command("cargo", &["doc", "--workspace", "--no-deps", "--open"])?;
        }
    }

    Ok(())
}

fn test() -> anyhow::Result<()> {
    run_command("cargo", &["test", "--workspace"])
}

fn lint() -> anyhow::Result<()> {
    run_command("cargo", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
}

fn fmt() -> anyhow::Result<()> {
    run_command("cargo", &["fmt", "--all", "--check"])
}

fn run_command(program: &str, args: &[&str]) -> anyhow::Result<()> {
    let status = Command::new(program).args(args).status()?;

    if !status.success() {
        anyhow::bail!("{} {:?} failed", program, args);
    }

    Ok(())
}
