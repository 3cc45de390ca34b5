use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use profiling_tools::{merge_profile_files, Profile, ProfileError};

#[derive(Parser)]
#[command(author, version, about = "Tree-consistent edits of CAMI profiling files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Renormalize a profile so the root-level taxa sum to 100
    Normalize {
        /// Input profile (may be gzip-compressed)
        input: PathBuf,
        /// Output profile
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Zero out every taxon whose abundance is below a cutoff
    Threshold {
        input: PathBuf,
        /// Abundance cutoff, in percent
        #[arg(short, long)]
        threshold: f64,
        #[arg(short, long)]
        output: PathBuf,
        /// Renormalize after thresholding
        #[arg(long)]
        normalize: bool,
    },
    /// Merge several profiles, summing abundances of shared taxa
    Merge {
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// Renormalize the merged profile
        #[arg(long)]
        normalize: bool,
    },
}

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(msg.to_string());
    spinner
}

fn run(command: Commands) -> Result<(), ProfileError> {
    let (profile, output) = match command {
        Commands::Normalize { input, output } => {
            let progress = spinner("blue", &format!("Loading {}...", input.display()));
            let mut profile = Profile::from_path(&input)?;
            progress.set_message("Normalizing...");
            profile.normalize()?;
            progress.finish_with_message(format!("Normalized {} taxa.", profile.len()));
            (profile, output)
        }
        Commands::Threshold {
            input,
            threshold,
            output,
            normalize,
        } => {
            let progress = spinner("blue", &format!("Loading {}...", input.display()));
            let mut profile = Profile::from_path(&input)?;
            progress.set_message(format!("Applying threshold {threshold}..."));
            profile.threshold(threshold);
            if normalize {
                profile.normalize()?;
            }
            progress.finish_with_message("Threshold applied.");
            (profile, output)
        }
        Commands::Merge {
            inputs,
            output,
            normalize,
        } => {
            let progress = spinner("green", &format!("Merging {} profile(s)...", inputs.len()));
            let profile = merge_profile_files(&inputs, normalize)?;
            progress.finish_with_message(format!("Merged into {} taxa.", profile.len()));
            (profile, output)
        }
    };

    let progress = spinner("yellow", "Writing output file...");
    profile.write_file(&output)?;
    progress.finish_with_message(format!("Wrote {}.", output.display()));
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command) {
        log::error!("{err}");
        process::exit(2);
    }
}
