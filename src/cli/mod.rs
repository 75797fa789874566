// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// `clap` and hands everything else to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    - trains the U-Net and keeps the best checkpoints
//   2. `predict`  - segments a volume with a retained checkpoint
//   3. `evaluate` - reports per-slice and mean Dice on a split
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, EvaluateArgs, PredictArgs, TrainArgs};
use std::sync::atomic::{AtomicBool, Ordering};

/// The main CLI struct.
#[derive(Parser, Debug)]
#[command(
    name = "atrium-seg",
    version = "0.1.0",
    about = "Train a U-Net to segment the left atrium in cardiac MRI slices, then apply it."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. This layer only routes and prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Predict(args)  => run_predict(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on slices in: {}", args.data_dir);
    let backend = args.backend.into();
    let use_case = TrainUseCase::new(args.into(), backend);

    // Ctrl-C finishes at the next batch boundary; committed checkpoints stay valid.
    let stop = use_case.stop_flag();
    ctrlc::set_handler(move || {
        if request_stop(&stop) {
            tracing::warn!("Stop requested; ending after the current batch (Ctrl-C again has no further effect)");
        }
    })
    .context("Cannot install the Ctrl-C handler")?;

    let summary = use_case.execute()?;

    if summary.interrupted {
        println!("Training stopped after {} epochs.", summary.epochs_completed);
    } else {
        println!("Training complete after {} epochs.", summary.epochs_completed);
    }
    for record in &summary.checkpoints {
        println!("  epoch {:>3}  val_dice_loss={:.4}  {}", record.epoch, record.metric, record.file);
    }
    match summary.best() {
        Some(best) => println!("Best checkpoint: {} (epoch {})", best.file, best.epoch),
        None => println!("No checkpoint was kept."),
    }
    Ok(())
}

/// Raise the stop flag. Returns true only for the first request.
fn request_stop(stop: &AtomicBool) -> bool {
    !stop.swap(true, Ordering::Relaxed)
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(args.checkpoint_dir, args.checkpoint, args.backend.into());
    let report = use_case.execute(&args.input, &args.output)?;
    println!(
        "Segmented {} slices ({} foreground pixels) with epoch {} → {}",
        report.slices,
        report.foreground,
        report.checkpoint.epoch,
        args.output.display()
    );
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(args.checkpoint_dir, args.checkpoint, args.backend.into());
    let report = use_case.execute(&args.data_dir, &args.split)?;
    for slice in &report.slices {
        println!("{:>12}  dice={:.4}", slice.name, slice.dice);
    }
    println!(
        "\nMean Dice on '{}': {:.4} ({} slices, checkpoint epoch {})",
        args.split,
        report.mean_dice,
        report.slices.len(),
        report.checkpoint.epoch
    );
    if report.empty_slices > 0 {
        println!(
            "{} slices have an empty mask and an empty prediction; each scores ~0 and lowers the mean.",
            report.empty_slices
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_only_first_stop_request_counts() {
        let stop = Arc::new(AtomicBool::new(false));
        assert!(request_stop(&stop));
        assert!(stop.load(Ordering::Relaxed));
        assert!(!request_stop(&stop));
        assert!(stop.load(Ordering::Relaxed));
    }
}
