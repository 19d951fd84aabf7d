use clap::Parser;
use ic50::cli::{init_tracing, run_train, TrainArgs};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = TrainArgs::parse();
    let report = run_train(&args)?;
    for fold in &report.folds {
        match &fold.valid {
            Some(v) => println!("{}: valid rmse {:.4}, r2 {:.4} ({})", fold.run_name, v.rmse, v.r2, fold.checkpoint.display()),
            None => println!("{}: no validation rows ({})", fold.run_name, fold.checkpoint.display()),
        }
    }
    println!("wrote {} predictions to {}", report.n_predictions, report.submission.display());
    Ok(())
}
