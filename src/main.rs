use clap::Parser;
use log::{error, info};
use std::process::ExitCode;

use pill2yolo::dataset::{run_all, run_classify, run_collect, run_mapping, run_merge, run_yolo};
use pill2yolo::submission::export_submission;
use pill2yolo::{Args, CategoryMapping, Command, DatasetLayout, Result};

fn run(args: &Args) -> Result<()> {
    let config = args.to_pipeline_config()?;
    let layout = DatasetLayout::resolve(&config);
    info!("Dataset root: {:?}", layout.base_dir);

    match &args.command {
        Command::Classify => {
            run_classify(&layout, &config, args.clean)?;
        }
        Command::Collect => {
            run_collect(&layout, &config, args.clean)?;
        }
        Command::Merge => {
            run_merge(&layout, args.clean)?;
        }
        Command::Map => {
            run_mapping(&layout)?;
        }
        Command::Yolo => {
            run_yolo(&layout, &config, args.clean)?;
        }
        Command::Run => {
            run_all(&layout, &config, args.clean)?;
        }
        Command::Submit { detections, output } => {
            let mapping = CategoryMapping::load(&layout.mapping_file)?;
            export_submission(detections, output, &mapping)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Starting {:?}...", args.command);
    match run(&args) {
        Ok(()) => {
            info!("Done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
