//! plant_data_prep CLI
//!
//! ```bash
//! # data/raw/<class>/ を data/{train,val,test}/<class>/ に分割
//! plant_data_prep split --manifest
//!
//! # 分割済みデータを確認して学習計画を書き出す
//! plant_data_prep plan
//!
//! # 外部で変換したモデルを models/plant_model.tflite に配置
//! plant_data_prep package --model exported.tflite
//! ```

use clap::Parser;
use plant_data_prep_lib::cli::{init_logging, run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
