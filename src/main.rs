// src/main.rs

use std::process::ExitCode;

use taskmon::{cli, run};

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("taskmon error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
