use std::process::ExitCode;

use blindbuster::app::{self, ScanExit};

fn main() -> ExitCode {
    match app::run_cli() {
        Ok(ScanExit::Completed) => ExitCode::SUCCESS,
        Ok(ScanExit::Interrupted) => ExitCode::from(130),
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
