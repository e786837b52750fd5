mod cli;
mod commands;

use ops_reports::error::AppError;

pub fn run() -> Result<(), AppError> {
    cli::run()
}
