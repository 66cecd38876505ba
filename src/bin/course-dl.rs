//! course-dl CLI - downloads every course document from the portal.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match course_dl::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            course_dl::cli::report_error(&e);
            ExitCode::FAILURE
        }
    }
}
