//! Create an archive from paths relative to the working directory, or extract one.
//!
//! ```text
//! cargo run --example tree -- create archive.zip src tests
//! cargo run --example tree -- extract archive.zip output
//! ```

use std::env;
use std::process::ExitCode;
use std::thread;

use ziptree::{
    create_archive_parallel, error::ArchiveError, extract_archive_parallel, report::TaskReport,
};

fn run(args: &[String]) -> Result<TaskReport, ArchiveError> {
    let threads = thread::available_parallelism().map_or(1, |threads| threads.get());
    match args {
        [command, archive, sources @ ..] if command == "create" && !sources.is_empty() => {
            create_archive_parallel(archive, sources, threads)
        }
        [command, archive, destination] if command == "extract" => {
            extract_archive_parallel(archive, destination, threads)
        }
        _ => {
            eprintln!("usage: tree create <archive> <path>... | tree extract <archive> <destination>");
            std::process::exit(2);
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(report) => {
            println!("{}", report);
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            eprintln!("{}", error);
            ExitCode::FAILURE
        }
    }
}
