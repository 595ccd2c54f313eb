//! CLI smoke entry point.
//!
//! Opens an in-memory store through the full controller bootstrap and prints
//! the resulting state. Set `READINGLIST_LOG_DIR` to an absolute path to also
//! write logs.

use readinglist_core::db::open_db_in_memory;
use readinglist_core::{
    core_version, default_log_level, init_logging, ReadingListsController,
    SqliteReadingListStore,
};
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("readinglist error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var("READINGLIST_LOG_DIR") {
        init_logging(default_log_level(), &log_dir)?;
    }

    let store = SqliteReadingListStore::try_new(open_db_in_memory()?)?;
    let controller = ReadingListsController::with_default_config(store)?;
    let default_list = controller.default_reading_list()?;

    println!("readinglist_core version={}", core_version());
    println!(
        "readinglist default_list={} lists={}",
        default_list.name,
        controller.reading_lists().len()
    );
    Ok(())
}
