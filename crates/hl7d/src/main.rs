use std::process::ExitCode;

fn main() -> ExitCode {
    match hl7d::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("hl7d: {error}");
            ExitCode::FAILURE
        }
    }
}
