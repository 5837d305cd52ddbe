use std::process::ExitCode;

fn main() -> ExitCode {
    match medrelay_lib::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Startup failed: {e}");
            ExitCode::FAILURE
        }
    }
}
