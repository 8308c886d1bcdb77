use std::process::ExitCode;

fn main() -> ExitCode {
    detbridge::init_tracing();

    match detbridge::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
