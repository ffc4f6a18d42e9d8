use std::process::ExitCode;

fn main() -> ExitCode {
    presence_cli::run()
}
