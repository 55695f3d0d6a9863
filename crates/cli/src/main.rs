use std::process::ExitCode;

fn main() -> ExitCode {
    reune_cli::run()
}
