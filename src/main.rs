use std::process::ExitCode;

fn main() -> ExitCode {
    alertrx_lib::run()
}
