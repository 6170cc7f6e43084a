use quicshot::status::ExitStatus;
use quicshot::{core, signals};

/// Entry point - catches Ctrl+C and calls core::run()
fn main() -> ExitStatus {
    // The handler cancels the shared shutdown token instead of exiting, so
    // in-flight shots are reported and the summary is still printed
    signals::install_handler().ok();

    let args: Vec<String> = std::env::args().collect();
    let status = core::run(args);

    if signals::was_interrupted() {
        return ExitStatus::Interrupted;
    }

    status
}
