use std::process;

fn main() {
    if let Err(err) = sessionizer::app::run() {
        eprintln!("fatal: {err:#}");
        process::exit(1);
    }
}
