use evertims_bridge::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", cli::error_report(&e));
        std::process::exit(1);
    }
}
