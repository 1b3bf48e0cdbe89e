use clap::Parser;
use relabel_core::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = relabel_core::run_cli(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
