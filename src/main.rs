use colored::Colorize;
use jobcache::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        eprintln!("{} {:?}", "error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}
