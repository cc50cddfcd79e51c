mod audio;
mod celebration;
mod cli;
mod config;
mod error;
mod input;
mod logging;
mod machine;
mod proximity;
mod reel;
mod scheduler;
mod session;
mod sim;
mod stage;
mod tracker;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
