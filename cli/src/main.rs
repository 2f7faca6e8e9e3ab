mod cmd;
mod util;

use clap::Parser;
use cmd::GlobalArgs;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let app = GlobalArgs::parse();
    app.exec_subcmd().await.unwrap_or_else(|e| {
        println!("\n\nTester got exception: {:#}", e);
        std::process::exit(1);
    });
}
