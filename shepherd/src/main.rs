// src/main.rs

use shepherd::{cli, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    match run(args).await {
        Ok(disposition) => std::process::exit(disposition.exit_code()),
        Err(err) => {
            eprintln!("shepherd error: {err:?}");
            std::process::exit(1);
        }
    }
}
