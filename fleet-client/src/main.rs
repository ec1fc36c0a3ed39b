use fleet_client::{errors, run_cli};

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        std::process::exit(errors::report(&err));
    }
}
