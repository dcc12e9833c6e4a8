#[tokio::main]
async fn main() {
    if let Err(e) = foodgram::start_server().await {
        log::error!("Startup failed: {e}");
        eprintln!("Startup failed: {e}");
        std::process::exit(1);
    }
}
