#[tokio::main]
async fn main() {
    if let Err(e) = lib_session_host::init().await {
        eprintln!("❌ {e}");
        std::process::exit(1);
    }
}
