#[tokio::main]
async fn main() {
    comanda::start_server().await;
}
