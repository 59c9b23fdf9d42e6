//! Serves the canned endpoints on `127.0.0.1:$PORT` (default 3000) for
//! poking at a transport by hand.

use tokio::net::TcpListener;

const ENDPOINTS: &[&str] = &[
    "/text",
    "/status/{code}",
    "/delay/{ms}",
    "/echo",
    "/json",
    "/xml",
    "/cookies",
];

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    let addr = listener.local_addr()?;
    println!("mock server on http://{addr}");
    for endpoint in ENDPOINTS {
        println!("  {endpoint}");
    }
    mock_server::run(listener).await
}
