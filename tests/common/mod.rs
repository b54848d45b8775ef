//! Shared test utilities

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve a router on an ephemeral local port
///
/// Returns the base URL and a handle that stops the server when fired.
pub async fn serve(app: Router) -> (String, oneshot::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base_url = format!("http://{addr}");

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .ok();
    });

    (base_url, shutdown_tx)
}

/// Return a URL with nothing listening behind it
///
/// Binds an ephemeral port and immediately drops the listener, so requests
/// to the returned URL are refused.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
