//! Test utilities shared by the unit and integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use axum_test::TestServer;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::Application;
use crate::config::{Config, ProviderConfig};
use crate::types::RelayCredential;

pub const TEST_API_KEY: &str = "chv_test_key";

/// Config forwarding to a fake image host mounted at `provider_uri`.
pub fn create_test_config(provider_uri: &str) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        provider: ProviderConfig {
            url: format!("{}/api/1/upload", provider_uri.trim_end_matches('/'))
                .parse()
                .expect("Invalid test provider URL"),
            api_key: Some(RelayCredential::new(TEST_API_KEY)),
            timeout: Duration::from_secs(2),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn create_test_server(config: Config) -> TestServer {
    Application::new(config).expect("Failed to create application").into_test_server()
}

/// PNG signature followed by `len - 8` bytes of padding.
pub fn png_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.resize(len.max(bytes.len()), 0);
    bytes
}

/// A relay served on a real socket, for tests that drive it over HTTP. Stops when dropped.
pub struct RunningRelay {
    pub addr: SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

impl RunningRelay {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

pub async fn spawn_relay(app: Application) -> RunningRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read test listener address");
    let (shutdown, stopped) = oneshot::channel::<()>();

    tokio::spawn(async move {
        app.serve_with_listener(listener, async {
            let _ = stopped.await;
        })
        .await
        .expect("Test relay failed");
    });

    RunningRelay {
        addr,
        _shutdown: shutdown,
    }
}
