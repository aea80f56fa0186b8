//! Local HTTP/1.1 responder for client tests. No external network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub struct TestServer {
    listener: TcpListener,
    pub base: String,
}

impl TestServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        Self { listener, base }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Answer each request with the raw response registered for its path.
    ///
    /// Unknown paths get a 404. An empty response means never answer.
    pub fn serve(self, routes: Vec<(&str, String)>) -> String {
        let routes: Arc<HashMap<String, String>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, response)| (path.to_string(), response))
                .collect(),
        );
        let listener = self.listener;

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request.split_whitespace().nth(1).unwrap_or("/");

                    match routes.get(path) {
                        Some(response) if response.is_empty() => {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Some(response) => {
                            let _ = socket.write_all(response.as_bytes()).await;
                        }
                        None => {
                            let _ = socket.write_all(status(404, "Not Found").as_bytes()).await;
                        }
                    }
                });
            }
        });

        self.base
    }
}

pub fn status(code: u16, reason: &str) -> String {
    format!("HTTP/1.1 {code} {reason}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
}

pub fn redirect(location: &str) -> String {
    format!(
        "HTTP/1.1 301 Moved Permanently\r\nlocation: {location}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
    )
}

pub fn body(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    )
}
