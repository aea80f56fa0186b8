use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use replybot_core::config::DEFAULT_PROBE_TIMEOUT;
use replybot_core::error::AppError;
use replybot_core::traits::LinkProber;
use reqwest::Client;
use reqwest::redirect::Policy;
use url::{Host, Url};

/// Redirects followed by the transport inside a single probe.
const MAX_TRANSPORT_REDIRECTS: usize = 10;

/// HEAD-request link prober using reqwest.
///
/// Each probe follows the server's redirects and returns the URL of the
/// last response, whatever its status. The timeout bounds the whole call,
/// DNS lookup included. Links come from public posts, so by default hosts
/// that are or resolve to non-public addresses are refused; see
/// [`allow_private_urls`](Self::allow_private_urls).
#[derive(Clone)]
pub struct ReqwestProber {
    client: Client,
    timeout: Duration,
    public_only: bool,
}

impl ReqwestProber {
    pub fn new() -> Result<Self, AppError> {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent("replybot/0.1 (+link resolver)")
            .timeout(timeout)
            .redirect(Policy::limited(MAX_TRANSPORT_REDIRECTS))
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            public_only: true,
        })
    }

    /// Disable the public-address check.
    pub fn allow_private_urls(mut self) -> Self {
        self.public_only = false;
        self
    }

    async fn head(&self, url: &str) -> Result<String, AppError> {
        if self.public_only {
            ensure_public_target(url).await?;
        }

        let response = self.client.head(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Timeout(self.timeout.as_secs())
            } else if e.is_connect() {
                AppError::NetworkError(format!("Connection failed: {e}"))
            } else {
                AppError::HttpError(e.to_string())
            }
        })?;

        tracing::debug!(
            %url,
            status = response.status().as_u16(),
            final_url = %response.url(),
            "Probed link"
        );

        Ok(response.url().to_string())
    }
}

impl LinkProber for ReqwestProber {
    async fn probe(&self, url: &str) -> Result<String, AppError> {
        within(self.timeout, self.head(url)).await
    }
}

/// Run `fut` under a deadline, mapping expiry to [`AppError::Timeout`].
async fn within<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(timeout, fut)
        .await
        .unwrap_or_else(|_| Err(AppError::Timeout(timeout.as_secs())))
}

/// Refuse links whose host is, or resolves to, a non-public address.
async fn ensure_public_target(url: &str) -> Result<(), AppError> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::HttpError(format!("Invalid link {url:?}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::HttpError(format!(
            "Refusing {} link",
            parsed.scheme()
        )));
    }

    let addrs: Vec<IpAddr> = match parsed.host() {
        Some(Host::Ipv4(ip)) => vec![ip.into()],
        Some(Host::Ipv6(ip)) => vec![ip.into()],
        Some(Host::Domain(domain)) => {
            let port = parsed.port_or_known_default().unwrap_or(80);
            tokio::net::lookup_host((domain, port))
                .await
                .map_err(|e| AppError::NetworkError(format!("DNS lookup failed for {domain}: {e}")))?
                .map(|addr| addr.ip())
                .collect()
        }
        None => return Err(AppError::HttpError(format!("Link has no host: {url}"))),
    };

    match addrs.into_iter().find(|ip| !is_public(*ip)) {
        Some(ip) => Err(AppError::HttpError(format!(
            "Refusing link to non-public address {ip}"
        ))),
        None => Ok(()),
    }
}

fn is_public(ip: IpAddr) -> bool {
    match ip.to_canonical() {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            let shared = a == 100 && (64..128).contains(&b);
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || shared)
        }
        IpAddr::V6(v6) => {
            !(v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_unicast_link_local()
                || v6.is_unique_local())
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::test_server::{TestServer, redirect, status};

    async fn spawn_server() -> String {
        let server = TestServer::bind().await;
        let routes = vec![
            ("/short", redirect(&server.url("/middle"))),
            ("/middle", redirect(&server.url("/final"))),
            ("/final", status(200, "OK")),
            ("/gone", status(404, "Not Found")),
            ("/hang", String::new()),
        ];
        server.serve(routes)
    }

    fn local_prober(timeout: Duration) -> ReqwestProber {
        ReqwestProber::with_timeout(timeout)
            .unwrap()
            .allow_private_urls()
    }

    #[tokio::test]
    async fn follows_redirects_to_final_url() {
        let base = spawn_server().await;
        let prober = local_prober(Duration::from_secs(5));

        let final_url = prober.probe(&format!("{base}/short")).await.unwrap();
        assert_eq!(final_url, format!("{base}/final"));
    }

    #[tokio::test]
    async fn non_success_status_still_reports_url() {
        let base = spawn_server().await;
        let prober = local_prober(Duration::from_secs(5));

        let final_url = prober.probe(&format!("{base}/gone")).await.unwrap();
        assert_eq!(final_url, format!("{base}/gone"));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let base = spawn_server().await;
        let prober = local_prober(Duration::from_millis(200));

        let err = prober.probe(&format!("{base}/hang")).await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let prober = local_prober(Duration::from_secs(5));
        let err = prober.probe(&format!("http://{addr}/x")).await.unwrap_err();
        assert!(matches!(err, AppError::NetworkError(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn private_addresses_blocked_by_default() {
        let prober = ReqwestProber::new().unwrap();
        let err = prober.probe("http://127.0.0.1/admin").await.unwrap_err();
        assert!(err.to_string().contains("non-public address"));

        let err = prober
            .probe("http://169.254.169.254/latest/meta-data/")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("non-public address"));

        let err = prober.probe("http://[::1]:8080/").await.unwrap_err();
        assert!(err.to_string().contains("non-public address"));
    }

    #[tokio::test]
    async fn non_http_scheme_rejected() {
        let prober = ReqwestProber::new().unwrap();
        let err = prober.probe("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("Refusing file link"));
    }

    #[tokio::test]
    async fn deadline_covers_work_before_the_request() {
        let started = std::time::Instant::now();
        let err = within(
            Duration::from_millis(50),
            std::future::pending::<Result<String, AppError>>(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn deadline_passes_results_through() {
        let ok = within(Duration::from_secs(1), async { Ok::<_, AppError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = within(Duration::from_secs(1), async {
            Err::<u8, _>(AppError::NetworkError("refused".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NetworkError(_)));
    }

    #[test]
    fn public_address_ranges() {
        assert!(!is_public("10.0.0.1".parse().unwrap()));
        assert!(!is_public("192.168.1.1".parse().unwrap()));
        assert!(!is_public("100.64.0.1".parse().unwrap()));
        assert!(is_public("100.128.0.1".parse().unwrap()));
        assert!(!is_public("fe80::1".parse().unwrap()));
        assert!(!is_public("fd00::1".parse().unwrap()));
        assert!(!is_public("::ffff:127.0.0.1".parse().unwrap()));
        assert!(is_public("8.8.8.8".parse().unwrap()));
        assert!(is_public("2001:4860:4860::8888".parse().unwrap()));
    }
}
