//! Single-URL liveness probe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, redirect};
use scholarscout_shared::{Result, ScholarScoutError};
use tracing::debug;

/// User-Agent string for link checks. Some university sites reject bare
/// library agents, so this one says who is asking.
const USER_AGENT: &str = concat!(
    "ScholarScout-LinkCheck/",
    env!("CARGO_PKG_VERSION"),
    " (+scholarship link verification)"
);

/// Outcome of probing one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Answered with a 2xx or 3xx status.
    Alive(u16),
    /// Answered with a status outside 200..400.
    Dead(u16),
    /// No HTTP answer at all (DNS, TLS, timeout, refused).
    Unreachable(String),
}

impl LinkStatus {
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive(_))
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive(code) => write!(f, "alive (HTTP {code})"),
            Self::Dead(code) => write!(f, "dead (HTTP {code})"),
            Self::Unreachable(reason) => write!(f, "unreachable: {reason}"),
        }
    }
}

/// Something that can tell whether a URL is alive.
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn probe(&self, url: &str) -> LinkStatus;
}

/// HTTP probe: HEAD first, GET once if the server refuses HEAD.
///
/// Redirects are not followed; a 3xx already proves the page exists.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| ScholarScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    async fn status(&self, method: Method, url: &str) -> std::result::Result<StatusCode, String> {
        // The body is never read; dropping the response closes the stream.
        self.client
            .request(method, url)
            .send()
            .await
            .map(|response| response.status())
            .map_err(|e| e.to_string())
    }
}

fn classify(status: StatusCode) -> LinkStatus {
    let code = status.as_u16();
    if (200..400).contains(&code) {
        LinkStatus::Alive(code)
    } else {
        LinkStatus::Dead(code)
    }
}

#[async_trait]
impl LinkProbe for HttpProbe {
    async fn probe(&self, url: &str) -> LinkStatus {
        let head = match self.status(Method::HEAD, url).await {
            Ok(status) => status,
            Err(reason) => return LinkStatus::Unreachable(reason),
        };

        if !matches!(head, StatusCode::FORBIDDEN | StatusCode::METHOD_NOT_ALLOWED) {
            return classify(head);
        }

        debug!(url, status = head.as_u16(), "HEAD refused, retrying with GET");
        match self.status(Method::GET, url).await {
            Ok(status) => classify(status),
            Err(reason) => LinkStatus::Unreachable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn probe() -> HttpProbe {
        HttpProbe::new(Duration::from_secs(2)).unwrap()
    }

    async fn mount(server: &MockServer, verb: &str, route: &str, status: u16) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn head_ok_is_alive() {
        let server = MockServer::start().await;
        mount(&server, "HEAD", "/apply", 200).await;
        let status = probe().probe(&format!("{}/apply", server.uri())).await;
        assert_eq!(status, LinkStatus::Alive(200));
    }

    #[tokio::test]
    async fn redirect_is_alive_without_following() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/old"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", "https://mit.edu/new"),
            )
            .mount(&server)
            .await;
        let status = probe().probe(&format!("{}/old", server.uri())).await;
        assert_eq!(status, LinkStatus::Alive(301));
    }

    #[tokio::test]
    async fn method_not_allowed_falls_back_to_get() {
        let server = MockServer::start().await;
        mount(&server, "HEAD", "/apply", 405).await;
        Mock::given(method("GET"))
            .and(path("/apply"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>apply here</html>"))
            .expect(1)
            .mount(&server)
            .await;
        let status = probe().probe(&format!("{}/apply", server.uri())).await;
        assert_eq!(status, LinkStatus::Alive(200));
    }

    #[tokio::test]
    async fn forbidden_on_both_is_dead() {
        let server = MockServer::start().await;
        mount(&server, "HEAD", "/apply", 403).await;
        mount(&server, "GET", "/apply", 403).await;
        let status = probe().probe(&format!("{}/apply", server.uri())).await;
        assert_eq!(status, LinkStatus::Dead(403));
    }

    #[tokio::test]
    async fn not_found_is_dead_without_get() {
        let server = MockServer::start().await;
        mount(&server, "HEAD", "/gone", 404).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let status = probe().probe(&format!("{}/gone", server.uri())).await;
        assert_eq!(status, LinkStatus::Dead(404));
    }

    #[tokio::test]
    async fn connection_refused_is_unreachable() {
        // Port 9 (discard) is closed on test machines.
        let status = probe().probe("http://127.0.0.1:9/apply").await;
        assert!(matches!(status, LinkStatus::Unreachable(_)));
        assert!(!status.is_alive());
    }

    #[tokio::test]
    async fn slow_response_times_out_as_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let probe = HttpProbe::new(Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let status = probe.probe(&format!("{}/slow", server.uri())).await;

        assert!(matches!(status, LinkStatus::Unreachable(_)), "{status:?}");
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }
}
