use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;

type Connector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Shared HTTP client for the identity service and the rewrite endpoint.
///
/// Plain `http://` is allowed so a local dev server can be targeted.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<Connector, Full<Bytes>>,
}

impl HttpClient {
    pub fn new() -> Self {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self { client }
    }

    /// Send a prepared request and hand back the response with its body unread.
    pub async fn send(
        &self,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, hyper_util::client::legacy::Error> {
        self.client.request(req).await
    }

    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, String> {
        let req = Request::builder()
            .method("POST")
            .uri(url)
            .header("Content-Type", content_type)
            .body(Full::new(Bytes::from(body.to_vec())))
            .map_err(|e| e.to_string())?;

        let response = self.send(req).await.map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .into_body()
                .collect()
                .await
                .map(|b| String::from_utf8_lossy(&b.to_bytes()).into_owned())
                .unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(format!("HTTP {}: {}", status.as_u16(), detail.trim()));
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| e.to_string())?;
        Ok(body.to_bytes().to_vec())
    }

    pub async fn post_json(&self, url: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.post(url, "application/json", body).await
    }

    pub async fn post_form(&self, url: &str, body: &str) -> Result<Vec<u8>, String> {
        self.post(url, "application/x-www-form-urlencoded", body.as_bytes())
            .await
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
