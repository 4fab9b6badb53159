//! HTTP client substrate (C4, §4.4).

use crate::error::{HttpError, Result, StatusError};
use crate::url::normalize;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use vpn_cookie::Cookie;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// `<client-id>/<client-version> eduvpn-common/<library-version>` (§6).
pub fn build_user_agent(client_id: &str, client_version: &str) -> String {
    format!(
        "{client_id}/{client_version} eduvpn-common/{}",
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub ensure_trailing_slash: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            headers: HashMap::new(),
            query: Vec::new(),
            ensure_trailing_slash: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: String) -> Self {
        Self {
            inner: reqwest::Client::new(),
            user_agent,
        }
    }

    pub async fn get(&self, url: &str, opts: &RequestOptions, cookie: Option<&Cookie>) -> Result<HttpResponse> {
        let mut request = self.inner.get(self.build_url(url, opts)?);
        request = self.apply_common(request, opts);
        self.execute(request, opts.timeout, cookie).await
    }

    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        opts: &RequestOptions,
        cookie: Option<&Cookie>,
    ) -> Result<HttpResponse> {
        let mut request = self.inner.post(self.build_url(url, opts)?).form(form);
        request = self.apply_common(request, opts);
        self.execute(request, opts.timeout, cookie).await
    }

    fn build_url(&self, url: &str, opts: &RequestOptions) -> Result<url::Url> {
        let mut normalized = normalize(url, opts.ensure_trailing_slash)?;
        if !opts.query.is_empty() {
            let mut pairs = normalized.query_pairs_mut();
            for (k, v) in &opts.query {
                pairs.append_pair(k, v);
            }
        }
        Ok(normalized)
    }

    fn apply_common(&self, mut request: reqwest::RequestBuilder, opts: &RequestOptions) -> reqwest::RequestBuilder {
        request = request.header("User-Agent", &self.user_agent);
        for (k, v) in &opts.headers {
            request = request.header(k, v);
        }
        request
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
        cookie: Option<&Cookie>,
    ) -> Result<HttpResponse> {
        let send_fut = request.timeout(timeout).send();

        let response = match cookie {
            Some(cookie) => {
                tokio::select! {
                    biased;
                    _ = cookie.token().cancelled() => return Err(HttpError::Cancelled),
                    result = send_fut => result?,
                }
            }
            None => send_fut.await?,
        };

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect::<HashMap<_, _>>();

        let body = read_capped_body(response, cookie).await?;

        if !(200..300).contains(&status) {
            return Err(HttpError::Status(StatusError {
                url,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            }));
        }

        Ok(HttpResponse { status, headers, body })
    }
}

/// Eagerly reads the response body, failing fast the moment the cap would
/// be exceeded rather than buffering the whole (potentially huge) body
/// first (§4.4 "16 MiB response-body cap using an eager reader").
async fn read_capped_body(response: reqwest::Response, cookie: Option<&Cookie>) -> Result<Vec<u8>> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();

    loop {
        let next = stream.next();
        let chunk = match cookie {
            Some(cookie) => {
                tokio::select! {
                    biased;
                    _ = cookie.token().cancelled() => return Err(HttpError::Cancelled),
                    chunk = next => chunk,
                }
            }
            None => next.await,
        };

        let chunk = match chunk {
            Some(chunk) => chunk?,
            None => break,
        };

        check_cap(buf.len(), chunk.len(), MAX_BODY_BYTES)?;
        buf.extend_from_slice(&chunk);
    }

    Ok(buf)
}

fn check_cap(current_len: usize, chunk_len: usize, cap: usize) -> Result<()> {
    if current_len + chunk_len > cap {
        return Err(HttpError::BodyTooLarge { limit: cap });
    }
    Ok(())
}
