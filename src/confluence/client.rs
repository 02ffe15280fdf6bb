use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use url::Url;

use super::responses::{CurrentUser, ErrorBody, Page, PageResults, Space};
use crate::config::{Config, Credentials};
use crate::{Error, Result};

const RETRY_BASE_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

/// Blocking REST client for a Confluence instance. Retry policy lives
/// here, wrapped around every operation, so callers stay straight-line:
/// rate limits, transient network failures and 5xx responses are retried
/// with backoff up to the configured cap, everything else surfaces
/// immediately.
pub struct ConfluenceClient {
    http: Client,
    base_url: Url,
    credentials: Credentials,
    retry_count: u32,
    retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct CreatePageRequest {
    pub title: String,
    pub space_key: String,
    pub body: String,
    pub ancestor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePageRequest {
    pub page_id: String,
    pub title: String,
    pub space_key: String,
    pub body: String,
    pub version: u32,
    pub ancestor: Option<String>,
}

impl ConfluenceClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(config.confluence_url())
            .map_err(|err| Error::Config(format!("Invalid confluence.url: {}", err)))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs()))
            .build()?;

        Ok(ConfluenceClient {
            http,
            base_url,
            credentials: config.credentials()?,
            retry_count: config.retry_count(),
            retry_delay: Duration::from_secs(RETRY_BASE_SECS),
        })
    }

    /// Overrides the backoff base; only tests need short delays.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn get_space(&self, key: &str) -> Result<Space> {
        self.with_retry("get space", || {
            let response = self
                .authorize(self.http.get(self.api(&format!("space/{}", key))))
                .send()?;
            Ok(self.check(response, key)?.json()?)
        })
    }

    /// Fetches a page with its version and ancestors expanded.
    pub fn get_page(&self, page_id: &str) -> Result<Page> {
        self.with_retry("get page", || {
            let response = self
                .authorize(self.http.get(self.api(&format!("content/{}", page_id))))
                .query(&[("expand", "version,ancestors")])
                .send()?;
            Ok(self.check(response, page_id)?.json()?)
        })
    }

    pub fn get_page_by_title(&self, space_key: &str, title: &str) -> Result<Option<Page>> {
        self.with_retry("find page", || {
            let response = self
                .authorize(self.http.get(self.api("content")))
                .query(&[
                    ("spaceKey", space_key),
                    ("title", title),
                    ("expand", "version,ancestors"),
                    ("limit", "1"),
                    ("start", "0"),
                ])
                .send()?;
            let results: PageResults = self.check(response, title)?.json()?;
            Ok(results.results.into_iter().next())
        })
    }

    pub fn create_page(&self, request: &CreatePageRequest) -> Result<Page> {
        let mut payload = serde_json::json!({
            "type": "page",
            "title": request.title,
            "space": { "key": request.space_key },
            "body": {
                "storage": {
                    "value": request.body,
                    "representation": "storage",
                }
            },
        });
        if let Some(ancestor) = &request.ancestor {
            payload["ancestors"] = serde_json::json!([{ "id": ancestor }]);
        }

        self.with_retry("create page", || {
            let response = self
                .authorize(self.http.post(self.api("content")))
                .json(&payload)
                .send()?;
            Ok(self.check(response, &request.title)?.json()?)
        })
    }

    pub fn update_page(&self, request: &UpdatePageRequest) -> Result<Page> {
        let mut payload = serde_json::json!({
            "id": request.page_id,
            "type": "page",
            "title": request.title,
            "space": { "key": request.space_key },
            "version": { "number": request.version },
            "body": {
                "storage": {
                    "value": request.body,
                    "representation": "storage",
                }
            },
        });
        if let Some(ancestor) = &request.ancestor {
            payload["ancestors"] = serde_json::json!([{ "id": ancestor }]);
        }

        self.with_retry("update page", || {
            let response = self
                .authorize(
                    self.http
                        .put(self.api(&format!("content/{}", request.page_id))),
                )
                .json(&payload)
                .send()?;
            Ok(self.check(response, &request.title)?.json()?)
        })
    }

    pub fn delete_page(&self, page_id: &str) -> Result<()> {
        self.with_retry("delete page", || {
            let response = self
                .authorize(
                    self.http
                        .delete(self.api(&format!("content/{}", page_id))),
                )
                .send()?;
            self.check(response, page_id)?;
            Ok(())
        })
    }

    pub fn move_page(&self, page_id: &str, new_parent_id: &str) -> Result<()> {
        self.with_retry("move page", || {
            let response = self
                .authorize(self.http.put(self.api(&format!(
                    "content/{}/move/append/{}",
                    page_id, new_parent_id
                ))))
                .send()?;
            self.check(response, page_id)?;
            Ok(())
        })
    }

    pub fn test_connection(&self) -> Result<bool> {
        self.with_retry("test connection", || {
            let response = self
                .authorize(self.http.get(self.api("user/current")))
                .send()?;
            let _user: CurrentUser = self.check(response, "current user")?.json()?;
            Ok(true)
        })
    }

    /// Uploads a file as a page attachment. An attachment with the same
    /// name is left to the remote to reconcile.
    pub fn upload_attachment(&self, page_id: &str, file: &Path) -> Result<()> {
        self.with_retry("upload attachment", || {
            let form = reqwest::blocking::multipart::Form::new()
                .file("file", file)
                .map_err(|err| {
                    Error::Validation(format!(
                        "Cannot read attachment {}: {}",
                        file.display(),
                        err
                    ))
                })?
                .text("minorEdit", "true");

            let response = self
                .authorize(
                    self.http
                        .post(self.api(&format!("content/{}/child/attachment", page_id))),
                )
                .header("X-Atlassian-Token", "nocheck")
                .multipart(form)
                .send()?;
            self.check(response, page_id)?;
            Ok(())
        })
    }

    fn api(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{}/rest/api/{}", base, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Basic {
                username,
                api_token,
            } => request.basic_auth(username, Some(api_token)),
            Credentials::Bearer(token) => request.bearer_auth(token),
        }
    }

    /// Maps a non-2xx response onto the failure taxonomy.
    fn check(&self, response: Response, context: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let message = response
            .json::<ErrorBody>()
            .ok()
            .and_then(|body| body.message)
            .unwrap_or_else(|| status.to_string());

        Err(match status.as_u16() {
            401 => Error::Auth(message),
            403 => Error::Forbidden(message),
            404 => Error::NotFound(format!("{}: {}", context, message)),
            409 => Error::Conflict(format!("{}: {}", context, message)),
            400 => Error::Validation(message),
            429 => Error::RateLimited { retry_after },
            code if code >= 500 => Error::Server {
                status: code,
                message,
            },
            code => Error::Generic(format!("Unexpected status {}: {}", code, message)),
        })
    }

    fn with_retry<T>(&self, operation: &str, attempt: impl Fn() -> Result<T>) -> Result<T> {
        let mut attempts: u32 = 0;
        loop {
            match attempt() {
                Err(err) if err.retryable() => {
                    attempts += 1;
                    if attempts > self.retry_count {
                        return Err(Error::MaxRetriesExceeded {
                            attempts,
                            last_error: format!("{}: {}", operation, err),
                        });
                    }

                    let backoff = self
                        .retry_delay
                        .checked_mul(1u32 << (attempts - 1).min(5))
                        .unwrap_or(Duration::from_secs(MAX_BACKOFF_SECS));
                    let delay = match &err {
                        Error::RateLimited {
                            retry_after: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => backoff.min(Duration::from_secs(MAX_BACKOFF_SECS)),
                    };
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }
}
