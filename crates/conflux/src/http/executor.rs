//! Drives one request through its lifecycle: send, redirect chase,
//! validate, retry.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use url::Url;

use crate::config::Config;
use crate::error::{RequestError, Result};
use crate::headers::Headers;
use super::request::{Body, Request};
use super::response::Response;

/// Transfer progress callback, invoked with `(bytes, total)` while the
/// request body is written and while the response body is read.
pub type ProgressFn<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);

/// The terminal result of an executed request.
///
/// A failed exchange that still produced a response (an unsuccessful
/// status, a validator rejection) carries both the response and the
/// error.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The final response, if one was received.
    pub response: Option<Arc<Response>>,
    /// The classified failure, if the exchange did not succeed.
    pub error: Option<RequestError>,
}

impl Outcome {
    pub(crate) fn success(response: Arc<Response>) -> Self {
        Self {
            response: Some(response),
            error: None,
        }
    }

    pub(crate) fn failure(response: Option<Arc<Response>>, error: RequestError) -> Self {
        Self {
            response,
            error: Some(error),
        }
    }

    /// Whether the exchange succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, surfacing the error if present.
    pub fn into_result(self) -> Result<Arc<Response>> {
        match self.error {
            Some(error) => Err(error),
            None => self
                .response
                .ok_or_else(|| RequestError::Failed("no response received".to_string())),
        }
    }
}

/// Executes request descriptors over a shared transport.
pub struct Executor {
    http: reqwest::Client,
    config: Arc<Config>,
}

impl Executor {
    /// Build an executor over a fresh transport configured per `config`.
    ///
    /// The transport's own redirect following is disabled; the executor
    /// chases redirects itself so it can bound the chain and rewrite the
    /// descriptor.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RequestError::Failed(format!("transport setup failed: {e}")))?;
        Ok(Self { http, config })
    }

    /// Run the request to completion: redirect chasing, status check,
    /// validators, and the retry loop. Never panics and never returns a
    /// redirect-continuation as an error.
    pub async fn execute(&self, request: &mut Request, progress: ProgressFn<'_>) -> Outcome {
        let mut last_response: Option<Arc<Response>> = None;
        loop {
            let error = match self.attempt(request, progress).await {
                Ok(response) => {
                    let response = Arc::new(response);
                    last_response = Some(response.clone());
                    if request.throw_on_failure() && !response.is_success() {
                        RequestError::Unsuccessful {
                            status: response.status(),
                            reason: response.reason().to_string(),
                        }
                    } else if let Some(error) = self.validate(request, &response) {
                        error
                    } else {
                        return Outcome::success(response);
                    }
                }
                Err(error) => error,
            };

            // A cancelled request is never retried.
            if error.is_cancelled() {
                return Outcome::failure(last_response.take(), error);
            }
            if request.retry_count() >= request.retries() {
                let error = if request.retries() > 0 {
                    RequestError::MaxRetriesReached(Box::new(error))
                } else {
                    error
                };
                return Outcome::failure(last_response.take(), error);
            }
            if let Some(decision) = request.retry_decision().cloned() {
                if !decision.on_will_retry(last_response.as_deref(), &error, request) {
                    return Outcome::failure(last_response.take(), error);
                }
            }
            request.bump_retry_count();
            tracing::debug!(
                url = request.url(),
                attempt = request.retry_count(),
                error = %error,
                "retrying request"
            );
            if !request.retry_spacing().is_zero() {
                tokio::time::sleep(request.retry_spacing()).await;
            }
        }
    }

    /// Run config-level then request-level validators in order; the first
    /// rejection or failure wins.
    fn validate(&self, request: &Request, response: &Response) -> Option<RequestError> {
        let validators = self
            .config
            .default_validators
            .iter()
            .chain(request.validators());
        for validator in validators {
            match validator.validate(response) {
                Ok(true) => {}
                Ok(false) => {
                    return Some(RequestError::ValidatorRejected {
                        id: validator.id().to_string(),
                    })
                }
                Err(cause) => {
                    return Some(RequestError::ValidatorErrored {
                        id: validator.id().to_string(),
                        message: cause.to_string(),
                    })
                }
            }
        }
        None
    }

    /// One attempt: the send/receive loop including redirect chasing.
    async fn attempt(&self, request: &mut Request, progress: ProgressFn<'_>) -> Result<Response> {
        loop {
            if request.is_cancelled() {
                return Err(RequestError::Cancelled);
            }

            let url = Url::parse(request.url())?;
            let mut header_map = self.build_headers(request)?;
            let mut builder = self.http.request(request.method().to_reqwest(), url.clone());

            match request.body() {
                Body::Empty => {}
                Body::Bytes(bytes) => {
                    // Raw bodies report upload progress the same way a
                    // payload source does, one buffer-sized chunk at a
                    // time against the known total.
                    let total = bytes.len() as u64;
                    let mut written = 0u64;
                    for chunk in bytes.chunks(self.config.buffer_size) {
                        written += chunk.len() as u64;
                        progress(written, Some(total));
                    }
                    builder = builder.body(bytes.clone());
                }
                Body::Payload(payload) => {
                    let mut source = payload.lock();
                    let mut buf = Vec::with_capacity(self.config.buffer_size);
                    let result =
                        source.write_to(&mut buf, &mut |current, total| progress(current, total));
                    source.close();
                    let written = result?;
                    if !header_map.contains_key(CONTENT_TYPE) {
                        let content_type = HeaderValue::from_str(source.content_type())
                            .map_err(|e| RequestError::InvalidHeader(e.to_string()))?;
                        header_map.insert(CONTENT_TYPE, content_type);
                    }
                    header_map.insert(CONTENT_LENGTH, HeaderValue::from(written));
                    builder = builder.body(buf);
                }
            }

            let timeout = request.read_timeout().unwrap_or(self.config.read_timeout);
            let mut reply = builder
                .headers(header_map)
                .timeout(timeout)
                .send()
                .await?;
            if request.is_cancelled() {
                return Err(RequestError::Cancelled);
            }

            let status = i32::from(reply.status().as_u16());
            if self.config.follow_redirects && (300..=303).contains(&status) {
                if let Some(location) = reply
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                {
                    if request.redirect_count() >= self.config.max_redirects {
                        return Err(RequestError::TooManyRedirects {
                            max: self.config.max_redirects,
                        });
                    }
                    // Relative Location values resolve against the
                    // current URL.
                    let target = url.join(location)?;
                    tracing::debug!(from = %url, to = %target, status, "following redirect");
                    request.redirect_to(target.to_string());
                    continue;
                }
            }

            let reason = reply
                .status()
                .canonical_reason()
                .unwrap_or_default()
                .to_string();
            let headers = Headers::from(reply.headers());
            let final_url = reply.url().to_string();
            let total = reply.content_length();

            let mut body = Vec::new();
            while let Some(chunk) = reply.chunk().await? {
                if request.is_cancelled() {
                    return Err(RequestError::Cancelled);
                }
                body.extend_from_slice(&chunk);
                progress(body.len() as u64, total);
            }

            let response =
                Response::new(status, reason, final_url, headers, body, self.config.codecs.clone())
                    .with_redirects(request.redirect_count());
            return Ok(response);
        }
    }

    /// Merge config default headers with request headers (request wins)
    /// into a transport header map.
    fn build_headers(&self, request: &Request) -> Result<HeaderMap> {
        let mut merged = self.config.default_headers.clone();
        merged.extend(request.headers());

        let mut map = HeaderMap::new();
        for (name, value) in merged.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RequestError::InvalidHeader(format!("{name:?}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| RequestError::InvalidHeader(format!("{name:?}: {e}")))?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_into_result_surfaces_error_over_response() {
        let outcome = Outcome::failure(None, RequestError::TimedOut);
        assert!(matches!(outcome.into_result(), Err(RequestError::TimedOut)));
    }

    #[test]
    fn outcome_without_response_or_error_is_a_failure() {
        let outcome = Outcome {
            response: None,
            error: None,
        };
        assert!(outcome.into_result().is_err());
    }
}
