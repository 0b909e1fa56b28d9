use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{Anchor, AnchorError};

#[derive(Serialize)]
struct StoreRequest<'a> {
    election_id: &'a str,
    fingerprint: &'a str,
}

#[derive(Deserialize)]
struct StoreResponse {
    reference: String,
}

#[derive(Deserialize)]
struct FetchResponse {
    fingerprint: String,
}

/// Anchor service reached over HTTP.
///
/// `POST {base}/anchors` with `{election_id, fingerprint}` answers `{reference}`;
/// `GET {base}/anchors/{election_id}` answers `{fingerprint}`.
pub struct HttpAnchor {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl HttpAnchor {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AnchorError> {
        let base = Url::parse(base_url)
            .map_err(|e| AnchorError::Malformed(format!("invalid anchor URL {base_url:?}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(AnchorError::Malformed(format!(
                "anchor URL {base_url:?} cannot have paths"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    /// `{base}/anchors[/{election_id}]`, with the ID escaped as one path segment.
    fn endpoint(&self, election_id: Option<&str>) -> Result<Url, AnchorError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AnchorError::Malformed("anchor URL cannot have paths".to_string()))?;
            segments.pop_if_empty().push("anchors");
            if let Some(id) = election_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Turn a non-success response into an error carrying its body.
    async fn reject(response: Response) -> AnchorError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        AnchorError::Rejected { status, message }
    }
}

#[rocket::async_trait]
impl Anchor for HttpAnchor {
    async fn store(&self, election_id: &str, fingerprint: &str) -> Result<String, AnchorError> {
        let url = self.endpoint(None)?;
        debug!("Anchoring {fingerprint} for election {election_id} at {url}");
        let response = self
            .authorize(self.client.post(url))
            .json(&StoreRequest {
                election_id,
                fingerprint,
            })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Self::reject(response).await);
        }
        let body: StoreResponse = response.json().await?;
        if body.reference.is_empty() {
            return Err(AnchorError::Malformed(
                "anchor returned an empty reference".to_string(),
            ));
        }
        Ok(body.reference)
    }

    async fn fetch(&self, election_id: &str) -> Result<String, AnchorError> {
        let url = self.endpoint(Some(election_id))?;
        let response = self.authorize(self.client.get(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(AnchorError::NoRecord(election_id.to_string())),
            status if status.is_success() => {
                let body: FetchResponse = response.json().await?;
                Ok(body.fingerprint)
            }
            _ => Err(Self::reject(response).await),
        }
    }
}
