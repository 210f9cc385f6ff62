//! Retrieval through the Polytope web service.
//!
//! Polytope returns the raw global fields in a single file. Reducing them to the per step files
//! at station resolution needs an interpolation step this crate does not have, so a retrieval
//! stores the raw data and then reports the gap as an error.

use std::{
    fs::File,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use reqwest::{
    blocking::{Client, Response},
    header::{AUTHORIZATION, LOCATION},
    StatusCode,
};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{RetrievalBackend, Request};
use crate::{category::Category, config::ExtractDtSection, errors::DtExtractErr};

const EMAIL_VAR: &str = "POLYTOPE_USER_EMAIL";
const KEY_VAR: &str = "POLYTOPE_USER_KEY";

/// Fetches data from a Polytope server.
#[derive(Debug)]
pub struct PolytopeBackend {
    address: String,
    collection: String,
    target_dir: PathBuf,
    email: Option<String>,
    key: Option<String>,
    poll_interval: Duration,
    client: Client,
}

impl PolytopeBackend {
    /// Set up a client for the configured server, with credentials from the environment. Raw data
    /// is stored in `target_dir`.
    pub fn new(section: &ExtractDtSection, target_dir: &Path) -> Result<Self, DtExtractErr> {
        let client = Client::builder().build()?;

        Ok(PolytopeBackend {
            address: section.polytope_address.clone(),
            collection: section.polytope_collection.clone(),
            target_dir: target_dir.to_path_buf(),
            email: std::env::var(EMAIL_VAR).ok(),
            key: std::env::var(KEY_VAR).ok(),
            poll_interval: Duration::from_secs(5),
            client,
        })
    }

    fn requests_url(&self) -> String {
        let address = self.address.trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{}/api/v1/requests/{}", address, self.collection)
        } else {
            format!("https://{}/api/v1/requests/{}", address, self.collection)
        }
    }

    fn authorization(&self) -> Option<String> {
        match (&self.email, &self.key) {
            (Some(email), Some(key)) => Some(format!("EmailKey {}:{}", email, key)),
            (None, Some(key)) => Some(format!("Bearer {}", key)),
            _ => None,
        }
    }

    fn get(&self, url: &str) -> Result<Response, DtExtractErr> {
        let mut builder = self.client.get(url);
        if let Some(auth) = self.authorization() {
            builder = builder.header(AUTHORIZATION, auth);
        }
        Ok(builder.send()?)
    }

    // Follow a queued request until the server hands over the data.
    fn wait_for_data(&self, mut response: Response) -> Result<Response, DtExtractErr> {
        loop {
            match response.status() {
                StatusCode::OK => return Ok(response),
                StatusCode::ACCEPTED | StatusCode::SEE_OTHER => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|loc| loc.to_str().ok())
                        .map(|loc| response.url().join(loc))
                        .transpose()
                        .map_err(|err| DtExtractErr::Polytope(err.to_string()))?
                        .ok_or_else(|| {
                            DtExtractErr::Polytope("queued request without a location".to_owned())
                        })?;

                    debug!("polytope request queued at {}", location);
                    thread::sleep(self.poll_interval);
                    response = self.get(location.as_str())?;
                }
                status => {
                    let body = response.text().unwrap_or_default();
                    return Err(DtExtractErr::Polytope(format!("{}: {}", status, body)));
                }
            }
        }
    }
}

/// The request in the `key: value` form the service expects.
fn request_text(request: &Request) -> String {
    request
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

impl RetrievalBackend for PolytopeBackend {
    fn retrieve(
        &self,
        request: &Request,
        category: Category,
        _workdir: &Path,
    ) -> Result<(), DtExtractErr> {
        info!("POLYTOPE REQUEST: {}", request);

        let body = json!({
            "verb": "retrieve",
            "request": request_text(request),
        });

        let mut builder = self.client.post(self.requests_url()).json(&body);
        if let Some(auth) = self.authorization() {
            builder = builder.header(AUTHORIZATION, auth);
        } else {
            warn!("no polytope credentials in {} / {}", EMAIL_VAR, KEY_VAR);
        }

        let mut response = self.wait_for_data(builder.send()?)?;

        let target = self
            .target_dir
            .join(format!("{}_raw.grib", category.tag()));
        let mut file = File::create(&target)?;
        let bytes = response.copy_to(&mut file)?;
        info!("stored {} bytes of global data in {}", bytes, target.display());

        Err(DtExtractErr::NotImplemented(
            "interpolation of polytope data to station points",
        ))
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
