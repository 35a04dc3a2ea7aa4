// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    log::warn,
    sha2::Digest,
    std::{io::Write, path::Path},
    thiserror::Error,
    url::Url,
};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hex parsing error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("HTTP status {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("hash mismatch of downloaded {name}; wanted {expected}, got {actual}")]
    HashMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

pub type Result<T> = std::result::Result<T, HttpError>;

/// Defines remote content that can be downloaded.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteContent {
    /// Identifier used in log messages.
    pub name: String,
    /// URL to fetch.
    pub url: String,
    /// Expected hex SHA-256 of the content.
    ///
    /// Content behind a moving "latest" URL cannot be pinned, so this is
    /// optional.
    pub sha256: Option<String>,
}

/// Obtain an HTTP client, taking proxy environment variables into account.
pub fn get_http_client() -> reqwest::Result<reqwest::blocking::Client> {
    let mut builder = reqwest::blocking::ClientBuilder::new();

    for (key, value) in std::env::vars() {
        let key = key.to_lowercase();
        if let Some(schema) = key.strip_suffix("_proxy") {
            if let Ok(url) = Url::parse(&value) {
                let proxy = match schema {
                    "http" => Some(reqwest::Proxy::http(url.as_str())),
                    "https" => Some(reqwest::Proxy::https(url.as_str())),
                    _ => None,
                };

                if let Some(Ok(proxy)) = proxy {
                    builder = builder.proxy(proxy);
                }
            }
        }
    }

    builder.build()
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(data);

    hex::encode(hasher.finalize())
}

/// Verify data against an expected hex SHA-256, if one is defined.
pub fn verify_content(entry: &RemoteContent, data: &[u8]) -> Result<()> {
    if let Some(expected) = &entry.sha256 {
        // Normalizes case and rejects garbage digests.
        let expected = hex::encode(hex::decode(expected)?);
        let actual = sha256_hex(data);

        if expected != actual {
            return Err(HttpError::HashMismatch {
                name: entry.name.clone(),
                expected,
                actual,
            });
        }
    }

    Ok(())
}

/// Fetch remote content and verify its SHA-256 matches expectations.
pub fn download_and_verify(entry: &RemoteContent) -> Result<Vec<u8>> {
    warn!("downloading {}", entry.url);
    let url = Url::parse(&entry.url)?;
    let client = get_http_client()?;
    let response = client.get(url).send()?;

    if !response.status().is_success() {
        return Err(HttpError::Status {
            url: entry.url.clone(),
            status: response.status().as_u16(),
        });
    }

    let data = response.bytes()?.to_vec();

    if entry.sha256.is_some() {
        warn!("validating hash of {}...", entry.name);
    }
    verify_content(entry, &data)?;

    Ok(data)
}

/// Ensure remote content is present at a local path.
///
/// If the destination exists and matches a pinned digest, no download
/// occurs. Content is written to a temporary file in the destination directory
/// and renamed into place so an interrupted download never leaves a partial
/// file at `dest`.
pub fn download_to_path(entry: &RemoteContent, dest: impl AsRef<Path>) -> Result<()> {
    let dest = dest.as_ref();

    if entry.sha256.is_some() && dest.exists() {
        let existing = std::fs::read(dest)?;
        if verify_content(entry, &existing).is_ok() {
            warn!("{} already downloaded to {}", entry.name, dest.display());
            return Ok(());
        }
    }

    let data = download_and_verify(entry)?;

    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(&data)?;
    temp.persist(dest).map_err(|e| e.error)?;

    warn!("wrote {} bytes to {}", data.len(), dest.display());

    Ok(())
}
