// File transfer
//
// Uploads and downloads bypass `/rpc` and go through the PHP side channel
// under `/priv/script/php_rpc/`, authenticated by an `ads_sid` cookie that
// carries the same SID. Both directions accept only a fixed allow-list.

use std::path::Path;

use reqwest::StatusCode;
use reqwest::header::{COOKIE, HeaderValue};
use reqwest::multipart::{Form, Part};
use secrecy::ExposeSecret;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::client::DeviceClient;
use crate::error::Error;
use crate::transport::check_status;

const UPLOAD_PATH: &str = "priv/script/php_rpc/upload.php";
const DOWNLOAD_PATH: &str = "priv/script/php_rpc/download.php";

/// What an uploaded file is. The name doubles as the multipart field name.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum UploadKind {
    /// Firmware image; the device reboots into it.
    Firmware,
    Bootlogo,
    /// Settings backup (`.cf2`) to restore.
    Settings,
    CustomerSettings,
    /// CA, server, or client certificate.
    Cert,
    WwanUpdate,
}

impl UploadKind {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Files the device lets you download.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
pub enum DownloadFile {
    /// Diagnostics archive; generate it first with `generate_diag_now=1`.
    #[strum(serialize = "diag.tar.gz")]
    Diagnostics,
    /// Settings backup; prepare it first with `save_settings_now=1`.
    #[strum(serialize = "settings.cf2")]
    Settings,
}

impl DownloadFile {
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

fn allowed<E: IntoEnumIterator + Into<&'static str>>() -> String {
    E::iter()
        .map(Into::<&'static str>::into)
        .collect::<Vec<_>>()
        .join(", ")
}

impl DeviceClient {
    // ── Upload ───────────────────────────────────────────────────────

    /// Upload `path` as `kind`, where `kind` is one of the [`UploadKind`]
    /// names (`firmware`, `cert`, ...).
    ///
    /// An unknown kind or a missing local file fails before any request.
    pub async fn upload_file(
        &self,
        kind: &str,
        path: impl AsRef<Path>,
    ) -> Result<String, Error> {
        let kind: UploadKind = kind.parse().map_err(|_| {
            Error::validation(
                "upload type",
                format!("'{kind}' is not one of: {}", allowed::<UploadKind>()),
            )
        })?;
        self.upload(kind, path).await
    }

    /// Upload `path` as `kind`.
    ///
    /// `POST /priv/script/php_rpc/upload.php` (multipart, field named after
    /// `kind`). Returns the device's response text verbatim; it carries no
    /// reliable success marker, so confirm the effect with a status query
    /// (certificate list, image version) afterwards.
    pub async fn upload(
        &self,
        kind: UploadKind,
        path: impl AsRef<Path>,
    ) -> Result<String, Error> {
        let path = path.as_ref();
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::LocalFileNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| kind.as_str().to_owned());

        let cookie = self.session_cookie().await?;
        let url = self.base_url().join(UPLOAD_PATH)?;
        debug!(%kind, file = %file_name, bytes = data.len(), "POST {}", url);

        let form = Form::new().part(kind.as_str(), Part::bytes(data).file_name(file_name));
        let resp = self
            .http()
            .post(url)
            .header(COOKIE, cookie)
            .multipart(form)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        Ok(resp.text().await?)
    }

    // ── Download ─────────────────────────────────────────────────────

    /// Download `remote_name` (`diag.tar.gz` or `settings.cf2`) to `local_path`.
    ///
    /// Any other name fails before any request.
    pub async fn download_file(
        &self,
        remote_name: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<u64, Error> {
        let file: DownloadFile = remote_name.parse().map_err(|_| {
            Error::validation(
                "download file",
                format!("'{remote_name}' is not one of: {}", allowed::<DownloadFile>()),
            )
        })?;
        self.download(file, local_path).await
    }

    /// Stream `file` from the device into `local_path`, returning the number
    /// of bytes written.
    ///
    /// `GET /priv/script/php_rpc/download.php?file={name}`. The body is
    /// written chunk by chunk as it arrives; diagnostics archives are large.
    /// Any status other than 200 is [`Error::HttpStatus`] and no local file
    /// is created. A body that breaks off midway removes the partial file.
    pub async fn download(
        &self,
        file: DownloadFile,
        local_path: impl AsRef<Path>,
    ) -> Result<u64, Error> {
        let local_path = local_path.as_ref();
        let cookie = self.session_cookie().await?;

        let mut url: Url = self.base_url().join(DOWNLOAD_PATH)?;
        url.query_pairs_mut().append_pair("file", file.as_str());
        debug!(%file, "GET {}", url);

        let resp = self.http().get(url).header(COOKIE, cookie).send().await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let written = match write_body(resp, local_path).await {
            Ok(written) => written,
            Err(e) => {
                warn!(
                    %file,
                    path = %local_path.display(),
                    "download failed, removing partial file"
                );
                if let Err(rm) = tokio::fs::remove_file(local_path).await {
                    debug!(error = %rm, "partial file not removed");
                }
                return Err(e);
            }
        };

        debug!(%file, bytes = written, path = %local_path.display(), "download complete");
        Ok(written)
    }

    /// `ads_sid={sid}` cookie for the PHP endpoints, logging in if needed.
    async fn session_cookie(&self) -> Result<HeaderValue, Error> {
        let sid = self.ensure_authenticated().await?;
        let mut value = HeaderValue::from_str(&format!("ads_sid={}", sid.expose_secret()))
            .map_err(|e| Error::Authentication {
                message: format!("session id is not a valid cookie value: {e}"),
            })?;
        value.set_sensitive(true);
        Ok(value)
    }
}

async fn write_body(mut resp: reqwest::Response, local_path: &Path) -> Result<u64, Error> {
    let mut out = tokio::fs::File::create(local_path).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = resp.chunk().await? {
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}
