use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use super::{
    ImageEvent, ImageStore, ImageStream, OsError, ProgressObserver, TransferOptions, ZIP_MIME,
    resolve::{DEFAULT_VERSION, VersionRequest, VersionResolver},
    unzip::{self, UnzipError},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub output: PathBuf,
    /// Version the image store actually served.
    pub version: String,
}

/// Resolves a version, streams the image and writes it to disk.
pub struct ImageFetchPipeline {
    resolver: VersionResolver,
    store: Arc<dyn ImageStore>,
    options: TransferOptions,
}

impl ImageFetchPipeline {
    pub fn new(
        resolver: VersionResolver,
        store: Arc<dyn ImageStore>,
        options: TransferOptions,
    ) -> Self {
        Self {
            resolver,
            store,
            options,
        }
    }

    /// Downloads the OS image for `device_type` to `output`.
    ///
    /// Zip payloads are extracted into `output` as a directory, anything else is
    /// written to `output` as a single file. An existing file is replaced only once
    /// the transfer has completed.
    pub async fn download(
        &self,
        device_type: &str,
        output: &Path,
        token: Option<&str>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<DownloadOutcome, OsError> {
        let request = VersionRequest::new(device_type, token);
        if request.token.is_none() {
            eprintln!("No version requested, downloading the {DEFAULT_VERSION} version");
        }
        let version = self.resolver.resolve_request(&request).await?;

        info!("Downloading {} image version {}", device_type, version);
        let mut stream = self
            .store
            .open(device_type, &version, &self.options)
            .await?;

        let served = match stream.next_event().await? {
            ImageEvent::ResolvedVersion(v) => v,
            other => {
                return Err(OsError::Transfer(format!(
                    "image stream sent '{}' before the resolved version",
                    other.kind()
                )));
            }
        };
        let is_zip = stream
            .mime()
            .map(|m| m.eq_ignore_ascii_case(ZIP_MIME))
            .unwrap_or(false);
        debug!(
            "serving version {} (mime: {:?})",
            served,
            stream.mime().unwrap_or("unknown")
        );

        observer.start(&served);
        let written = {
            let reader = StreamReader::new(Box::pin(payload(stream, &mut *observer)));
            if is_zip {
                extract_to_dir(reader, output, &self.options).await
            } else {
                write_to_file(reader, output).await
            }
        };

        match written {
            Ok(()) => {
                observer.finish();
                Ok(DownloadOutcome {
                    output: output.to_path_buf(),
                    version: served,
                })
            }
            Err(e) => {
                observer.abandon();
                Err(e)
            }
        }
    }
}

/// Payload bytes of an image stream, forwarding progress to `observer` as it goes.
fn payload<'a>(
    stream: Box<dyn ImageStream>,
    observer: &'a mut dyn ProgressObserver,
) -> impl Stream<Item = io::Result<Bytes>> + Send + 'a {
    futures::stream::unfold(
        Some((stream, observer)),
        |state| async move {
            let (mut stream, observer) = state?;
            loop {
                match stream.next_event().await {
                    Ok(ImageEvent::Data(chunk)) => return Some((Ok(chunk), Some((stream, observer)))),
                    Ok(ImageEvent::Progress(p)) => observer.update(p.as_ref()),
                    Ok(ImageEvent::End) => return None,
                    Ok(ImageEvent::ResolvedVersion(v)) => {
                        let err = OsError::Transfer(format!("unexpected second resolved version '{v}'"));
                        return Some((Err(io::Error::other(err)), None));
                    }
                    Err(e) => return Some((Err(io::Error::other(e)), None)),
                }
            }
        },
    )
}

/// Recovers the `OsError` a payload stream failure was wrapped in, or classifies a
/// local I/O failure with `local`.
fn classify(err: io::Error, local: fn(String) -> OsError) -> OsError {
    if err.get_ref().is_some_and(|inner| inner.is::<OsError>()) {
        if let Some(inner) = err.into_inner() {
            if let Ok(os) = inner.downcast::<OsError>() {
                return *os;
            }
        }
        return OsError::Transfer("image stream failed".to_string());
    }
    local(err.to_string())
}

async fn write_to_file<R>(mut reader: R, output: &Path) -> Result<(), OsError>
where
    R: AsyncBufRead + Unpin,
{
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".fleetos-download-")
        .tempfile_in(&dir)
        .map_err(|e| OsError::Transfer(format!("cannot write to {}: {}", dir.display(), e)))?;
    let std_file = tmp
        .reopen()
        .map_err(|e| OsError::Transfer(e.to_string()))?;
    let mut file = tokio::fs::File::from_std(std_file);

    let bytes = tokio::io::copy_buf(&mut reader, &mut file)
        .await
        .map_err(|e| classify(e, OsError::Transfer))?;
    file.flush()
        .await
        .map_err(|e| OsError::Transfer(e.to_string()))?;
    file.sync_all()
        .await
        .map_err(|e| OsError::Transfer(e.to_string()))?;
    drop(file);

    tmp.persist(output)
        .map_err(|e| OsError::Transfer(format!("cannot write {}: {}", output.display(), e.error)))?;
    debug!("wrote {} bytes to {}", bytes, output.display());
    Ok(())
}

async fn extract_to_dir<R>(reader: R, output: &Path, options: &TransferOptions) -> Result<(), OsError>
where
    R: AsyncBufRead + Unpin,
{
    let created = !output.exists();
    match unzip::extract(reader, output, options.flush_mode).await {
        Ok(summary) => {
            debug!(
                "extracted {} entries ({} bytes) to {}",
                summary.entries,
                summary.bytes,
                output.display()
            );
            Ok(())
        }
        Err(e) => {
            if created {
                if let Err(cleanup) = tokio::fs::remove_dir_all(output).await {
                    warn!("failed to remove {}: {}", output.display(), cleanup);
                }
            }
            Err(match e {
                UnzipError::Io(io) => classify(io, OsError::Decompression),
                UnzipError::Format(msg) => OsError::Decompression(msg),
            })
        }
    }
}
