//! Streaming zip extraction.
//!
//! Image downloads are extracted while they arrive, so entries are read from their
//! local headers in stream order and the central directory is never consulted.
//! Entries written with a trailing data descriptor are supported for deflate; a
//! stored entry without a declared size cannot be delimited and is rejected.

use std::io;
use std::path::{Component, Path, PathBuf};

use crc32fast::Hasher;
use flate2::{Decompress, FlushDecompress, Status};
use fleetos_shared::config::FlushMode;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

const LOCAL_FILE_HEADER: u32 = 0x0403_4b50;
const CENTRAL_DIRECTORY_HEADER: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY: u32 = 0x0605_4b50;
const DATA_DESCRIPTOR: u32 = 0x0807_4b50;

const FLAG_ENCRYPTED: u16 = 0x0001;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

const ZIP64_EXTRA_ID: u16 = 0x0001;

const OUTPUT_CHUNK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum UnzipError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Format(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractSummary {
    pub entries: usize,
    pub bytes: u64,
}

#[derive(Debug)]
struct EntryHeader {
    name: String,
    flags: u16,
    method: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    zip64: bool,
}

impl EntryHeader {
    fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    fn has_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }
}

/// Extracts every entry of the archive read from `reader` below `dest`, then drains
/// the remainder of the stream.
pub async fn extract<R>(
    mut reader: R,
    dest: &Path,
    flush_mode: FlushMode,
) -> Result<ExtractSummary, UnzipError>
where
    R: AsyncBufRead + Unpin,
{
    fs::create_dir_all(dest).await?;

    let mut summary = ExtractSummary::default();
    loop {
        let signature = match reader.read_u32_le().await {
            Ok(sig) => sig,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(UnzipError::Format(
                    "archive ended before the central directory".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        match signature {
            LOCAL_FILE_HEADER => {
                summary.bytes += extract_entry(&mut reader, dest, flush_mode).await?;
                summary.entries += 1;
            }
            CENTRAL_DIRECTORY_HEADER | END_OF_CENTRAL_DIRECTORY => break,
            other => {
                return Err(UnzipError::Format(format!(
                    "unexpected record signature {other:#010x}"
                )));
            }
        }
    }

    let trailing = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await?;
    trace!("skipped {} bytes of central directory", trailing + 4);

    Ok(summary)
}

async fn extract_entry<R>(
    reader: &mut R,
    dest: &Path,
    flush_mode: FlushMode,
) -> Result<u64, UnzipError>
where
    R: AsyncBufRead + Unpin,
{
    let header = read_entry_header(reader).await?;
    if header.flags & FLAG_ENCRYPTED != 0 {
        return Err(UnzipError::Format(format!(
            "entry '{}' is encrypted",
            header.name
        )));
    }

    let path = entry_path(dest, &header.name)?;
    let mut hasher = Hasher::new();

    let written = if header.is_dir() {
        fs::create_dir_all(&path).await?;
        copy_entry_data(reader, &mut tokio::io::sink(), &header, flush_mode, &mut hasher).await?
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;
        let written = copy_entry_data(reader, &mut file, &header, flush_mode, &mut hasher).await?;
        file.flush().await?;
        written
    };

    let (crc32, size) = if header.has_descriptor() {
        read_data_descriptor(reader, header.zip64).await?
    } else {
        (header.crc32, header.uncompressed_size)
    };

    if hasher.finalize() != crc32 {
        return Err(UnzipError::Format(format!(
            "CRC mismatch in '{}'",
            header.name
        )));
    }
    if written != size {
        return Err(UnzipError::Format(format!(
            "size mismatch in '{}': expected {} bytes, got {}",
            header.name, size, written
        )));
    }

    debug!("extracted {} ({} bytes)", header.name, written);
    Ok(written)
}

async fn read_entry_header<R>(reader: &mut R) -> Result<EntryHeader, UnzipError>
where
    R: AsyncBufRead + Unpin,
{
    let _version_needed = reader.read_u16_le().await?;
    let flags = reader.read_u16_le().await?;
    let method = reader.read_u16_le().await?;
    let _mod_time = reader.read_u16_le().await?;
    let _mod_date = reader.read_u16_le().await?;
    let crc32 = reader.read_u32_le().await?;
    let compressed = reader.read_u32_le().await?;
    let uncompressed = reader.read_u32_le().await?;
    let name_len = reader.read_u16_le().await? as usize;
    let extra_len = reader.read_u16_le().await? as usize;

    let mut name = vec![0u8; name_len];
    reader.read_exact(&mut name).await?;
    let mut extra = vec![0u8; extra_len];
    reader.read_exact(&mut extra).await?;

    let name = String::from_utf8_lossy(&name).into_owned();
    let missing_zip64 = || UnzipError::Format(format!("missing zip64 sizes for '{name}'"));

    let mut compressed_size = compressed as u64;
    let mut uncompressed_size = uncompressed as u64;
    let zip64 = find_extra_field(&extra, ZIP64_EXTRA_ID);
    match zip64 {
        Some(field) => {
            // Only the fields saturated in the fixed header are present, uncompressed first.
            let mut sizes = field.chunks_exact(8).map(|c| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(c);
                u64::from_le_bytes(buf)
            });
            if uncompressed == u32::MAX {
                uncompressed_size = sizes.next().ok_or_else(missing_zip64)?;
            }
            if compressed == u32::MAX {
                compressed_size = sizes.next().ok_or_else(missing_zip64)?;
            }
        }
        None if compressed == u32::MAX || uncompressed == u32::MAX => {
            return Err(missing_zip64());
        }
        None => {}
    }

    Ok(EntryHeader {
        zip64: zip64.is_some(),
        name,
        flags,
        method,
        crc32,
        compressed_size,
        uncompressed_size,
    })
}

fn find_extra_field(extra: &[u8], id: u16) -> Option<&[u8]> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let field_id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let size = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        let body = extra.get(pos + 4..pos + 4 + size)?;
        if field_id == id {
            return Some(body);
        }
        pos += 4 + size;
    }
    None
}

/// Joins an entry name onto `dest`, refusing names that would land outside it.
fn entry_path(dest: &Path, name: &str) -> Result<PathBuf, UnzipError> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => {
                return Err(UnzipError::Format(format!(
                    "entry '{name}' points outside the target directory"
                )));
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(UnzipError::Format("entry with an empty name".to_string()));
    }
    Ok(dest.join(relative))
}

async fn copy_entry_data<R, W>(
    reader: &mut R,
    writer: &mut W,
    header: &EntryHeader,
    flush_mode: FlushMode,
    hasher: &mut Hasher,
) -> Result<u64, UnzipError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let limit = if header.has_descriptor() && header.compressed_size == 0 {
        None
    } else {
        Some(header.compressed_size)
    };

    match (header.method, limit) {
        (METHOD_STORED, Some(len)) => copy_stored(reader, writer, len, hasher).await,
        (METHOD_STORED, None) if header.is_dir() => Ok(0),
        (METHOD_STORED, None) => Err(UnzipError::Format(format!(
            "stored entry '{}' has no declared size",
            header.name
        ))),
        (METHOD_DEFLATED, limit) => inflate(reader, writer, limit, flush_mode, hasher).await,
        (method, _) => Err(UnzipError::Format(format!(
            "unsupported compression method {} in '{}'",
            method, header.name
        ))),
    }
}

async fn copy_stored<R, W>(
    reader: &mut R,
    writer: &mut W,
    len: u64,
    hasher: &mut Hasher,
) -> Result<u64, UnzipError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = len;
    while remaining > 0 {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(UnzipError::Format(
                "archive ended inside a stored entry".to_string(),
            ));
        }
        let n = (buf.len() as u64).min(remaining) as usize;
        writer.write_all(&buf[..n]).await?;
        hasher.update(&buf[..n]);
        reader.consume(n);
        remaining -= n as u64;
    }
    Ok(len)
}

async fn inflate<R, W>(
    reader: &mut R,
    writer: &mut W,
    limit: Option<u64>,
    flush_mode: FlushMode,
    hasher: &mut Hasher,
) -> Result<u64, UnzipError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let flush = match flush_mode {
        FlushMode::NoFlush => FlushDecompress::None,
        FlushMode::SyncFlush => FlushDecompress::Sync,
    };
    let mut decoder = Decompress::new(false);
    let mut out = vec![0u8; OUTPUT_CHUNK];

    loop {
        let buf = reader.fill_buf().await?;
        let available = match limit {
            Some(limit) => (buf.len() as u64).min(limit - decoder.total_in()) as usize,
            None => buf.len(),
        };
        let input = &buf[..available];
        let at_end = input.is_empty();

        let before_in = decoder.total_in();
        let before_out = decoder.total_out();
        let status = decoder
            .decompress(
                input,
                &mut out,
                if at_end { FlushDecompress::Finish } else { flush },
            )
            .map_err(|e| UnzipError::Format(format!("corrupt deflate data: {e}")))?;
        let consumed = (decoder.total_in() - before_in) as usize;
        let produced = (decoder.total_out() - before_out) as usize;
        reader.consume(consumed);

        if produced > 0 {
            writer.write_all(&out[..produced]).await?;
            hasher.update(&out[..produced]);
        }

        match status {
            Status::StreamEnd => return Ok(decoder.total_out()),
            _ if at_end && produced == 0 => {
                return Err(UnzipError::Format(
                    "archive ended inside a compressed entry".to_string(),
                ));
            }
            _ if consumed == 0 && produced == 0 => {
                return Err(UnzipError::Format("deflate stream stalled".to_string()));
            }
            _ => {}
        }
    }
}

async fn read_data_descriptor<R>(reader: &mut R, zip64: bool) -> Result<(u32, u64), UnzipError>
where
    R: AsyncBufRead + Unpin,
{
    // The descriptor signature is optional.
    let first = reader.read_u32_le().await?;
    let crc32 = if first == DATA_DESCRIPTOR {
        reader.read_u32_le().await?
    } else {
        first
    };
    let size = if zip64 {
        let _compressed = reader.read_u64_le().await?;
        reader.read_u64_le().await?
    } else {
        let _compressed = reader.read_u32_le().await?;
        reader.read_u32_le().await? as u64
    };
    Ok((crc32, size))
}
