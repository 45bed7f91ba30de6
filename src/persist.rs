// Persisted snapshot file (v1)
//
// Layout (LE):
// MAGIC8 = "SOSCACHE"
// u32 version      = 1
// u8  codec        (0=none, 1=zstd)
// u8[3] reserved   (zero)
// u64 payload_len  (stored bytes, after compression)
// u32 crc32c(payload)
// payload          = JSON of the snapshot
//
// Policy:
// - Atomic write: tmp+rename, fsync of the file and (best-effort) of the parent directory.
// - Every access holds the advisory lock `<file>.lock` (exclusive for write/consume).
// - Any anomaly on read is an error; `load_and_consume` deletes the file either way.

use anyhow::{anyhow, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
#[cfg(unix)]
use std::fs::File;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::lock::{acquire_lock, LockMode};
use crate::snapshot::Snapshot;

pub const PERSIST_MAGIC: &[u8; 8] = b"SOSCACHE";
pub const PERSIST_VERSION: u32 = 1;
pub const HEADER_LEN: usize = 8 + 4 + 1 + 3 + 8 + 4;

pub const CODEC_NONE: u8 = 0;
pub const CODEC_ZSTD: u8 = 1;

/// Refuse absurd lengths before allocating.
const MAX_PAYLOAD: u64 = 1 << 34;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistHeader {
    pub version: u32,
    pub codec: u8,
    pub payload_len: u64,
    pub checksum: u32,
}

impl PersistHeader {
    pub fn codec_name(&self) -> &'static str {
        match self.codec {
            CODEC_NONE => "none",
            CODEC_ZSTD => "zstd",
            _ => "unknown",
        }
    }
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}
#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Serialize `snapshot` into `path` (tmp+rename). Returns the number of bytes written.
pub fn write_snapshot_file(path: &Path, snapshot: &Snapshot, compress: bool) -> Result<u64> {
    let json = snapshot
        .to_canonical_bytes()
        .context("serialize snapshot")?;
    let (codec, payload) = if compress {
        let z = zstd::bulk::compress(&json, 0).context("zstd compress snapshot")?;
        (CODEC_ZSTD, z)
    } else {
        (CODEC_NONE, json)
    };
    let header = PersistHeader {
        version: PERSIST_VERSION,
        codec,
        payload_len: payload.len() as u64,
        checksum: crc32c::crc32c(&payload),
    };

    let _lock = acquire_lock(path, LockMode::Exclusive)?;
    let tmp = tmp_path(path);
    let _ = fs::remove_file(&tmp); // best-effort

    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp)
        .with_context(|| format!("open snapshot tmp {}", tmp.display()))?;
    write_header(&mut f, &header)?;
    f.write_all(&payload)
        .with_context(|| format!("write snapshot payload {}", tmp.display()))?;
    f.sync_all()?; // flush tmp to disk

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    let _ = fsync_dir(path);

    let written = HEADER_LEN as u64 + header.payload_len;
    info!(
        "persisted cache snapshot to {} ({} bytes, codec={})",
        path.display(),
        written,
        header.codec_name()
    );
    Ok(written)
}

fn write_header<W: Write>(w: &mut W, h: &PersistHeader) -> Result<()> {
    w.write_all(PERSIST_MAGIC)?;
    w.write_u32::<LittleEndian>(h.version)?;
    w.write_u8(h.codec)?;
    w.write_all(&[0u8; 3])?;
    w.write_u64::<LittleEndian>(h.payload_len)?;
    w.write_u32::<LittleEndian>(h.checksum)?;
    Ok(())
}

fn read_header<R: Read>(r: &mut R, path: &Path) -> Result<PersistHeader> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)
        .with_context(|| format!("read header of {}", path.display()))?;
    if &magic != PERSIST_MAGIC {
        return Err(anyhow!(
            "bad snapshot magic at {} (expected {:?}, got {:?})",
            path.display(),
            PERSIST_MAGIC,
            magic
        ));
    }
    let version = r.read_u32::<LittleEndian>()?;
    if version != PERSIST_VERSION {
        return Err(anyhow!(
            "unsupported snapshot version {} at {} (expected {})",
            version,
            path.display(),
            PERSIST_VERSION
        ));
    }
    let codec = r.read_u8()?;
    if codec != CODEC_NONE && codec != CODEC_ZSTD {
        return Err(anyhow!("unknown snapshot codec {} at {}", codec, path.display()));
    }
    let mut reserved = [0u8; 3];
    r.read_exact(&mut reserved)?;
    let payload_len = r.read_u64::<LittleEndian>()?;
    if payload_len > MAX_PAYLOAD {
        return Err(anyhow!(
            "snapshot payload length {} at {} is out of range",
            payload_len,
            path.display()
        ));
    }
    let checksum = r.read_u32::<LittleEndian>()?;
    Ok(PersistHeader {
        version,
        codec,
        payload_len,
        checksum,
    })
}

/// Read and verify the header only.
pub fn inspect(path: &Path) -> Result<PersistHeader> {
    let _lock = acquire_lock(path, LockMode::Shared)?;
    let mut f = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open snapshot {}", path.display()))?;
    read_header(&mut f, path)
}

fn decode(path: &Path) -> Result<Snapshot> {
    let mut f = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("open snapshot {}", path.display()))?;
    let h = read_header(&mut f, path)?;

    let mut payload = Vec::new();
    f.read_to_end(&mut payload)
        .with_context(|| format!("read snapshot payload {}", path.display()))?;
    if payload.len() as u64 != h.payload_len {
        return Err(anyhow!(
            "snapshot payload length mismatch at {} (header {}, file {})",
            path.display(),
            h.payload_len,
            payload.len()
        ));
    }
    let calc = crc32c::crc32c(&payload);
    if calc != h.checksum {
        return Err(anyhow!(
            "snapshot checksum mismatch at {} (stored {:08x}, calculated {:08x})",
            path.display(),
            h.checksum,
            calc
        ));
    }
    let json = match h.codec {
        CODEC_ZSTD => zstd::stream::decode_all(&payload[..])
            .with_context(|| format!("zstd decode snapshot {}", path.display()))?,
        _ => payload,
    };
    serde_json::from_slice(&json).with_context(|| format!("decode snapshot JSON {}", path.display()))
}

/// Read the snapshot without consuming the file.
pub fn read_snapshot_file(path: &Path) -> Result<Snapshot> {
    let _lock = acquire_lock(path, LockMode::Shared)?;
    decode(path)
}

/// Consume-once load: Ok(None) if there is no file; the file is deleted after any attempt.
pub fn load_and_consume(path: &Path) -> Result<Option<Snapshot>> {
    let _lock = acquire_lock(path, LockMode::Exclusive)?;
    if !path.exists() {
        debug!("no persisted cache snapshot at {}", path.display());
        return Ok(None);
    }
    let res = decode(path);
    if let Err(e) = fs::remove_file(path) {
        warn!("could not delete consumed snapshot {}: {}", path.display(), e);
    } else {
        let _ = fsync_dir(path);
    }
    res.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_roundtrip() -> Result<()> {
        let h = PersistHeader {
            version: PERSIST_VERSION,
            codec: CODEC_ZSTD,
            payload_len: 1234,
            checksum: 0xdead_beef,
        };
        let mut buf = Vec::new();
        write_header(&mut buf, &h)?;
        assert_eq!(buf.len(), HEADER_LEN);
        let back = read_header(&mut Cursor::new(buf), Path::new("mem"))?;
        assert_eq!(back, h);
        Ok(())
    }

    #[test]
    fn rejects_foreign_magic_and_version() -> Result<()> {
        let mut buf = b"NOTCACHE".to_vec();
        buf.extend_from_slice(&[0u8; HEADER_LEN - 8]);
        assert!(read_header(&mut Cursor::new(buf), Path::new("mem")).is_err());

        let mut buf = Vec::new();
        write_header(
            &mut buf,
            &PersistHeader {
                version: 9,
                codec: CODEC_NONE,
                payload_len: 0,
                checksum: 0,
            },
        )?;
        let err = read_header(&mut Cursor::new(buf), Path::new("mem")).unwrap_err();
        assert!(err.to_string().contains("unsupported snapshot version"));
        Ok(())
    }
}
