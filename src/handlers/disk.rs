//! Local disk backend.
//!
//! Layout under the cache root:
//!
//! ```text
//! {root}/
//!   00/ .. ff/                 shard directories, by first id byte
//!     {hex(action_id)}-a       "{hex(output_id)} {size} {unix_secs}"
//!     {hex(output_id)}-d       object body
//! ```
//!
//! Object paths handed out in responses stay valid until the process exits.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::handlers::{Handler, HandlerFuture, RequestContext, ResponseWriter};
use crate::protocol::{Body, Command, Request, Response};
use crate::registry::Registry;

const ACTION_SUFFIX: &str = "-a";
const OBJECT_SUFFIX: &str = "-d";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Content store keyed by action id, one file per object.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

/// Metadata recorded for an action.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActionEntry {
    output_id: Vec<u8>,
    size: u64,
    stored_at: i64,
}

impl DiskCache {
    /// Open (creating if needed) a cache rooted at `root`, including all 256
    /// shard directories. The root is made absolute.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = root.canonicalize()?;
        for shard in 0..=u8::MAX {
            fs::create_dir_all(root.join(format!("{shard:02x}")))?;
        }
        tracing::info!(root = %root.display(), "initialized cache directory");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register this cache as the `get`, `put` and `close` handler.
    pub fn register(self: Arc<Self>, registry: &Registry) {
        let handler: Arc<dyn Handler> = self;
        registry.handle_get(Arc::clone(&handler));
        registry.handle_put(Arc::clone(&handler));
        registry.handle_close(handler);
    }

    pub fn object_path(&self, output_id: &[u8]) -> io::Result<PathBuf> {
        self.entry_path(output_id, OBJECT_SUFFIX)
    }

    pub fn action_path(&self, action_id: &[u8]) -> io::Result<PathBuf> {
        self.entry_path(action_id, ACTION_SUFFIX)
    }

    fn entry_path(&self, id: &[u8], suffix: &str) -> io::Result<PathBuf> {
        let Some(first) = id.first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty id"));
        };
        Ok(self
            .root
            .join(format!("{first:02x}"))
            .join(format!("{}{suffix}", hex::encode(id))))
    }

    /// Look up `action_id`. `Ok(None)` is a miss.
    pub fn lookup(&self, id: i64, action_id: &[u8]) -> io::Result<Option<Response>> {
        let action_path = self.action_path(action_id)?;
        let entry = match fs::read_to_string(&action_path) {
            Ok(text) => parse_action(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let object_path = self.object_path(&entry.output_id)?;
        let meta = match fs::metadata(&object_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if meta.len() != entry.size {
            tracing::debug!(id, path = %object_path.display(), "object size mismatch, treating as miss");
            return Ok(None);
        }

        Ok(Some(Response {
            id,
            output_id: entry.output_id,
            size: i64::try_from(entry.size).unwrap_or(i64::MAX),
            time: DateTime::<Utc>::from_timestamp(entry.stored_at, 0),
            disk_path: Some(object_path),
            ..Response::default()
        }))
    }

    /// Store `body` as the object for `output_id` and record it under
    /// `action_id`. Returns the object path. Partial files are removed on
    /// failure.
    pub fn store(&self, action_id: &[u8], output_id: &[u8], body: &mut Body) -> io::Result<PathBuf> {
        let action_path = self.action_path(action_id)?;
        let object_path = self.object_path(output_id)?;

        let size = write_atomically(&object_path, |file| io::copy(body, file))?;

        let entry = format!("{} {} {}", hex::encode(output_id), size, Utc::now().timestamp());
        if let Err(e) = write_atomically(&action_path, |file| file.write_all(entry.as_bytes())) {
            let _ = fs::remove_file(&object_path);
            return Err(e);
        }
        Ok(object_path)
    }

    async fn get(&self, w: &dyn ResponseWriter, req: &Request) {
        let cache = self.clone();
        let action_id = req.action_id.clone();
        let id = req.id;
        let result = tokio::task::spawn_blocking(move || cache.lookup(id, &action_id)).await;

        match result {
            Ok(Ok(Some(res))) => w.write_response(res),
            Ok(Ok(None)) => w.write_response(Response::miss(id)),
            Ok(Err(e)) => w.write_response(Response::error(id, format!("failed to read cache entry: {e}"))),
            Err(join_err) => w.write_response(Response::error(id, format!("cache lookup task failed: {join_err}"))),
        }
    }

    async fn put(&self, w: &dyn ResponseWriter, req: &mut Request) {
        let cache = self.clone();
        let action_id = req.action_id.clone();
        let output_id = req.output_id.clone();
        let mut body = std::mem::take(&mut req.body);
        let id = req.id;
        let result =
            tokio::task::spawn_blocking(move || cache.store(&action_id, &output_id, &mut body))
                .await;

        match result {
            Ok(Ok(path)) => w.write_response(Response {
                id,
                disk_path: Some(path),
                ..Response::default()
            }),
            Ok(Err(e)) => w.write_response(Response::error(id, format!("failed to store cache entry: {e}"))),
            Err(join_err) => w.write_response(Response::error(id, format!("cache store task failed: {join_err}"))),
        }
    }
}

impl Handler for DiskCache {
    fn handle<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        w: &'a dyn ResponseWriter,
        req: &'a mut Request,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            match req.command {
                Command::Get => self.get(w, req).await,
                Command::Put => self.put(w, req).await,
                Command::Close => w.write_response(Response::ok(req.id)),
                Command::Other(ref other) => w.write_response(Response::error(
                    req.id,
                    format!("error: {other} is unknown command"),
                )),
            }
        })
    }
}

fn parse_action(text: &str) -> io::Result<ActionEntry> {
    let invalid = |what: &str| io::Error::new(io::ErrorKind::InvalidData, format!("action file: {what}"));
    let mut fields = text.split_whitespace();
    let output_id = fields
        .next()
        .ok_or_else(|| invalid("missing output id"))
        .and_then(|hex_id| hex::decode(hex_id).map_err(|_| invalid("bad output id")))?;
    let size = fields
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| invalid("bad size"))?;
    let stored_at = fields
        .next()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| invalid("bad timestamp"))?;
    Ok(ActionEntry {
        output_id,
        size,
        stored_at,
    })
}

/// Write through a sibling temporary file and rename into place.
fn write_atomically<T>(
    path: &Path,
    write: impl FnOnce(&mut fs::File) -> io::Result<T>,
) -> io::Result<T> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(
        ".tmp{}-{}",
        std::process::id(),
        TMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = PathBuf::from(tmp);

    let result = fs::File::create(&tmp).and_then(|mut file| {
        let value = write(&mut file)?;
        file.sync_all()?;
        Ok(value)
    });
    let value = match result {
        Ok(value) => value,
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    };
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(value)
}
