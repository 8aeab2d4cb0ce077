//! Typed wrappers over the node's HTTP RPC endpoints.

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use http::header::{CONTENT_TYPE, HOST};
use http::Request;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::form_urlencoded;

use super::{CoreApi, EntryStream, IpfsClient, KeyRecord};
use crate::error::{Error, Kind, Result};
use crate::ipld::{EntryKind, StreamEntry};

/// Boundary for the single-file multipart bodies `block/put` uploads.
const MULTIPART_BOUNDARY: &str = "ipfs-mount-block-put";

/// Buffered entries per streaming listing before backpressure applies.
const STREAM_DEPTH: usize = 64;

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PathBody {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsLine {
    objects: Vec<LsObject>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsObject {
    #[serde(default)]
    links: Vec<LsLink>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsLink {
    name: String,
    hash: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "Type", default)]
    kind: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinLine {
    cid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyBody {
    name: String,
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyListBody {
    #[serde(default)]
    keys: Vec<KeyBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockPutBody {
    key: String,
}

/// Maps a server-reported failure message onto the error taxonomy.
///
/// The node reports lookup failures as prose; the set of phrases below is
/// what its resolver and UnixFS layers actually emit.
pub(super) fn classify_message(message: &str) -> Kind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("no link named")
        || lower.contains("no link by that name")
        || lower.contains("invalid path")
        || lower.contains("not found")
        || lower.contains("could not resolve name")
    {
        Kind::NotExist
    } else if lower.contains("is a directory") {
        Kind::IsDir
    } else if lower.contains("not a directory") {
        Kind::NotDir
    } else if lower.contains("already pinned") || lower.contains("already exists") {
        Kind::Exist
    } else {
        Kind::Other
    }
}

pub(super) fn ls_kind(raw: i32) -> EntryKind {
    // UnixFS data types as reported by the ls endpoint.
    match raw {
        1 | 5 => EntryKind::Directory,
        0 | 2 => EntryKind::Regular,
        4 => EntryKind::Symlink,
        _ => EntryKind::Irregular,
    }
}

impl IpfsClient {
    fn request(&self, endpoint: &str, args: &[(&str, &str)]) -> Request<Full<Bytes>> {
        self.request_with_body(endpoint, args, None)
    }

    fn request_with_body(
        &self,
        endpoint: &str,
        args: &[(&str, &str)],
        body: Option<(String, Bytes)>,
    ) -> Request<Full<Bytes>> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in args {
            query.append_pair(key, value);
        }
        let uri = format!("/api/v0/{}?{}", endpoint, query.finish());
        let authority = self.endpoint.authority();
        let builder = Request::post(uri).header(HOST, authority);
        match body {
            Some((content_type, bytes)) => builder
                .header(CONTENT_TYPE, content_type)
                .body(Full::new(bytes))
                .expect("static request parts are valid"),
            None => builder
                .body(Full::new(Bytes::new()))
                .expect("static request parts are valid"),
        }
    }

    /// Sends a request and returns the raw body stream after a status check.
    async fn send_checked(
        &self,
        op: &'static str,
        path: &str,
        request: Request<Full<Bytes>>,
    ) -> Result<Incoming> {
        let response = self.endpoint.send(request, self.dial_timeout).await?;
        let status = response.status();
        let body = response.into_body();
        if status.is_success() {
            return Ok(body);
        }
        let bytes = body
            .collect()
            .await
            .map_err(|e| Error::with_source(op, path, Kind::Io, e))?
            .to_bytes();
        let kind = match serde_json::from_slice::<ErrorBody>(&bytes) {
            Ok(parsed) => {
                let kind = classify_message(&parsed.message);
                return Err(Error::with_source(op, path, kind, parsed.message));
            }
            Err(_) => Kind::Io,
        };
        Err(Error::with_source(op, path, kind, format!("api status {status}")))
    }

    /// Sends a request and aggregates the response body under the API timeout.
    async fn call(
        &self,
        op: &'static str,
        path: &str,
        request: Request<Full<Bytes>>,
    ) -> Result<Bytes> {
        let exchange = async {
            let body = self.send_checked(op, path, request).await?;
            body.collect()
                .await
                .map(|collected| collected.to_bytes())
                .map_err(|e| Error::with_source(op, path, Kind::Io, e))
        };
        timeout(self.api_timeout, exchange)
            .await
            .map_err(|e| Error::with_source(op, path, Kind::Io, e))?
    }

    fn parse<'de, T: Deserialize<'de>>(
        op: &'static str,
        path: &str,
        bytes: &'de [u8],
    ) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::with_source(op, path, Kind::Io, e))
    }

    /// Spawns a task relaying NDJSON lines of `body` into an entry channel.
    ///
    /// Each line is parsed with `parse_line`; the resulting entries are sent
    /// in order. Any failure terminates the stream with a single trailing
    /// `Err` item.
    fn spawn_line_relay<F>(
        &self,
        op: &'static str,
        path: String,
        mut body: Incoming,
        parse_line: F,
    ) -> EntryStream
    where
        F: Fn(&[u8]) -> Result<Vec<StreamEntry>> + Send + 'static,
    {
        let (entry_send, entry_recv) = mpsc::channel::<Result<StreamEntry>>(STREAM_DEPTH);
        let frame_timeout = self.api_timeout;
        tokio::spawn(async move {
            let mut pending = Vec::new();
            loop {
                let frame = match timeout(frame_timeout, body.frame()).await {
                    Ok(Some(Ok(frame))) => frame,
                    Ok(Some(Err(e))) => {
                        let err = Error::with_source(op, &path, Kind::Io, e);
                        let _ = entry_send.send(Err(err)).await;
                        return;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let err = Error::with_source(op, &path, Kind::Io, e);
                        let _ = entry_send.send(Err(err)).await;
                        return;
                    }
                };
                let Some(data) = frame.data_ref() else { continue };
                pending.extend_from_slice(data);
                while let Some(end) = pending.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = pending.drain(..=end).collect();
                    let line = &line[..line.len() - 1];
                    if line.is_empty() {
                        continue;
                    }
                    match parse_line(line) {
                        Ok(entries) => {
                            for entry in entries {
                                if entry_send.send(Ok(entry)).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(err) => {
                            let _ = entry_send.send(Err(err)).await;
                            return;
                        }
                    }
                }
            }
            // Trailing line without a newline terminator.
            if !pending.is_empty() {
                match parse_line(&pending) {
                    Ok(entries) => {
                        for entry in entries {
                            if entry_send.send(Ok(entry)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = entry_send.send(Err(err)).await;
                    }
                }
            }
        });
        entry_recv
    }
}

pub(super) fn parse_ls_line(line: &[u8]) -> Result<Vec<StreamEntry>> {
    let parsed: LsLine = serde_json::from_slice(line)
        .map_err(|e| Error::with_source("readdir", "", Kind::Io, e))?;
    let mut entries = Vec::new();
    for object in parsed.objects {
        for link in object.links {
            let cid = link.hash.parse::<Cid>().ok();
            entries.push(StreamEntry {
                name: link.name,
                cid,
                size: link.size,
                kind: ls_kind(link.kind),
            });
        }
    }
    Ok(entries)
}

pub(super) fn parse_pin_line(line: &[u8]) -> Result<Vec<StreamEntry>> {
    let parsed: PinLine = serde_json::from_slice(line)
        .map_err(|e| Error::with_source("readdir", "", Kind::Io, e))?;
    let cid = parsed
        .cid
        .parse::<Cid>()
        .map_err(|e| Error::with_source("readdir", &parsed.cid, Kind::Io, e))?;
    Ok(vec![StreamEntry {
        name: cid.to_string(),
        cid: Some(cid),
        size: 0,
        kind: EntryKind::Directory,
    }])
}

#[async_trait]
impl CoreApi for IpfsClient {
    async fn resolve_path(&self, path: &str) -> Result<String> {
        let request = self.request("resolve", &[("arg", path)]);
        let bytes = self.call("resolve", path, request).await?;
        let body: PathBody = Self::parse("resolve", path, &bytes)?;
        Ok(body.path)
    }

    async fn block_get(&self, cid: &Cid) -> Result<Vec<u8>> {
        let text = cid.to_string();
        let request = self.request("block/get", &[("arg", &text)]);
        let bytes = self.call("getnode", &text, request).await?;
        Ok(bytes.to_vec())
    }

    async fn cat(&self, path: &str, offset: u64, length: Option<u64>) -> Result<Vec<u8>> {
        let offset_text = offset.to_string();
        let mut args = vec![("arg", path), ("offset", offset_text.as_str())];
        let length_text = length.map(|l| l.to_string());
        if let Some(text) = &length_text {
            args.push(("length", text.as_str()));
        }
        let request = self.request("cat", &args);
        let bytes = self.call("read", path, request).await?;
        Ok(bytes.to_vec())
    }

    async fn ls(&self, cid: &Cid) -> Result<EntryStream> {
        let text = cid.to_string();
        let request = self.request(
            "ls",
            &[("arg", text.as_str()), ("stream", "true"), ("resolve-type", "true")],
        );
        let body = self.send_checked("readdir", &text, request).await?;
        Ok(self.spawn_line_relay("readdir", text, body, parse_ls_line))
    }

    async fn pin_ls(&self) -> Result<EntryStream> {
        let request =
            self.request("pin/ls", &[("type", "recursive"), ("stream", "true")]);
        let body = self.send_checked("readdir", "/", request).await?;
        Ok(self.spawn_line_relay("readdir", "/".to_string(), body, parse_pin_line))
    }

    async fn pin_add(&self, cid: &Cid) -> Result<()> {
        let text = cid.to_string();
        let request = self.request("pin/add", &[("arg", text.as_str()), ("recursive", "true")]);
        self.call("symlink", &text, request).await?;
        Ok(())
    }

    async fn pin_rm(&self, cid: &Cid) -> Result<()> {
        let text = cid.to_string();
        let request = self.request("pin/rm", &[("arg", text.as_str())]);
        self.call("unlink", &text, request).await?;
        Ok(())
    }

    async fn block_put(&self, block: Vec<u8>) -> Result<Cid> {
        let mut body = Vec::with_capacity(block.len() + 256);
        body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"block\"\r\n",
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(&block);
        body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
        let request = self.request_with_body(
            "block/put",
            &[("cid-codec", "dag-pb"), ("mhtype", "sha2-256")],
            Some((
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
                Bytes::from(body),
            )),
        );
        let bytes = self.call("symlink", "block/put", request).await?;
        let parsed: BlockPutBody = Self::parse("symlink", "block/put", &bytes)?;
        parsed
            .key
            .parse::<Cid>()
            .map_err(|e| Error::with_source("symlink", &parsed.key, Kind::Io, e))
    }

    async fn key_list(&self) -> Result<Vec<KeyRecord>> {
        let request = self.request("key/list", &[]);
        let bytes = self.call("readdir", "/", request).await?;
        let body: KeyListBody = Self::parse("readdir", "/", &bytes)?;
        Ok(body.keys.into_iter().map(|k| KeyRecord { name: k.name, id: k.id }).collect())
    }

    async fn key_gen(&self, name: &str) -> Result<KeyRecord> {
        let request = self.request("key/gen", &[("arg", name), ("type", "ed25519")]);
        let bytes = self.call("create", name, request).await?;
        let body: KeyBody = Self::parse("create", name, &bytes)?;
        Ok(KeyRecord { name: body.name, id: body.id })
    }

    async fn key_rm(&self, name: &str) -> Result<()> {
        let request = self.request("key/rm", &[("arg", name)]);
        self.call("unlink", name, request).await?;
        Ok(())
    }

    async fn name_resolve(&self, name: &str) -> Result<String> {
        let path = format!("/ipns/{name}");
        let request = self.request("name/resolve", &[("arg", path.as_str())]);
        let bytes = self.call("resolve", &path, request).await?;
        let body: PathBody = Self::parse("resolve", &path, &bytes)?;
        Ok(body.path)
    }

    async fn name_publish(&self, key: &str, path: &str) -> Result<()> {
        let request =
            self.request("name/publish", &[("arg", path), ("key", key), ("allow-offline", "true")]);
        self.call("symlink", path, request).await?;
        Ok(())
    }
}
