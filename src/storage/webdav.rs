//! WebDAV backend over blocking `reqwest`: PUT to create/overwrite, GET
//! to read, DELETE to delete, PROPFIND (depth 1) to list a directory.

use std::io::{self, Cursor, Read};

use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::uri::ParsedUri;
use super::{DirEntry, Handle, StorageBackend};

pub struct WebDavBackend {
    client: Client,
    base_url: String,
}

impl WebDavBackend {
    pub fn new(uri: ParsedUri) -> io::Result<Self> {
        let host = uri.host.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "webdav uri missing host"))?;
        let scheme = if uri.password.is_some() || uri.port == Some(443) { "https" } else { "http" };
        let port_part = uri.port.map(|p| format!(":{p}")).unwrap_or_default();
        let base_url = format!("{scheme}://{host}{port_part}{}", uri.path);
        let client = Client::builder()
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), name.trim_start_matches('/'))
    }
}

struct WebDavWriteHandle {
    client: Client,
    url: String,
    buffer: Vec<u8>,
}

impl Handle for WebDavWriteHandle {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "handle opened for writing"))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn seek(&mut self, _offset: u64) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "cannot seek a write handle"))
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        let response = self
            .client
            .put(&self.url)
            .body(self.buffer)
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        if !response.status().is_success() {
            return Err(io::Error::new(io::ErrorKind::Other, format!("PUT {} failed: {}", self.url, response.status())));
        }
        Ok(())
    }
}

struct WebDavReadHandle {
    cursor: Cursor<Vec<u8>>,
}

impl Handle for WebDavReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }

    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "handle opened for reading"))
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.cursor.set_position(offset);
        Ok(())
    }

    fn close(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

impl StorageBackend for WebDavBackend {
    fn create(&self, name: &str, _size_hint: Option<u64>) -> io::Result<Box<dyn Handle>> {
        Ok(Box::new(WebDavWriteHandle { client: self.client.clone(), url: self.url_for(name), buffer: Vec::new() }))
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Handle>> {
        let response = self
            .client
            .get(self.url_for(name))
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        if !response.status().is_success() {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("GET {name} failed: {}", response.status())));
        }
        let bytes = response.bytes().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(Box::new(WebDavReadHandle { cursor: Cursor::new(bytes.to_vec()) }))
    }

    fn exists(&self, name: &str) -> io::Result<bool> {
        let response = self
            .client
            .head(self.url_for(name))
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(response.status() != StatusCode::NOT_FOUND && response.status().is_success())
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        let response = self
            .client
            .delete(self.url_for(name))
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        if !response.status().is_success() {
            return Err(io::Error::new(io::ErrorKind::Other, format!("DELETE {name} failed: {}", response.status())));
        }
        Ok(())
    }

    fn list_directory(&self, path: &str) -> io::Result<Box<dyn Iterator<Item = io::Result<DirEntry>>>> {
        let body = "<?xml version=\"1.0\"?><propfind xmlns=\"DAV:\"><prop><displayname/><getcontentlength/><resourcetype/></prop></propfind>";
        let response = self
            .client
            .request(reqwest::Method::from_bytes(b"PROPFIND").unwrap(), self.url_for(path))
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let text = response.text().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let entries = parse_propfind_names(&text);
        Ok(Box::new(entries.into_iter().map(|name| Ok(DirEntry { name, size: 0, is_directory: false }))))
    }
}

/// A minimal PROPFIND response scraper: pulls `<D:href>` (or `<href>`)
/// element text without pulling in a full XML dependency. WebDAV servers
/// vary wildly in namespace prefixing, so this matches the tag's local
/// name only.
fn parse_propfind_names(xml: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("href>") {
        let after_tag = &rest[start + "href>".len()..];
        if let Some(end) = after_tag.find("</") {
            let href = &after_tag[..end];
            if let Some(last_segment) = href.trim_end_matches('/').rsplit('/').next() {
                if !last_segment.is_empty() {
                    names.push(last_segment.to_string());
                }
            }
            rest = &after_tag[end..];
        } else {
            break;
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_href_basenames_out_of_propfind_body() {
        let xml = "<D:multistatus><D:response><D:href>/archives/vol-000001.bar</D:href></D:response></D:multistatus>";
        assert_eq!(parse_propfind_names(xml), vec!["vol-000001.bar".to_string()]);
    }
}
