//! Scheme dispatch for storage URIs: `ftp://user@host/path`,
//! `sftp://host/path`, `webdav://host/path`, `optical:///dev/sr0`, or a
//! bare filesystem path with no scheme at all.

use std::io;

use url::Url;

#[derive(Debug, Clone)]
pub struct ParsedUri {
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
}

pub fn parse_uri(uri: &str) -> io::Result<ParsedUri> {
    if !uri.contains("://") {
        return Ok(ParsedUri {
            scheme: String::new(),
            user: None,
            password: None,
            host: None,
            port: None,
            path: uri.to_string(),
        });
    }

    let url = Url::parse(uri).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    Ok(ParsedUri {
        scheme: url.scheme().to_string(),
        user: if url.username().is_empty() { None } else { Some(url.username().to_string()) },
        password: url.password().map(str::to_string),
        host: url.host_str().map(str::to_string),
        port: url.port(),
        path: url.path().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_path_has_no_scheme() {
        let p = parse_uri("/var/backups/job1").unwrap();
        assert_eq!(p.scheme, "");
        assert_eq!(p.path, "/var/backups/job1");
    }

    #[test]
    fn ftp_uri_splits_user_and_host() {
        let p = parse_uri("ftp://alice@backup.example.com/archives").unwrap();
        assert_eq!(p.scheme, "ftp");
        assert_eq!(p.user.as_deref(), Some("alice"));
        assert_eq!(p.host.as_deref(), Some("backup.example.com"));
        assert_eq!(p.path, "/archives");
    }

    #[test]
    fn sftp_uri_with_explicit_port() {
        let p = parse_uri("sftp://backup.example.com:2222/archives").unwrap();
        assert_eq!(p.port, Some(2222));
    }
}
