use std::io::ErrorKind;

use tokio::{io::AsyncWriteExt, net::TcpStream};

use crate::{
    canonical::{RequestHead, Response},
    error::{Error, Result},
};

pub const MAX_REQUEST_HEAD: usize = 8 * 1024;
const MAX_HEADERS: usize = 64;

/// Parses a complete request head, or `None` if more bytes are needed.
pub fn parse_request_head(buf: &[u8]) -> Result<Option<RequestHead>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(Error::BadRequest("too many headers")),
        Err(_) => return Err(Error::BadRequest("invalid request head")),
    }

    let (Some(method), Some(uri), Some(version)) = (req.method, req.path, req.version) else {
        return Err(Error::BadRequest("incomplete request line"));
    };
    if !uri.starts_with('/') {
        return Err(Error::BadRequest("unsupported request target"));
    }

    let headers = req
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();

    Ok(Some(RequestHead {
        method: method.to_string(),
        uri: uri.to_string(),
        version,
        headers,
    }))
}

/// Reads until a full request head is buffered.
///
/// `Ok(None)` means the client closed the connection before sending anything.
/// Bytes past the head are discarded.
pub async fn read_request_head(stream: &TcpStream) -> Result<Option<RequestHead>> {
    let mut buf = vec![0u8; MAX_REQUEST_HEAD];
    let mut len = 0;

    loop {
        stream.readable().await?;

        match stream.try_read(&mut buf[len..]) {
            Ok(0) if len == 0 => return Ok(None),
            Ok(0) => return Err(Error::BadRequest("connection closed inside request head")),
            Ok(n) => {
                len += n;
                if let Some(head) = parse_request_head(&buf[..len])? {
                    return Ok(Some(head));
                }
                if len == buf.len() {
                    return Err(Error::BadRequest("request head too large"));
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

pub async fn write_response(stream: &mut TcpStream, response: &Response) -> Result<()> {
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_head() {
        let head = parse_request_head(b"GET /slow?x=1 HTTP/1.1\r\nHost: a\r\nX-Id: 7\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.uri, "/slow?x=1");
        assert_eq!(head.version, 1);
        assert_eq!(head.header("x-id"), Some("7"));
    }

    #[test]
    fn partial_head_needs_more_bytes() {
        assert!(parse_request_head(b"GET / HTTP/1.1\r\nHost:").unwrap().is_none());
    }

    #[test]
    fn rejects_garbage_and_absolute_targets() {
        assert!(parse_request_head(b"\x16\x03\x01\x00\r\n\r\n").is_err());
        assert!(parse_request_head(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n").is_err());
    }
}
