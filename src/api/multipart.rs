//! Minimal `multipart/form-data` decoding for image uploads.

use anyhow::{anyhow, Result};

use super::http::find;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FormPart {
    pub(crate) name: String,
    pub(crate) filename: Option<String>,
    pub(crate) data: Vec<u8>,
}

/// `boundary` parameter of a `multipart/form-data` content type.
pub(crate) fn form_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';').map(str::trim);
    let media = params.next()?;
    if !media.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| unquote(value.trim()).to_string())
    })
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

pub(crate) fn parse_form(body: &[u8], boundary: &str) -> Result<Vec<FormPart>> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut separator = b"\r\n".to_vec();
    separator.extend_from_slice(&delimiter);

    let mut pos = find(body, &delimiter).ok_or_else(|| anyhow!("multipart boundary not found"))?
        + delimiter.len();
    let mut parts = Vec::new();
    loop {
        let rest = &body[pos..];
        if rest.starts_with(b"--") {
            break;
        }
        let rest = rest.strip_prefix(b"\r\n").unwrap_or(rest);
        let header_len =
            find(rest, b"\r\n\r\n").ok_or_else(|| anyhow!("multipart part has no header end"))?;
        let headers = String::from_utf8_lossy(&rest[..header_len]);
        let content = &rest[header_len + 4..];
        let data_len = find(content, &separator)
            .ok_or_else(|| anyhow!("multipart part is not terminated"))?;

        let (name, filename) = content_disposition(&headers);
        parts.push(FormPart {
            name: name.unwrap_or_default(),
            filename,
            data: content[..data_len].to_vec(),
        });

        let consumed = body.len() - content.len() + data_len + separator.len();
        pos = consumed;
        if pos >= body.len() {
            break;
        }
    }
    Ok(parts)
}

fn content_disposition(headers: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut filename = None;
    for line in headers.split("\r\n") {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case("content-disposition") {
            continue;
        }
        for param in value.split(';').map(str::trim) {
            match param.split_once('=') {
                Some(("name", v)) => name = Some(unquote(v).to_string()),
                Some(("filename", v)) => filename = Some(unquote(v).to_string()),
                _ => {}
            }
        }
    }
    (name, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_and_files() -> Result<()> {
        let body = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\r\n\
hello\r\n\
--XyZ\r\n\
Content-Disposition: form-data; name=\"image\"; filename=\"a.png\"\r\n\
Content-Type: image/png\r\n\r\n\
\x89PNG\r\n\x1a\n\r\n\
--XyZ--\r\n";
        let parts = parse_form(body, "XyZ")?;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "note");
        assert_eq!(parts[0].data, b"hello");
        assert_eq!(parts[1].filename.as_deref(), Some("a.png"));
        assert_eq!(parts[1].data, b"\x89PNG\r\n\x1a\n");
        Ok(())
    }

    #[test]
    fn boundary_parameter() {
        assert_eq!(
            form_boundary("multipart/form-data; boundary=\"abc 1\"").as_deref(),
            Some("abc 1")
        );
        assert_eq!(
            form_boundary("Multipart/Form-Data;boundary=x").as_deref(),
            Some("x")
        );
        assert_eq!(form_boundary("image/jpeg"), None);
    }

    #[test]
    fn rejects_truncated_bodies() {
        assert!(parse_form(b"no boundary here", "b").is_err());
        assert!(parse_form(b"--b\r\nContent-Disposition: form-data; name=\"x\"\r\n\r\ndata", "b").is_err());
    }
}
