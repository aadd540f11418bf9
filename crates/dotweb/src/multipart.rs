//! Zero-copy reader for `multipart/form-data` bodies.

#[derive(Debug)]
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub body: &'a [u8],
}

/// Iterates the parts of a multipart body. Iteration stops at the closing
/// boundary or at the first part that is cut off.
pub struct Multipart<'a> {
    body: &'a [u8],
    boundary_marker: Vec<u8>,
}

impl<'a> Multipart<'a> {
    pub fn new(body: &'a [u8], boundary: &str) -> Self {
        let mut marker = Vec::with_capacity(boundary.len() + 2);
        marker.extend_from_slice(b"--");
        marker.extend_from_slice(boundary.as_bytes());
        Self {
            body,
            boundary_marker: marker,
        }
    }

    fn find(data: &[u8], needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        data.windows(needle.len()).position(|w| w == needle)
    }
}

/// Extract the `boundary` parameter from a `Content-Type` header value.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

fn disposition_param<'h>(line: &'h str, key: &str) -> Option<&'h str> {
    line.split(';').skip(1).find_map(|param| {
        let (k, v) = param.trim().split_once('=')?;
        if !k.trim().eq_ignore_ascii_case(key) {
            return None;
        }
        Some(v.trim().trim_matches('"'))
    })
}

impl<'a> Iterator for Multipart<'a> {
    type Item = Part<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.body.is_empty() {
            return None;
        }

        let mut start = Self::find(self.body, &self.boundary_marker)?;
        start += self.boundary_marker.len();

        // closing boundary
        if self.body[start..].starts_with(b"--") {
            self.body = &[];
            return None;
        }
        if self.body[start..].starts_with(b"\r\n") {
            start += 2;
        }

        let header_end = Self::find(&self.body[start..], b"\r\n\r\n")?;
        let header_slice = &self.body[start..start + header_end];
        let body_start = start + header_end + 4;

        let Some(pos) = Self::find(&self.body[body_start..], &self.boundary_marker) else {
            self.body = &[];
            return None;
        };
        let body_end = body_start + pos;
        let content_end = if self.body[..body_end].ends_with(b"\r\n") {
            body_end - 2
        } else {
            body_end
        };
        let part_body = &self.body[body_start..content_end];
        self.body = &self.body[body_end..];

        let headers = std::str::from_utf8(header_slice).ok()?;
        let mut name = "";
        let mut filename = None;
        let mut content_type = None;
        for line in headers.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                name = disposition_param(line, "name").unwrap_or("");
                filename = disposition_param(line, "filename");
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                content_type = Some(value.trim());
            }
        }

        Some(Part {
            name,
            filename,
            content_type,
            body: part_body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = b"--XyZ\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
hello\r\n\
--XyZ\r\n\
Content-Disposition: form-data; filename=\"a.txt\"; name=\"upload\"\r\n\
Content-Type: text/plain\r\n\r\n\
file body\r\n\
--XyZ--\r\n";

    #[test]
    fn reads_fields_and_files() {
        let parts: Vec<_> = Multipart::new(BODY, "XyZ").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "title");
        assert_eq!(parts[0].body, b"hello");
        assert!(parts[0].filename.is_none());
        assert_eq!(parts[1].name, "upload");
        assert_eq!(parts[1].filename, Some("a.txt"));
        assert_eq!(parts[1].content_type, Some("text/plain"));
        assert_eq!(parts[1].body, b"file body");
    }

    #[test]
    fn truncated_body_stops_iteration() {
        let parts: Vec<_> = Multipart::new(&BODY[..40], "XyZ").collect();
        assert!(parts.is_empty());
    }

    #[test]
    fn boundary_parameter() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"abc\"").as_deref(),
            Some("abc")
        );
        assert_eq!(boundary_from_content_type("multipart/form-data"), None);
    }
}
