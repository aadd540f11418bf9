/// Returns the canonical form of a URL path.
///
/// Repeated slashes collapse into one, `.` segments are dropped and `..`
/// segments remove the segment before them. The result always starts with
/// `/`, and a trailing slash survives when the input ended in `/`, `/.` or
/// `/..`.
pub fn clean_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    let mut trailing = false;
    for segment in p.split('/') {
        trailing = matches!(segment, "" | "." | "..");
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(p.len() + 1);
    cleaned.push('/');
    cleaned.push_str(&segments.join("/"));
    if trailing && cleaned.len() > 1 {
        cleaned.push('/');
    }
    cleaned
}
