//! Compressing radix tree used by the router.
//!
//! Each HTTP method owns one tree. Static children are indexed by their
//! first character and kept in descending priority order, where the priority of a
//! node is the number of values registered at or below it. A node with a
//! wildcard child (`:name` or `*name`) has exactly that one child.

use super::params::Params;
use crate::error::{DotwebError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Static,
    Root,
    Param,
    CatchAll,
}

pub struct Node<T> {
    path: String,
    indices: Vec<char>,
    wild_child: bool,
    kind: NodeKind,
    priority: u32,
    children: Vec<Node<T>>,
    value: Option<T>,
    pattern: String,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Node {
            path: String::new(),
            indices: Vec::new(),
            wild_child: false,
            kind: NodeKind::Static,
            priority: 0,
            children: Vec::new(),
            value: None,
            pattern: String::new(),
        }
    }
}

/// Result of a tree lookup.
pub struct Match<'n, T> {
    pub value: Option<&'n T>,
    /// The full pattern the value was registered under.
    pub pattern: &'n str,
    /// Trailing slash recommendation: a value exists for the path with the
    /// trailing slash added or removed.
    pub tsr: bool,
}

impl<'n, T> Match<'n, T> {
    fn found(node: &'n Node<T>) -> Self {
        Match {
            value: node.value.as_ref(),
            pattern: &node.pattern,
            tsr: false,
        }
    }

    fn miss(tsr: bool) -> Self {
        Match {
            value: None,
            pattern: "",
            tsr,
        }
    }
}

fn longest_common_prefix(a: &str, b: &str) -> usize {
    let len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    // never split inside a multi-byte character
    let mut len = len;
    while !a.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Decodes the character at the start of `bytes`, which must begin on a
/// character boundary.
fn leading_char(bytes: &[u8]) -> Option<char> {
    (1..=bytes.len().min(4))
        .find_map(|n| std::str::from_utf8(&bytes[..n]).ok())
        .and_then(|s| s.chars().next())
}

/// Finds the first wildcard segment of `path`, returning its start index and
/// the segment itself (including the leading `:` or `*`).
fn find_wildcard<'p>(path: &'p str, full_path: &str) -> Result<Option<(usize, &'p str)>> {
    let bytes = path.as_bytes();
    let Some(start) = bytes.iter().position(|&c| c == b':' || c == b'*') else {
        return Ok(None);
    };
    let end = bytes[start + 1..]
        .iter()
        .position(|&c| c == b'/')
        .map_or(path.len(), |i| start + 1 + i);
    let wildcard = &path[start..end];

    if wildcard[1..].contains(|c| c == ':' || c == '*') {
        return Err(DotwebError::RouteMalformed(format!(
            "only one wildcard per path segment is allowed, has: '{}' in path '{full_path}'",
            &path[start..]
        )));
    }
    if wildcard.len() < 2 {
        return Err(DotwebError::RouteMalformed(format!(
            "wildcards must be named with a non-empty name in path '{full_path}'"
        )));
    }
    Ok(Some((start, wildcard)))
}

impl<T> Node<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty() && self.children.is_empty() && self.value.is_none()
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Registers `value` under `path`. Not safe for concurrent use.
    pub fn insert(&mut self, path: &str, value: T) -> Result<()> {
        let full_path = path;
        self.priority += 1;

        if self.path.is_empty() && self.children.is_empty() {
            self.insert_child(path, full_path, value)?;
            self.kind = NodeKind::Root;
            return Ok(());
        }

        let mut node = self;
        let mut path = path;
        loop {
            let common = longest_common_prefix(path, &node.path);

            if common < node.path.len() {
                node.split_at(common);
            }

            if common == path.len() {
                if node.value.is_some() {
                    return Err(DotwebError::RouteConflict(format!(
                        "a handle is already registered for path '{full_path}'"
                    )));
                }
                node.value = Some(value);
                node.pattern = full_path.to_string();
                return Ok(());
            }

            path = &path[common..];

            if node.wild_child {
                node = &mut node.children[0];
                node.priority += 1;

                let longer_name = node.path.len() < path.len()
                    && path.as_bytes()[node.path.len()] != b'/';
                if path.starts_with(node.path.as_str())
                    && node.kind != NodeKind::CatchAll
                    && !longer_name
                {
                    continue;
                }

                let segment = if node.kind == NodeKind::CatchAll {
                    path
                } else {
                    path.split('/').next().unwrap_or(path)
                };
                return Err(DotwebError::RouteConflict(format!(
                    "'{segment}' in new path '{full_path}' conflicts with existing wildcard '{}'",
                    node.path
                )));
            }

            let Some(c) = path.chars().next() else {
                return Err(DotwebError::RouteMalformed(format!(
                    "empty segment in path '{full_path}'"
                )));
            };

            // slash after a param
            if node.kind == NodeKind::Param && c == '/' && node.children.len() == 1 {
                node = &mut node.children[0];
                node.priority += 1;
                continue;
            }

            if let Some(i) = node.indices.iter().position(|&b| b == c) {
                let i = node.bump_child_priority(i);
                node = &mut node.children[i];
                continue;
            }

            if c != ':' && c != '*' {
                node.indices.push(c);
                node.children.push(Node::default());
                let i = node.bump_child_priority(node.indices.len() - 1);
                node = &mut node.children[i];
            }
            return node.insert_child(path, full_path, value);
        }
    }

    fn split_at(&mut self, at: usize) {
        let child = Node {
            path: self.path[at..].to_string(),
            indices: std::mem::take(&mut self.indices),
            wild_child: self.wild_child,
            kind: NodeKind::Static,
            priority: self.priority - 1,
            children: std::mem::take(&mut self.children),
            value: self.value.take(),
            pattern: std::mem::take(&mut self.pattern),
        };
        self.indices = self.path[at..].chars().take(1).collect();
        self.path.truncate(at);
        self.children = vec![child];
        self.wild_child = false;
    }

    /// Increments the priority of the child at `pos` and moves it forward
    /// past siblings with a lower priority. Returns the new position.
    fn bump_child_priority(&mut self, pos: usize) -> usize {
        self.children[pos].priority += 1;
        let priority = self.children[pos].priority;

        let mut new_pos = pos;
        while new_pos > 0 && self.children[new_pos - 1].priority < priority {
            self.children.swap(new_pos - 1, new_pos);
            self.indices.swap(new_pos - 1, new_pos);
            new_pos -= 1;
        }
        new_pos
    }

    fn insert_child(&mut self, path: &str, full_path: &str, value: T) -> Result<()> {
        let mut node = self;
        let mut path = path;

        while let Some((start, wildcard)) = find_wildcard(path, full_path)? {
            if !node.children.is_empty() {
                return Err(DotwebError::RouteConflict(format!(
                    "wildcard segment '{wildcard}' conflicts with existing children in path '{full_path}'"
                )));
            }

            if wildcard.starts_with(':') {
                if start > 0 {
                    node.path = path[..start].to_string();
                    path = &path[start..];
                }

                node.wild_child = true;
                node.children.push(Node {
                    kind: NodeKind::Param,
                    path: wildcard.to_string(),
                    ..Node::default()
                });
                node = &mut node.children[0];
                node.priority += 1;

                // another non-wildcard subpath follows
                if wildcard.len() < path.len() {
                    path = &path[wildcard.len()..];
                    node.children.push(Node {
                        priority: 1,
                        ..Node::default()
                    });
                    node = &mut node.children[0];
                    continue;
                }

                node.value = Some(value);
                node.pattern = full_path.to_string();
                return Ok(());
            }

            if start + wildcard.len() != path.len() {
                return Err(DotwebError::RouteMalformed(format!(
                    "catch-all routes are only allowed at the end of the path in path '{full_path}'"
                )));
            }
            if node.path.ends_with('/') {
                return Err(DotwebError::RouteConflict(format!(
                    "catch-all conflicts with existing handle for the path segment root in path '{full_path}'"
                )));
            }
            if start == 0 || path.as_bytes()[start - 1] != b'/' {
                return Err(DotwebError::RouteMalformed(format!(
                    "no / before catch-all in path '{full_path}'"
                )));
            }

            let slash = start - 1;
            node.path = path[..slash].to_string();

            // first node: empty catch-all holder
            node.children.push(Node {
                wild_child: true,
                kind: NodeKind::CatchAll,
                priority: 1,
                ..Node::default()
            });
            node.indices = vec!['/'];
            node = &mut node.children[0];

            // second node: holds the variable
            node.children.push(Node {
                path: path[slash..].to_string(),
                kind: NodeKind::CatchAll,
                priority: 1,
                value: Some(value),
                pattern: full_path.to_string(),
                ..Node::default()
            });
            return Ok(());
        }

        node.path = path.to_string();
        node.value = Some(value);
        node.pattern = full_path.to_string();
        Ok(())
    }

    /// Looks up `path`, appending captured wildcard values to `params`.
    ///
    /// On a miss `tsr` reports whether the path with the trailing slash added
    /// or removed would match. `params` may hold partial captures after a
    /// miss.
    pub fn get_value<'n>(&'n self, path: &str, params: &mut Params) -> Match<'n, T> {
        let mut node = self;
        let mut path = path;

        loop {
            let prefix = node.path.as_str();

            if path.len() > prefix.len() {
                if !path.starts_with(prefix) {
                    return Match::miss(path == "/");
                }
                path = &path[prefix.len()..];

                if !node.wild_child {
                    let next = path.chars().next();
                    if let Some(i) = node.indices.iter().position(|&c| Some(c) == next) {
                        node = &node.children[i];
                        continue;
                    }
                    return Match::miss(path == "/" && node.value.is_some());
                }

                node = &node.children[0];
                match node.kind {
                    NodeKind::Param => {
                        let end = path.find('/').unwrap_or(path.len());
                        params.push(&node.path[1..], &path[..end]);

                        if end < path.len() {
                            if let Some(child) = node.children.first() {
                                path = &path[end..];
                                node = child;
                                continue;
                            }
                            return Match::miss(path.len() == end + 1);
                        }

                        if node.value.is_some() {
                            return Match::found(node);
                        }
                        if node.children.len() == 1 {
                            let child = &node.children[0];
                            let tsr = (child.path == "/" && child.value.is_some())
                                || (child.path.is_empty() && child.indices == ['/']);
                            return Match::miss(tsr);
                        }
                        return Match::miss(false);
                    }
                    NodeKind::CatchAll => {
                        params.push(&node.path[2..], path);
                        return Match::found(node);
                    }
                    _ => return Match::miss(false),
                }
            } else if path == prefix {
                if node.value.is_some() {
                    return Match::found(node);
                }

                // a wildcard child implies a value for the path plus a slash
                if path == "/" && node.wild_child && node.kind != NodeKind::Root {
                    return Match::miss(true);
                }
                if path == "/" && node.kind == NodeKind::Static {
                    return Match::miss(true);
                }

                if let Some(i) = node.indices.iter().position(|&c| c == '/') {
                    let child = &node.children[i];
                    let tsr = (child.path.len() == 1 && child.value.is_some())
                        || (child.kind == NodeKind::CatchAll
                            && child.children.first().is_some_and(|c| c.value.is_some()));
                    return Match::miss(tsr);
                }
                return Match::miss(false);
            }

            let tsr = path == "/"
                || (prefix.len() == path.len() + 1
                    && prefix.as_bytes()[path.len()] == b'/'
                    && prefix.starts_with(path)
                    && node.value.is_some());
            return Match::miss(tsr);
        }
    }

    /// Case-insensitive lookup. Returns the registered spelling of the path,
    /// optionally fixing a missing or superfluous trailing slash.
    pub fn find_case_insensitive_path(&self, path: &str, fix_trailing_slash: bool) -> Option<String> {
        let mut out = Vec::with_capacity(path.len() + 1);
        if self.find_case_insensitive(path.as_bytes(), &mut out, fix_trailing_slash) {
            String::from_utf8(out).ok()
        } else {
            None
        }
    }

    fn find_case_insensitive(&self, path: &[u8], out: &mut Vec<u8>, fix: bool) -> bool {
        let mut node = self;
        let mut path = path;

        loop {
            let node_path = node.path.as_bytes();
            if path.len() < node_path.len() || !path[..node_path.len()].eq_ignore_ascii_case(node_path) {
                break;
            }
            path = &path[node_path.len()..];
            out.extend_from_slice(node_path);

            if path.is_empty() {
                if node.value.is_some() {
                    return true;
                }
                if fix {
                    if let Some(i) = node.indices.iter().position(|&c| c == '/') {
                        let child = &node.children[i];
                        if (child.path.len() == 1 && child.value.is_some())
                            || (child.kind == NodeKind::CatchAll
                                && child.children.first().is_some_and(|c| c.value.is_some()))
                        {
                            out.push(b'/');
                            return true;
                        }
                    }
                }
                return false;
            }

            if !node.wild_child {
                // both the character and its folded form may be indexed, try each
                let Some(c) = leading_char(path) else {
                    return false;
                };
                let c = c.to_ascii_lowercase();
                for (i, index) in node.indices.iter().enumerate() {
                    if index.to_ascii_lowercase() == c {
                        let mark = out.len();
                        if node.children[i].find_case_insensitive(path, out, fix) {
                            return true;
                        }
                        out.truncate(mark);
                    }
                }
                return fix && path == b"/" && node.value.is_some();
            }

            node = &node.children[0];
            match node.kind {
                NodeKind::Param => {
                    let end = path.iter().position(|&b| b == b'/').unwrap_or(path.len());
                    out.extend_from_slice(&path[..end]);

                    if end < path.len() {
                        if let Some(child) = node.children.first() {
                            path = &path[end..];
                            node = child;
                            continue;
                        }
                        return fix && path.len() == end + 1;
                    }

                    if node.value.is_some() {
                        return true;
                    }
                    if fix && node.children.len() == 1 {
                        let child = &node.children[0];
                        if child.path == "/" && child.value.is_some() {
                            out.push(b'/');
                            return true;
                        }
                    }
                    return false;
                }
                NodeKind::CatchAll => {
                    out.extend_from_slice(path);
                    return true;
                }
                _ => return false,
            }
        }

        if fix {
            if path == b"/" {
                return true;
            }
            let node_path = node.path.as_bytes();
            if path.len() + 1 == node_path.len()
                && node_path[path.len()] == b'/'
                && path.eq_ignore_ascii_case(&node_path[..path.len()])
                && node.value.is_some()
            {
                out.extend_from_slice(node_path);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(routes: &[&'static str]) -> Node<&'static str> {
        let mut tree = Node::new();
        for route in routes {
            tree.insert(route, *route)
                .unwrap_or_else(|e| panic!("insert {route}: {e}"));
        }
        tree
    }

    fn lookup(tree: &Node<&'static str>, path: &str) -> (Option<&'static str>, Params, bool) {
        let mut params = Params::new();
        let m = tree.get_value(path, &mut params);
        (m.value.copied(), params, m.tsr)
    }

    #[test]
    fn test_tree_static_routes() {
        let tree = build(&["/hi", "/contact", "/co", "/c", "/a", "/ab", "/doc/", "/doc/go_faq.html", "/α", "/β"]);

        for path in ["/a", "/hi", "/contact", "/co", "/ab", "/α", "/β", "/doc/go_faq.html"] {
            let (value, params, _) = lookup(&tree, path);
            assert_eq!(value, Some(path), "lookup {path}");
            assert!(params.is_empty());
        }
        assert_eq!(lookup(&tree, "/con").0, None);
        assert_eq!(lookup(&tree, "/cona").0, None);
        assert_eq!(lookup(&tree, "/no").0, None);
    }

    #[test]
    fn test_tree_wildcards() {
        let tree = build(&[
            "/",
            "/cmd/:tool/:sub",
            "/cmd/:tool/",
            "/src/*filepath",
            "/search/",
            "/search/:query",
            "/user_:name",
            "/user_:name/about",
            "/files/:dir/*filepath",
            "/info/:user/public",
            "/info/:user/project/:project",
        ]);

        let (value, params, _) = lookup(&tree, "/cmd/test/");
        assert_eq!(value, Some("/cmd/:tool/"));
        assert_eq!(params.by_name("tool"), "test");

        let (value, params, _) = lookup(&tree, "/cmd/test/3");
        assert_eq!(value, Some("/cmd/:tool/:sub"));
        assert_eq!(params.by_name("tool"), "test");
        assert_eq!(params.by_name("sub"), "3");

        let (value, params, _) = lookup(&tree, "/src/some/file.png");
        assert_eq!(value, Some("/src/*filepath"));
        assert_eq!(params.by_name("filepath"), "/some/file.png");

        let (value, params, _) = lookup(&tree, "/search/someth!ng+in+ünìcodé");
        assert_eq!(value, Some("/search/:query"));
        assert_eq!(params.by_name("query"), "someth!ng+in+ünìcodé");

        let (value, params, _) = lookup(&tree, "/user_gopher/about");
        assert_eq!(value, Some("/user_:name/about"));
        assert_eq!(params.by_name("name"), "gopher");

        let (value, params, _) = lookup(&tree, "/files/js/inc/framework.js");
        assert_eq!(value, Some("/files/:dir/*filepath"));
        assert_eq!(params.by_name("dir"), "js");
        assert_eq!(params.by_name("filepath"), "/inc/framework.js");

        let (value, params, _) = lookup(&tree, "/info/gordon/project/go");
        assert_eq!(value, Some("/info/:user/project/:project"));
        assert_eq!(params.iter().map(|p| p.key.as_str()).collect::<Vec<_>>(), ["user", "project"]);

        assert_eq!(lookup(&tree, "/cmd/test").0, None);
        assert_eq!(lookup(&tree, "/search/").0, Some("/search/"));
    }

    #[test]
    fn test_tree_wildcard_conflicts() {
        let mut tree = build(&["/cmd/:tool/:sub", "/src/*filepath", "/user_:name", "/id:id"]);

        let conflicts = [
            "/cmd/vet",
            "/cmd/:badvar",
            "/src/*filepathx",
            "/src/",
            "/user_x",
            "/id/:id",
        ];
        for path in conflicts {
            match tree.insert(path, path) {
                Err(DotwebError::RouteConflict(_)) => {}
                other => panic!("expected conflict for {path}, got {:?}", other.err()),
            }
        }

        assert!(tree.insert("/src1/", "/src1/").is_ok());
    }

    #[test]
    fn test_tree_duplicate_path() {
        let mut tree = build(&["/", "/doc/", "/src/*filepath", "/search/:query", "/user_:name"]);
        for path in ["/", "/doc/", "/src/*filepath", "/search/:query", "/user_:name"] {
            assert!(
                matches!(tree.insert(path, path), Err(DotwebError::RouteConflict(_))),
                "duplicate {path} accepted"
            );
        }
    }

    #[test]
    fn test_tree_malformed_routes() {
        let malformed = ["/user:", "/user:/", "/cmd/:/", "/src/*", "/:foo:bar", "/src/*filepath/x", "/src*filepath"];
        for path in malformed {
            let mut tree: Node<&str> = Node::new();
            assert!(
                matches!(tree.insert(path, path), Err(DotwebError::RouteMalformed(_))),
                "malformed {path} accepted"
            );
        }
    }

    #[test]
    fn test_tree_trailing_slash_recommendation() {
        let tree = build(&[
            "/hi",
            "/b/",
            "/search/:query",
            "/cmd/:tool/",
            "/src/*filepath",
            "/x",
            "/x/y",
            "/y/",
            "/y/z",
            "/0/:id",
            "/0/:id/1",
            "/1/:id/",
            "/1/:id/2",
            "/aa",
            "/a/",
            "/admin",
            "/admin/:category",
            "/admin/:category/:page",
            "/doc",
            "/doc/go_faq.html",
            "/no/a",
            "/no/b",
            "/api/hello/:name",
        ]);

        let tsr_routes = [
            "/hi/", "/b", "/search/gopher/", "/cmd/vet", "/src", "/x/", "/y", "/0/go/", "/1/go",
            "/a", "/admin/", "/admin/config/", "/admin/config/permissions/", "/doc/",
        ];
        for path in tsr_routes {
            let (value, _, tsr) = lookup(&tree, path);
            assert_eq!(value, None, "{path} matched unexpectedly");
            assert!(tsr, "expected tsr for {path}");
        }

        for path in ["/", "/no", "/no/", "/_", "/_/", "/api/world/abc"] {
            let (value, _, tsr) = lookup(&tree, path);
            assert_eq!(value, None);
            assert!(!tsr, "unexpected tsr for {path}");
        }
    }

    #[test]
    fn test_tree_catch_all_holder_redirects() {
        let tree = build(&["/files/*filepath"]);
        let (value, _, tsr) = lookup(&tree, "/files");
        assert_eq!(value, None);
        assert!(tsr);

        let (value, params, _) = lookup(&tree, "/files/a/b.txt");
        assert_eq!(value, Some("/files/*filepath"));
        assert_eq!(params.by_name("filepath"), "/a/b.txt");
    }

    #[test]
    fn test_tree_case_insensitive_path() {
        let routes = [
            "/hi",
            "/b/",
            "/ABC/",
            "/search/:query",
            "/cmd/:tool/",
            "/src/*filepath",
            "/x",
            "/x/y",
            "/y/",
            "/y/z",
            "/0/:id",
            "/0/:id/1",
            "/1/:id/",
            "/1/:id/2",
            "/aa",
            "/a/",
            "/doc",
            "/doc/go_faq.html",
            "/doc/go1.html",
            "/users/:id",
        ];
        let tree = build(&routes);

        // every route finds itself, with and without slash fixing
        for route in routes {
            assert_eq!(tree.find_case_insensitive_path(route, true).as_deref(), Some(route));
            assert_eq!(tree.find_case_insensitive_path(route, false).as_deref(), Some(route));
        }

        let cases = [
            ("/HI", Some("/hi"), false),
            ("/HI/", Some("/hi"), true),
            ("/B", Some("/b/"), true),
            ("/abc/", Some("/ABC/"), false),
            ("/aBc", Some("/ABC/"), true),
            ("/SEARCH/QUERY", Some("/search/QUERY"), false),
            ("/CMD/TOOL", Some("/cmd/TOOL/"), true),
            ("/SRC/FILE/PATH", Some("/src/FILE/PATH"), false),
            ("/X/Y", Some("/x/y"), false),
            ("/DOC/GO_FAQ.HTML", Some("/doc/go_faq.html"), false),
            ("/DOC/", Some("/doc"), true),
            ("/Users/42", Some("/users/42"), false),
            ("/nope", None, false),
        ];
        for (path, expected, needs_fix) in cases {
            assert_eq!(
                tree.find_case_insensitive_path(path, true).as_deref(),
                expected,
                "fixed lookup of {path}"
            );
            if needs_fix {
                assert_eq!(tree.find_case_insensitive_path(path, false), None, "unfixed lookup of {path}");
            }
        }
    }

    #[test]
    fn test_tree_priorities_order_children() {
        let tree = build(&["/a", "/b/1", "/b/2", "/b/3"]);
        // root path "/" with children for 'b' (3 values) before 'a' (1 value)
        assert_eq!(tree.path, "/");
        assert_eq!(tree.indices, vec!['b', 'a']);
        assert_eq!(tree.priority(), 4);
        let priorities: Vec<u32> = tree.children.iter().map(|c| c.priority).collect();
        assert_eq!(priorities, vec![3, 1]);
    }

    #[test]
    fn test_tree_multibyte_siblings_share_a_lead_byte() {
        // 'é' and 'è' both start with 0xC3
        let tree = build(&["/é", "/è", "/café/:id", "/cafè", "/Menu/été"]);
        assert_eq!(tree.indices, vec!['c', 'é', 'è', 'M']);

        assert_eq!(lookup(&tree, "/é").0, Some("/é"));
        assert_eq!(lookup(&tree, "/è").0, Some("/è"));
        assert_eq!(lookup(&tree, "/cafè").0, Some("/cafè"));
        let (value, params, _) = lookup(&tree, "/café/42");
        assert_eq!(value, Some("/café/:id"));
        assert_eq!(params.by_name("id"), "42");
        assert_eq!(lookup(&tree, "/ê").0, None);

        assert_eq!(
            tree.find_case_insensitive_path("/menu/été", false).as_deref(),
            Some("/Menu/été")
        );
        assert_eq!(tree.find_case_insensitive_path("/menu/ete", false), None);
    }

    #[test]
    fn test_tree_match_reports_pattern() {
        let tree = build(&["/user/:id/profile"]);
        let mut params = Params::new();
        let m = tree.get_value("/user/7/profile", &mut params);
        assert_eq!(m.pattern, "/user/:id/profile");
        assert_eq!(params.by_name("id"), "7");
    }
}
