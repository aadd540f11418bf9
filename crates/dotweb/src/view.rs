//! Template rendering hook used by [`HttpContext::view`](crate::HttpContext::view).

use serde_json::{Map, Value};

use crate::error::Result;

/// Renders a named template with the request's view data.
pub trait Renderer: Send + Sync {
    fn render(&self, name: &str, data: &Map<String, Value>) -> Result<String>;
}

impl<F> Renderer for F
where
    F: Fn(&str, &Map<String, Value>) -> Result<String> + Send + Sync,
{
    fn render(&self, name: &str, data: &Map<String, Value>) -> Result<String> {
        self(name, data)
    }
}
