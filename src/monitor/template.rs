//! Config template rendering.
//!
//! Templates see a single variable, `proxy_records`: the full listing sorted
//! by name, each record with `name`, `ttl` and sorted `endpoints`. `exists`
//! is available both as a function and as a filter to probe the filesystem
//! (for example to include a certificate block only when the file is there).

use std::path::Path;

use minijinja::{context, Environment};

use crate::registry::ServiceRecord;

fn exists(path: &str) -> bool {
    Path::new(path).exists()
}

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_function("exists", exists);
    env.add_filter("exists", exists);
    env
}

/// Render `source` against `records`.
///
/// Output depends only on the template text and the records, so identical
/// listings always produce byte-identical files.
pub fn render(source: &str, records: &[ServiceRecord]) -> Result<String, minijinja::Error> {
    let env = environment();
    let template = env.template_from_str(source)?;
    template.render(context! { proxy_records => records })
}
