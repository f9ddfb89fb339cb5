use uuid::Uuid;

const PREFIX_LEN: usize = 5;

/// Public slug: a short random prefix followed by the slugified title.
///
/// The prefix keeps slugs unique when titles repeat ("Senior Engineer").
pub fn generate(title: &str) -> String {
    let prefix: String = Uuid::new_v4().simple().to_string()[..PREFIX_LEN].to_string();
    let tail = slugify(title);
    if tail.is_empty() {
        prefix
    } else {
        format!("{prefix}-{tail}")
    }
}

/// Lowercase, ASCII alphanumerics only, runs of anything else become one `-`.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}
