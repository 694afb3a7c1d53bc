/// Cluster slug sanitisation (§9): lowercase, `[a-z0-9-]` only, non-empty.
pub fn sanitize(label: &str) -> String {
    let lower = label.to_lowercase().replace('_', "-");
    let mut out = String::with_capacity(lower.len());
    for c in lower.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            out.push(c);
        } else {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derive a cluster's DNS slug, preferring `cluster_id` then `cluster_name`,
/// falling back to `"default"`.
pub fn cluster_slug(cluster_id: &str, cluster_name: &str) -> String {
    if !cluster_id.trim().is_empty() {
        sanitize(cluster_id)
    } else if !cluster_name.trim().is_empty() {
        sanitize(cluster_name)
    } else {
        "default".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_strips_invalid_chars() {
        assert_eq!(sanitize("Cluster_ONE!!"), "cluster-one");
    }

    #[test]
    fn trims_leading_and_trailing_dashes() {
        assert_eq!(sanitize("--foo--"), "foo");
    }

    #[test]
    fn empty_input_falls_back_to_default() {
        assert_eq!(sanitize(""), "default");
        assert_eq!(sanitize("___"), "default");
    }

    #[test]
    fn cluster_slug_prefers_id_over_name() {
        assert_eq!(cluster_slug("us-east-1", "My Cluster"), "us-east-1");
    }

    #[test]
    fn cluster_slug_falls_back_to_name_then_default() {
        assert_eq!(cluster_slug("", "My Cluster"), "my-cluster");
        assert_eq!(cluster_slug("", ""), "default");
    }
}
