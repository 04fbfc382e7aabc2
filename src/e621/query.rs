/// Prefix that turns a tag into an exclusion.
const EXCLUSION_MARKER: char = '-';

/// Composes the search expression sent as `tags`.
///
/// Positive tags are trimmed and empty ones dropped, then every blacklisted tag follows in its
/// negated form. Both lists keep their order. An empty result matches every post.
pub(crate) fn build_tag_query<S, B>(user_tags: &[S], blacklist: &[B]) -> String
where
    S: AsRef<str>,
    B: AsRef<str>,
{
    let positives = user_tags
        .iter()
        .map(|tag| tag.as_ref().trim())
        .filter(|tag| !tag.is_empty())
        .map(String::from);
    let negatives = blacklist
        .iter()
        .map(|tag| tag.as_ref().trim())
        .filter(|tag| !tag.is_empty())
        .map(|tag| format!("{EXCLUSION_MARKER}{tag}"));

    positives
        .chain(negatives)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// The query that lists every post of a pool. The blacklist is not applied to pools.
pub(crate) fn pool_query(pool_id: &str) -> String {
    format!("pool:{}", pool_id.trim())
}
