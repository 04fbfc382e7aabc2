use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The JSON body returned by `posts.json`.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub(crate) struct BulkPostEntry {
    /// All posts on the requested page.
    #[serde(default)]
    pub(crate) posts: Vec<PostEntry>,
}

/// A single post as returned by the search endpoint.
///
/// Apart from the id, the post is kept exactly as the API sent it so the session metadata
/// record mirrors the response, `null`s and missing keys included. The fields the scraper acts
/// on are read through accessors.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub(crate) struct PostEntry {
    /// The ID of the post.
    pub(crate) id: i64,
    #[serde(flatten)]
    pub(crate) fields: Map<String, Value>,
}

impl PostEntry {
    /// The post's rating (`s`, `q` or `e`), empty when the API left it out.
    pub(crate) fn rating(&self) -> &str {
        self.fields.get("rating").and_then(Value::as_str).unwrap_or("")
    }

    /// The file URL, if the post can be downloaded.
    pub(crate) fn file_url(&self) -> Option<&str> {
        self.file_field("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }

    /// The advertised size of the file in bytes, `0` when unknown.
    pub(crate) fn file_size(&self) -> u64 {
        self.file_field("size").and_then(Value::as_u64).unwrap_or(0)
    }

    /// Whether the post has a file URL to download.
    pub(crate) fn is_downloadable(&self) -> bool {
        self.file_url().is_some()
    }

    fn file_field(&self, name: &str) -> Option<&Value> {
        self.fields.get("file").and_then(|file| file.get(name))
    }
}

#[cfg(test)]
pub(crate) fn test_post(id: i64, url: Option<&str>, size: u64) -> PostEntry {
    let mut fields = Map::new();
    fields.insert("rating".into(), Value::from("s"));
    fields.insert("file".into(), serde_json::json!({ "url": url, "size": size }));
    PostEntry { id, fields }
}
