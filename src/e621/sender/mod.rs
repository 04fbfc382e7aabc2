use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::USER_AGENT;
use reqwest::StatusCode;
use thiserror::Error;

use crate::e621::io::Credentials;
use crate::e621::sender::entries::{BulkPostEntry, PostEntry};

pub(crate) mod entries;

/// The search endpoint of e621.
pub(crate) const API_ENDPOINT: &str = "https://e621.net/posts.json";

/// Timeout applied to API page requests. File downloads are not bounded by it.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while talking to the API or a file host.
#[derive(Error, Debug)]
pub(crate) enum SenderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0} returned")]
    Status(StatusCode),

    #[error("unable to build HTTP client: {0}")]
    Client(String),
}

/// What a single page request produced.
#[derive(Debug)]
pub(crate) enum PageOutcome {
    /// The page held at least one post.
    Posts(Vec<PostEntry>),
    /// The API answered successfully with no posts: the results are exhausted.
    Empty,
    /// The request failed or the API answered with a non-success status.
    Failed(SenderError),
}

/// Anything that can hand out pages of search results.
pub(crate) trait PostSource {
    /// Fetches page `page` (1-based) of `query`, `limit` posts per page.
    fn fetch_page(&self, query: &str, page: u32, limit: u32) -> PageOutcome;
}

/// Sends every request the scraper makes, with the identifying user agent and the optional
/// credential pair attached.
#[derive(Clone, Debug)]
pub(crate) struct RequestSender {
    /// The client used for all requests.
    client: Client,
    /// URL of the search endpoint.
    endpoint: String,
    /// The user agent identifying this client to the API.
    user_agent: String,
    /// Basic auth pair sent with API requests.
    credentials: Option<Credentials>,
}

impl RequestSender {
    pub(crate) fn new(user_agent: &str, credentials: Option<Credentials>) -> Result<Self, SenderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| SenderError::Client(e.to_string()))?;

        Ok(RequestSender {
            client,
            endpoint: API_ENDPOINT.to_string(),
            user_agent: user_agent.to_string(),
            credentials,
        })
    }

    /// Points the sender at another search endpoint.
    pub(crate) fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    fn api_request(&self, url: &str) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .timeout(API_TIMEOUT);
        match &self.credentials {
            Some(login) => request.basic_auth(login.username(), Some(login.api_key())),
            None => request,
        }
    }

    /// Searches for posts matching `query` and returns the posts of one page.
    pub(crate) fn search(&self, query: &str, page: u32, limit: u32) -> Result<Vec<PostEntry>, SenderError> {
        trace!("Searching \"{}\" (page {}, limit {})", query, page, limit);
        let response = self
            .api_request(&self.endpoint)
            .query(&[
                ("tags", query.to_string()),
                ("page", page.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::Status(status));
        }

        let entry: BulkPostEntry = response.json()?;
        Ok(entry.posts)
    }

    /// Opens a streaming `GET` on a file URL. The body is not read until the caller reads it.
    pub(crate) fn get_stream(&self, url: &str) -> Result<Response, SenderError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::Status(status));
        }

        Ok(response)
    }
}

impl PostSource for RequestSender {
    fn fetch_page(&self, query: &str, page: u32, limit: u32) -> PageOutcome {
        match self.search(query, page, limit) {
            Ok(posts) if posts.is_empty() => PageOutcome::Empty,
            Ok(posts) => PageOutcome::Posts(posts),
            Err(err) => {
                error!("Unable to fetch page {} of \"{}\": {}", page, query, err);
                PageOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::Method::GET;
    use httpmock::MockServer;

    use super::*;

    fn page_body(ids: &[i64]) -> String {
        let posts: Vec<String> = ids
            .iter()
            .map(|id| format!(r#"{{"id":{id},"rating":"s","file":{{"url":"https://example.net/{id}.png","size":10}}}}"#))
            .collect();
        format!(r#"{{"posts":[{}]}}"#, posts.join(","))
    }

    #[test]
    fn test_search_sends_query_and_identity() {
        let server = MockServer::start();
        let page = server.mock(|when, then| {
            when.method(GET)
                .path("/posts.json")
                .query_param("tags", "fox -cub")
                .query_param("page", "3")
                .query_param("limit", "20")
                .header("user-agent", "e621_scraper/test (by tester)")
                .header("authorization", "Basic Zm94OnNlY3JldA==");
            then.status(200)
                .header("content-type", "application/json")
                .body(page_body(&[1, 2]));
        });

        let login = Credentials::new("fox", "secret");
        let sender = RequestSender::new("e621_scraper/test (by tester)", Some(login))
            .unwrap()
            .with_endpoint(&server.url("/posts.json"));

        let posts = sender.search("fox -cub", 3, 20).unwrap();
        assert_eq!(posts.len(), 2);
        page.assert();
    }

    #[test]
    fn test_anonymous_requests_have_no_authorization() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.method(GET).path("/posts.json");
            then.status(200)
                .header("content-type", "application/json")
                .body(page_body(&[1]));
        });
        let authorized = server.mock(|when, then| {
            when.method(GET).path("/posts.json").header_exists("authorization");
            then.status(200)
                .header("content-type", "application/json")
                .body(page_body(&[1]));
        });

        let sender = RequestSender::new("agent", None)
            .unwrap()
            .with_endpoint(&server.url("/posts.json"));

        assert!(!sender.is_authenticated());
        sender.search("", 1, 20).unwrap();
        assert_eq!(any.hits(), 1);
        assert_eq!(authorized.hits(), 0);
    }

    #[test]
    fn test_fetch_page_distinguishes_outcomes() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/posts.json").query_param("page", "1");
            then.status(200)
                .header("content-type", "application/json")
                .body(page_body(&[5]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/posts.json").query_param("page", "2");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"posts":[]}"#);
        });
        server.mock(|when, then| {
            when.method(GET).path("/posts.json").query_param("page", "3");
            then.status(503).body(r#"{"success":false}"#);
        });

        let sender = RequestSender::new("agent", None)
            .unwrap()
            .with_endpoint(&server.url("/posts.json"));

        assert!(matches!(sender.fetch_page("fox", 1, 20), PageOutcome::Posts(ref p) if p.len() == 1));
        assert!(matches!(sender.fetch_page("fox", 2, 20), PageOutcome::Empty));
        match sender.fetch_page("fox", 3, 20) {
            PageOutcome::Failed(SenderError::Status(status)) => assert_eq!(status.as_u16(), 503),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_transport_failure_is_failed_page() {
        let sender = RequestSender::new("agent", None)
            .unwrap()
            .with_endpoint("http://127.0.0.1:9/posts.json");

        assert!(matches!(sender.fetch_page("fox", 1, 20), PageOutcome::Failed(_)));
    }
}
