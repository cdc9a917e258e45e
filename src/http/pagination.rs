use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use super::client::ApiClient;
use crate::error::{MigrateError, Result};

pub const PER_PAGE: u32 = 100;

/// How a listing endpoint advances between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStyle {
    /// Follow the `Link: <...>; rel="next"` header until it disappears
    LinkHeader,
    /// Increment `page` until an empty page comes back
    PageNumber,
}

enum Cursor {
    First {
        url: Url,
        query: Vec<(String, String)>,
    },
    Next(Url),
    Page {
        url: Url,
        query: Vec<(String, String)>,
        page: u32,
    },
    Done,
}

/// Walks one listing endpoint page by page.
///
/// A non-list response body is treated as a single-object endpoint: it is
/// yielded once and the walk ends. The paginator is restartable per call
/// only; it keeps no state across runs.
pub struct Paginator<'a> {
    client: &'a ApiClient,
    style: PageStyle,
    cursor: Cursor,
}

impl<'a> Paginator<'a> {
    pub fn new(
        client: &'a ApiClient,
        url: Url,
        mut query: Vec<(String, String)>,
        style: PageStyle,
    ) -> Self {
        if !query.iter().any(|(k, _)| k == "per_page") {
            query.push(("per_page".to_string(), PER_PAGE.to_string()));
        }

        let cursor = match style {
            PageStyle::LinkHeader => Cursor::First { url, query },
            PageStyle::PageNumber => Cursor::Page {
                url,
                query,
                page: 1,
            },
        };

        Self {
            client,
            style,
            cursor,
        }
    }

    /// Fetch the next page, or `None` once the listing is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>> {
        let (url, query, page) = match std::mem::replace(&mut self.cursor, Cursor::Done) {
            Cursor::Done => return Ok(None),
            Cursor::First { url, query } => (url, query, None),
            // the next URL already encodes the query; re-adding it would duplicate parameters
            Cursor::Next(url) => (url, Vec::new(), None),
            Cursor::Page { url, query, page } => (url, query, Some(page)),
        };

        let mut params = query.clone();
        if let Some(page) = page {
            params.push(("page".to_string(), page.to_string()));
        }

        let response = self
            .client
            .send(Method::GET, url.clone(), &params, None)
            .await?
            .error_for_status()?;

        let items = match serde_json::from_str::<Value>(&response.body)? {
            Value::Array(items) => items,
            single => return Ok(Some(vec![single])),
        };

        self.cursor = match self.style {
            PageStyle::LinkHeader => match response.next_link {
                Some(next) => Cursor::Next(Url::parse(&next)?),
                None => Cursor::Done,
            },
            PageStyle::PageNumber if items.is_empty() => Cursor::Done,
            PageStyle::PageNumber => Cursor::Page {
                url,
                query,
                page: page.unwrap_or(1) + 1,
            },
        };

        Ok(Some(items))
    }

    /// Lazily yield every item of every page, deserialized as `T`.
    pub fn into_stream<T>(self) -> BoxStream<'a, Result<T>>
    where
        T: DeserializeOwned + Send + 'a,
    {
        stream::try_unfold(self, |mut pager| async move {
            Ok::<_, MigrateError>(pager.next_page().await?.map(|items| (items, pager)))
        })
        .map_ok(|items| {
            stream::iter(
                items
                    .into_iter()
                    .map(|item| serde_json::from_value::<T>(item).map_err(MigrateError::from)),
            )
        })
        .try_flatten()
        .boxed()
    }
}

impl ApiClient {
    /// Stream every item of a listing endpoint relative to the base URL.
    pub fn paginate<T>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        style: PageStyle,
    ) -> BoxStream<'_, Result<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match self.endpoint(path) {
            Ok(url) => Paginator::new(self, url, query, style).into_stream(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    pub async fn fetch_all<T>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
        style: PageStyle,
    ) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.paginate(path, query, style).try_collect().await
    }
}

/// Extract the `rel="next"` target from an RFC 8288 `Link` header.
pub fn parse_next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let target = segments.next()?.trim();
        let is_next = segments.any(|param| {
            let param = param.trim();
            param == r#"rel="next""# || param == "rel=next"
        });
        is_next.then(|| {
            target
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}

/// Build an owned query list from borrowed pairs.
pub fn query<const N: usize>(pairs: [(&str, &str); N]) -> Vec<(String, String)> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::client::test_client;
    use mockito::Matcher;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn ids(items: Vec<Item>) -> Vec<u32> {
        items.into_iter().map(|i| i.id).collect()
    }

    #[test]
    fn test_parse_next_link_among_relations() {
        let header = r#"<https://gitlab.example.com/api/v4/projects?page=1&per_page=2>; rel="prev", <https://gitlab.example.com/api/v4/projects?page=3&per_page=2>; rel="next", <https://gitlab.example.com/api/v4/projects?page=1&per_page=2>; rel="first""#;
        assert_eq!(
            parse_next_link(header).as_deref(),
            Some("https://gitlab.example.com/api/v4/projects?page=3&per_page=2")
        );
    }

    #[test]
    fn test_parse_next_link_absent() {
        let header = r#"<https://api.github.com/repos/o/r/pulls?page=1>; rel="first""#;
        assert_eq!(parse_next_link(header), None);
        assert_eq!(parse_next_link(""), None);
    }

    #[tokio::test]
    async fn test_link_header_follows_next_without_original_query() {
        let mut server = mockito::Server::new_async().await;
        let next_url = format!("{}/items?cursor=abc", server.url());
        let first = server
            .mock("GET", "/items")
            .match_query(Matcher::Exact("state=all&per_page=100".to_string()))
            .with_status(200)
            .with_header("link", &format!(r#"<{next_url}>; rel="next""#))
            .with_body(r#"[{"id":1},{"id":2}]"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/items")
            .match_query(Matcher::Exact("cursor=abc".to_string()))
            .with_status(200)
            .with_body(r#"[{"id":3}]"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let items: Vec<Item> = client
            .fetch_all("items", query([("state", "all")]), PageStyle::LinkHeader)
            .await
            .unwrap();

        assert_eq!(ids(items), vec![1, 2, 3]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_page_number_stops_on_empty_page() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for (page, body) in [("1", r#"[{"id":1},{"id":2}]"#), ("2", r#"[{"id":3}]"#), ("3", "[]")] {
            mocks.push(
                server
                    .mock("GET", "/users")
                    .match_query(Matcher::AllOf(vec![
                        Matcher::UrlEncoded("page".into(), page.into()),
                        Matcher::UrlEncoded("per_page".into(), "100".into()),
                    ]))
                    .with_status(200)
                    .with_body(body)
                    .expect(1)
                    .create_async()
                    .await,
            );
        }

        let client = test_client(&server.url());
        let items: Vec<Item> = client
            .fetch_all("users", Vec::new(), PageStyle::PageNumber)
            .await
            .unwrap();

        assert_eq!(ids(items), vec![1, 2, 3]);
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_single_object_endpoint_yields_once() {
        let mut server = mockito::Server::new_async().await;
        let detail = server
            .mock("GET", "/projects/5/pipelines/7")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("link", r#"<http://unused/next>; rel="next""#)
            .with_body(r#"{"id":7}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let items: Vec<Item> = client
            .fetch_all("projects/5/pipelines/7", Vec::new(), PageStyle::LinkHeader)
            .await
            .unwrap();

        assert_eq!(items, vec![Item { id: 7 }]);
        detail.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_fails_with_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/groups/1/projects")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"message":"403 Forbidden"}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let err = client
            .fetch_all::<Item>("groups/1/projects", Vec::new(), PageStyle::LinkHeader)
            .await
            .unwrap_err();

        match err {
            MigrateError::Upstream { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("Forbidden"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let mut server = mockito::Server::new_async().await;
        let next_url = format!("{}/items?page=2", server.url());
        server
            .mock("GET", "/items")
            .match_query(Matcher::UrlEncoded("per_page".into(), "100".into()))
            .with_status(200)
            .with_header("link", &format!(r#"<{next_url}>; rel="next""#))
            .with_body(r#"[{"id":1}]"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/items")
            .match_query(Matcher::Exact("page=2".to_string()))
            .with_status(200)
            .with_body(r#"[{"id":2}]"#)
            .expect(0)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let mut stream = client.paginate::<Item>("items", Vec::new(), PageStyle::LinkHeader);
        let first = stream.next().await.unwrap().unwrap();

        assert_eq!(first, Item { id: 1 });
        second.assert_async().await;
    }
}
